//! Tamper protection for the flag form.
//!
//! Every rendered form carries the target and a timestamp, signed with an HMAC. A submission is
//! only accepted if the hash matches and the form is not older than the configured expiry.

use anyhow::anyhow;
use chrono::Utc;
use hmac::{Hmac, Mac as _};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::content::ModelLabel;

type HmacSha256 = Hmac<Sha256>;

/// Hidden fields of a flag form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityData {
    pub content_type: String,
    pub object_pk: String,
    pub timestamp: i64,
    pub security_hash: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("the security hash failed to verify")]
    BadHash,
    #[error("the flag form has expired")]
    Expired,
}

/// Signs and verifies flag forms.
#[derive(Clone)]
pub struct FormSecurity {
    mac: HmacSha256,
    expiry_secs: i64,
}

impl std::fmt::Debug for FormSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSecurity")
            .field("expiry_secs", &self.expiry_secs)
            .finish_non_exhaustive()
    }
}

impl FormSecurity {
    pub fn new(key: &[u8], expiry_hours: u32) -> anyhow::Result<Self> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key).map_err(|_| anyhow!("invalid form signing key"))?,
            expiry_secs: i64::from(expiry_hours) * 60 * 60,
        })
    }

    pub fn initial(&self, model: &ModelLabel, object_pk: i64) -> SecurityData {
        self.initial_at(model, object_pk, Utc::now().timestamp())
    }

    pub fn initial_at(&self, model: &ModelLabel, object_pk: i64, timestamp: i64) -> SecurityData {
        let content_type = model.to_string();
        let object_pk = object_pk.to_string();
        let security_hash = hex::encode(
            self.mac(&content_type, &object_pk, timestamp)
                .finalize()
                .into_bytes(),
        );

        SecurityData {
            content_type,
            object_pk,
            timestamp,
            security_hash,
        }
    }

    fn mac(&self, content_type: &str, object_pk: &str, timestamp: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{content_type}-{object_pk}-{timestamp}").as_bytes());
        mac
    }

    pub fn verify(&self, data: &SecurityData) -> Result<(), SecurityError> {
        self.verify_at(data, Utc::now().timestamp())
    }

    /// The hash is checked before the age, so a forged timestamp reads as a bad hash.
    pub fn verify_at(&self, data: &SecurityData, now: i64) -> Result<(), SecurityError> {
        let expected = hex::decode(&data.security_hash).map_err(|_| SecurityError::BadHash)?;
        self.mac(&data.content_type, &data.object_pk, data.timestamp)
            .verify_slice(&expected)
            .map_err(|_| SecurityError::BadHash)?;

        if now.saturating_sub(data.timestamp) > self.expiry_secs {
            return Err(SecurityError::Expired);
        }
        Ok(())
    }
}
