//! Read-only projections for display contexts.
//!
//! None of these fail: a missing aggregate reads as zero flags, and anything that prevents
//! flagging (anonymous user, disallowed model, limits, storage trouble) reads as `false`.

use tracing::warn;

use crate::{
    content::{Flaggable, ModelRef, UserId},
    error::FlagError,
    flagging::FlagService,
    storage::FlagStore,
};

/// Mount point of the flag routes.
pub const FLAG_ROOT: &str = "/flag";

/// Number of flags ever recorded on `object`.
pub async fn flag_count<S: FlagStore>(flags: &FlagService<S>, object: &dyn Flaggable) -> i64 {
    match flags.find_for_object(object).await {
        Ok(content) => content.map_or(0, |content| content.count),
        Err(err) => {
            warn!("failed to look up flag count: {err:?}");
            0
        }
    }
}

/// Status code of `object`'s aggregate, if it was ever flagged.
pub async fn flag_status<S: FlagStore>(
    flags: &FlagService<S>,
    object: &dyn Flaggable,
) -> Option<String> {
    match flags.find_for_object(object).await {
        Ok(content) => content.map(|content| content.status),
        Err(err) => {
            warn!("failed to look up flag status: {err:?}");
            None
        }
    }
}

/// Whether `user` may flag `object` right now.
pub async fn can_be_flagged_by<S: FlagStore>(
    flags: &FlagService<S>,
    object: &dyn Flaggable,
    user: Option<UserId>,
) -> bool {
    let Some(user) = user else {
        return false;
    };
    if !flags.model_can_be_flagged(ModelRef::Object(object)).await {
        return false;
    }

    let content = match flags.find_for_object(object).await {
        Ok(Some(content)) => content,
        // Never flagged.
        Ok(None) => return true,
        Err(err) => {
            warn!("failed to look up flagged content: {err:?}");
            return false;
        }
    };

    match flags.can_be_flagged_by_user(&content, user).await {
        Ok(allowed) => allowed,
        Err(FlagError::Storage(err)) => {
            warn!("failed to check flag limits: {err:?}");
            false
        }
        Err(_) => false,
    }
}

/// Path of the confirmation page for flagging `object`.
pub fn flag_confirm_url(object: &dyn Flaggable) -> String {
    let label = object.model_label();
    format!(
        "{FLAG_ROOT}/{}/{}/{}/",
        label.app_label,
        label.model,
        object.object_id()
    )
}
