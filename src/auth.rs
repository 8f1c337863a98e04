//! Authentication layers

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts, response::Redirect};
use tracing::debug;

use crate::{content::UserId, serve::AppState};

/// The user on whose behalf a request is made, as asserted by the fronting proxy.
///
/// A missing or malformed header yields an anonymous user; handlers decide what that means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Option<UserId>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(state.config.auth.user_header.as_str()) else {
            return Ok(Self(None));
        };

        let user = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(UserId);
        if user.is_none() {
            debug!("ignoring malformed user header {value:?}");
        }

        Ok(Self(user))
    }
}

/// Send an anonymous user to the login page, coming back to `next` afterwards.
pub fn login_redirect(login_url: &str, next: &str) -> Redirect {
    let mut url = String::from(login_url);
    url.push(if login_url.contains('?') { '&' } else { '?' });
    url.push_str(
        &url::form_urlencoded::Serializer::new(String::new())
            .append_pair("next", next)
            .finish(),
    );
    Redirect::to(&url)
}
