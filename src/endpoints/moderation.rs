//! Moderation and retraction.

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use constcat::concat;
use serde::Deserialize;

use crate::{
    AppState, Result,
    auth::CurrentUser,
    config::AppConfig,
    content::UserId,
    error::Error,
    models::{FlagInstance, FlaggedContent},
    presentation::FLAG_ROOT,
    serve::Flags,
};

#[derive(Deserialize, Debug)]
struct ModerateInput {
    status: String,
}

fn require_user(user: Option<UserId>) -> Result<UserId> {
    user.ok_or_else(|| {
        Error::with_status(StatusCode::UNAUTHORIZED, anyhow!("authentication required"))
    })
}

/// Change the status of flagged content
/// POST `/flag/moderate/{content_id}`
async fn moderate(
    State(config): State<AppConfig>,
    State(flags): State<Flags>,
    CurrentUser(user): CurrentUser,
    Path(content_id): Path<i64>,
    Json(input): Json<ModerateInput>,
) -> Result<Json<FlaggedContent>> {
    let moderator = require_user(user)?;
    if !config.moderators.contains(&moderator) {
        return Err(Error::with_status(
            StatusCode::FORBIDDEN,
            anyhow!("user {moderator} is not a moderator"),
        ));
    }

    let content = flags.set_status(content_id, &input.status, moderator).await?;
    Ok(Json(content))
}

/// Retract one of the caller's flags
/// POST `/flag/recall/{instance_id}`
async fn recall(
    State(flags): State<Flags>,
    CurrentUser(user): CurrentUser,
    Path(instance_id): Path<i64>,
) -> Result<Json<FlagInstance>> {
    let user = require_user(user)?;
    let instance = flags.recall(user, instance_id).await?;
    Ok(Json(instance))
}

pub(super) fn routes() -> Router<AppState> {
    // AP /flag/moderate/{content_id}
    // AP /flag/recall/{instance_id}
    Router::new()
        .route(concat!(FLAG_ROOT, "/moderate/{content_id}"), post(moderate))
        .route(concat!(FLAG_ROOT, "/recall/{instance_id}"), post(recall))
}
