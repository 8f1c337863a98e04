//! Content flagging service.
//!
//! Users flag content they find objectionable; moderators review the per-object aggregates.
mod auth;
pub mod config;
pub mod content;
mod endpoints;
pub mod error;
pub mod flagging;
mod metrics;
pub mod models;
pub mod policy;
pub mod presentation;
pub mod security;
mod serve;
pub mod storage;

#[cfg(test)]
mod tests;

pub use serve::{AppState, Flags, Result, app, run};

/// The index (/) route.
async fn index() -> impl axum::response::IntoResponse {
    r"
                    __             __  ____
  _________  ____  / /____  ____  / /_/ __/ /___ _____ _
 / ___/ __ \/ __ \/ __/ _ \/ __ \/ __/ /_/ / __ `/ __ `/
/ /__/ /_/ / / / / /_/  __/ / / / /_/ __/ / /_/ / /_/ /
\___/\____/_/ /_/\__/\___/_/ /_/\__/_/ /_/\__,_/\__, /
                                               /____/

This is a content flagging service.

Flag confirmation pages live under /flag/{app_label}/{model}/{object_id}/
    "
}
