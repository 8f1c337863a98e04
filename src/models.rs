//! Persistent flagging records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::content::{ContentRef, UserId};

/// Per-object flag aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct FlaggedContent {
    pub id: i64,
    pub content_type_id: i64,
    pub object_id: i64,
    /// Kept here so that it outlives the content itself.
    pub creator: Option<UserId>,
    pub status: String,
    /// Moderator responsible for the last status change.
    pub moderator: Option<UserId>,
    /// All-time number of flags, retracted ones included.
    pub count: i64,
}

impl FlaggedContent {
    pub fn content_ref(&self) -> ContentRef {
        ContentRef {
            content_type_id: self.content_type_id,
            object_id: self.object_id,
        }
    }
}

/// Values used when an aggregate has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlaggedContent {
    pub content: ContentRef,
    pub creator: Option<UserId>,
    pub status: String,
}

/// One user's act of flagging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct FlagInstance {
    pub id: i64,
    pub flagged_content_id: i64,
    pub user_id: UserId,
    pub when_added: DateTime<Utc>,
    pub when_recalled: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl FlagInstance {
    pub fn is_recalled(&self) -> bool {
        self.when_recalled.is_some()
    }
}

/// Notification sent after a flag has been recorded, when the caller asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentFlagged {
    pub flagged_content: FlaggedContent,
    pub flag_instance: FlagInstance,
}
