//! Flag storage and content lookup.

mod memory;
mod resolver;
mod sqlite;

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    content::{ContentObject, ContentRef, ContentType, ModelLabel, UserId},
    models::{FlagInstance, FlaggedContent, NewFlaggedContent},
};

// Re-export public items
pub use memory::{MemoryResolver, MemoryStore};
pub use resolver::SqlContentResolver;
pub use sqlite::{SqliteStore, open_pool};

/// Persistence for aggregates, flag events and the content-type registry.
pub trait FlagStore: Clone + Send + Sync + 'static {
    /// Fetch the content type registered for `label`, registering it if needed.
    fn content_type_for(&self, label: &ModelLabel)
    -> impl Future<Output = Result<ContentType>> + Send;

    fn content_type_by_id(&self, id: i64)
    -> impl Future<Output = Result<Option<ContentType>>> + Send;

    /// Look up a content type without registering it.
    fn find_content_type(
        &self,
        label: &ModelLabel,
    ) -> impl Future<Output = Result<Option<ContentType>>> + Send;

    fn get_content(
        &self,
        content: ContentRef,
    ) -> impl Future<Output = Result<Option<FlaggedContent>>> + Send;

    fn get_content_by_id(&self, id: i64)
    -> impl Future<Output = Result<Option<FlaggedContent>>> + Send;

    /// Insert a new aggregate. Returns `None` if one already exists for the content.
    fn insert_content(
        &self,
        new: &NewFlaggedContent,
    ) -> impl Future<Output = Result<Option<FlaggedContent>>> + Send;

    /// Fetch the aggregate for the content, inserting it if absent. The flag is `true` if the
    /// aggregate was created by this call. An existing aggregate is returned untouched.
    fn get_or_insert_content(
        &self,
        new: &NewFlaggedContent,
    ) -> impl Future<Output = Result<(FlaggedContent, bool)>> + Send;

    fn count_flags_by_user(
        &self,
        content_id: i64,
        user: UserId,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Increment the aggregate's count and insert the flag event as one atomic unit.
    ///
    /// The increment is evaluated by the storage itself, never as a read-modify-write.
    fn record_flag(
        &self,
        content_id: i64,
        user: UserId,
        comment: Option<String>,
        when: DateTime<Utc>,
    ) -> impl Future<Output = Result<(FlaggedContent, FlagInstance)>> + Send;

    /// Flag events of an aggregate, oldest first.
    fn instances(&self, content_id: i64)
    -> impl Future<Output = Result<Vec<FlagInstance>>> + Send;

    fn get_instance(&self, id: i64) -> impl Future<Output = Result<Option<FlagInstance>>> + Send;

    /// Set the retraction timestamp of an event unless it is already set.
    fn recall_instance(
        &self,
        id: i64,
        when: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<FlagInstance>>> + Send;

    fn update_status(
        &self,
        content_id: i64,
        status: &str,
        moderator: Option<UserId>,
    ) -> impl Future<Output = Result<Option<FlaggedContent>>> + Send;
}

/// Lookup of the host application's content records.
pub trait ContentResolver: Clone + Send + Sync + 'static {
    /// Resolve a record, or `None` if the model is unknown or the record does not exist.
    fn resolve(
        &self,
        model: &ModelLabel,
        object_id: i64,
    ) -> impl Future<Output = Result<Option<ContentObject>>> + Send;
}
