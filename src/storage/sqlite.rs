//! SQLite-based flag storage implementation.

use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use super::FlagStore;
use crate::{
    content::{ContentRef, ContentType, ModelLabel, UserId},
    models::{FlagInstance, FlaggedContent, NewFlaggedContent},
};

const CONTENT_COLUMNS: &str = "id, content_type_id, object_id, creator, status, moderator, count";
const INSTANCE_COLUMNS: &str =
    "id, flagged_content_id, user_id, when_added, when_recalled, comment";

/// Open a connection pool and bring the schema up to date.
pub async fn open_pool(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .context("failed to parse database options")?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
        .context("failed to connect to SQLite database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to apply migrations")?;

    Ok(pool)
}

/// SQLite-based implementation of [`FlagStore`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl FlagStore for SqliteStore {
    async fn content_type_for(&self, label: &ModelLabel) -> Result<ContentType> {
        _ = sqlx::query(
            "INSERT INTO content_type (app_label, model) VALUES (?, ?)
             ON CONFLICT (app_label, model) DO NOTHING",
        )
        .bind(&label.app_label)
        .bind(&label.model)
        .execute(&self.pool)
        .await
        .context("failed to register content type")?;

        self.find_content_type(label)
            .await?
            .context("content type missing after registration")
    }

    async fn content_type_by_id(&self, id: i64) -> Result<Option<ContentType>> {
        sqlx::query_as("SELECT id, app_label, model FROM content_type WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query content type")
    }

    async fn find_content_type(&self, label: &ModelLabel) -> Result<Option<ContentType>> {
        sqlx::query_as(
            "SELECT id, app_label, model FROM content_type WHERE app_label = ? AND model = ?",
        )
        .bind(&label.app_label)
        .bind(&label.model)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query content type")
    }

    async fn get_content(&self, content: ContentRef) -> Result<Option<FlaggedContent>> {
        sqlx::query_as(&format!(
            "SELECT {CONTENT_COLUMNS} FROM flagged_content
             WHERE content_type_id = ? AND object_id = ?"
        ))
        .bind(content.content_type_id)
        .bind(content.object_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query flagged content")
    }

    async fn get_content_by_id(&self, id: i64) -> Result<Option<FlaggedContent>> {
        sqlx::query_as(&format!(
            "SELECT {CONTENT_COLUMNS} FROM flagged_content WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query flagged content")
    }

    async fn insert_content(&self, new: &NewFlaggedContent) -> Result<Option<FlaggedContent>> {
        sqlx::query_as(&format!(
            "INSERT INTO flagged_content (content_type_id, object_id, creator, status, count)
             VALUES (?, ?, ?, ?, 0)
             ON CONFLICT (content_type_id, object_id) DO NOTHING
             RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(new.content.content_type_id)
        .bind(new.content.object_id)
        .bind(new.creator)
        .bind(&new.status)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert flagged content")
    }

    async fn get_or_insert_content(
        &self,
        new: &NewFlaggedContent,
    ) -> Result<(FlaggedContent, bool)> {
        if let Some(content) = self.insert_content(new).await? {
            return Ok((content, true));
        }

        let content = self
            .get_content(new.content)
            .await?
            .context("flagged content missing after conflicting insert")?;
        Ok((content, false))
    }

    async fn count_flags_by_user(&self, content_id: i64, user: UserId) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM flag_instance WHERE flagged_content_id = ? AND user_id = ?",
        )
        .bind(content_id)
        .bind(user)
        .fetch_one(&self.pool)
        .await
        .context("failed to count flags")
    }

    async fn record_flag(
        &self,
        content_id: i64,
        user: UserId,
        comment: Option<String>,
        when: DateTime<Utc>,
    ) -> Result<(FlaggedContent, FlagInstance)> {
        // Unless committed, the transaction will be automatically rolled back.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let content: FlaggedContent = sqlx::query_as(&format!(
            "UPDATE flagged_content
                SET count = count + 1
                WHERE id = ?
                RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(content_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to increment flag count")?
        .context("flagged content not found")?;

        let instance: FlagInstance = sqlx::query_as(&format!(
            "INSERT INTO flag_instance (flagged_content_id, user_id, when_added, comment)
             VALUES (?, ?, ?, ?)
             RETURNING {INSTANCE_COLUMNS}"
        ))
        .bind(content_id)
        .bind(user)
        .bind(when)
        .bind(comment)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert flag")?;

        tx.commit().await.context("failed to commit flag")?;

        Ok((content, instance))
    }

    async fn instances(&self, content_id: i64) -> Result<Vec<FlagInstance>> {
        sqlx::query_as(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM flag_instance
             WHERE flagged_content_id = ?
             ORDER BY id"
        ))
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to query flags")
    }

    async fn get_instance(&self, id: i64) -> Result<Option<FlagInstance>> {
        sqlx::query_as(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM flag_instance WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query flag")
    }

    async fn recall_instance(&self, id: i64, when: DateTime<Utc>) -> Result<Option<FlagInstance>> {
        sqlx::query_as(&format!(
            "UPDATE flag_instance
                SET when_recalled = COALESCE(when_recalled, ?)
                WHERE id = ?
                RETURNING {INSTANCE_COLUMNS}"
        ))
        .bind(when)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to recall flag")
    }

    async fn update_status(
        &self,
        content_id: i64,
        status: &str,
        moderator: Option<UserId>,
    ) -> Result<Option<FlaggedContent>> {
        sqlx::query_as(&format!(
            "UPDATE flagged_content
                SET status = ?, moderator = ?
                WHERE id = ?
                RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(status)
        .bind(moderator)
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to update status")
    }
}
