//! Content lookup in the host application's tables.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context as _, Result, bail};
use sqlx::SqlitePool;

use super::ContentResolver;
use crate::{
    config::ContentSource,
    content::{ContentObject, ModelLabel, UserId},
};

/// Resolves content records from the tables declared in the `[[content]]` configuration.
#[derive(Clone, Debug)]
pub struct SqlContentResolver {
    pool: SqlitePool,
    queries: Arc<HashMap<ModelLabel, String>>,
}

impl SqlContentResolver {
    /// Build the lookup queries. Table and column names are checked to be plain identifiers
    /// since they are spliced into SQL.
    pub fn new(pool: SqlitePool, sources: &[ContentSource]) -> Result<Self> {
        let mut queries = HashMap::new();

        for source in sources {
            check_identifier(&source.table)?;
            check_identifier(&source.id_column)?;
            let creator = match source.creator_column.as_deref() {
                Some(column) => {
                    check_identifier(column)?;
                    column
                }
                None => "NULL",
            };

            let query = format!(
                "SELECT {creator} FROM {} WHERE {} = ?",
                source.table, source.id_column
            );
            if queries.insert(source.model.clone(), query).is_some() {
                bail!("content source for `{}` declared twice", source.model);
            }
        }

        Ok(Self {
            pool,
            queries: Arc::new(queries),
        })
    }
}

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        bail!("`{name}` is not a valid SQL identifier");
    }
    Ok(())
}

impl ContentResolver for SqlContentResolver {
    async fn resolve(&self, model: &ModelLabel, object_id: i64) -> Result<Option<ContentObject>> {
        let Some(query) = self.queries.get(model) else {
            return Ok(None);
        };

        let row: Option<Option<i64>> = sqlx::query_scalar(query)
            .bind(object_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to look up {model} #{object_id}"))?;

        Ok(row.map(|creator| ContentObject {
            model: model.clone(),
            id: object_id,
            creator: creator.map(UserId),
        }))
    }
}
