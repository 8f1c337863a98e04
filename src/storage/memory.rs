//! In-memory reference implementations.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use futures::lock::Mutex;

use super::{ContentResolver, FlagStore};
use crate::{
    content::{ContentObject, ContentRef, ContentType, ModelLabel, UserId},
    models::{FlagInstance, FlaggedContent, NewFlaggedContent},
};

#[derive(Default, Debug)]
struct Tables {
    content_types: Vec<ContentType>,
    contents: HashMap<i64, FlaggedContent>,
    content_index: HashMap<ContentRef, i64>,
    instances: Vec<FlagInstance>,
}

impl Tables {
    fn find_content_type(&self, label: &ModelLabel) -> Option<&ContentType> {
        self.content_types
            .iter()
            .find(|ct| ct.app_label == label.app_label && ct.model == label.model)
    }

    fn insert_content(&mut self, new: &NewFlaggedContent) -> Option<FlaggedContent> {
        if self.content_index.contains_key(&new.content) {
            return None;
        }

        let content = FlaggedContent {
            id: next_id(self.contents.len()),
            content_type_id: new.content.content_type_id,
            object_id: new.content.object_id,
            creator: new.creator,
            status: new.status.clone(),
            moderator: None,
            count: 0,
        };
        drop(self.content_index.insert(new.content, content.id));
        drop(self.contents.insert(content.id, content.clone()));
        Some(content)
    }

    fn instance_mut(&mut self, id: i64) -> Option<&mut FlagInstance> {
        self.instances.iter_mut().find(|i| i.id == id)
    }
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).map_or(i64::MAX, |len| len + 1)
}

/// Reference [`FlagStore`] keeping everything in process memory.
///
/// A single lock guards all tables, so every operation is atomic.
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryStore {
    async fn content_type_for(&self, label: &ModelLabel) -> Result<ContentType> {
        let mut tables = self.tables.lock().await;
        if let Some(ct) = tables.find_content_type(label) {
            return Ok(ct.clone());
        }

        let ct = ContentType {
            id: next_id(tables.content_types.len()),
            app_label: label.app_label.clone(),
            model: label.model.clone(),
        };
        tables.content_types.push(ct.clone());
        Ok(ct)
    }

    async fn content_type_by_id(&self, id: i64) -> Result<Option<ContentType>> {
        let tables = self.tables.lock().await;
        Ok(tables.content_types.iter().find(|ct| ct.id == id).cloned())
    }

    async fn find_content_type(&self, label: &ModelLabel) -> Result<Option<ContentType>> {
        Ok(self.tables.lock().await.find_content_type(label).cloned())
    }

    async fn get_content(&self, content: ContentRef) -> Result<Option<FlaggedContent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .content_index
            .get(&content)
            .and_then(|id| tables.contents.get(id))
            .cloned())
    }

    async fn get_content_by_id(&self, id: i64) -> Result<Option<FlaggedContent>> {
        Ok(self.tables.lock().await.contents.get(&id).cloned())
    }

    async fn insert_content(&self, new: &NewFlaggedContent) -> Result<Option<FlaggedContent>> {
        Ok(self.tables.lock().await.insert_content(new))
    }

    async fn get_or_insert_content(
        &self,
        new: &NewFlaggedContent,
    ) -> Result<(FlaggedContent, bool)> {
        let mut tables = self.tables.lock().await;
        if let Some(content) = tables.insert_content(new) {
            return Ok((content, true));
        }

        let content = tables
            .content_index
            .get(&new.content)
            .and_then(|id| tables.contents.get(id))
            .cloned()
            .context("flagged content index is inconsistent")?;
        Ok((content, false))
    }

    async fn count_flags_by_user(&self, content_id: i64, user: UserId) -> Result<i64> {
        let tables = self.tables.lock().await;
        let count = tables
            .instances
            .iter()
            .filter(|i| i.flagged_content_id == content_id && i.user_id == user)
            .count();
        Ok(i64::try_from(count)?)
    }

    async fn record_flag(
        &self,
        content_id: i64,
        user: UserId,
        comment: Option<String>,
        when: DateTime<Utc>,
    ) -> Result<(FlaggedContent, FlagInstance)> {
        let mut tables = self.tables.lock().await;

        let content = tables
            .contents
            .get_mut(&content_id)
            .context("flagged content not found")?;
        content.count = content.count.saturating_add(1);
        let content = content.clone();

        let instance = FlagInstance {
            id: next_id(tables.instances.len()),
            flagged_content_id: content_id,
            user_id: user,
            when_added: when,
            when_recalled: None,
            comment,
        };
        tables.instances.push(instance.clone());

        Ok((content, instance))
    }

    async fn instances(&self, content_id: i64) -> Result<Vec<FlagInstance>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .instances
            .iter()
            .filter(|i| i.flagged_content_id == content_id)
            .cloned()
            .collect())
    }

    async fn get_instance(&self, id: i64) -> Result<Option<FlagInstance>> {
        let tables = self.tables.lock().await;
        Ok(tables.instances.iter().find(|i| i.id == id).cloned())
    }

    async fn recall_instance(&self, id: i64, when: DateTime<Utc>) -> Result<Option<FlagInstance>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.instance_mut(id).map(|instance| {
            instance.when_recalled = instance.when_recalled.or(Some(when));
            instance.clone()
        }))
    }

    async fn update_status(
        &self,
        content_id: i64,
        status: &str,
        moderator: Option<UserId>,
    ) -> Result<Option<FlaggedContent>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.contents.get_mut(&content_id).map(|content| {
            status.clone_into(&mut content.status);
            content.moderator = moderator;
            content.clone()
        }))
    }
}

/// Reference [`ContentResolver`] over a fixed set of records.
#[derive(Clone, Default, Debug)]
pub struct MemoryResolver {
    objects: Arc<HashMap<(ModelLabel, i64), ContentObject>>,
}

impl MemoryResolver {
    pub fn new(objects: impl IntoIterator<Item = ContentObject>) -> Self {
        let objects = objects
            .into_iter()
            .map(|obj| ((obj.model.clone(), obj.id), obj))
            .collect();
        Self {
            objects: Arc::new(objects),
        }
    }
}

impl ContentResolver for MemoryResolver {
    async fn resolve(&self, model: &ModelLabel, object_id: i64) -> Result<Option<ContentObject>> {
        Ok(self.objects.get(&(model.clone(), object_id)).cloned())
    }
}
