//! Flag recording, moderation and retraction.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    content::{ContentObject, ContentRef, ContentType, Flaggable, ModelLabel, ModelRef, UserId},
    error::FlagError,
    metrics::{FLAG_ADDED, FLAG_RECALLED, FLAG_REJECTED, STATUS_CHANGED},
    models::{ContentFlagged, FlagInstance, FlaggedContent, NewFlaggedContent},
    policy::FlagPolicy,
    storage::FlagStore,
};

/// How many undelivered notifications a slow subscriber may lag behind.
const SIGNAL_CAPACITY: usize = 256;

type Result<T> = std::result::Result<T, FlagError>;

/// Options of a single [`FlagService::add`] call.
#[derive(Debug, Clone, Default)]
pub struct AddFlag {
    pub comment: Option<String>,
    /// Status given to the aggregate if this call creates it.
    pub status: Option<String>,
    /// Send a [`ContentFlagged`] notification once the flag is recorded.
    pub send_signal: bool,
}

impl AddFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn send_signal(mut self, send_signal: bool) -> Self {
        self.send_signal = send_signal;
        self
    }
}

/// The flagging service.
#[derive(Clone)]
pub struct FlagService<S> {
    store: S,
    policy: Arc<FlagPolicy>,
    signal: broadcast::Sender<ContentFlagged>,
}

impl<S: FlagStore> FlagService<S> {
    pub fn new(store: S, policy: FlagPolicy) -> Self {
        let (signal, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            store,
            policy: Arc::new(policy),
            signal,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &FlagPolicy {
        &self.policy
    }

    /// Receive the notifications of flags added with `send_signal` set.
    pub fn subscribe(&self) -> broadcast::Receiver<ContentFlagged> {
        self.signal.subscribe()
    }

    async fn resolve_model(&self, model: ModelRef<'_>) -> Result<Option<ModelLabel>> {
        let label = match model {
            ModelRef::Object(obj) => Some(obj.model_label()),
            ModelRef::Model(label) => Some(label.clone()),
            ModelRef::ContentType(ct) => Some(ct.label()),
            ModelRef::ContentTypeId(id) => {
                self.store.content_type_by_id(id).await?.map(|ct| ct.label())
            }
            ModelRef::Name(name) => match name.trim().parse::<i64>() {
                Ok(id) => self.store.content_type_by_id(id).await?.map(|ct| ct.label()),
                Err(_) => ModelLabel::parse(name),
            },
        };
        Ok(label)
    }

    /// Resolve `model` and check it against the allow-list.
    pub async fn assert_model_can_be_flagged(&self, model: ModelRef<'_>) -> Result<ModelLabel> {
        match self.resolve_model(model).await? {
            Some(label) if self.policy.model_allowed(&label) => Ok(label),
            Some(label) => Err(FlagError::ModelCannotBeFlagged(label.to_string())),
            None => Err(FlagError::ModelCannotBeFlagged(model.to_string())),
        }
    }

    pub async fn model_can_be_flagged(&self, model: ModelRef<'_>) -> bool {
        match self.assert_model_can_be_flagged(model).await {
            Ok(_) => true,
            Err(FlagError::Storage(err)) => {
                warn!("failed to resolve model {model}: {err:?}");
                false
            }
            Err(_) => false,
        }
    }

    /// Check the model of `object` against the allow-list, and its id.
    async fn assert_object_can_be_flagged(&self, object: &dyn Flaggable) -> Result<ModelLabel> {
        let label = self.assert_model_can_be_flagged(ModelRef::Object(object)).await?;
        if object.object_id() < 0 {
            return Err(FlagError::InvalidObjectId(object.object_id()));
        }
        Ok(label)
    }

    async fn content_ref(&self, object: &dyn Flaggable) -> Result<ContentRef> {
        let label = self.assert_object_can_be_flagged(object).await?;
        let ct = self.store.content_type_for(&label).await?;
        Ok(ContentRef {
            content_type_id: ct.id,
            object_id: object.object_id(),
        })
    }

    /// The aggregate of `object`, if it was ever flagged or registered.
    pub async fn find_for_object(&self, object: &dyn Flaggable) -> Result<Option<FlaggedContent>> {
        let Some(ct) = self.store.find_content_type(&object.model_label()).await? else {
            return Ok(None);
        };

        Ok(self
            .store
            .get_content(ContentRef {
                content_type_id: ct.id,
                object_id: object.object_id(),
            })
            .await?)
    }

    pub async fn get_for_object(&self, object: &dyn Flaggable) -> Result<FlaggedContent> {
        self.find_for_object(object).await?.ok_or(FlagError::NotFound)
    }

    /// Fetch or create the aggregate of `object`.
    ///
    /// `status` and `creator` are only used on creation. An existing aggregate keeps its status
    /// and creator; status changes go through [`FlagService::set_status`].
    pub async fn get_or_create_for_object(
        &self,
        object: &dyn Flaggable,
        status: Option<&str>,
        creator: Option<UserId>,
    ) -> Result<(FlaggedContent, bool)> {
        self.assert_object_can_be_flagged(object).await?;
        if let Some(content) = self.find_for_object(object).await? {
            return Ok((content, false));
        }

        let new = self.new_content(object, status, creator).await?;
        let (content, created) = self.store.get_or_insert_content(&new).await?;
        if created {
            debug!(
                "registered {} #{} for flagging",
                object.model_label(),
                object.object_id()
            );
        }
        Ok((content, created))
    }

    /// Register `object` for flagging ahead of its first flag.
    pub async fn create_for_object(
        &self,
        object: &dyn Flaggable,
        creator: Option<UserId>,
    ) -> Result<FlaggedContent> {
        let new = self.new_content(object, None, creator).await?;
        self.store
            .insert_content(&new)
            .await?
            .ok_or(FlagError::AlreadyExists)
    }

    async fn new_content(
        &self,
        object: &dyn Flaggable,
        status: Option<&str>,
        creator: Option<UserId>,
    ) -> Result<NewFlaggedContent> {
        let status = match status {
            Some(status) => {
                self.policy.validate_status(status)?;
                status
            }
            None => self.policy.default_status(),
        };

        Ok(NewFlaggedContent {
            content: self.content_ref(object).await?,
            creator: creator.or_else(|| object.creator()),
            status: status.to_owned(),
        })
    }

    pub async fn count_flags_by_user(&self, content: &FlaggedContent, user: UserId) -> Result<i64> {
        Ok(self.store.count_flags_by_user(content.id, user).await?)
    }

    pub async fn assert_can_be_flagged_by_user(
        &self,
        content: &FlaggedContent,
        user: UserId,
    ) -> Result<()> {
        // Skip the count query when the object limit already decides.
        self.policy.assert_can_be_flagged(content)?;
        let count = self.count_flags_by_user(content, user).await?;
        self.policy.assert_can_be_flagged_by_user(content, count)
    }

    pub async fn can_be_flagged_by_user(
        &self,
        content: &FlaggedContent,
        user: UserId,
    ) -> Result<bool> {
        match self.assert_can_be_flagged_by_user(content, user).await {
            Ok(()) => Ok(true),
            Err(FlagError::Storage(err)) => Err(FlagError::Storage(err)),
            Err(_) => Ok(false),
        }
    }

    /// Flag `object` on behalf of `user`.
    ///
    /// Nothing is recorded if the model is not flaggable, a limit is reached, or the comment
    /// breaks the comment policy. A refused first flag leaves no aggregate behind.
    pub async fn add(
        &self,
        user: UserId,
        object: &dyn Flaggable,
        request: AddFlag,
    ) -> Result<FlagInstance> {
        self.assert_object_can_be_flagged(object).await?;

        let content = match self.find_for_object(object).await? {
            Some(content) => content,
            None => {
                // A fresh aggregate has no flags, so only the comment can refuse this one.
                if let Err(err) = self.policy.check_comment(request.comment.as_deref()) {
                    return Err(rejected(user, object, err));
                }
                let (content, _) = self
                    .get_or_create_for_object(object, request.status.as_deref(), None)
                    .await?;
                content
            }
        };

        let checked = match self.assert_can_be_flagged_by_user(&content, user).await {
            Ok(()) => self.policy.check_comment(request.comment.as_deref()),
            Err(err) => Err(err),
        };
        let comment = checked.map_err(|err| rejected(user, object, err))?;

        let (content, instance) = self
            .store
            .record_flag(content.id, user, comment, Utc::now())
            .await?;

        counter!(FLAG_ADDED).increment(1);
        info!(
            "user {user} flagged {} #{} (count {})",
            object.model_label(),
            object.object_id(),
            content.count
        );

        if request.send_signal {
            // No subscribers is not an error.
            drop(self.signal.send(ContentFlagged {
                flagged_content: content,
                flag_instance: instance.clone(),
            }));
        }

        Ok(instance)
    }

    /// Flag an object given its content type and id.
    ///
    /// The notification is always sent.
    pub async fn add_flag(
        &self,
        flagger: UserId,
        content_type: &ContentType,
        object_id: i64,
        content_creator: Option<UserId>,
        comment: Option<String>,
        status: Option<String>,
    ) -> Result<FlagInstance> {
        let object = ContentObject {
            model: content_type.label(),
            id: object_id,
            creator: content_creator,
        };
        let request = AddFlag {
            comment,
            status,
            send_signal: true,
        };
        self.add(flagger, &object, request).await
    }

    /// Flag events of `content`, oldest first.
    pub async fn instances(&self, content: &FlaggedContent) -> Result<Vec<FlagInstance>> {
        Ok(self.store.instances(content.id).await?)
    }

    /// Moderation action: change the status of an aggregate.
    pub async fn set_status(
        &self,
        content_id: i64,
        status: &str,
        moderator: UserId,
    ) -> Result<FlaggedContent> {
        self.policy.validate_status(status)?;

        let content = self
            .store
            .update_status(content_id, status, Some(moderator))
            .await?
            .ok_or(FlagError::NotFound)?;

        counter!(STATUS_CHANGED).increment(1);
        info!("moderator {moderator} set status of content {content_id} to {status}");
        Ok(content)
    }

    /// Retract one of `user`'s flags. The aggregate's count is left unchanged.
    pub async fn recall(&self, user: UserId, instance_id: i64) -> Result<FlagInstance> {
        let instance = self
            .store
            .get_instance(instance_id)
            .await?
            .filter(|instance| instance.user_id == user)
            .ok_or(FlagError::NotFound)?;

        if instance.is_recalled() {
            return Ok(instance);
        }

        let instance = self
            .store
            .recall_instance(instance_id, Utc::now())
            .await?
            .ok_or(FlagError::NotFound)?;

        counter!(FLAG_RECALLED).increment(1);
        info!("user {user} recalled flag {instance_id}");
        Ok(instance)
    }
}

fn rejected(user: UserId, object: &dyn Flaggable, err: FlagError) -> FlagError {
    if err.is_rejection() {
        counter!(FLAG_REJECTED).increment(1);
        debug!(
            "user {user} cannot flag {} #{}: {err}",
            object.model_label(),
            object.object_id()
        );
    }
    err
}
