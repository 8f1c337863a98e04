//! Flag limits, comment rules and the model allow-list.

use crate::{
    config::{CommentPolicy, FlagConfig, StatusChoice},
    content::ModelLabel,
    error::FlagError,
    models::FlaggedContent,
};

/// Immutable rule set derived from [`FlagConfig`].
#[derive(Debug, Clone)]
pub struct FlagPolicy {
    models: Option<Vec<ModelLabel>>,
    limit_for_object: u32,
    limit_same_object_for_user: u32,
    comments: CommentPolicy,
    statuses: Vec<StatusChoice>,
}

impl FlagPolicy {
    pub fn new(config: &FlagConfig) -> Self {
        Self {
            models: config.models.clone().filter(|models| !models.is_empty()),
            limit_for_object: config.limit_for_object,
            limit_same_object_for_user: config.limit_same_object_for_user,
            comments: config.comments,
            statuses: config.statuses.clone(),
        }
    }

    pub fn comments(&self) -> CommentPolicy {
        self.comments
    }

    /// Status given to newly created aggregates.
    pub fn default_status(&self) -> &str {
        self.statuses.first().map_or("1", |s| s.code.as_str())
    }

    pub fn status_label(&self, code: &str) -> Option<&str> {
        self.statuses
            .iter()
            .find(|s| s.code == code)
            .map(|s| s.label.as_str())
    }

    pub fn validate_status(&self, code: &str) -> Result<(), FlagError> {
        if self.status_label(code).is_some() {
            Ok(())
        } else {
            Err(FlagError::InvalidStatus(code.to_owned()))
        }
    }

    pub fn model_allowed(&self, label: &ModelLabel) -> bool {
        self.models
            .as_ref()
            .map_or(true, |models| models.contains(label))
    }

    /// Object-level limit. A limit of 0 means unlimited.
    pub fn can_be_flagged(&self, content: &FlaggedContent) -> bool {
        self.limit_for_object == 0 || content.count < i64::from(self.limit_for_object)
    }

    pub fn assert_can_be_flagged(&self, content: &FlaggedContent) -> Result<(), FlagError> {
        if self.can_be_flagged(content) {
            Ok(())
        } else {
            Err(FlagError::ContentFlaggedEnough)
        }
    }

    /// Both limits, given how many flags the user already put on `content`.
    pub fn can_be_flagged_by_user(&self, content: &FlaggedContent, user_count: i64) -> bool {
        self.assert_can_be_flagged_by_user(content, user_count).is_ok()
    }

    /// The object-level error wins when both limits are exceeded.
    pub fn assert_can_be_flagged_by_user(
        &self,
        content: &FlaggedContent,
        user_count: i64,
    ) -> Result<(), FlagError> {
        self.assert_can_be_flagged(content)?;

        if self.limit_same_object_for_user != 0
            && user_count >= i64::from(self.limit_same_object_for_user)
        {
            return Err(FlagError::ContentAlreadyFlaggedByUser { count: user_count });
        }
        Ok(())
    }

    /// Check a comment against the comment policy. Blank comments count as absent.
    pub fn check_comment(&self, comment: Option<&str>) -> Result<Option<String>, FlagError> {
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());

        match (self.comments, comment) {
            (CommentPolicy::Required, None) => Err(FlagError::Comment("A comment is required")),
            (CommentPolicy::Forbidden, Some(_)) => {
                Err(FlagError::Comment("Comments are not allowed"))
            }
            (_, comment) => Ok(comment.map(ToOwned::to_owned)),
        }
    }
}
