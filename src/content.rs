//! Tagged references to flaggable content.
//!
//! Flaggable records live in the host application. This crate only ever sees them through a
//! (content type, object id) pair, plus whatever a
//! [`ContentResolver`](crate::storage::ContentResolver) can tell about them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user of the host application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A model "class": the `app.model` label of a kind of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelLabel {
    pub app_label: String,
    pub model: String,
}

impl ModelLabel {
    pub fn new(app_label: impl AsRef<str>, model: impl AsRef<str>) -> Self {
        Self {
            app_label: app_label.as_ref().to_lowercase(),
            model: model.as_ref().to_lowercase(),
        }
    }

    /// Parse an `app.model` label. Labels are case-insensitive.
    pub fn parse(label: &str) -> Option<Self> {
        let (app_label, model) = label.split_once('.')?;
        if app_label.is_empty() || model.is_empty() || model.contains('.') {
            return None;
        }
        Some(Self::new(app_label, model))
    }
}

impl fmt::Display for ModelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

impl TryFrom<String> for ModelLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid model label `{value}`"))
    }
}

impl From<ModelLabel> for String {
    fn from(value: ModelLabel) -> Self {
        value.to_string()
    }
}

/// A registered content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContentType {
    pub id: i64,
    pub app_label: String,
    pub model: String,
}

impl ContentType {
    pub fn label(&self) -> ModelLabel {
        ModelLabel::new(&self.app_label, &self.model)
    }
}

/// The (content type, object id) pair identifying one flaggable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub content_type_id: i64,
    pub object_id: i64,
}

/// Anything that can be flagged.
pub trait Flaggable: Send + Sync {
    fn model_label(&self) -> ModelLabel;

    fn object_id(&self) -> i64;

    /// The user who produced the content, if known.
    fn creator(&self) -> Option<UserId> {
        None
    }
}

/// A content record resolved from the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    pub model: ModelLabel,
    pub id: i64,
    pub creator: Option<UserId>,
}

impl Flaggable for ContentObject {
    fn model_label(&self) -> ModelLabel {
        self.model.clone()
    }

    fn object_id(&self) -> i64 {
        self.id
    }

    fn creator(&self) -> Option<UserId> {
        self.creator
    }
}

/// The accepted ways of naming a model when asking whether it can be flagged.
///
/// Resolution follows the variant order: an instance, a model label, a content-type record,
/// a content-type id, and finally a free-form name (numeric id first, then `app.model`).
#[derive(Clone, Copy)]
pub enum ModelRef<'a> {
    Object(&'a dyn Flaggable),
    Model(&'a ModelLabel),
    ContentType(&'a ContentType),
    ContentTypeId(i64),
    Name(&'a str),
}

impl fmt::Debug for ModelRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Object(obj) => write!(f, "Object({}#{})", obj.model_label(), obj.object_id()),
            Self::Model(label) => write!(f, "Model({label})"),
            Self::ContentType(ct) => write!(f, "ContentType({})", ct.id),
            Self::ContentTypeId(id) => write!(f, "ContentTypeId({id})"),
            Self::Name(name) => write!(f, "Name({name:?})"),
        }
    }
}

impl fmt::Display for ModelRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Object(obj) => write!(f, "{}", obj.model_label()),
            Self::Model(label) => write!(f, "{label}"),
            Self::ContentType(ct) => write!(f, "{}", ct.label()),
            Self::ContentTypeId(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl<'a, T: Flaggable> From<&'a T> for ModelRef<'a> {
    fn from(value: &'a T) -> Self {
        Self::Object(value)
    }
}
