use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Domain errors raised by the flagging operations.
///
/// Every variant except [`FlagError::Storage`] is an expected condition that the caller
/// is supposed to turn into a user-visible response.
#[derive(Debug, Error)]
pub enum FlagError {
    /// The target's model is outside the configured allow-list (or could not be resolved).
    #[error("model `{0}` cannot be flagged")]
    ModelCannotBeFlagged(String),
    /// Object ids are non-negative.
    #[error("invalid object id {0}")]
    InvalidObjectId(i64),
    /// The aggregate already reached the per-object flag limit.
    #[error("Flag limit raised")]
    ContentFlaggedEnough,
    /// The acting user already reached the per-user flag limit on this object.
    #[error("{}", already_flagged_message(.count))]
    ContentAlreadyFlaggedByUser { count: i64 },
    /// The comment is missing while required, or present while forbidden.
    #[error("{0}")]
    Comment(&'static str),
    /// The status code is not part of the configured status set.
    #[error("unknown flag status `{0}`")]
    InvalidStatus(String),
    /// An aggregate already exists for this content.
    #[error("content is already registered for flagging")]
    AlreadyExists,
    #[error("flagged content not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl FlagError {
    /// Whether this error is one of the limit/comment rejections of the recording operation.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ContentFlaggedEnough | Self::ContentAlreadyFlaggedByUser { .. } | Self::Comment(_)
        )
    }
}

fn already_flagged_message(count: &i64) -> String {
    if *count == 1 {
        "You already flagged this".to_owned()
    } else {
        format!("You already flagged this {count} times")
    }
}

/// `axum`-compatible error handler.
#[derive(Error)]
pub struct Error {
    status: StatusCode,
    err: anyhow::Error,
}

impl Error {
    pub fn bad_request(err: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, err)
    }

    pub fn with_status(status: StatusCode, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            err: err.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl From<FlagError> for Error {
    fn from(err: FlagError) -> Self {
        let status = match err {
            FlagError::ModelCannotBeFlagged(_)
            | FlagError::InvalidObjectId(_)
            | FlagError::InvalidStatus(_)
            | FlagError::Comment(_) => StatusCode::BAD_REQUEST,
            FlagError::ContentFlaggedEnough | FlagError::ContentAlreadyFlaggedByUser { .. } => {
                StatusCode::FORBIDDEN
            }
            FlagError::AlreadyExists => StatusCode::CONFLICT,
            FlagError::NotFound => StatusCode::NOT_FOUND,
            FlagError::Storage(err) => return Self::from(err),
        };
        Self::with_status(status, err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.status, self.err)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.err.fmt(f)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{:?}", self.err);
        }

        // N.B: Forward out the error message to the requester if this is a debug build.
        // This is insecure for production builds, so we'll return an empty body if this
        // is a release build.
        let body = if cfg!(debug_assertions) {
            Body::new(format!("{:?}", self.err))
        } else {
            Body::empty()
        };

        (self.status, body).into_response()
    }
}
