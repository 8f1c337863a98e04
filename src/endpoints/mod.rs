use anyhow::anyhow;
use axum::Router;

use crate::{
    AppState,
    content::{ContentObject, ModelRef},
    error::{Error, FlagError},
    flagging::FlagService,
    storage::{ContentResolver, FlagStore},
};

mod flag;
mod moderation;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .merge(flag::routes())
        .merge(moderation::routes())
}

/// Resolve the target of a flag request from its raw `content_type` and `object_pk` values.
///
/// Every failure is a bad request, except storage trouble.
pub(crate) async fn resolve_content_object<S: FlagStore, R: ContentResolver>(
    flags: &FlagService<S>,
    resolver: &R,
    content_type: Option<&str>,
    object_pk: Option<&str>,
) -> Result<ContentObject, Error> {
    let (Some(content_type), Some(object_pk)) = (content_type, object_pk) else {
        return Err(Error::bad_request(anyhow!(
            "Missing content_type or object_pk field."
        )));
    };

    let model = match flags
        .assert_model_can_be_flagged(ModelRef::Name(content_type))
        .await
    {
        Ok(model) => model,
        Err(FlagError::Storage(err)) => return Err(err.into()),
        Err(err) => {
            return Err(Error::bad_request(anyhow!(
                "Invalid content_type value {content_type:?}: {err}"
            )));
        }
    };

    let Ok(id) = object_pk.trim().parse::<i64>() else {
        return Err(Error::bad_request(anyhow!(
            "Invalid object_pk value {object_pk:?}."
        )));
    };

    resolver.resolve(&model, id).await?.ok_or_else(|| {
        Error::bad_request(anyhow!(
            "No object matching content-type {model} and object PK {id} exists."
        ))
    })
}

/// Only same-site paths are followed after a flag request.
pub(crate) fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(next) if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') => {
            next
        }
        _ => "/",
    }
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
