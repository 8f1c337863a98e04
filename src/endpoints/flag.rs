//! Flag confirmation page and form submission.

use anyhow::anyhow;
use axum::{
    Form, Json, Router,
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use constcat::concat;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{escape_html, resolve_content_object, safe_next};
use crate::{
    AppState, Result,
    auth::{CurrentUser, login_redirect},
    config::{AppConfig, CommentPolicy},
    content::{ContentObject, Flaggable as _},
    error::{Error, FlagError},
    flagging::AddFlag,
    metrics::AUTH_MISSING,
    presentation::{self, FLAG_ROOT},
    security::{FormSecurity, SecurityData},
    serve::Flags,
    storage::SqlContentResolver,
};

const FLAG_POST: &str = concat!(FLAG_ROOT, "/");

#[derive(Deserialize, Debug, Default)]
struct NextQuery {
    next: Option<String>,
}

/// Fields of the flag form.
#[derive(Deserialize, Debug, Default)]
struct FlagForm {
    content_type: Option<String>,
    object_pk: Option<String>,
    timestamp: Option<String>,
    security_hash: Option<String>,
    comment: Option<String>,
    next: Option<String>,
}

#[derive(Serialize, Debug)]
struct FlagStatus {
    count: i64,
    status: Option<String>,
    status_label: Option<String>,
    can_flag: bool,
}

struct ConfirmPage<'a> {
    object: &'a ContentObject,
    security: SecurityData,
    next: &'a str,
    comment: Option<&'a str>,
    comments: CommentPolicy,
    error: Option<&'a str>,
}

impl ConfirmPage<'_> {
    fn render(&self) -> Response {
        let comment_field = match self.comments {
            CommentPolicy::Forbidden => String::new(),
            policy => format!(
                r#"<label for="comment">Comment</label>
                    <textarea id="comment" name="comment" rows="4"{required}>{comment}</textarea>"#,
                required = if policy == CommentPolicy::Required {
                    " required"
                } else {
                    ""
                },
                comment = escape_html(self.comment.unwrap_or_default()),
            ),
        };
        let error = self.error.map_or_else(String::new, |error| {
            format!(r#"<p class="error">{}</p>"#, escape_html(error))
        });

        let html = format!(
            r#"<!DOCTYPE html>
        <html>
        <head>
            <title>Flag this content</title>
            <meta name="viewport" content="width=device-width, initial-scale=1">
            <style>
                body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; max-width: 500px; margin: 0 auto; padding: 20px; }}
                .container {{ border: 1px solid #e0e0e0; border-radius: 8px; padding: 20px; }}
                h1 {{ font-size: 24px; }}
                label {{ display: block; margin-top: 12px; }}
                textarea {{ width: 100%; padding: 8px; margin-top: 4px; border: 1px solid #ddd; border-radius: 4px; }}
                button {{ margin-top: 20px; padding: 8px 16px; background-color: #d93025; color: white; border: none; border-radius: 4px; cursor: pointer; }}
                .error {{ color: #d93025; }}
            </style>
        </head>
        <body>
            <div class="container">
                <h1>Flag this content</h1>
                <p>You are about to report {model} #{id} to the moderators.</p>
                {error}
                <form action="{action}" method="post">
                    <input type="hidden" name="content_type" value="{content_type}">
                    <input type="hidden" name="object_pk" value="{object_pk}">
                    <input type="hidden" name="timestamp" value="{timestamp}">
                    <input type="hidden" name="security_hash" value="{security_hash}">
                    <input type="hidden" name="next" value="{next}">
                    {comment_field}
                    <button type="submit">Flag</button>
                </form>
            </div>
        </body>
        </html>
        "#,
            model = escape_html(&self.object.model.to_string()),
            id = self.object.id,
            action = FLAG_POST,
            content_type = escape_html(&self.security.content_type),
            object_pk = escape_html(&self.security.object_pk),
            timestamp = self.security.timestamp,
            security_hash = self.security.security_hash,
            next = escape_html(self.next),
        );

        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))],
            html,
        )
            .into_response()
    }
}

fn anonymous(config: &AppConfig, next: &str) -> Response {
    counter!(AUTH_MISSING).increment(1);
    login_redirect(&config.login_url, next).into_response()
}

/// Flag confirmation page
/// GET `/flag/{app_label}/{model}/{object_id}/`
async fn confirm(
    State(config): State<AppConfig>,
    State(flags): State<Flags>,
    State(resolver): State<SqlContentResolver>,
    State(security): State<FormSecurity>,
    CurrentUser(user): CurrentUser,
    OriginalUri(uri): OriginalUri,
    Path((app_label, model, object_id)): Path<(String, String, String)>,
    Query(query): Query<NextQuery>,
) -> Result<Response> {
    let Some(user) = user else {
        return Ok(anonymous(&config, uri.path()));
    };

    let content_type = format!("{app_label}.{model}");
    let object =
        resolve_content_object(&flags, &resolver, Some(&content_type), Some(&object_id)).await?;

    let next = match query.next.as_deref() {
        Some(next) => safe_next(Some(next)),
        None => uri.path(),
    };

    if !presentation::can_be_flagged_by(&flags, &object, Some(user)).await {
        debug!("user {user} cannot flag {} #{}", object.model, object.id);
        return Ok(Redirect::to(next).into_response());
    }

    Ok(ConfirmPage {
        security: security.initial(&object.model_label(), object.id),
        object: &object,
        next,
        comment: None,
        comments: flags.policy().comments(),
        error: None,
    }
    .render())
}

/// Flag form submission
/// POST `/flag/`
async fn flag(
    State(config): State<AppConfig>,
    State(flags): State<Flags>,
    State(resolver): State<SqlContentResolver>,
    State(security): State<FormSecurity>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<FlagForm>,
) -> Result<Response> {
    let Some(user) = user else {
        return Ok(anonymous(&config, FLAG_POST));
    };

    let object = resolve_content_object(
        &flags,
        &resolver,
        form.content_type.as_deref(),
        form.object_pk.as_deref(),
    )
    .await?;

    let timestamp = form
        .timestamp
        .as_deref()
        .and_then(|ts| ts.trim().parse::<i64>().ok())
        .ok_or_else(|| Error::bad_request(anyhow!("Missing or invalid timestamp field.")))?;
    let data = SecurityData {
        content_type: form.content_type.clone().unwrap_or_default(),
        object_pk: form.object_pk.clone().unwrap_or_default(),
        timestamp,
        security_hash: form.security_hash.clone().unwrap_or_default(),
    };
    security.verify(&data).map_err(|err| {
        Error::bad_request(anyhow!(
            "The flag form failed security verification: {err}"
        ))
    })?;

    let next = safe_next(form.next.as_deref());
    let comment = match flags.policy().comments() {
        // A comment sent anyway is dropped rather than refused.
        CommentPolicy::Forbidden => None,
        _ => form.comment.clone(),
    };

    let request = AddFlag {
        comment,
        status: None,
        send_signal: true,
    };
    match flags.add(user, &object, request).await {
        Ok(_) => Ok(Redirect::to(next).into_response()),
        Err(FlagError::Comment(message)) => Ok(ConfirmPage {
            security: security.initial(&object.model_label(), object.id),
            object: &object,
            next,
            comment: form.comment.as_deref(),
            comments: flags.policy().comments(),
            error: Some(message),
        }
        .render()),
        Err(
            err @ (FlagError::ContentFlaggedEnough
            | FlagError::ContentAlreadyFlaggedByUser { .. }),
        ) => {
            info!("flag by user {user} refused: {err}");
            Ok(Redirect::to(next).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// GET `/flag/`
async fn flag_get() -> Error {
    Error::bad_request(anyhow!("Flags can only be submitted with POST."))
}

/// Flag state of a piece of content
/// GET `/flag/status/{app_label}/{model}/{object_id}`
async fn status(
    State(flags): State<Flags>,
    State(resolver): State<SqlContentResolver>,
    CurrentUser(user): CurrentUser,
    Path((app_label, model, object_id)): Path<(String, String, String)>,
) -> Result<Json<FlagStatus>> {
    let content_type = format!("{app_label}.{model}");
    let object =
        resolve_content_object(&flags, &resolver, Some(&content_type), Some(&object_id)).await?;

    let status = presentation::flag_status(&flags, &object).await;
    let status_label = status
        .as_deref()
        .and_then(|code| flags.policy().status_label(code))
        .map(ToOwned::to_owned);

    Ok(Json(FlagStatus {
        count: presentation::flag_count(&flags, &object).await,
        status,
        status_label,
        can_flag: presentation::can_be_flagged_by(&flags, &object, user).await,
    }))
}

pub(super) fn routes() -> Router<AppState> {
    // UG /flag/{app_label}/{model}/{object_id}/
    // AP /flag/
    // UG /flag/status/{app_label}/{model}/{object_id}
    Router::new()
        .route(FLAG_POST, get(flag_get).post(flag))
        .route(concat!(FLAG_ROOT, "/{app_label}/{model}/{object_id}/"), get(confirm))
        .route(concat!(FLAG_ROOT, "/{app_label}/{model}/{object_id}"), get(confirm))
        .route(concat!(FLAG_ROOT, "/status/{app_label}/{model}/{object_id}"), get(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ModelLabel, UserId};

    fn page(comments: CommentPolicy, error: Option<&str>) -> String {
        let object = ContentObject {
            model: ModelLabel::new("blog", "post"),
            id: 3,
            creator: Some(UserId(1)),
        };
        let security = FormSecurity::new(b"key", 2)
            .unwrap()
            .initial_at(&object.model, object.id, 0);
        let response = ConfirmPage {
            object: &object,
            security,
            next: "/posts/<3>",
            comment: Some("spam & eggs"),
            comments,
            error,
        }
        .render();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = response.into_parts();
        let bytes = futures::executor::block_on(axum::body::to_bytes(body, usize::MAX)).unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn confirm_page_carries_security_fields() {
        let html = page(CommentPolicy::Optional, None);
        assert!(html.contains(r#"name="content_type" value="blog.post""#));
        assert!(html.contains(r#"name="object_pk" value="3""#));
        assert!(html.contains(r#"name="timestamp" value="0""#));
        assert!(html.contains(r#"name="next" value="/posts/&lt;3&gt;""#));
        assert!(html.contains("spam &amp; eggs"));
        assert!(!html.contains(r#"class="error""#));
    }

    #[test]
    fn comment_field_follows_policy() {
        assert!(page(CommentPolicy::Required, None).contains("required>"));
        assert!(!page(CommentPolicy::Forbidden, None).contains("<textarea"));

        let html = page(CommentPolicy::Required, Some("A comment is required"));
        assert!(html.contains(r#"<p class="error">A comment is required</p>"#));
    }
}
