//! End-to-end tests against a live server.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result};
use figment::{Figment, providers::Format as _};
use futures::future::join_all;
use reqwest::{RequestBuilder, StatusCode, header::LOCATION, redirect};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    AppState,
    config::{AppConfig, CommentPolicy, FlagConfig},
    content::{ContentObject, ModelLabel, UserId},
    flagging::AddFlag,
    models::FlaggedContent,
};

const USER: i64 = 1;
const OTHER_USER: i64 = 2;
const MODERATOR: i64 = 99;
const AUTHOR: i64 = 42;

/// A temporary test directory that will be cleaned up when the struct is dropped.
struct TempDir {
    /// The path to the directory.
    path: PathBuf,
}

impl TempDir {
    /// Create a new temporary directory.
    fn new() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("contentflag-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

fn without_author() -> ContentObject {
    ContentObject {
        model: ModelLabel::new("tests", "modelwithoutauthor"),
        id: 1,
        creator: None,
    }
}

fn with_author() -> ContentObject {
    ContentObject {
        model: ModelLabel::new("tests", "modelwithauthor"),
        id: 1,
        creator: Some(UserId(AUTHOR)),
    }
}

/// A running server with its own database.
struct TestState {
    /// Kept alive for the duration of the test.
    _temp_dir: TempDir,
    address: std::net::SocketAddr,
    state: AppState,
    client: reqwest::Client,
}

impl TestState {
    async fn new(flag: FlagConfig) -> Result<Self> {
        let temp_dir = TempDir::new()?;

        let mut config: AppConfig = Figment::new()
            .merge(figment::providers::Toml::string(&format!(
                r#"
                db = "sqlite://{dir}/test.db"
                key = "{dir}/keys/form.key"
                moderators = [{MODERATOR}]

                [[content]]
                model = "tests.modelwithoutauthor"
                table = "tests_modelwithoutauthor"

                [[content]]
                model = "tests.modelwithauthor"
                table = "tests_modelwithauthor"
                creator_column = "author_id"
                "#,
                dir = temp_dir.path().display(),
            )))
            .extract()?;
        config.flag = flag;

        let state = AppState::new(config).await?;

        // Host application tables.
        _ = sqlx::query(
            "CREATE TABLE tests_modelwithoutauthor (id INTEGER PRIMARY KEY);
             CREATE TABLE tests_modelwithauthor (id INTEGER PRIMARY KEY, author_id INTEGER);
             INSERT INTO tests_modelwithoutauthor (id) VALUES (1);
             INSERT INTO tests_modelwithauthor (id, author_id) VALUES (1, 42);",
        )
        .execute(state.flags.store().pool())
        .await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind address")?;
        let address = listener.local_addr()?;

        let app = crate::app(state.clone());
        drop(tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await
        }));

        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            _temp_dir: temp_dir,
            address,
            state,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    fn as_user(&self, builder: RequestBuilder, user: Option<i64>) -> RequestBuilder {
        match user {
            Some(user) => {
                builder.header(self.state.config.auth.user_header.as_str(), user.to_string())
            }
            None => builder,
        }
    }

    fn get(&self, path: &str, user: Option<i64>) -> RequestBuilder {
        self.as_user(self.client.get(self.url(path)), user)
    }

    fn post(&self, path: &str, user: Option<i64>) -> RequestBuilder {
        self.as_user(self.client.post(self.url(path)), user)
    }

    /// The hidden fields of a freshly rendered flag form, plus a comment.
    fn form_data(&self, object: &ContentObject, comment: Option<&str>) -> Vec<(String, String)> {
        let data = self.state.security.initial(&object.model, object.id);
        let mut form = vec![
            ("content_type".to_owned(), data.content_type),
            ("object_pk".to_owned(), data.object_pk),
            ("timestamp".to_owned(), data.timestamp.to_string()),
            ("security_hash".to_owned(), data.security_hash),
        ];
        if let Some(comment) = comment {
            form.push(("comment".to_owned(), comment.to_owned()));
        }
        form
    }

    async fn post_flag(
        &self,
        user: Option<i64>,
        form: &[(String, String)],
    ) -> Result<reqwest::Response> {
        Ok(self.post("/flag/", user).form(form).send().await?)
    }

    async fn content(&self, object: &ContentObject) -> Option<FlaggedContent> {
        self.state.flags.find_for_object(object).await.unwrap()
    }
}

fn location(resp: &reqwest::Response) -> &str {
    resp.headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn index() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;
    let resp = state.get("/", None).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn confirm_view() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;
    let url = "/flag/tests/modelwithoutauthor/1/";

    // Not authenticated.
    let resp = state.get(url, None).send().await?;
    assert!(resp.status().is_redirection());
    assert!(location(&resp).contains("?next=%2Fflag%2Ftests%2Fmodelwithoutauthor%2F1%2F"));

    // Authenticated user.
    let resp = state.get(url, Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await?;
    assert!(body.contains(r#"name="security_hash""#));
    assert!(body.contains(&format!(r#"name="next" value="{url}""#)));

    // Already flagged object.
    _ = state
        .state
        .flags
        .add(UserId(USER), &without_author(), AddFlag::new().comment("comment"))
        .await?;
    let resp = state.get(url, Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Bad content object.
    let resp = state.get("/flag/foo/bar/1000/", Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = state.get("/flag/tests/modelwithoutauthor/1000/", Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn confirm_view_redirects_once_limit_is_reached() -> Result<()> {
    let state = TestState::new(FlagConfig {
        limit_same_object_for_user: 1,
        ..FlagConfig::default()
    })
    .await?;

    _ = state
        .state
        .flags
        .add(UserId(USER), &without_author(), AddFlag::new())
        .await?;

    let resp = state
        .get("/flag/tests/modelwithoutauthor/1/?next=/back/", Some(USER))
        .send()
        .await?;
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/back/");

    // Another user can still flag.
    let resp = state.get("/flag/tests/modelwithoutauthor/1/", Some(OTHER_USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn post_view() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;
    let form = state.form_data(&without_author(), Some("comment"));

    // Not authenticated.
    let resp = state.post_flag(None, &form).await?;
    assert!(resp.status().is_redirection());
    assert!(location(&resp).contains("?next=%2Fflag%2F"));
    assert!(state.content(&without_author()).await.is_none());

    // Authenticated user.
    let resp = state.post_flag(Some(USER), &form).await?;
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/");
    let content = state.content(&without_author()).await.context("flagged content")?;
    assert_eq!(content.count, 1);
    let instances = state.state.flags.instances(&content).await?;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].comment.as_deref(), Some("comment"));

    // Bad object.
    let mut data = form.clone();
    data[1].1 = "foo".to_owned();
    let resp = state.post_flag(Some(USER), &data).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Creator.
    let cform = state.form_data(&with_author(), Some("comment"));
    let resp = state.post_flag(Some(USER), &cform).await?;
    assert!(resp.status().is_redirection());
    let content = state.content(&with_author()).await.context("flagged content")?;
    assert_eq!(content.count, 1);
    assert_eq!(content.creator, Some(UserId(AUTHOR)));

    // Bad security.
    let mut data = form.clone();
    data[3].1 = format!("zz{}", &data[3].1[2..]);
    let resp = state.post_flag(Some(USER), &data).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Tampered target.
    let mut data = form.clone();
    data[0].1 = "tests.modelwithauthor".to_owned();
    let resp = state.post_flag(Some(USER), &data).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.content(&without_author()).await.context("flagged content")?.count, 1);

    // GET access.
    let resp = state.get("/flag/", Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn post_view_sends_signal() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;
    let mut rx = state.state.flags.subscribe();

    let mut form = state.form_data(&with_author(), None);
    form.push(("next".to_owned(), "/posts/1/".to_owned()));
    let resp = state.post_flag(Some(USER), &form).await?;
    assert_eq!(location(&resp), "/posts/1/");

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
    assert_eq!(event.flag_instance.user_id, UserId(USER));
    assert_eq!(event.flagged_content.count, 1);

    Ok(())
}

#[tokio::test]
async fn post_view_drops_forbidden_comment() -> Result<()> {
    let state = TestState::new(FlagConfig {
        comments: CommentPolicy::Forbidden,
        ..FlagConfig::default()
    })
    .await?;

    let resp = state
        .post_flag(Some(USER), &state.form_data(&without_author(), Some("comment")))
        .await?;
    assert!(resp.status().is_redirection());

    let content = state.content(&without_author()).await.context("flagged content")?;
    assert_eq!(content.count, 1);
    let instances = state.state.flags.instances(&content).await?;
    assert_eq!(instances[0].comment, None);

    Ok(())
}

#[tokio::test]
async fn post_view_user_limit() -> Result<()> {
    let state = TestState::new(FlagConfig {
        limit_same_object_for_user: 2,
        ..FlagConfig::default()
    })
    .await?;
    let form = state.form_data(&without_author(), None);

    for _ in 0..2 {
        let resp = state.post_flag(Some(USER), &form).await?;
        assert!(resp.status().is_redirection());
    }

    let resp = state.post_flag(Some(USER), &form).await?;
    assert!(resp.status().is_redirection());
    let content = state.content(&without_author()).await.context("flagged content")?;
    assert_eq!(content.count, 2);

    Ok(())
}

#[tokio::test]
async fn post_view_missing_comment_renders_form() -> Result<()> {
    let state = TestState::new(FlagConfig {
        comments: CommentPolicy::Required,
        ..FlagConfig::default()
    })
    .await?;

    let mut form = state.form_data(&without_author(), None);
    form.push(("next".to_owned(), "/foobar/".to_owned()));
    let resp = state.post_flag(Some(USER), &form).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.text().await?;
    assert!(body.contains(r#"name="next" value="/foobar/""#));
    assert!(body.contains("A comment is required"));
    assert!(state.content(&without_author()).await.map_or(true, |c| c.count == 0));

    Ok(())
}

#[tokio::test]
async fn status_view() -> Result<()> {
    let state = TestState::new(FlagConfig {
        limit_same_object_for_user: 1,
        ..FlagConfig::default()
    })
    .await?;
    let url = "/flag/status/tests/modelwithauthor/1";

    let status: Value = state.get(url, Some(USER)).send().await?.json().await?;
    assert_eq!(status["count"], 0);
    assert_eq!(status["status"], Value::Null);
    assert_eq!(status["can_flag"], true);

    _ = state
        .state
        .flags
        .add(UserId(USER), &with_author(), AddFlag::new())
        .await?;

    let status: Value = state.get(url, Some(USER)).send().await?.json().await?;
    assert_eq!(status["count"], 1);
    assert_eq!(status["status"], "1");
    assert_eq!(status["status_label"], "flagged");
    assert_eq!(status["can_flag"], false);

    let status: Value = state.get(url, None).send().await?.json().await?;
    assert_eq!(status["can_flag"], false);

    let resp = state.get("/flag/status/tests/modelwithauthor/2", Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn moderation() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;
    _ = state
        .state
        .flags
        .add(UserId(USER), &with_author(), AddFlag::new())
        .await?;
    let content = state.content(&with_author()).await.context("flagged content")?;
    let url = format!("/flag/moderate/{}", content.id);
    let body = serde_json::json!({ "status": "5" });

    let resp = state.post(&url, None).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = state.post(&url, Some(USER)).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = state.post(&url, Some(MODERATOR)).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let moderated: Value = resp.json().await?;
    assert_eq!(moderated["status"], "5");
    assert_eq!(moderated["moderator"], MODERATOR);
    assert_eq!(moderated["count"], 1);

    let resp = state
        .post(&url, Some(MODERATOR))
        .json(&serde_json::json!({ "status": "42" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = state
        .post("/flag/moderate/9999", Some(MODERATOR))
        .json(&body)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn recall() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;
    let instance = state
        .state
        .flags
        .add(UserId(USER), &without_author(), AddFlag::new())
        .await?;
    let url = format!("/flag/recall/{}", instance.id);

    let resp = state.post(&url, Some(OTHER_USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = state.post(&url, Some(USER)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let recalled: Value = resp.json().await?;
    assert!(recalled["when_recalled"].is_string());

    let content = state.content(&without_author()).await.context("flagged content")?;
    assert_eq!(content.count, 1);

    Ok(())
}

#[tokio::test]
async fn concurrent_flags_are_all_counted() -> Result<()> {
    let state = TestState::new(FlagConfig::default()).await?;

    let adds = (0..20).map(|user| {
        let flags = state.state.flags.clone();
        async move {
            flags
                .add(UserId(user), &without_author(), AddFlag::new())
                .await
        }
    });
    for result in join_all(adds).await {
        _ = result?;
    }

    let content = state.content(&without_author()).await.context("flagged content")?;
    assert_eq!(content.count, 20);
    assert_eq!(state.state.flags.instances(&content).await?.len(), 20);

    Ok(())
}
