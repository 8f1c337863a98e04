use std::{net::SocketAddr, path::PathBuf};

use serde::Deserialize;
use url::Url;

use crate::content::{ModelLabel, UserId};

/// Top-level application configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub listen_address: Option<SocketAddr>,
    /// The database connection string, e.g. `sqlite://data/contentflag.db`.
    #[serde(default = "default_db")]
    pub db: String,
    /// Where the form signing key is kept. Generated on first startup.
    #[serde(default = "default_key")]
    pub key: PathBuf,
    /// Login page used when an anonymous user reaches a flag page.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default)]
    pub flag: FlagConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Host tables that hold flaggable content.
    #[serde(default)]
    pub content: Vec<ContentSource>,
    /// Users allowed to change the status of flagged content.
    #[serde(default)]
    pub moderators: Vec<UserId>,
    pub metrics: Option<MetricConfig>,
}

/// The flagging rules.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FlagConfig {
    /// Models that can be flagged. `None` or empty means every model.
    pub models: Option<Vec<ModelLabel>>,
    /// Maximum number of flags for one object. 0 means no limit.
    pub limit_for_object: u32,
    /// Maximum number of flags one user may put on one object. 0 means no limit.
    pub limit_same_object_for_user: u32,
    pub comments: CommentPolicy,
    /// Valid status codes. The first one is given to newly flagged content.
    pub statuses: Vec<StatusChoice>,
    /// How long a rendered flag form stays valid.
    pub form_expiry_hours: u32,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            models: None,
            limit_for_object: 0,
            limit_same_object_for_user: 0,
            comments: CommentPolicy::default(),
            statuses: default_statuses(),
            form_expiry_hours: 2,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentPolicy {
    Required,
    #[default]
    Optional,
    Forbidden,
}

/// One entry of the status set.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusChoice {
    pub code: String,
    pub label: String,
}

impl StatusChoice {
    fn new(code: &str, label: &str) -> Self {
        Self {
            code: code.to_owned(),
            label: label.to_owned(),
        }
    }
}

fn default_statuses() -> Vec<StatusChoice> {
    vec![
        StatusChoice::new("1", "flagged"),
        StatusChoice::new("2", "flag rejected by moderator"),
        StatusChoice::new("3", "creator notified"),
        StatusChoice::new("4", "content removed by creator"),
        StatusChoice::new("5", "content removed by moderator"),
    ]
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Request header carrying the id of the authenticated user, set by the fronting proxy.
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: "x-remote-user".to_owned(),
        }
    }
}

/// A host table holding flaggable records of one model.
#[derive(Deserialize, Debug, Clone)]
pub struct ContentSource {
    pub model: ModelLabel,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub creator_column: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum MetricConfig {
    PrometheusPush(PrometheusConfig),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrometheusConfig {
    pub url: Url,
}

fn default_db() -> String {
    "sqlite://data/contentflag.db".to_owned()
}

fn default_key() -> PathBuf {
    PathBuf::from("data/keys/form.key")
}

fn default_login_url() -> String {
    "/accounts/login/".to_owned()
}

fn default_id_column() -> String {
    "id".to_owned()
}

#[cfg(test)]
mod tests {
    use figment::{Figment, providers::Format as _};

    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: AppConfig = Figment::new()
            .merge(figment::providers::Toml::string(""))
            .extract()
            .unwrap();

        assert_eq!(config.db, "sqlite://data/contentflag.db");
        assert_eq!(config.flag.limit_for_object, 0);
        assert_eq!(config.flag.comments, CommentPolicy::Optional);
        assert_eq!(config.flag.statuses.len(), 5);
        assert_eq!(config.flag.statuses[0].code, "1");
        assert_eq!(config.flag.form_expiry_hours, 2);
        assert_eq!(config.auth.user_header, "x-remote-user");
        assert!(config.flag.models.is_none());
    }

    #[test]
    fn flag_section_overrides() {
        let config: AppConfig = Figment::new()
            .merge(figment::providers::Toml::string(
                r#"
                moderators = [7]

                [flag]
                models = ["blog.post"]
                limit_for_object = 10
                comments = "forbidden"

                [[content]]
                model = "blog.post"
                table = "blog_post"
                creator_column = "author_id"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.flag.models, Some(vec![ModelLabel::new("blog", "post")]));
        assert_eq!(config.flag.limit_for_object, 10);
        assert_eq!(config.flag.limit_same_object_for_user, 0);
        assert_eq!(config.flag.comments, CommentPolicy::Forbidden);
        assert_eq!(config.content[0].id_column, "id");
        assert_eq!(config.content[0].creator_column.as_deref(), Some("author_id"));
        assert_eq!(config.moderators, vec![UserId(7)]);
    }

    #[test]
    fn prometheus_push_metrics() {
        let config: AppConfig = Figment::new()
            .merge(figment::providers::Toml::string(
                r#"
                [metrics]
                type = "PrometheusPush"
                url = "http://localhost:9091/metrics/job/contentflag"
                "#,
            ))
            .extract()
            .unwrap();

        let Some(MetricConfig::PrometheusPush(prometheus)) = config.metrics else {
            panic!("expected a prometheus push gateway");
        };
        assert_eq!(prometheus.url.host_str(), Some("localhost"));
        assert_eq!(prometheus.url.port(), Some(9091));
    }
}
