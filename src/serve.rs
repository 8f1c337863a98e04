use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use axum::{Router, extract::FromRef, routing::get};
use base64::Engine as _;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity, log::LevelFilter};
use figment::{Figment, providers::Format as _};
use rand::RngCore as _;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use super::error::Error;
use super::{
    config::AppConfig,
    flagging::FlagService,
    policy::FlagPolicy,
    security::FormSecurity,
    storage::{SqlContentResolver, SqliteStore, open_pool},
};

/// The application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
/// The flagging service as deployed.
pub type Flags = FlagService<SqliteStore>;

/// Size of a freshly generated form signing key.
const KEY_LEN: usize = 32;

#[derive(Parser, Debug, Clone)]
/// Command line arguments.
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "default.toml")]
    pub config: PathBuf,
    /// The verbosity level.
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Clone, FromRef)]
/// The application state, shared across all routes.
pub struct AppState {
    /// The application configuration.
    pub(crate) config: AppConfig,
    /// The flagging service, backed by the main database.
    pub flags: Flags,
    /// Lookup of the host application's content.
    pub resolver: SqlContentResolver,
    /// The flag form signer.
    pub security: FormSecurity,
}

impl AppState {
    /// Open the database, load (or create) the signing key and wire up the services.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let key = load_or_create_key(&config.key).await?;
        let pool = open_pool(&config.db)
            .await
            .context("failed to establish database connection pool")?;

        let resolver = SqlContentResolver::new(pool.clone(), &config.content)
            .context("invalid content configuration")?;
        let flags = FlagService::new(SqliteStore::new(pool), FlagPolicy::new(&config.flag));
        let security = FormSecurity::new(&key, config.flag.form_expiry_hours)?;

        Ok(Self {
            config,
            flags,
            resolver,
            security,
        })
    }
}

/// Read the form signing key, generating one on first startup.
async fn load_or_create_key(path: &Path) -> anyhow::Result<Vec<u8>> {
    if let Ok(encoded) = tokio::fs::read_to_string(path).await {
        return base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("failed to decode form signing key");
    }

    info!("form signing key not found, generating a new one");

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("failed to create key directory")?;
    }

    let mut key = vec![0_u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    tokio::fs::write(path, base64::engine::general_purpose::STANDARD.encode(&key))
        .await
        .context("failed to write form signing key")?;

    Ok(key)
}

/// Build the router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(super::index))
        .merge(super::endpoints::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main application entry point.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up trace logging to console and account for the user-provided verbosity flag.
    if args.verbosity.log_level_filter() != LevelFilter::Off {
        let lvl = match args.verbosity.log_level_filter() {
            LevelFilter::Error => tracing::Level::ERROR,
            LevelFilter::Warn => tracing::Level::WARN,
            LevelFilter::Info | LevelFilter::Off => tracing::Level::INFO,
            LevelFilter::Debug => tracing::Level::DEBUG,
            LevelFilter::Trace => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(lvl).init();
    }

    if !args.config.exists() {
        // Not fatal: every setting can also come from the environment.
        warn!(
            "configuration file {} does not exist",
            args.config.display()
        );
    }

    // Read and parse the user-provided configuration.
    let config: AppConfig = Figment::new()
        .admerge(figment::providers::Toml::file(args.config))
        .admerge(figment::providers::Env::prefixed("CONTENTFLAG_"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize metrics reporting.
    super::metrics::setup(config.metrics.as_ref()).context("failed to set up metrics exporter")?;

    let addr = config
        .listen_address
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000));

    let state = AppState::new(config).await?;
    if state.config.content.is_empty() {
        warn!("no [[content]] sources configured; every flag request will be rejected");
    }

    let app = app(state);

    info!("listening on {addr}");
    info!("connect to: http://127.0.0.1:{}", addr.port());

    let listener = TcpListener::bind(&addr)
        .await
        .context("failed to bind address")?;

    axum::serve(listener, app.into_make_service())
        .await
        .context("failed to serve app")
}
