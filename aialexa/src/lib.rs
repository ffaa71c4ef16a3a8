//! # aialexa: asset ingestion and chat embedding for aialexa chatbots
//!
//! `aialexa` is the backend behind the aialexa chatbot builder. Users upload reference files
//! (documents, spreadsheets, source code) that their chatbots answer questions about. Each
//! upload is stored in public blob storage and registered with the user's LLM provider so the
//! provider's retrieval and code interpreter tools can read it.
//!
//! ## Request Flow
//!
//! `POST /api/upload` runs a fixed sequence of checks, each with its own status code, before
//! anything is written:
//!
//! 1. a valid session (403)
//! 2. room for another file on the user's subscription plan (402)
//! 3. a `file` part with a filename and an allowed extension, in a request with a body (400)
//! 4. a configured provider API key (400)
//!
//! The upload is then recorded as an *upload intent*, the bytes are written to the blob store,
//! the file is registered with the provider, and the file row is inserted while holding a
//! per-user lock that re-checks the quota. When a step fails the completed side effects are
//! undone. Intents left behind by a crash are finished by a background sweeper.
//!
//! ## Core Components
//!
//! - [`api`]: Axum handlers and wire models
//! - [`auth`]: session tokens from the web app's cookie or a bearer header
//! - [`db`]: PostgreSQL repositories behind the [`db::Store`] trait
//! - [`blob`]: public object storage (local directory or S3)
//! - [`provider`]: the OpenAI-compatible files API
//! - [`uploads`]: validation, side effects, compensation and the sweeper
//! - [`subscription`]: plan resolution and file quotas
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use aialexa::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     aialexa::install_crypto_provider();
//!     let args = aialexa::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     aialexa::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)
//!         .await?
//!         .serve(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! Migrations run on startup. They can also be run on their own:
//!
//! ```no_run
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! aialexa::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod blob;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod provider;
pub mod subscription;
pub mod telemetry;
mod templates;
pub mod types;
pub mod uploads;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::{
    blob::{BlobStore, LOCAL_BLOB_ROUTE},
    config::{BlobStorageConfig, CorsOrigin},
    db::{PgStore, Store},
    openapi::ApiDoc,
    provider::{LlmProvider, OpenAiProvider},
    uploads::sweeper::UploadSweeper,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
pub use types::UserId;

/// Slack on top of `uploads.max_file_size` for multipart boundaries and part headers
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Install the process-wide rustls crypto provider. Safe to call more than once.
///
/// HTTP clients (provider, S3, OTLP) are built with rustls and no bundled provider, so this must
/// run before the first client is created.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Shared state handed to every handler.
///
/// The store and both external services sit behind traits so tests can swap in doubles.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(Arc::new(PgStore::new(pool)))
///     .blobs(blobs)
///     .provider(provider)
///     .templates(Arc::new(templates::environment()?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub provider: Arc<dyn LlmProvider>,
    pub templates: Arc<minijinja::Environment<'static>>,
}

/// Get the aialexa database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to the configured database and run migrations
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool_settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(pool_settings.max_connections)
        .min_connections(pool_settings.min_connections)
        .acquire_timeout(pool_settings.acquire_timeout)
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.auth.security.cors.allowed_origins;
    let allow_origin = if allowed.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send origins without a trailing slash
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/api/upload`, `/api/files`: session-authenticated file routes
/// - `/chatbot/{chatbot_id}/chat`: public chat embed page
/// - `/api`: public greeting, outside the credentialed CORS policy
/// - `/blobs/*`: uploaded objects, when the local blob backend is configured
/// - `/docs`, `/api-docs/openapi.json`: API documentation
/// - `/healthz`, and `/internal/metrics` when metrics are enabled
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let upload_limit = usize::try_from(state.config.uploads.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let api_routes = Router::new()
        .route(
            "/upload",
            post(api::handlers::upload::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files", get(api::handlers::files::list_files));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/chatbot/{chatbot_id}/chat", get(api::handlers::embed::chat_page))
        .nest("/api", api_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );

    if let BlobStorageConfig::Local { path, .. } = &state.config.blob_storage {
        router = router.nest_service(LOCAL_BLOB_ROUTE, ServeDir::new(path));
    }

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router
        .layer(cors_layer)
        .route("/api", get(api::handlers::hello::hello));

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks that run alongside the HTTP server.
///
/// Dropping this cancels the shutdown token through `drop_guard`, which stops every task.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the upload sweeper when enabled
fn setup_background_services(state: &AppState, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let sweeper_config = state.config.uploads.sweeper.clone();
    if sweeper_config.enabled {
        let sweeper = UploadSweeper::new(state.store.clone(), state.blobs.clone(), state.provider.clone(), sweeper_config);
        let sweeper_shutdown = shutdown_token.clone();
        background_tasks.push(tokio::spawn(async move { sweeper.run(sweeper_shutdown).await }));
    } else {
        info!("Upload sweeper disabled by configuration");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. [`Application::new`] connects to the database, runs migrations, builds the blob store and
///    provider client and starts background services
/// 2. [`Application::serve`] binds the listener and handles requests until the shutdown future
///    resolves, then stops background services and closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing `pool` when given. Migrations still run.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting aialexa with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                migrator().run(&pool).await?;
                pool
            }
            None => setup_database(&config).await?,
        };

        let blobs = blob::from_config(&config.blob_storage).await?;
        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(&config.provider)?);
        let templates = templates::environment()?;

        let app_state = AppState::builder()
            .config(config.clone())
            .store(Arc::new(PgStore::new(pool.clone())))
            .blobs(blobs)
            .provider(provider)
            .templates(Arc::new(templates))
            .build();

        let bg_services = setup_background_services(&app_state, CancellationToken::new());
        let router = build_router(app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "aialexa listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        db::{
            handlers::{Chatbots, Files, ProviderConfigs, Repository, files::FileFilter},
            models::chatbots::ChatbotCreateDBRequest,
        },
        test_utils::{create_test_config, create_test_user, session_cookie},
    };
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(provider: &MockServer, blob_dir: &std::path::Path) -> Config {
        let mut config = create_test_config();
        config.provider.base_url = url::Url::parse(&format!("{}/v1", provider.uri())).unwrap();
        config.blob_storage = BlobStorageConfig::Local {
            path: blob_dir.to_path_buf(),
            public_base_url: url::Url::parse("http://localhost:3001").unwrap(),
        };
        config
    }

    /// Full stack against Postgres, a local blob directory and a mocked provider
    #[sqlx::test]
    #[test_log::test]
    async fn test_upload_end_to_end(pool: PgPool) {
        install_crypto_provider();
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "file-e2e",
                "object": "file",
                "filename": "notes.md",
                "purpose": "assistants",
                "bytes": 7
            })))
            .expect(1)
            .mount(&provider)
            .await;

        let blob_dir = tempfile::tempdir().unwrap();
        let config = config_for(&provider, blob_dir.path());

        let user = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        ProviderConfigs::new(&mut conn)
            .upsert_api_key(user.id, Some("sk-e2e"))
            .await
            .unwrap();
        drop(conn);

        let app = Application::new_with_pool(config.clone(), Some(pool.clone())).await.unwrap();
        let (server, _bg_services) = app.into_test_server();
        let cookie = HeaderValue::from_str(&session_cookie(&config, user.id, &user.email)).unwrap();

        let form = MultipartForm::new().add_part("file", Part::bytes(b"# notes".as_slice()).file_name("notes.md"));
        let response = server
            .post("/api/upload")
            .add_header(http::header::COOKIE, cookie.clone())
            .multipart(form)
            .await;

        response.assert_status(StatusCode::CREATED);
        let url = response.json::<serde_json::Value>()["url"].as_str().unwrap().to_string();
        assert!(url.starts_with("http://localhost:3001/blobs/"));
        assert!(url.ends_with("/notes.md"));

        // The object is served back under /blobs
        let key = url.trim_start_matches("http://localhost:3001/blobs/");
        let blob = server.get(&format!("/blobs/{key}")).await;
        blob.assert_status_ok();
        assert_eq!(blob.as_bytes().to_vec(), b"# notes".to_vec());

        let mut conn = pool.acquire().await.unwrap();
        let files = Files::new(&mut conn).list(&FileFilter::new().user_id(user.id)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].provider_file_id, "file-e2e");
        assert_eq!(files[0].blob_url, url);

        // The free plan allows one file
        let form = MultipartForm::new().add_part("file", Part::bytes(b"# more".as_slice()).file_name("more.md"));
        let response = server
            .post("/api/upload")
            .add_header(http::header::COOKIE, cookie.clone())
            .multipart(form)
            .await;
        response.assert_status(StatusCode::PAYMENT_REQUIRED);
    }

    #[sqlx::test]
    async fn test_chat_page_from_database(pool: PgPool) {
        install_crypto_provider();
        let provider = MockServer::start().await;
        let blob_dir = tempfile::tempdir().unwrap();
        let user = create_test_user(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        let chatbot = Chatbots::new(&mut conn)
            .create(&ChatbotCreateDBRequest {
                user_id: user.id,
                name: "Physics Helper".to_string(),
            })
            .await
            .unwrap();
        drop(conn);

        let app = Application::new_with_pool(config_for(&provider, blob_dir.path()), Some(pool))
            .await
            .unwrap();
        let (server, _bg_services) = app.into_test_server();

        let response = server.get(&format!("/chatbot/{}/chat", chatbot.id)).await;
        response.assert_status_ok();
        let html = response.text();
        assert!(html.contains("<title>Physics Helper</title>"));
        assert!(html.contains(&format!("/embed/{}/window?chatbox=false", chatbot.id)));
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        let mut config = create_test_config();
        config.auth.security.cors.allowed_origins = vec![CorsOrigin::Url(url::Url::parse("https://aialexa.app").unwrap())];
        assert!(create_cors_layer(&config).is_ok());
    }
}
