//! HTTP server: configuration, shared state and routing

use crate::api;
use crate::cleanup::spawn_cleanup_task;
use crate::convert::{CloudConvertConfig, CloudConvertGateway, ConversionGateway};
use crate::error::{Error, Result};
use crate::redact::Redactor;
use crate::source::SourceFetcher;
use crate::storage::{BlobStore, LocalStore, MemoryStore, RemoteBlobConfig, RemoteBlobStore};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StorageKind {
    /// Remote when a blob token is configured, local otherwise
    #[default]
    Auto,
    Local,
    Remote,
    Memory,
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:3001)
    pub bind_addr: SocketAddr,
    /// Base of URLs handed out by the local and memory backends
    pub public_base_url: String,
    /// Directory of the local backend (default: ./uploads)
    pub upload_dir: PathBuf,
    pub storage: StorageKind,
    /// Managed blob store token; selects the remote backend under `Auto`
    pub blob_token: Option<String>,
    pub blob_api_url: String,
    /// Host suffix identifying objects of the managed blob store
    pub blob_public_host_suffix: String,
    /// Conversion service API key; conversion is disabled without it
    pub cloudconvert_api_key: Option<String>,
    pub cloudconvert_api_url: String,
    /// Delay between conversion job polls (default: 2s)
    pub conversion_poll_interval: Duration,
    /// Hard ceiling on waiting for a conversion (default: 5 min)
    pub conversion_timeout: Duration,
    /// Objects older than this are swept (default: 30 min)
    pub file_ttl: Duration,
    /// Interval of the in-process sweep; zero disables it (default: 5 min)
    pub cleanup_interval: Duration,
    /// Bearer secret required by the cleanup endpoint when set
    pub cron_secret: Option<String>,
    /// Header accepted in place of the cron secret
    pub cron_header: String,
    /// Password checked by `/api/verify-password`
    pub gate_password: Option<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum request body size in bytes (default: 100MB)
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            public_base_url: "http://localhost:3001".to_string(),
            upload_dir: PathBuf::from("uploads"),
            storage: StorageKind::Auto,
            blob_token: None,
            blob_api_url: "https://blob.vercel-storage.com".to_string(),
            blob_public_host_suffix: "blob.vercel-storage.com".to_string(),
            cloudconvert_api_key: None,
            cloudconvert_api_url: "https://api.cloudconvert.com/v2".to_string(),
            conversion_poll_interval: Duration::from_secs(2),
            conversion_timeout: Duration::from_secs(5 * 60),
            file_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            cron_secret: None,
            cron_header: "x-vercel-cron".to_string(),
            gate_password: None,
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            max_upload_bytes: 100 * 1024 * 1024,   // 100MB
        }
    }
}

impl ServerConfig {
    /// Backend actually used once `Auto` is resolved
    pub fn effective_storage(&self) -> StorageKind {
        match self.storage {
            StorageKind::Auto if non_empty(&self.blob_token).is_some() => StorageKind::Remote,
            StorageKind::Auto => StorageKind::Local,
            other => other,
        }
    }

    fn secrets(&self) -> Vec<String> {
        [
            &self.blob_token,
            &self.cloudconvert_api_key,
            &self.cron_secret,
            &self.gate_password,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Clients and settings shared by every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn BlobStore>,
    pub fetcher: SourceFetcher,
    pub gateway: Option<Arc<dyn ConversionGateway>>,
    pub redactor: Arc<Redactor>,
}

impl AppState {
    /// Build every client from configuration
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let store: Arc<dyn BlobStore> = match config.effective_storage() {
            StorageKind::Remote => {
                let token = non_empty(&config.blob_token).ok_or_else(|| Error::NotConfigured {
                    feature: "Blob storage token".to_string(),
                })?;
                let mut remote = RemoteBlobConfig::new(token);
                remote.api_url = config.blob_api_url.clone();
                remote.public_host_suffix = config.blob_public_host_suffix.clone();
                remote.max_download_bytes = config.max_download_bytes;
                Arc::new(RemoteBlobStore::new(client.clone(), remote))
            }
            StorageKind::Memory => Arc::new(MemoryStore::new(&config.public_base_url)),
            StorageKind::Local | StorageKind::Auto => Arc::new(LocalStore::new(
                config.upload_dir.clone(),
                &config.public_base_url,
            )?),
        };

        let gateway: Option<Arc<dyn ConversionGateway>> =
            non_empty(&config.cloudconvert_api_key).map(|key| {
                let mut cc = CloudConvertConfig::new(key);
                cc.api_url = config.cloudconvert_api_url.clone();
                cc.poll_interval = config.conversion_poll_interval;
                cc.timeout = config.conversion_timeout;
                Arc::new(CloudConvertGateway::new(client.clone(), cc)) as Arc<dyn ConversionGateway>
            });

        Self::new(config, store, gateway)
    }

    /// Assemble state around an existing store and gateway
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn BlobStore>,
        gateway: Option<Arc<dyn ConversionGateway>>,
    ) -> Result<Self> {
        let fetcher = SourceFetcher::new(
            store.clone(),
            config.allow_private_urls,
            config.max_download_bytes,
        )?;
        let redactor = Arc::new(Redactor::new(config.secrets()));

        Ok(Self {
            config: Arc::new(config),
            store,
            fetcher,
            gateway,
            redactor,
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let max_body = state.config.max_upload_bytes;
    let serve_uploads = matches!(state.config.effective_storage(), StorageKind::Local);
    let upload_dir = state.config.upload_dir.clone();

    let api = Router::new()
        .route("/api/health", get(api::system::health))
        .route("/api/upload", post(api::files::upload))
        .route("/api/download", get(api::files::download))
        .route("/api/pdf", post(api::pdf::handle))
        .route("/api/image", post(api::image::handle))
        .route(
            "/api/convert",
            post(api::convert::start).get(api::convert::status),
        )
        .route(
            "/api/cleanup",
            get(api::system::cleanup).post(api::system::cleanup),
        )
        .route("/api/verify-password", post(api::system::verify_password))
        .route("/api/{*rest}", axum::routing::any(api::not_found))
        .method_not_allowed_fallback(api::method_not_allowed)
        .with_state(state);

    let app = if serve_uploads {
        api.nest_service("/uploads", ServeDir::new(upload_dir))
    } else {
        api
    };

    app.layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// Run the service until a shutdown signal arrives
pub async fn run_server_with_config(config: ServerConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr;
    let ttl = config.file_ttl;
    let interval = config.cleanup_interval;

    let state = AppState::from_config(config)?;
    tracing::info!(
        backend = state.store.name(),
        conversion = state.gateway.is_some(),
        ttl = %humantime::format_duration(ttl),
        "service configured"
    );

    let cleanup = spawn_cleanup_task(state.store.clone(), ttl, interval);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cleanup {
        handle.abort();
    }
    Ok(())
}
