//! OptiNexus server - Entry point
//!
//! HTTP service for PDF and image tools.

use clap::Parser;
use optinexus_server::{run_server_with_config, ServerConfig, StorageKind};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "optinexus-server", version, about = "HTTP service for PDF and image tools")]
struct Args {
    /// Interface to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Base of URLs handed out for locally stored files
    #[arg(long, env = "PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Directory of the local storage backend
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Storage backend
    #[arg(long, env = "STORAGE", value_enum, default_value = "auto")]
    storage: StorageKind,

    /// Managed blob store token (selects the remote backend under `auto`)
    #[arg(long, env = "BLOB_READ_WRITE_TOKEN", hide_env_values = true)]
    blob_token: Option<String>,

    #[arg(long, env = "BLOB_API_URL", default_value = "https://blob.vercel-storage.com")]
    blob_api_url: String,

    /// Host suffix identifying managed blob URLs
    #[arg(long, env = "BLOB_PUBLIC_HOST_SUFFIX", default_value = "blob.vercel-storage.com")]
    blob_public_host_suffix: String,

    /// Conversion service API key; conversion is disabled without it
    #[arg(long, env = "CLOUDCONVERT_API_KEY", hide_env_values = true)]
    cloudconvert_api_key: Option<String>,

    #[arg(long, env = "CLOUDCONVERT_API_URL", default_value = "https://api.cloudconvert.com/v2")]
    cloudconvert_api_url: String,

    /// Delay between conversion job polls
    #[arg(long, env = "CONVERSION_POLL_INTERVAL", default_value = "2s", value_parser = humantime::parse_duration)]
    conversion_poll_interval: Duration,

    /// Longest wait for a conversion job
    #[arg(long, env = "CONVERSION_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    conversion_timeout: Duration,

    /// Age after which stored files are deleted
    #[arg(long, env = "FILE_TTL", default_value = "30m", value_parser = humantime::parse_duration)]
    file_ttl: Duration,

    /// Interval of the in-process cleanup ("0s" disables it)
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    cleanup_interval: Duration,

    /// Bearer secret required by /api/cleanup
    #[arg(long, env = "CRON_SECRET", hide_env_values = true)]
    cron_secret: Option<String>,

    /// Scheduler header accepted by /api/cleanup
    #[arg(long, env = "CRON_HEADER", default_value = "x-vercel-cron")]
    cron_header: String,

    /// Password checked by /api/verify-password
    #[arg(long, env = "CLOUDCONVERT_PASSWORD", hide_env_values = true)]
    gate_password: Option<String>,

    /// Allow source URLs that resolve to private addresses
    #[arg(long, env = "ALLOW_PRIVATE_URLS")]
    allow_private_urls: bool,

    /// Largest source download in bytes
    #[arg(long, env = "MAX_DOWNLOAD_BYTES", default_value_t = 100 * 1024 * 1024)]
    max_download_bytes: u64,

    /// Largest request body in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 100 * 1024 * 1024)]
    max_upload_bytes: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: SocketAddr::new(args.host, args.port),
            public_base_url: args
                .public_base_url
                .unwrap_or_else(|| format!("http://localhost:{}", args.port)),
            upload_dir: args.upload_dir,
            storage: args.storage,
            blob_token: args.blob_token,
            blob_api_url: args.blob_api_url,
            blob_public_host_suffix: args.blob_public_host_suffix,
            cloudconvert_api_key: args.cloudconvert_api_key,
            cloudconvert_api_url: args.cloudconvert_api_url,
            conversion_poll_interval: args.conversion_poll_interval,
            conversion_timeout: args.conversion_timeout,
            file_ttl: args.file_ttl,
            cleanup_interval: args.cleanup_interval,
            cron_secret: args.cron_secret,
            cron_header: args.cron_header.to_ascii_lowercase(),
            gate_password: args.gate_password,
            allow_private_urls: args.allow_private_urls,
            max_download_bytes: args.max_download_bytes,
            max_upload_bytes: args.max_upload_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optinexus_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting OptiNexus server");

    run_server_with_config(args.into()).await
}
