use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{StoreBackend, TollgateConfig};
use tollgate::http::{AppState, HttpServer};
use tollgate::ratelimit::{EnforcementMode, FailurePolicy, RateLimiter};
use tollgate::store::{MemoryStore, RedisStore, WindowStore};

/// Fixed-window request rate governor.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Requests admitted per window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Window store backend
    #[arg(long, value_enum)]
    store_backend: Option<BackendArg>,

    /// Window store host
    #[arg(long)]
    store_host: Option<String>,

    /// Window store port
    #[arg(long)]
    store_port: Option<u16>,

    /// Use the store's atomic increment instead of the two-call sequence
    #[arg(long)]
    strict: bool,

    /// Reject requests when the store is unavailable
    #[arg(long)]
    fail_closed: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Redis,
    Memory,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    fn apply(&self, config: &mut TollgateConfig) {
        if let Some(addr) = self.http_addr {
            config.server.http_addr = addr;
        }
        if let Some(limit) = self.limit {
            config.rate_limiting.limit = limit;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limiting.window_secs = window_secs;
        }
        if let Some(backend) = self.store_backend {
            config.store.backend = match backend {
                BackendArg::Redis => StoreBackend::Redis,
                BackendArg::Memory => StoreBackend::Memory,
            };
        }
        if let Some(ref host) = self.store_host {
            config.store.host = host.clone();
        }
        if let Some(port) = self.store_port {
            config.store.port = port;
        }
        if self.strict {
            config.rate_limiting.enforcement = EnforcementMode::Strict;
        }
        if self.fail_closed {
            config.rate_limiting.failure_policy = FailurePolicy::FailClosed;
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Tollgate Rate Governor");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    info!(
        http_addr = %config.server.http_addr,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    // Refuse to start with nonsensical bounds
    let policy = config.policy()?;

    let store: Arc<dyn WindowStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store.redis()).await?),
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            let _sweeper =
                store.spawn_sweeper(Duration::from_secs(config.store.sweep_interval_secs.max(1)));
            store as Arc<dyn WindowStore>
        }
    };

    let limiter = Arc::new(RateLimiter::new(store, policy)?);
    info!(
        limit = limiter.policy().limit(),
        window_secs = limiter.policy().window_secs(),
        enforcement = ?limiter.policy().enforcement(),
        failure_policy = ?config.rate_limiting.failure_policy,
        "Rate limiter initialized"
    );

    let state = AppState::new(limiter, config.rate_limiting.failure_policy);
    HttpServer::new(config.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Tollgate Rate Governor stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
