//! greenhouse - carnivorous greenhouse monitor
//!
//! Serves the sign-up/login/dashboard pages, the `/socket` real-time channel
//! and a background loop that pushes synthetic sensor readings to every
//! connected dashboard.

use clap::Parser as ClapParser;
use greenhouse::{
    api,
    broker::Broker,
    config::{AppConfig, CliOverrides, ConfigError, FileConfig},
    fault::RandomFaults,
    otel,
    registry::ConnectionRegistry,
    session::SessionStore,
    store::{Store, StoreError},
    telemetry::Telemetry,
};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::LoggerProvider;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// greenhouse - live carnivorous plant monitor
///
/// Users register plants and watch simulated sensor readings stream in.
#[derive(ClapParser, Debug)]
#[command(name = "greenhouse", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP/WebSocket server
    #[arg(long, env = "GREENHOUSE_BIND")]
    bind: Option<SocketAddr>,

    /// Path of the SQLite database file
    #[arg(long, env = "GREENHOUSE_DB")]
    database: Option<PathBuf>,

    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Telemetry tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// OTLP gRPC endpoint for log export (e.g. http://localhost:4317)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

#[derive(Debug, Error)]
pub enum GreenhouseError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(otel_logs: Option<&LoggerProvider>) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "greenhouse=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_logs.map(OpenTelemetryTracingBridge::new))
        .init();
}

fn load_config(cli: Cli) -> Result<AppConfig, ConfigError> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => None,
    };
    AppConfig::resolve(
        file,
        CliOverrides {
            bind: cli.bind,
            database: cli.database,
            telemetry_interval_ms: cli.tick_ms,
        },
    )
}

async fn run(config: AppConfig) -> Result<(), GreenhouseError> {
    let store = Store::open(&config.database)?;
    tracing::info!(database = %store.path().display(), "database ready");

    let registry = ConnectionRegistry::new(Broker::new());
    let faults = Arc::new(RandomFaults);
    let shutdown = CancellationToken::new();

    let telemetry = Telemetry::new(registry.clone(), store.clone(), faults.clone())
        .spawn(config.telemetry_interval, shutdown.clone());

    let state = api::AppState {
        store,
        sessions: Arc::new(SessionStore::new(config.session_ttl)),
        registry,
        faults,
        shutdown: shutdown.clone(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "greenhouse listening");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received Ctrl+C, shutting down");
                }
                _ = signal.cancelled() => {}
            }
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    telemetry.await?;
    served?;
    tracing::info!("greenhouse stopped");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let otel_logs = cli.otlp_endpoint.as_deref().map(otel::log_provider);
    let provider = match &otel_logs {
        Some(Ok(provider)) => Some(provider),
        _ => None,
    };
    init_tracing(provider);
    match &otel_logs {
        Some(Ok(_)) => tracing::info!(service = otel::SERVICE_NAME, "exporting logs over OTLP"),
        Some(Err(e)) => tracing::warn!(error = %e, "OTLP log export disabled"),
        None => {}
    }

    let result = match load_config(cli) {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "greenhouse exited with error");
    }

    if let Some(Ok(provider)) = &otel_logs {
        // Flushing blocks on the batch task, which runs on another worker.
        if let Err(e) = tokio::task::block_in_place(|| otel::shutdown(provider)) {
            eprintln!("greenhouse: {e}");
        }
    }

    if let Err(e) = result {
        eprintln!("greenhouse: {e}");
        std::process::exit(1);
    }
}
