//! yoda-player - Main entry point
//!
//! RFID-triggered playback controller. Readers POST scanned tag ids to
//! `/play`; the session controller decides whether to start, extend or stop
//! playback on the configured player backend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yoda_common::config::{load_toml, ConfigFileResolver, CONFIG_ENV_VAR};
use yoda_common::EventBus;

use yoda_player::api::{self, AppContext};
use yoda_player::backend::{build_backend, spawn_worker};
use yoda_player::catalog::Catalog;
use yoda_player::config::{BackendKind, Overrides, PlayerConfig};
use yoda_player::metrics::PlaybackMetrics;
use yoda_player::session::{SessionController, SessionSettings};

/// Command-line arguments for yoda-player
#[derive(Parser, Debug)]
#[command(name = "yoda-player")]
#[command(about = "RFID/NFC-triggered audio playback controller")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "YODA_PORT")]
    port: Option<u16>,

    /// Path to the JSON track catalog
    #[arg(long, env = "YODA_CATALOG")]
    catalog: Option<PathBuf>,

    /// Player backend (mpd or process)
    #[arg(long, env = "YODA_BACKEND")]
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is resolved before tracing starts so its log level can apply;
    // the resolver itself only logs once a subscriber exists.
    let source = ConfigFileResolver::new(CONFIG_ENV_VAR).resolve(args.config.as_deref());
    let file_config: Result<PlayerConfig, _> = load_toml(&source);
    let level = file_config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("yoda_player={level},yoda_common={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting yoda-player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = file_config.context("Failed to load configuration")?;
    match source.path() {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No config file found, using built-in defaults"),
    }
    config.apply_overrides(Overrides {
        port: args.port,
        catalog_path: args.catalog,
        backend: args.backend,
    });
    config.validate().context("Invalid configuration")?;

    let catalog = Catalog::load(&config.catalog_path).context("Failed to load track catalog")?;
    if catalog.is_empty() {
        warn!("Track catalog {} has no playable entries", config.catalog_path.display());
    }

    let metrics = Arc::new(PlaybackMetrics::new().context("Failed to register metrics")?);
    let events = EventBus::new(256);

    let backend = build_backend(&config.backend);
    info!("Player backend: {}", backend.name());
    let (backend_handle, reports, worker) = spawn_worker(backend);

    let (controller, controller_task) = SessionController::spawn(
        Arc::new(catalog),
        backend_handle.clone(),
        reports,
        Arc::clone(&metrics),
        events.clone(),
        SessionSettings::from(&config.session),
    );

    let shutdown = CancellationToken::new();
    let ctx = AppContext {
        controller: controller.clone(),
        backend: backend_handle,
        metrics,
        events,
        shutdown: shutdown.clone(),
    };

    let listener = api::bind(&config.bind_addr())
        .await
        .context("Failed to start HTTP server")?;

    tokio::spawn(async move {
        shutdown_signal().await;
        // Stop playback and let the backend finish its queue before the
        // server starts draining connections
        if let Err(e) = controller.shutdown().await {
            warn!("Controller shutdown: {}", e);
        }
        shutdown.cancel();
    });

    api::serve(listener, ctx).await.context("HTTP server failed")?;

    if let Err(e) = controller_task.await {
        warn!("Session controller task failed: {}", e);
    }
    if let Err(e) = worker.await {
        warn!("Backend worker task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
