//! Synergy Engine
//!
//! Serves the synergy search API for the web UI.
//!
//! # Startup
//!
//! - Configuration is read from the environment (and `.env`)
//! - The synergy map is rebuilt when no map file exists yet
//!
//! # Graceful Shutdown
//!
//! SIGTERM and SIGINT stop the API server; in-flight requests are given a
//! bounded time to finish.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use synergy::api::{self, AppState};
use synergy::{Config, Result, SynergyService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 Synergy Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Config::from_env()?;
    let api_config = config.api.clone();
    let map_file = config.data.synergy_map_file.clone();
    info!("✅ Configuration loaded and validated");

    let service = SynergyService::new(config)?;
    info!("✅ Synergy service initialized");

    if !map_file.exists() {
        info!("📦 No synergy map at {}, building one...", map_file.display());
        match service.build_synergy_map().await {
            Ok(report) => info!("✅ Synergy map built: {} synergies", report.synergy_count),
            Err(e) => warn!("⚠️ Could not build synergy map: {}", e),
        }
    }

    let state = Arc::new(AppState { service });

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    info!("🌐 Starting API server on port {}...", api_config.port);
    let server = spawn_api_server(state, api_config.clone(), shutdown_tx.subscribe());

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", api_config.host, api_config.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        api_config.host, api_config.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("📴 Shutdown signal received");
        }
        _ = wait_for_exit(&server) => {
            warn!("⚠️ API server stopped, shutting down");
        }
    }

    info!("🛑 Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    if tokio::time::timeout(Duration::from_secs(30), server)
        .await
        .is_err()
    {
        warn!("⚠️ Shutdown timeout exceeded, forcing exit");
    }

    info!("👋 Synergy Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("synergy_engine=debug,synergy=debug,tower_http=debug,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

/// Spawn the API server
fn spawn_api_server(
    state: Arc<AppState>,
    config: synergy::config::ApiConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = api::start_server(state, config) => {
                if let Err(e) = result {
                    error!("API server error: {:?}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("API server shutting down");
            }
        }
    })
}

/// Wait for the server task to finish on its own
async fn wait_for_exit(handle: &tokio::task::JoinHandle<()>) {
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
