//! tether-server - Tether daemon
//!
//! Restores companion mappings, runs the reconciliation sweeper and serves
//! the lifecycle operations over a local HTTP API.

use std::path::Path;
use std::sync::Arc;
use tether_core::gateway::{Gateway, HttpGateway, InMemoryGateway};
use tether_core::SqliteMappingStore;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod routes;
mod services;
mod state;

use config::{Config, GatewayMode, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(
            EnvFilter::from_default_env()
                .add_directive("tether_server=info".parse()?)
                .add_directive("tether_core=info".parse()?),
        )
        .init();

    info!("tether-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Config loaded from {:?}", config.config_path);

    // Check for existing server
    if config.pid_file.exists() {
        let pid_str = std::fs::read_to_string(&config.pid_file)?;
        if let Ok(pid) = pid_str.trim().parse::<i32>() {
            if process_exists(pid) {
                anyhow::bail!("Server already running with PID {}", pid);
            }
        }

        info!("Cleaning up stale PID file from previous crash");
        let _ = std::fs::remove_file(&config.pid_file);
    }
    std::fs::write(&config.pid_file, std::process::id().to_string())?;

    // Open the mapping store
    let store = SqliteMappingStore::open(&config.database_path)?;
    if let Some(moved) = store.recovered_from() {
        warn!(
            moved_to = %moved.display(),
            "Mapping store was unreadable and has been reset"
        );
    }

    let gateway: Arc<dyn Gateway> = match config.gateway.mode {
        GatewayMode::Http => {
            info!(bridge_url = %config.gateway.bridge_url, "Using platform bridge");
            Arc::new(HttpGateway::new(config.gateway.bridge_url.clone())?)
        }
        GatewayMode::DryRun => {
            warn!("Dry-run mode: companions live only in memory");
            Arc::new(InMemoryGateway::new())
        }
    };

    let bind = config.bind.clone();
    let pid_file = config.pid_file.clone();
    let sweep_interval = config.lifecycle.sweep_interval();
    let state = state::AppState::new(config, Arc::new(store), gateway);

    // Reload mappings before accepting notifications
    if let Err(e) = state.manager.restore().await {
        warn!(error = %e, "Mapping restore failed, the sweeper will retry");
    }
    Arc::clone(&state.sweeper).start(sweep_interval).await;

    let app = routes::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server ready on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    state.sweeper.stop().await;
    remove_pid_file(&pid_file);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(error = %e, "Failed to remove PID file");
    }
}

/// Check if a process exists by PID
fn process_exists(pid: i32) -> bool {
    // On Unix, sending signal 0 checks if process exists
    unsafe { libc::kill(pid, 0) == 0 }
}
