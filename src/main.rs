//! sheetgrid server binary.
//!
//! Configuration comes from the TOML file named by `SHEETGRID_CONFIG` plus
//! `SHEETGRID_*` overrides; log filtering from `RUST_LOG`.

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sheetgrid::{build_router, AppState, MemoryRowStore, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServiceConfig::load().context("failed to load configuration")?;
    let store = MemoryRowStore::open(&config.store)
        .with_context(|| format!("failed to open store at {}", config.store.data_dir.display()))?;
    info!(
        tables = store.tables().len(),
        wal_mode = ?config.store.wal_mode,
        pool_size = config.store.pool_size,
        "store opened"
    );

    let addr = config.server.socket_addr();
    let state = AppState::new(store.clone(), config);
    let jobs = state.jobs().clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "sheetgrid listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    jobs.shutdown();
    store.sync().context("failed to flush write-ahead log")?;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sheetgrid=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
