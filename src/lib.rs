//! Warrant Volume Radar
//!
//! Imports the daily TWSE warrant trade report into SQLite and serves
//! rankings and per-warrant history over a small REST API.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod scheduler;
pub mod services;
pub mod state;

use config::Config;
use scheduler::AutoImportScheduler;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize and run the service until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    // Load .env before the subscriber so RUST_LOG can come from it
    let _ = dotenv::dotenv();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warrant_radar=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Warrant Radar...");

    let config = Config::from_env()?;
    let addr = config.bind_addr()?;
    let auto_import_at = config.auto_import_at;

    let state = Arc::new(AppState::new(config)?);
    tracing::info!("Application state initialized");

    match auto_import_at {
        Some(at) => {
            AutoImportScheduler::new(state.importer.clone(), at).start();
        }
        None => tracing::info!("Auto-import disabled (AUTO_IMPORT_AT not set)"),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    api::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Warrant Radar stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
