//! HTTP server for the warrant API

use super::handlers;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the CORS layer for the configured origin; `*` allows any origin
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin.trim() == "*" {
        return Ok(cors.allow_origin(Any));
    }

    let value = HeaderValue::from_str(origin.trim())
        .map_err(|e| AppError::Config(format!("Invalid CORS_ORIGIN '{}': {}", origin, e)))?;
    Ok(cors.allow_origin(value))
}

/// Build the router with all routes
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let cors = cors_layer(&state.config.cors_origin)?;

    let app = Router::new()
        // Health check
        .route("/api/health", get(handlers::health_check))
        // Import trigger and status
        .route("/api/warrants/import-latest", post(handlers::import_latest))
        .route("/api/warrants/import-latest/status", get(handlers::import_status))
        // Read endpoints
        .route("/api/warrants/dates", get(handlers::list_dates))
        .route("/api/warrants/rankings", get(handlers::rankings))
        .route("/api/warrants/timeseries", get(handlers::timeseries))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state)?;
    let addr = listener.local_addr()?;

    info!("Warrant radar API listening on http://{}", addr);
    info!("  GET  /api/health");
    info!("  POST /api/warrants/import-latest");
    info!("  GET  /api/warrants/import-latest/status");
    info!("  GET  /api/warrants/dates");
    info!("  GET  /api/warrants/rankings");
    info!("  GET  /api/warrants/timeseries");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server shut down");
    Ok(())
}
