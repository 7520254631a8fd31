//! Endpoint handlers
//!
//! Handlers only translate between HTTP and the services layer. Store reads
//! are synchronous, so they run on the blocking pool.

use super::types::{HealthResponse, ImportStartResponse};
use crate::db::SqliteDb;
use crate::error::{AppError, Result};
use crate::services::{
    DatesQuery, ImportStatusReport, RankingsQuery, StartOutcome, TimeseriesQuery,
    WarrantQueryService,
};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Health Check
// ============================================================================

/// GET /api/health
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::ok("Warrant radar API is running"))
}

// ============================================================================
// Import
// ============================================================================

/// POST /api/warrants/import-latest
///
/// 202 when a run was launched, 200 with `inProgress` when one is already
/// running. Never waits for the import itself.
pub async fn import_latest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcome = state.importer.start();
    let status = match outcome {
        StartOutcome::Accepted { run_id, .. } => {
            info!("Import requested over HTTP, run {}", run_id);
            StatusCode::ACCEPTED
        }
        StartOutcome::InProgress { .. } => StatusCode::OK,
    };
    (status, Json(ImportStartResponse::from(outcome)))
}

/// GET /api/warrants/import-latest/status
pub async fn import_status(State(state): State<Arc<AppState>>) -> Json<ImportStatusReport> {
    Json(state.importer.status())
}

// ============================================================================
// Queries
// ============================================================================

/// GET /api/warrants/dates
pub async fn list_dates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DatesQuery>,
) -> Result<impl IntoResponse> {
    let result = read(&state, move |db| WarrantQueryService::dates(db, &query)).await?;
    Ok(Json(result))
}

/// GET /api/warrants/rankings
pub async fn rankings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RankingsQuery>,
) -> Result<impl IntoResponse> {
    let result = read(&state, move |db| WarrantQueryService::rankings(db, &query)).await?;
    Ok(Json(result))
}

/// GET /api/warrants/timeseries
pub async fn timeseries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeseriesQuery>,
) -> Result<impl IntoResponse> {
    let result = read(&state, move |db| WarrantQueryService::timeseries(db, &query)).await?;
    Ok(Json(result))
}

async fn read<T, F>(state: &AppState, query: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&SqliteDb) -> Result<T> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || query(&db))
        .await
        .map_err(|e| AppError::Internal(format!("Query task failed: {}", e)))?
}
