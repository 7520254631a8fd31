//! REST API module
//!
//! Routes:
//! - `GET  /api/health`
//! - `POST /api/warrants/import-latest`
//! - `GET  /api/warrants/import-latest/status`
//! - `GET  /api/warrants/dates`
//! - `GET  /api/warrants/rankings`
//! - `GET  /api/warrants/timeseries`

pub mod handlers;
mod server;
mod types;

pub use server::{cors_layer, router, serve};
pub use types::{HealthResponse, ImportStartResponse};
