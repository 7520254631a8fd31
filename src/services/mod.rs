//! Services Layer
//!
//! Business logic shared by the HTTP handlers and the scheduler.
//!
//! # Architecture
//!
//! ```text
//! HTTP API ────┐
//!              ├──> Services --> Feed / DB
//! Scheduler ───┘
//! ```
//!
//! # Services
//!
//! - `ImportJobController` - Single-flight import of the latest TWSE dataset
//! - `ImportStatus` - Live status record polled by clients
//! - `WarrantQueryService` - Dates, rankings and time series
//! - `normalize` - Raw record to canonical row mapping

pub mod import_service;
pub mod import_status;
pub mod normalize;
pub mod query_service;

// Re-export commonly used types and services
pub use import_service::{ImportError, ImportJobController, ImportPolicy, ImportStatusReport, StartOutcome};
pub use import_status::{ImportJobState, ImportPhase, ImportStatus, ImportSummary, JobState};
pub use query_service::{DatesQuery, RankingsQuery, TimeseriesQuery, WarrantQueryService};
