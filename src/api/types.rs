//! HTTP response bodies
//!
//! Read endpoints return the query service results directly; the types here
//! cover health and the import trigger.

use crate::services::StartOutcome;
use serde::Serialize;
use uuid::Uuid;

pub const MSG_IMPORT_ACCEPTED: &str = "Import started; poll the status endpoint for progress";
pub const MSG_IMPORT_IN_PROGRESS: &str = "An import is already running; try again shortly";

/// `GET /api/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
}

impl HealthResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// `POST /api/warrants/import-latest`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ImportStartResponse {
    #[serde(rename_all = "camelCase")]
    Accepted {
        success: bool,
        accepted: bool,
        run_id: Uuid,
        recovered_stale_lock: bool,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    InProgress {
        success: bool,
        in_progress: bool,
        elapsed_seconds: u64,
        message: String,
    },
}

impl From<StartOutcome> for ImportStartResponse {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Accepted {
                run_id,
                recovered_stale_lock,
            } => ImportStartResponse::Accepted {
                success: true,
                accepted: true,
                run_id,
                recovered_stale_lock,
                message: MSG_IMPORT_ACCEPTED.to_string(),
            },
            StartOutcome::InProgress { elapsed_secs } => ImportStartResponse::InProgress {
                success: true,
                in_progress: true,
                elapsed_seconds: elapsed_secs,
                message: MSG_IMPORT_IN_PROGRESS.to_string(),
            },
        }
    }
}
