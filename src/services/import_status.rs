//! Live status of the import job
//!
//! A single record, created idle at startup and overwritten in place by each
//! run. Pollers read cloned snapshots; writers replace whole field sets under
//! the write lock so a reader never sees half of a transition.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a job is currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
}

/// Pipeline phase of a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Fetching,
    DbUpserting,
    Committing,
}

/// Snapshot of the import job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobState {
    pub state: JobState,
    pub phase: Option<ImportPhase>,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub imported_count: Option<usize>,
    pub trade_date: Option<NaiveDate>,
    pub total: Option<usize>,
    pub processed: Option<usize>,
}

impl Default for ImportJobState {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            phase: None,
            run_id: None,
            started_at: None,
            finished_at: None,
            success: None,
            message: None,
            error: None,
            imported_count: None,
            trade_date: None,
            total: None,
            processed: None,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub imported_count: usize,
    pub trade_date: Option<NaiveDate>,
    pub message: String,
}

/// Shared, concurrently readable job status
#[derive(Debug, Default)]
pub struct ImportStatus {
    inner: RwLock<ImportJobState>,
}

impl ImportStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; never blocks on a writer for longer than one patch
    pub fn snapshot(&self) -> ImportJobState {
        self.inner.read().clone()
    }

    /// Reset the record for a newly accepted run
    pub fn begin(&self, run_id: Uuid, started_at: DateTime<Utc>) {
        *self.inner.write() = ImportJobState {
            state: JobState::Running,
            phase: Some(ImportPhase::Fetching),
            run_id: Some(run_id),
            started_at: Some(started_at),
            ..ImportJobState::default()
        };
    }

    /// Enter the write phase with the number of rows to apply
    pub fn upserting(&self, run_id: Uuid, total: usize, trade_date: Option<NaiveDate>) {
        self.patch(run_id, |s| {
            s.phase = Some(ImportPhase::DbUpserting);
            s.total = Some(total);
            s.processed = Some(0);
            s.trade_date = trade_date;
        });
    }

    /// Record rows applied so far
    pub fn progress(&self, run_id: Uuid, processed: usize) {
        self.patch(run_id, |s| s.processed = Some(processed));
    }

    pub fn committing(&self, run_id: Uuid) {
        self.patch(run_id, |s| s.phase = Some(ImportPhase::Committing));
    }

    /// Publish a successful terminal outcome
    pub fn succeed(&self, run_id: Uuid, summary: ImportSummary) {
        self.patch(run_id, |s| {
            s.state = JobState::Idle;
            s.phase = None;
            s.finished_at = Some(Utc::now());
            s.success = Some(true);
            s.message = Some(summary.message);
            s.error = None;
            s.imported_count = Some(summary.imported_count);
            s.trade_date = summary.trade_date;
        });
    }

    /// Publish a failed terminal outcome.
    ///
    /// Nothing was written, so no trade date is reported. `total` and
    /// `processed` keep the progress reached before the failure.
    pub fn fail(&self, run_id: Uuid, error: String) {
        self.patch(run_id, |s| {
            s.state = JobState::Idle;
            s.phase = None;
            s.finished_at = Some(Utc::now());
            s.success = Some(false);
            s.message = None;
            s.error = Some(error);
            s.imported_count = None;
            s.trade_date = None;
        });
    }

    /// Apply a patch only if `run_id` still owns the record.
    ///
    /// A run that was superseded after its lock went stale must not overwrite
    /// the status of the run that replaced it.
    fn patch<F>(&self, run_id: Uuid, apply: F) -> bool
    where
        F: FnOnce(&mut ImportJobState),
    {
        let mut guard = self.inner.write();
        if guard.run_id != Some(run_id) {
            tracing::debug!("Ignoring status update from superseded run {}", run_id);
            return false;
        }
        apply(&mut guard);
        true
    }
}
