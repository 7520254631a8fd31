//! Daily auto-import scheduler
//!
//! TWSE publishes the warrant trade report after market close (13:30
//! Asia/Taipei). When a daily time is configured, this scheduler triggers the
//! same single-flight import an HTTP client would.

use crate::services::{ImportJobController, StartOutcome};
use chrono::{NaiveTime, TimeDelta, Utc};
use chrono_tz::Asia::Taipei;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Triggers an import once a day at a fixed Asia/Taipei wall-clock time
pub struct AutoImportScheduler {
    controller: ImportJobController,
    at: NaiveTime,
}

impl AutoImportScheduler {
    pub fn new(controller: ImportJobController, at: NaiveTime) -> Self {
        Self { controller, at }
    }

    /// Time from `now` until the next occurrence of `target`.
    ///
    /// Taipei has no daylight saving, so plain clock arithmetic is exact.
    /// When `now` equals `target` the next run is a full day away.
    pub fn duration_until(target: NaiveTime, now: NaiveTime) -> Duration {
        let mut delta = target - now;
        if delta <= TimeDelta::zero() {
            delta = delta + TimeDelta::hours(24);
        }
        delta.to_std().unwrap_or(Duration::ZERO)
    }

    /// Start the scheduler on the tokio runtime
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Auto-import scheduler started ({} Asia/Taipei)", self.at.format("%H:%M"));

            loop {
                let now = Utc::now().with_timezone(&Taipei).time();
                let wait = Self::duration_until(self.at, now);
                info!(
                    "Next auto-import in {} hours {} minutes",
                    wait.as_secs() / 3600,
                    (wait.as_secs() % 3600) / 60
                );

                tokio::time::sleep(wait).await;
                self.trigger();
            }
        })
    }

    fn trigger(&self) {
        match self.controller.start() {
            StartOutcome::Accepted {
                run_id,
                recovered_stale_lock,
            } => {
                info!(
                    "Scheduled import started, run {} (stale lock recovered: {})",
                    run_id, recovered_stale_lock
                );
            }
            StartOutcome::InProgress { elapsed_secs } => {
                warn!(
                    "Scheduled import skipped: a run has been in progress for {}s",
                    elapsed_secs
                );
            }
        }
    }
}
