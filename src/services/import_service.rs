//! Import Service
//!
//! Single-flight background import of the TWSE warrant dataset.
//!
//! ```text
//! start() ── lock ──> spawn ──> fetching ──> normalize ──> db_upserting ──> committing ──> idle
//!    │                                                         │  (deadline checked
//!    └── InProgress (lock fresh)                               │   before each chunk)
//!                                                              └──> rollback ──> idle (failed)
//! ```
//!
//! `start()` returns as soon as the lock is taken; callers poll `status()`.
//! Every failure inside the pipeline ends up in the status record, never in
//! the caller that triggered the run.

use super::import_status::{ImportJobState, ImportStatus, ImportSummary};
use super::normalize::{normalize_records, resolve_batch_trade_date};
use crate::db::sqlite::{upsert_batch, WarrantTradeRow, MAX_UPSERT_ROWS};
use crate::db::SqliteDb;
use crate::error::{AppError, FetchError};
use crate::feed::{RawWarrantRecord, WarrantFeed};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MSG_COMPLETED: &str = "Warrant data import completed";
const MSG_NO_DATA: &str =
    "TWSE has no data yet (non-trading day or report not published); nothing imported";
const MSG_NO_VALID_ROWS: &str = "TWSE data contained no valid warrant records; nothing imported";

/// Limits applied to every import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportPolicy {
    /// Age after which a held lock is considered abandoned
    pub lock_ttl: Duration,
    /// Wall-clock budget from lock acquisition to commit
    pub max_runtime: Duration,
    /// Rows per upsert statement
    pub chunk_size: usize,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(5 * 60),
            max_runtime: Duration::from_secs(6 * 60),
            chunk_size: 250,
        }
    }
}

/// Pipeline failure
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("import exceeded time limit of {limit_secs}s")]
    DeadlineExceeded { limit_secs: u64 },

    #[error("store error: {0}")]
    Store(#[from] AppError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl ImportError {
    /// Message published to pollers
    pub fn user_message(&self) -> String {
        match self {
            ImportError::Fetch(FetchError::TimedOut) => {
                "TWSE API timed out, please try again later".to_string()
            }
            ImportError::Fetch(FetchError::Status(code)) => {
                format!("TWSE API responded with status {}", code)
            }
            ImportError::Fetch(FetchError::Transport(e)) => {
                format!("Failed to reach TWSE API: {}", e)
            }
            ImportError::Fetch(FetchError::Decode(e)) => {
                format!("TWSE API returned an unreadable payload: {}", e)
            }
            ImportError::DeadlineExceeded { limit_secs } => format!(
                "Import exceeded the {}s time limit; all changes were rolled back",
                limit_secs
            ),
            // Database errors can embed the whole statement; the full text is logged
            ImportError::Store(_) => {
                "Import failed while writing to the database; all changes were rolled back"
                    .to_string()
            }
            ImportError::Worker(e) => format!("Import failed: {}", e),
        }
    }
}

/// Response to a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was launched
    Accepted {
        run_id: Uuid,
        recovered_stale_lock: bool,
    },
    /// A run holding a fresh lock is already executing
    InProgress { elapsed_secs: u64 },
}

/// Lock state plus the latest job snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatusReport {
    pub locked: bool,
    pub elapsed_seconds: Option<u64>,
    pub job: ImportJobState,
}

// ============================================================================
// Single-flight lock
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    run_id: Uuid,
    acquired_at: Instant,
}

enum LockAttempt {
    Acquired {
        run_id: Uuid,
        acquired_at: Instant,
        recovered_stale: Option<Duration>,
    },
    Busy {
        elapsed: Duration,
    },
}

/// Process-local lock for the one importable job type, with TTL expiry
#[derive(Debug, Default)]
struct JobLock {
    held: Mutex<Option<LockEntry>>,
}

impl JobLock {
    fn try_acquire(&self, ttl: Duration) -> LockAttempt {
        let mut held = self.held.lock();
        let now = Instant::now();

        let recovered_stale = match *held {
            Some(entry) => {
                let elapsed = now.duration_since(entry.acquired_at);
                if elapsed < ttl {
                    return LockAttempt::Busy { elapsed };
                }
                Some(elapsed)
            }
            None => None,
        };

        let run_id = Uuid::new_v4();
        *held = Some(LockEntry {
            run_id,
            acquired_at: now,
        });

        LockAttempt::Acquired {
            run_id,
            acquired_at: now,
            recovered_stale,
        }
    }

    /// Release only if `run_id` still holds the lock
    fn release(&self, run_id: Uuid) -> bool {
        let mut held = self.held.lock();
        match *held {
            Some(entry) if entry.run_id == run_id => {
                *held = None;
                true
            }
            _ => false,
        }
    }

    fn held_for(&self) -> Option<Duration> {
        let held = *self.held.lock();
        held.map(|entry| entry.acquired_at.elapsed())
    }
}

/// Releases the lock when the run ends, however it ends
struct LockLease {
    lock: Arc<JobLock>,
    run_id: Uuid,
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if self.lock.release(self.run_id) {
            debug!("Import lock released by run {}", self.run_id);
        } else {
            debug!("Run {} no longer held the import lock", self.run_id);
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

struct Shared {
    db: Arc<SqliteDb>,
    feed: Arc<dyn WarrantFeed>,
    policy: ImportPolicy,
    lock: Arc<JobLock>,
    status: ImportStatus,
}

/// Owner of the import lock, the deadline and the live status record
#[derive(Clone)]
pub struct ImportJobController {
    shared: Arc<Shared>,
}

impl ImportJobController {
    pub fn new(db: Arc<SqliteDb>, feed: Arc<dyn WarrantFeed>, policy: ImportPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                db,
                feed,
                policy,
                lock: Arc::new(JobLock::default()),
                status: ImportStatus::new(),
            }),
        }
    }

    /// Try to launch an import run.
    ///
    /// Must be called from within a tokio runtime. Returns immediately; the
    /// pipeline runs on a spawned task.
    pub fn start(&self) -> StartOutcome {
        let attempt = self.shared.lock.try_acquire(self.shared.policy.lock_ttl);

        let (run_id, acquired_at, recovered_stale) = match attempt {
            LockAttempt::Busy { elapsed } => {
                info!(
                    "Import already in progress ({}s elapsed); rejecting start",
                    elapsed.as_secs()
                );
                return StartOutcome::InProgress {
                    elapsed_secs: elapsed.as_secs(),
                };
            }
            LockAttempt::Acquired {
                run_id,
                acquired_at,
                recovered_stale,
            } => (run_id, acquired_at, recovered_stale),
        };

        if let Some(age) = recovered_stale {
            warn!(
                "Recovered stale import lock held for {}s (ttl {}s)",
                age.as_secs(),
                self.shared.policy.lock_ttl.as_secs()
            );
        }

        let lease = LockLease {
            lock: self.shared.lock.clone(),
            run_id,
        };
        self.shared.status.begin(run_id, Utc::now());
        info!("Import run {} accepted (feed: {})", run_id, self.shared.feed.name());

        // None when the limit is too large to represent, i.e. unbounded
        let deadline = acquired_at.checked_add(self.shared.policy.max_runtime);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let worker = tokio::spawn(shared.clone().execute(run_id, deadline));
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ImportError::Worker(e.to_string())),
            };
            shared.finish(run_id, outcome);
            drop(lease);
        });

        StartOutcome::Accepted {
            run_id,
            recovered_stale_lock: recovered_stale.is_some(),
        }
    }

    /// Lock state and latest job snapshot; never blocks on the pipeline
    pub fn status(&self) -> ImportStatusReport {
        let held_for = self.shared.lock.held_for();
        ImportStatusReport {
            locked: held_for.is_some(),
            elapsed_seconds: held_for.map(|d| d.as_secs()),
            job: self.shared.status.snapshot(),
        }
    }
}

impl Shared {
    async fn execute(
        self: Arc<Self>,
        run_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<ImportSummary, ImportError> {
        let payload = self.feed.fetch_latest().await?;

        let records: Vec<RawWarrantRecord> = match payload {
            serde_json::Value::Array(items) if !items.is_empty() => items
                .into_iter()
                .filter_map(RawWarrantRecord::from_value)
                .collect(),
            _ => {
                info!("Import run {}: feed returned no data", run_id);
                return Ok(ImportSummary {
                    imported_count: 0,
                    trade_date: None,
                    message: MSG_NO_DATA.to_string(),
                });
            }
        };

        let rows = normalize_records(&records);
        let dropped = records.len() - rows.len();
        if dropped > 0 {
            debug!("Import run {}: dropped {} invalid records", run_id, dropped);
        }
        if rows.is_empty() {
            info!("Import run {}: no valid records in {} fetched", run_id, records.len());
            return Ok(ImportSummary {
                imported_count: 0,
                trade_date: None,
                message: MSG_NO_VALID_ROWS.to_string(),
            });
        }

        let trade_date = resolve_batch_trade_date(&records);
        self.status.upserting(run_id, rows.len(), trade_date);

        let shared = self.clone();
        let imported = tokio::task::spawn_blocking(move || shared.write_rows(run_id, &rows, deadline))
            .await
            .map_err(|e| ImportError::Worker(e.to_string()))??;

        Ok(ImportSummary {
            imported_count: imported,
            trade_date,
            message: MSG_COMPLETED.to_string(),
        })
    }

    /// Blocking write phase: one connection, one transaction, ordered chunks
    fn write_rows(
        &self,
        run_id: Uuid,
        rows: &[WarrantTradeRow],
        deadline: Option<Instant>,
    ) -> Result<usize, ImportError> {
        let mut conn = self.db.connection()?;
        write_in_transaction(
            &mut conn,
            rows,
            self.policy.chunk_size,
            self.policy.max_runtime,
            || deadline.is_some_and(|d| Instant::now() >= d),
            |processed| self.status.progress(run_id, processed),
            || self.status.committing(run_id),
        )
    }

    fn finish(&self, run_id: Uuid, outcome: Result<ImportSummary, ImportError>) {
        match outcome {
            Ok(summary) => {
                info!(
                    "Import run {} finished: {} rows, trade date {:?}",
                    run_id, summary.imported_count, summary.trade_date
                );
                self.status.succeed(run_id, summary);
            }
            Err(e) => {
                error!("Import run {} failed: {}", run_id, e);
                self.status.fail(run_id, e.user_message());
            }
        }
    }
}

/// Apply `rows` in chunks inside a single transaction.
///
/// `expired` is consulted before every chunk; once it reports true the whole
/// transaction is rolled back. Rollback failures are logged and swallowed so
/// the chunk error is what the caller sees.
fn write_in_transaction<E, P, C>(
    conn: &mut Connection,
    rows: &[WarrantTradeRow],
    chunk_size: usize,
    limit: Duration,
    mut expired: E,
    mut on_progress: P,
    on_commit: C,
) -> Result<usize, ImportError>
where
    E: FnMut() -> bool,
    P: FnMut(usize),
    C: FnOnce(),
{
    let tx = conn.transaction().map_err(AppError::from)?;
    let applied = apply_chunks(&tx, rows, chunk_size, limit, &mut expired, &mut on_progress);

    match applied {
        Ok(processed) => {
            on_commit();
            tx.commit().map_err(AppError::from)?;
            Ok(processed)
        }
        Err(e) => {
            match tx.rollback() {
                Ok(()) => info!("Import transaction rolled back"),
                Err(rb) => warn!("Import rollback failed (ignored): {}", rb),
            }
            Err(e)
        }
    }
}

fn apply_chunks<E, P>(
    conn: &Connection,
    rows: &[WarrantTradeRow],
    chunk_size: usize,
    limit: Duration,
    expired: &mut E,
    on_progress: &mut P,
) -> Result<usize, ImportError>
where
    E: FnMut() -> bool,
    P: FnMut(usize),
{
    let mut processed = 0;
    for (idx, chunk) in rows.chunks(chunk_size.clamp(1, MAX_UPSERT_ROWS)).enumerate() {
        if expired() {
            error!(
                "Import deadline of {}s exceeded before chunk {} ({} of {} rows applied)",
                limit.as_secs(),
                idx + 1,
                processed,
                rows.len()
            );
            return Err(ImportError::DeadlineExceeded {
                limit_secs: limit.as_secs(),
            });
        }
        upsert_batch(conn, chunk)?;
        processed += chunk.len();
        on_progress(processed);
        debug!("Applied chunk {} ({}/{} rows)", idx + 1, processed, rows.len());
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::import_status::JobState;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    struct StaticFeed(Result<Value, FetchError>);

    #[async_trait]
    impl WarrantFeed for StaticFeed {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn fetch_latest(&self) -> Result<Value, FetchError> {
            self.0.clone()
        }
    }

    /// Hangs forever on the first call, answers normally afterwards
    struct StallFirstFeed {
        calls: AtomicUsize,
        payload: Value,
    }

    #[async_trait]
    impl WarrantFeed for StallFirstFeed {
        fn name(&self) -> &'static str {
            "stall-first"
        }

        async fn fetch_latest(&self) -> Result<Value, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(self.payload.clone())
        }
    }

    /// Blocks until released
    struct GatedFeed {
        gate: Arc<tokio::sync::Notify>,
        payload: Value,
    }

    #[async_trait]
    impl WarrantFeed for GatedFeed {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn fetch_latest(&self) -> Result<Value, FetchError> {
            self.gate.notified().await;
            Ok(self.payload.clone())
        }
    }

    fn record(code: &str, trade: &str, turnover: &str) -> Value {
        json!({
            "出表日期": trade,
            "交易日期": trade,
            "權證代號": code,
            "權證名稱": format!("{} name", code),
            "成交金額": turnover,
            "成交張數": "10"
        })
    }

    fn test_db() -> (TempDir, Arc<SqliteDb>) {
        let dir = tempdir().unwrap();
        let db = Arc::new(SqliteDb::new(&dir.path().join("import.db"), 4).unwrap());
        (dir, db)
    }

    fn policy() -> ImportPolicy {
        ImportPolicy {
            lock_ttl: Duration::from_secs(300),
            max_runtime: Duration::from_secs(360),
            chunk_size: 2,
        }
    }

    async fn wait_for_finish(controller: &ImportJobController) -> ImportStatusReport {
        for _ in 0..500 {
            let report = controller.status();
            if !report.locked && report.job.state == JobState::Idle && report.job.success.is_some() {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("import did not finish in time");
    }

    fn row(code: &str, turnover: f64) -> WarrantTradeRow {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        WarrantTradeRow {
            out_date: date,
            trade_date: date,
            warrant_code: code.to_string(),
            warrant_name: None,
            turnover: Some(turnover),
            volume: None,
            raw_out_date_text: None,
            raw_trade_date_text: None,
        }
    }

    #[tokio::test]
    async fn test_idle_before_first_run() {
        let (_dir, db) = test_db();
        let controller =
            ImportJobController::new(db, Arc::new(StaticFeed(Ok(json!([])))), policy());

        let report = controller.status();
        assert!(!report.locked);
        assert_eq!(report.elapsed_seconds, None);
        assert_eq!(report.job.state, JobState::Idle);
        assert_eq!(report.job.success, None);
    }

    #[tokio::test]
    async fn test_successful_import_skips_invalid_records() {
        let (_dir, db) = test_db();
        let payload = json!([
            record("030001", "1130115", "1,000"),
            record("030002", "1130115", "2,000"),
            record("   ", "1130115", "3,000"),
            record("030004", "113115", "4,000"),
            record("030005", "1130115", ""),
            "not an object"
        ]);
        let controller =
            ImportJobController::new(db.clone(), Arc::new(StaticFeed(Ok(payload))), policy());

        let outcome = controller.start();
        assert!(matches!(
            outcome,
            StartOutcome::Accepted {
                recovered_stale_lock: false,
                ..
            }
        ));

        let report = wait_for_finish(&controller).await;
        let job = report.job;
        assert_eq!(job.success, Some(true));
        assert_eq!(job.imported_count, Some(3));
        assert_eq!(job.total, Some(3));
        assert_eq!(job.processed, Some(3));
        assert_eq!(job.trade_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(job.message.as_deref(), Some(MSG_COMPLETED));
        assert!(job.finished_at.is_some());

        assert_eq!(db.count_trades().unwrap(), 3);
        let stored = db.get_trade("030001", "2024-01-15").unwrap().unwrap();
        assert_eq!(stored.turnover, Some(1000.0));
        let stored = db.get_trade("030005", "2024-01-15").unwrap().unwrap();
        assert_eq!(stored.turnover, None);
    }

    #[tokio::test]
    async fn test_reimport_does_not_duplicate() {
        let (_dir, db) = test_db();
        let payload = json!([record("030001", "1130115", "1,000")]);
        let controller =
            ImportJobController::new(db.clone(), Arc::new(StaticFeed(Ok(payload))), policy());

        controller.start();
        wait_for_finish(&controller).await;
        controller.start();
        let report = wait_for_finish(&controller).await;

        assert_eq!(report.job.imported_count, Some(1));
        assert_eq!(db.count_trades().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_is_success_with_zero_rows() {
        for payload in [json!([]), Value::Null, json!({ "unexpected": true })] {
            let (_dir, db) = test_db();
            let controller =
                ImportJobController::new(db.clone(), Arc::new(StaticFeed(Ok(payload))), policy());

            controller.start();
            let job = wait_for_finish(&controller).await.job;

            assert_eq!(job.success, Some(true));
            assert_eq!(job.imported_count, Some(0));
            assert_eq!(job.trade_date, None);
            assert_eq!(job.error, None);
            assert_eq!(db.count_trades().unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_all_invalid_records_is_success_with_zero_rows() {
        let (_dir, db) = test_db();
        let payload = json!([record("", "1130115", "1"), record("030002", "bad", "2")]);
        let controller =
            ImportJobController::new(db.clone(), Arc::new(StaticFeed(Ok(payload))), policy());

        controller.start();
        let job = wait_for_finish(&controller).await.job;
        assert_eq!(job.success, Some(true));
        assert_eq!(job.imported_count, Some(0));
        assert_eq!(job.message.as_deref(), Some(MSG_NO_VALID_ROWS));
    }

    #[tokio::test]
    async fn test_fetch_failures_publish_distinct_messages() {
        let cases = [
            (FetchError::TimedOut, "timed out"),
            (FetchError::Status(502), "status 502"),
            (FetchError::Transport("connection refused".into()), "Failed to reach"),
        ];

        for (err, expected) in cases {
            let (_dir, db) = test_db();
            let controller =
                ImportJobController::new(db, Arc::new(StaticFeed(Err(err))), policy());

            controller.start();
            let report = wait_for_finish(&controller).await;
            assert_eq!(report.job.success, Some(false));
            assert!(
                report.job.error.as_deref().unwrap().contains(expected),
                "unexpected error: {:?}",
                report.job.error
            );
            assert!(!report.locked);
        }
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() {
        let (_dir, db) = test_db();
        let gate = Arc::new(tokio::sync::Notify::new());
        let feed = GatedFeed {
            gate: gate.clone(),
            payload: json!([record("030001", "1130115", "1")]),
        };
        let controller = ImportJobController::new(db, Arc::new(feed), policy());

        assert!(matches!(controller.start(), StartOutcome::Accepted { .. }));
        let report = controller.status();
        assert!(report.locked);
        assert_eq!(report.job.state, JobState::Running);

        assert!(matches!(
            controller.start(),
            StartOutcome::InProgress { elapsed_secs: 0 }
        ));

        gate.notify_one();
        let report = wait_for_finish(&controller).await;
        assert_eq!(report.job.success, Some(true));

        // Lock is free again
        assert!(matches!(controller.start(), StartOutcome::Accepted { .. }));
        gate.notify_one();
        wait_for_finish(&controller).await;
    }

    #[tokio::test]
    async fn test_stale_lock_is_recovered_after_ttl() {
        let (_dir, db) = test_db();
        let feed = StallFirstFeed {
            calls: AtomicUsize::new(0),
            payload: json!([record("030001", "1130115", "1")]),
        };
        let controller = ImportJobController::new(
            db.clone(),
            Arc::new(feed),
            ImportPolicy {
                lock_ttl: Duration::from_millis(100),
                ..policy()
            },
        );

        let first = match controller.start() {
            StartOutcome::Accepted { run_id, .. } => run_id,
            other => panic!("expected acceptance, got {:?}", other),
        };
        assert!(matches!(controller.start(), StartOutcome::InProgress { .. }));

        tokio::time::sleep(Duration::from_millis(150)).await;

        let second = match controller.start() {
            StartOutcome::Accepted {
                run_id,
                recovered_stale_lock,
            } => {
                assert!(recovered_stale_lock);
                run_id
            }
            other => panic!("expected stale lock recovery, got {:?}", other),
        };
        assert_ne!(first, second);

        let report = wait_for_finish(&controller).await;
        assert_eq!(report.job.run_id, Some(second));
        assert_eq!(report.job.success, Some(true));
        assert_eq!(db.count_trades().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deadline_exceeded_rolls_back() {
        let (_dir, db) = test_db();
        db.upsert_trades(&[row("030001", 1.0)]).unwrap();

        let payload = json!([
            record("030001", "1130115", "999"),
            record("030002", "1130115", "2"),
            record("030003", "1130115", "3")
        ]);
        let controller = ImportJobController::new(
            db.clone(),
            Arc::new(StaticFeed(Ok(payload))),
            ImportPolicy {
                max_runtime: Duration::ZERO,
                ..policy()
            },
        );

        controller.start();
        let report = wait_for_finish(&controller).await;
        assert_eq!(report.job.success, Some(false));
        assert!(report.job.error.as_deref().unwrap().contains("time limit"));
        assert_eq!(report.job.trade_date, None);

        assert_eq!(db.count_trades().unwrap(), 1);
        let stored = db.get_trade("030001", "2024-01-15").unwrap().unwrap();
        assert_eq!(stored.turnover, Some(1.0));
    }

    #[test]
    fn test_deadline_between_chunks_discards_applied_chunks() {
        let (_dir, db) = test_db();
        let rows: Vec<WarrantTradeRow> = (0..5).map(|i| row(&format!("03000{}", i), i as f64)).collect();

        let mut checks = 0;
        let mut progress = Vec::new();
        let mut committed = false;
        let result = {
            let mut conn = db.connection().unwrap();
            write_in_transaction(
                &mut conn,
                &rows,
                2,
                Duration::from_secs(1),
                || {
                    checks += 1;
                    checks >= 3
                },
                |processed| progress.push(processed),
                || committed = true,
            )
        };

        assert!(matches!(result, Err(ImportError::DeadlineExceeded { limit_secs: 1 })));
        assert_eq!(progress, vec![2, 4]);
        assert!(!committed);
        assert_eq!(db.count_trades().unwrap(), 0);
    }

    #[test]
    fn test_write_in_transaction_commits_all_chunks() {
        let (_dir, db) = test_db();
        let rows: Vec<WarrantTradeRow> = (0..5).map(|i| row(&format!("03000{}", i), i as f64)).collect();

        let mut progress = Vec::new();
        let applied = {
            let mut conn = db.connection().unwrap();
            write_in_transaction(
                &mut conn,
                &rows,
                2,
                Duration::from_secs(1),
                || false,
                |processed| progress.push(processed),
                || {},
            )
            .unwrap()
        };

        assert_eq!(applied, 5);
        assert_eq!(progress, vec![2, 4, 5]);
        assert_eq!(db.count_trades().unwrap(), 5);
    }

    #[test]
    fn test_lock_release_is_keyed_by_run() {
        let lock = JobLock::default();
        let first = match lock.try_acquire(Duration::ZERO) {
            LockAttempt::Acquired { run_id, .. } => run_id,
            LockAttempt::Busy { .. } => panic!("lock should be free"),
        };
        // ttl of zero makes the held lock immediately stale
        let second = match lock.try_acquire(Duration::ZERO) {
            LockAttempt::Acquired {
                run_id,
                recovered_stale,
                ..
            } => {
                assert!(recovered_stale.is_some());
                run_id
            }
            LockAttempt::Busy { .. } => panic!("stale lock should be recovered"),
        };

        assert!(!lock.release(first));
        assert!(lock.held_for().is_some());
        assert!(lock.release(second));
        assert!(lock.held_for().is_none());
    }

    #[test]
    fn test_user_messages() {
        let deadline = ImportError::DeadlineExceeded { limit_secs: 360 };
        assert!(deadline.user_message().contains("360s time limit"));

        let decode = ImportError::Fetch(FetchError::Decode("eof".into()));
        assert!(decode.user_message().contains("unreadable"));

        let statement = format!("INSERT INTO tw_warrant_trade {}", "(?, ?), ".repeat(10_000));
        let store = ImportError::Store(AppError::Internal(statement));
        let message = store.user_message();
        assert!(message.contains("rolled back"));
        assert!(!message.contains("INSERT"));
        assert!(message.len() < 200);
    }

    #[test]
    fn test_oversized_chunk_size_is_capped_to_bind_limit() {
        let (_dir, db) = test_db();
        let rows: Vec<WarrantTradeRow> = (0..MAX_UPSERT_ROWS + 10)
            .map(|i| row(&format!("W{:05}", i), i as f64))
            .collect();

        let mut progress = Vec::new();
        let applied = {
            let mut conn = db.connection().unwrap();
            write_in_transaction(
                &mut conn,
                &rows,
                20_000,
                Duration::from_secs(60),
                || false,
                |processed| progress.push(processed),
                || {},
            )
            .unwrap()
        };

        assert_eq!(applied, rows.len());
        assert_eq!(progress, vec![MAX_UPSERT_ROWS, rows.len()]);
        assert_eq!(db.count_trades().unwrap(), rows.len() as i64);
    }
}
