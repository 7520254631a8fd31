//! SQLite database module

pub mod models;
mod migrations;
mod warrant_trade;

use crate::error::Result;
pub use models::{RankedTrade, RankingMetric, SeriesPoint, StoredTrade, WarrantTradeRow};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

pub use warrant_trade::{upsert_batch, MAX_UPSERT_ROWS};

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// SQLite database wrapper
///
/// Each caller checks out its own pooled connection, so the import job can hold
/// a long transaction while read queries proceed under WAL isolation.
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Open (or create) the database file and run migrations
    pub fn new(path: &Path, max_connections: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            // Enable WAL mode for better concurrent access
            conn.execute_batch(
                "PRAGMA busy_timeout=5000; PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;",
            )
        });

        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(Duration::from_secs(10))
            .build(manager)?;

        let db = Self { pool };

        // Run migrations
        db.run_migrations()?;

        tracing::info!("SQLite database ready at {:?}", path);
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.connection()?;
        migrations::run_migrations(&conn)
    }

    /// Check out a pooled connection
    pub fn connection(&self) -> Result<SqliteConnection> {
        Ok(self.pool.get()?)
    }

    // ========== Write Methods ==========

    /// Upsert rows in a transaction of their own
    pub fn upsert_trades(&self, rows: &[WarrantTradeRow]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let affected = warrant_trade::upsert_batch(&tx, rows)?;
        tx.commit()?;
        Ok(affected)
    }

    // ========== Read Methods ==========

    /// Distinct trade dates, newest first
    pub fn list_trade_dates(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.connection()?;
        warrant_trade::list_trade_dates(&conn, limit)
    }

    /// Most recent stored trade date
    pub fn latest_trade_date(&self) -> Result<Option<String>> {
        let conn = self.connection()?;
        warrant_trade::latest_trade_date(&conn)
    }

    /// Leaderboard for one trade date
    pub fn rankings(
        &self,
        trade_date: &str,
        metric: RankingMetric,
        limit: usize,
    ) -> Result<Vec<RankedTrade>> {
        let conn = self.connection()?;
        warrant_trade::rankings(&conn, trade_date, metric, limit)
    }

    /// History of one warrant, oldest first
    pub fn timeseries(
        &self,
        warrant_code: &str,
        start: Option<&str>,
        end: Option<&str>,
        limit_days: usize,
    ) -> Result<Vec<SeriesPoint>> {
        let conn = self.connection()?;
        warrant_trade::timeseries(&conn, warrant_code, start, end, limit_days)
    }

    /// Look up a single record by natural key
    pub fn get_trade(&self, warrant_code: &str, trade_date: &str) -> Result<Option<StoredTrade>> {
        let conn = self.connection()?;
        warrant_trade::get_trade(&conn, warrant_code, trade_date)
    }

    /// Total stored records
    pub fn count_trades(&self) -> Result<i64> {
        let conn = self.connection()?;
        warrant_trade::count_trades(&conn)
    }
}
