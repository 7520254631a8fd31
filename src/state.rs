//! Application state management

use crate::config::Config;
use crate::db::SqliteDb;
use crate::error::Result;
use crate::feed::{TwseFeed, WarrantFeed};
use crate::services::ImportJobController;
use std::sync::Arc;

/// Application state shared across handlers and the scheduler
pub struct AppState {
    /// Runtime configuration
    pub config: Config,

    /// SQLite database pool
    pub db: Arc<SqliteDb>,

    /// The one import controller for this process
    pub importer: ImportJobController,
}

impl AppState {
    /// Create application state backed by the TWSE feed
    pub fn new(config: Config) -> Result<Self> {
        let feed = TwseFeed::new(config.twse_api_url.clone(), config.fetch_policy())?;
        Self::with_feed(config, Arc::new(feed))
    }

    /// Create application state with an explicit feed
    pub fn with_feed(config: Config, feed: Arc<dyn WarrantFeed>) -> Result<Self> {
        let db = Arc::new(SqliteDb::new(&config.database_path, config.db_pool_size)?);
        let importer = ImportJobController::new(db.clone(), feed, config.import_policy());

        tracing::info!(
            "Import policy: lock ttl {}s, time limit {}s, chunk size {}",
            config.import_lock_ttl_secs,
            config.import_max_runtime_secs,
            config.import_chunk_size
        );

        Ok(Self {
            config,
            db,
            importer,
        })
    }
}
