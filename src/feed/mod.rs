//! External warrant data feeds
//!
//! The import job only sees the [`WarrantFeed`] trait. The TWSE open-data
//! client is the production implementation.

pub mod types;
mod twse;

use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;

pub use twse::{fetch_json, TwseFeed};
pub use types::RawWarrantRecord;

/// Source of the daily warrant trade dataset
#[async_trait]
pub trait WarrantFeed: Send + Sync {
    /// Feed name used in logs
    fn name(&self) -> &'static str;

    /// Fetch the latest dataset as raw JSON
    async fn fetch_latest(&self) -> Result<serde_json::Value, FetchError>;
}

/// Timeout and retry policy for a remote fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Hard wall-clock bound per attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl FetchPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(12_000),
            max_retries: 1,
            base_delay: Duration::from_millis(400),
        }
    }
}
