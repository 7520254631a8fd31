//! Runtime configuration
//!
//! Values come from the process environment; `run` loads an optional `.env`
//! file into it before this module reads anything. Every key has a default;
//! a key that is present but does not parse is a startup error rather than a
//! silent fallback.

use crate::db::sqlite::MAX_UPSERT_ROWS;
use crate::error::{AppError, Result};
use crate::feed::FetchPolicy;
use crate::services::ImportPolicy;
use chrono::NaiveTime;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TWSE_API_URL: &str = "https://openapi.twse.com.tw/v1/opendata/t187ap42_L";

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub database_path: PathBuf,
    pub db_pool_size: u32,
    pub twse_api_url: String,
    pub fetch_timeout_ms: u64,
    pub fetch_retries: u32,
    pub fetch_backoff_ms: u64,
    pub import_lock_ttl_secs: u64,
    pub import_max_runtime_secs: u64,
    pub import_chunk_size: usize,
    /// Daily import time (Asia/Taipei); `None` disables the scheduler
    pub auto_import_at: Option<NaiveTime>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4100,
            cors_origin: "http://localhost:5176".to_string(),
            database_path: PathBuf::from("warrants.db"),
            db_pool_size: 10,
            twse_api_url: DEFAULT_TWSE_API_URL.to_string(),
            fetch_timeout_ms: 12_000,
            fetch_retries: 1,
            fetch_backoff_ms: 400,
            import_lock_ttl_secs: 300,
            import_max_runtime_secs: 360,
            import_chunk_size: 250,
            auto_import_at: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// `.env` is loaded by the caller beforehand (see `run`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            cors_origin: get("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            db_pool_size: parse_or("DB_POOL_SIZE", get("DB_POOL_SIZE"), defaults.db_pool_size)?,
            twse_api_url: get("TWSE_API_URL").unwrap_or(defaults.twse_api_url),
            fetch_timeout_ms: parse_or(
                "FETCH_TIMEOUT_MS",
                get("FETCH_TIMEOUT_MS"),
                defaults.fetch_timeout_ms,
            )?,
            fetch_retries: parse_or("FETCH_RETRIES", get("FETCH_RETRIES"), defaults.fetch_retries)?,
            fetch_backoff_ms: parse_or(
                "FETCH_BACKOFF_MS",
                get("FETCH_BACKOFF_MS"),
                defaults.fetch_backoff_ms,
            )?,
            import_lock_ttl_secs: parse_or(
                "IMPORT_LOCK_TTL_SECS",
                get("IMPORT_LOCK_TTL_SECS"),
                defaults.import_lock_ttl_secs,
            )?,
            import_max_runtime_secs: parse_or(
                "IMPORT_MAX_RUNTIME_SECS",
                get("IMPORT_MAX_RUNTIME_SECS"),
                defaults.import_max_runtime_secs,
            )?,
            import_chunk_size: parse_or(
                "IMPORT_CHUNK_SIZE",
                get("IMPORT_CHUNK_SIZE"),
                defaults.import_chunk_size,
            )?,
            auto_import_at: get("AUTO_IMPORT_AT")
                .map(|raw| {
                    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| {
                        AppError::Config(format!("AUTO_IMPORT_AT must be HH:MM ({}): {}", raw, e))
                    })
                })
                .transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.twse_api_url)
            .map_err(|e| AppError::Config(format!("TWSE_API_URL is not a valid URL: {}", e)))?;

        if self.import_chunk_size == 0 {
            return Err(AppError::Config("IMPORT_CHUNK_SIZE must be at least 1".to_string()));
        }
        if self.import_chunk_size > MAX_UPSERT_ROWS {
            return Err(AppError::Config(format!(
                "IMPORT_CHUNK_SIZE must be at most {} ({} given)",
                MAX_UPSERT_ROWS, self.import_chunk_size
            )));
        }
        if self.db_pool_size == 0 {
            return Err(AppError::Config("DB_POOL_SIZE must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Socket address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address {}:{}: {}", self.host, self.port, e)))
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_millis(self.fetch_timeout_ms),
            max_retries: self.fetch_retries,
            base_delay: Duration::from_millis(self.fetch_backoff_ms),
        }
    }

    pub fn import_policy(&self) -> ImportPolicy {
        ImportPolicy {
            lock_ttl: Duration::from_secs(self.import_lock_ttl_secs),
            max_runtime: Duration::from_secs(self.import_max_runtime_secs),
            chunk_size: self.import_chunk_size,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{} has invalid value '{}': {}", key, value, e))),
        None => Ok(default),
    }
}
