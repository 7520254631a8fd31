//! Query Service
//!
//! Read-side queries over stored warrant trades: available dates, daily
//! leaderboards and single-warrant history. Query parameters arrive as raw
//! strings and are clamped here so handlers stay thin.

use crate::db::sqlite::{RankedTrade, RankingMetric, SeriesPoint};
use crate::db::SqliteDb;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DATES_DEFAULT_LIMIT: usize = 120;
pub const DATES_MAX_LIMIT: usize = 365;
pub const RANKINGS_DEFAULT_LIMIT: usize = 50;
pub const RANKINGS_MAX_LIMIT: usize = 200;
pub const TIMESERIES_DEFAULT_DAYS: usize = 90;
pub const TIMESERIES_MAX_DAYS: usize = 365;

/// `GET /dates` parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatesQuery {
    pub limit: Option<String>,
}

/// `GET /rankings` parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankingsQuery {
    pub metric: Option<String>,
    pub date: Option<String>,
    pub limit: Option<String>,
}

/// `GET /timeseries` parameters; `code` wins over `warrant_code`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeseriesQuery {
    pub code: Option<String>,
    pub warrant_code: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(rename = "limitDays")]
    pub limit_days: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatesResult {
    pub success: bool,
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingsResult {
    pub success: bool,
    pub date: Option<String>,
    pub metric: RankingMetric,
    pub rows: Vec<RankedTrade>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesResult {
    pub success: bool,
    pub code: String,
    pub name: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub count: usize,
    pub data: Vec<SeriesPoint>,
}

/// Read-only warrant queries
pub struct WarrantQueryService;

impl WarrantQueryService {
    /// Distinct trade dates, newest first
    pub fn dates(db: &SqliteDb, query: &DatesQuery) -> Result<DatesResult> {
        let limit = clamp_limit(query.limit.as_deref(), DATES_DEFAULT_LIMIT, DATES_MAX_LIMIT);
        let dates = db.list_trade_dates(limit)?;
        Ok(DatesResult {
            success: true,
            dates,
        })
    }

    /// Leaderboard for the requested date, or the latest stored date
    pub fn rankings(db: &SqliteDb, query: &RankingsQuery) -> Result<RankingsResult> {
        let metric = RankingMetric::parse_lenient(query.metric.as_deref());
        let limit = clamp_limit(query.limit.as_deref(), RANKINGS_DEFAULT_LIMIT, RANKINGS_MAX_LIMIT);

        let date = match parse_date_param("date", query.date.as_deref())? {
            Some(date) => date,
            None => match db.latest_trade_date()? {
                Some(latest) => latest,
                None => {
                    return Ok(RankingsResult {
                        success: true,
                        date: None,
                        metric,
                        rows: Vec::new(),
                    })
                }
            },
        };

        debug!("Rankings for {} by {:?} (limit {})", date, metric, limit);
        let rows = db.rankings(&date, metric, limit)?;
        Ok(RankingsResult {
            success: true,
            date: Some(date),
            metric,
            rows,
        })
    }

    /// History of one warrant, oldest first
    pub fn timeseries(db: &SqliteDb, query: &TimeseriesQuery) -> Result<TimeseriesResult> {
        let code = [query.code.as_deref(), query.warrant_code.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|c| !c.is_empty())
            .ok_or_else(|| AppError::Validation("Missing required parameter: code".to_string()))?
            .to_string();

        let start = parse_date_param("start", query.start.as_deref())?;
        let end = parse_date_param("end", query.end.as_deref())?;
        let limit_days = clamp_limit(
            query.limit_days.as_deref(),
            TIMESERIES_DEFAULT_DAYS,
            TIMESERIES_MAX_DAYS,
        );

        let data = db.timeseries(&code, start.as_deref(), end.as_deref(), limit_days)?;
        let name = data.iter().find_map(|p| p.warrant_name.clone());

        Ok(TimeseriesResult {
            success: true,
            code,
            name,
            start,
            end,
            count: data.len(),
            data,
        })
    }
}

/// Positive integer limit capped at `max`; anything unparsable gets `default`
pub fn clamp_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(max as u64) as usize)
        .unwrap_or(default)
}

/// Optional `YYYY-MM-DD` parameter; blank means absent, malformed is rejected
pub fn parse_date_param(name: &str, raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| AppError::Validation(format!("{} must be a YYYY-MM-DD date: {}", name, s))),
    }
}
