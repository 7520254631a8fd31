//! SQLite data models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical warrant trade row, keyed by `(warrant_code, trade_date)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarrantTradeRow {
    pub out_date: NaiveDate,
    pub trade_date: NaiveDate,
    pub warrant_code: String,
    pub warrant_name: Option<String>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
    pub raw_out_date_text: Option<String>,
    pub raw_trade_date_text: Option<String>,
}

/// Stored trade record as read back from the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrade {
    pub out_date: String,
    pub trade_date: String,
    pub warrant_code: String,
    pub warrant_name: Option<String>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
    pub raw_out_date_text: Option<String>,
    pub raw_trade_date_text: Option<String>,
    pub updated_at: String,
}

/// Ranking metric for the leaderboard query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMetric {
    Turnover,
    Volume,
}

impl RankingMetric {
    /// Anything other than "volume" ranks by turnover
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "volume" => RankingMetric::Volume,
            _ => RankingMetric::Turnover,
        }
    }

    pub(crate) fn order_clause(self) -> &'static str {
        match self {
            RankingMetric::Turnover => {
                "turnover DESC NULLS LAST, volume DESC NULLS LAST, warrant_code ASC"
            }
            RankingMetric::Volume => {
                "volume DESC NULLS LAST, turnover DESC NULLS LAST, warrant_code ASC"
            }
        }
    }
}

/// One leaderboard entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTrade {
    pub rank: usize,
    pub trade_date: String,
    pub warrant_code: String,
    pub warrant_name: Option<String>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
}

/// One point of a single warrant's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub trade_date: String,
    pub warrant_code: String,
    pub warrant_name: Option<String>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
}
