//! Warrant trade persistence
//!
//! Writes are a single multi-row upsert per batch keyed by the natural key
//! `(warrant_code, trade_date)`. Reads are plain parameterised queries used by
//! the ranking and time-series endpoints.

use super::models::{RankedTrade, RankingMetric, SeriesPoint, StoredTrade, WarrantTradeRow};
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

const TABLE: &str = "tw_warrant_trade";
const COLUMNS_PER_ROW: usize = 8;

/// Bound parameter ceiling of the bundled SQLite (`SQLITE_MAX_VARIABLE_NUMBER`)
const MAX_BOUND_PARAMS: usize = 32766;

/// Largest batch `upsert_batch` can bind in one statement
pub const MAX_UPSERT_ROWS: usize = MAX_BOUND_PARAMS / COLUMNS_PER_ROW;

/// Insert-or-update a batch of rows with one statement.
///
/// On a key conflict every mutable column is overwritten from the incoming
/// row. Re-applying the same batch converges to the same state.
pub fn upsert_batch(conn: &Connection, rows: &[WarrantTradeRow]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let sql = build_upsert_sql(rows.len());

    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::with_capacity(rows.len() * COLUMNS_PER_ROW);
    for row in rows {
        params_vec.push(Box::new(row.out_date.to_string()));
        params_vec.push(Box::new(row.trade_date.to_string()));
        params_vec.push(Box::new(row.warrant_code.clone()));
        params_vec.push(Box::new(row.warrant_name.clone()));
        params_vec.push(Box::new(row.turnover));
        params_vec.push(Box::new(row.volume));
        params_vec.push(Box::new(row.raw_out_date_text.clone()));
        params_vec.push(Box::new(row.raw_trade_date_text.clone()));
    }
    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

    let affected = conn.execute(&sql, params_refs.as_slice())?;
    Ok(affected)
}

fn build_upsert_sql(row_count: usize) -> String {
    let values = (0..row_count)
        .map(|i| {
            let base = i * COLUMNS_PER_ROW;
            format!(
                "(?{}, ?{}, ?{}, ?{}, ?{}, ?{}, ?{}, ?{}, strftime('%Y-%m-%d %H:%M:%f', 'now'))",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
                base + 6,
                base + 7,
                base + 8
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"
        INSERT INTO {table} (
            out_date, trade_date, warrant_code, warrant_name, turnover, volume,
            raw_out_date_text, raw_trade_date_text, updated_at
        )
        VALUES
        {values}
        ON CONFLICT (warrant_code, trade_date) DO UPDATE SET
            out_date = excluded.out_date,
            warrant_name = excluded.warrant_name,
            turnover = excluded.turnover,
            volume = excluded.volume,
            raw_out_date_text = excluded.raw_out_date_text,
            raw_trade_date_text = excluded.raw_trade_date_text,
            updated_at = excluded.updated_at
        "#,
        table = TABLE,
        values = values
    )
}

/// Distinct trade dates, newest first
pub fn list_trade_dates(conn: &Connection, limit: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT trade_date FROM {} ORDER BY trade_date DESC LIMIT ?1",
        TABLE
    ))?;

    let dates = stmt
        .query_map(params![limit as i64], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(dates)
}

/// Most recent trade date in the table, if any
pub fn latest_trade_date(conn: &Connection) -> Result<Option<String>> {
    let latest: Option<String> = conn.query_row(
        &format!("SELECT MAX(trade_date) FROM {}", TABLE),
        [],
        |row| row.get(0),
    )?;
    Ok(latest)
}

/// Leaderboard for a single trade date
pub fn rankings(
    conn: &Connection,
    trade_date: &str,
    metric: RankingMetric,
    limit: usize,
) -> Result<Vec<RankedTrade>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT trade_date, warrant_code, warrant_name, turnover, volume
         FROM {}
         WHERE trade_date = ?1
         ORDER BY {}
         LIMIT ?2",
        TABLE,
        metric.order_clause()
    ))?;

    let rows = stmt
        .query_map(params![trade_date, limit as i64], |row| {
            Ok(RankedTrade {
                rank: 0,
                trade_date: row.get(0)?,
                warrant_code: row.get(1)?,
                warrant_name: row.get(2)?,
                turnover: row.get(3)?,
                volume: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(idx, mut row)| {
            row.rank = idx + 1;
            row
        })
        .collect())
}

/// History of one warrant, oldest first.
///
/// With a date range every row in the range is returned. Without one, only the
/// latest `limit_days` rows are returned.
pub fn timeseries(
    conn: &Connection,
    warrant_code: &str,
    start: Option<&str>,
    end: Option<&str>,
    limit_days: usize,
) -> Result<Vec<SeriesPoint>> {
    let mut clauses = vec!["warrant_code = ?".to_string()];
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(warrant_code.to_string())];

    if let Some(start) = start {
        clauses.push("trade_date >= ?".to_string());
        params_vec.push(Box::new(start.to_string()));
    }
    if let Some(end) = end {
        clauses.push("trade_date <= ?".to_string());
        params_vec.push(Box::new(end.to_string()));
    }

    let ranged = start.is_some() || end.is_some();
    let sql = if ranged {
        format!(
            "SELECT trade_date, warrant_code, warrant_name, turnover, volume
             FROM {} WHERE {} ORDER BY trade_date ASC",
            TABLE,
            clauses.join(" AND ")
        )
    } else {
        params_vec.push(Box::new(limit_days as i64));
        format!(
            "SELECT trade_date, warrant_code, warrant_name, turnover, volume
             FROM {} WHERE {} ORDER BY trade_date DESC LIMIT ?",
            TABLE,
            clauses.join(" AND ")
        )
    };

    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let mut points = stmt
        .query_map(params_refs.as_slice(), |row| {
            Ok(SeriesPoint {
                trade_date: row.get(0)?,
                warrant_code: row.get(1)?,
                warrant_name: row.get(2)?,
                turnover: row.get(3)?,
                volume: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if !ranged {
        points.reverse();
    }

    Ok(points)
}

/// Fetch one stored record by its natural key
pub fn get_trade(conn: &Connection, warrant_code: &str, trade_date: &str) -> Result<Option<StoredTrade>> {
    let trade = conn
        .query_row(
            &format!(
                "SELECT out_date, trade_date, warrant_code, warrant_name, turnover, volume,
                        raw_out_date_text, raw_trade_date_text, updated_at
                 FROM {} WHERE warrant_code = ?1 AND trade_date = ?2",
                TABLE
            ),
            params![warrant_code, trade_date],
            |row| {
                Ok(StoredTrade {
                    out_date: row.get(0)?,
                    trade_date: row.get(1)?,
                    warrant_code: row.get(2)?,
                    warrant_name: row.get(3)?,
                    turnover: row.get(4)?,
                    volume: row.get(5)?,
                    raw_out_date_text: row.get(6)?,
                    raw_trade_date_text: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?;

    Ok(trade)
}

/// Total number of stored trade records
pub fn count_trades(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
