//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_tw_warrant_trade", CREATE_WARRANT_TRADE_TABLE)?;
    run_migration(conn, "002_tw_warrant_trade_indexes", CREATE_WARRANT_TRADE_INDEXES)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_WARRANT_TRADE_TABLE: &str = r#"
CREATE TABLE tw_warrant_trade (
    warrant_code TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    out_date TEXT NOT NULL,
    warrant_name TEXT,
    turnover REAL,
    volume REAL,
    raw_out_date_text TEXT,
    raw_trade_date_text TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (warrant_code, trade_date)
);
"#;

const CREATE_WARRANT_TRADE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tw_warrant_trade_date ON tw_warrant_trade(trade_date);
"#;
