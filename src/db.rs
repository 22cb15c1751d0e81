// Finance Suite - Database layer
// SQLite schema, shared error taxonomy, money rounding and the action log.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised by the store layer.
///
/// Stale writes and half-applied reorders are integration bugs and must
/// surface as hard failures; absence of data is never an error and is
/// represented by empty results instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write arrived tagged with a revision that is not the current head.
    /// Accepting it would corrupt the linear undo history.
    #[error("stale write: expected revision {expected}, got {got}")]
    StaleWrite { expected: i64, got: i64 },

    /// A row was referenced that has no metadata record.
    #[error("unknown row {row} in year {year}")]
    UnknownRow { year: i32, row: i64 },

    /// Non-finite or otherwise unusable monetary value.
    #[error("invalid value: {0}")]
    InvalidValue(f64),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Round a monetary amount to 2 decimal places.
///
/// Values are stored as REAL; rounding on every write and every derived sum
/// keeps repeated edits from accumulating binary floating-point drift.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Open (or create) the finance database at `path` and ensure the schema.
pub fn open_database(path: impl AsRef<Path>) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Finance cells: one record per (year, row, col, revision).
    // Edits never overwrite history; each write at a new revision adds a
    // record, which is what makes undo/redo possible.
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS finance_cell (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            row INTEGER NOT NULL,
            col INTEGER NOT NULL,
            value REAL NOT NULL,
            revision INTEGER NOT NULL,
            ts TEXT NOT NULL,
            UNIQUE(year, row, col, revision)
        )",
        [],
    )?;

    // ==========================================================================
    // Row metadata: display position, label, soft-delete flag, classification.
    // `classification` stays NULL until the user sets it explicitly; NULL is
    // resolved by the legacy default rule (row 0 income, others expense).
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS row_meta (
            year INTEGER NOT NULL,
            row INTEGER NOT NULL,
            position INTEGER NOT NULL,
            description TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            classification TEXT,
            PRIMARY KEY (year, row)
        )",
        [],
    )?;

    // ==========================================================================
    // Revision history: an ordered log of committed revisions per year plus a
    // head record holding the undo/redo cursor and the highest revision ever
    // issued (never reused, even after the redo path is discarded).
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS revision_log (
            year INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            PRIMARY KEY (year, idx)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS revision_head (
            year INTEGER PRIMARY KEY,
            cursor INTEGER NOT NULL,
            max_issued INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Action log (audit trail of user actions)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS action_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            info TEXT NOT NULL,
            ts TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cell_year_rev ON finance_cell(year, revision)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_action_ts ON action_log(ts)",
        [],
    )?;

    Ok(())
}

/// One entry of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub id: i64,
    pub action: String,
    pub info: serde_json::Value,
    pub ts: String,
}

/// Append an action to the audit trail.
pub fn log_action(conn: &Connection, action: &str, info: serde_json::Value) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO action_log (action, info, ts) VALUES (?1, ?2, ?3)",
        rusqlite::params![action, info.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Most recent actions, newest first.
pub fn recent_actions(conn: &Connection, limit: usize) -> StoreResult<Vec<ActionEntry>> {
    let mut stmt =
        conn.prepare("SELECT id, action, info, ts FROM action_log ORDER BY id DESC LIMIT ?1")?;

    let entries = stmt
        .query_map([limit as i64], |row| {
            let info_json: String = row.get(2)?;
            Ok(ActionEntry {
                id: row.get(0)?,
                action: row.get(1)?,
                info: serde_json::from_str(&info_json).unwrap_or(serde_json::Value::Null),
                ts: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}
