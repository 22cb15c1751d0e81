// Finance Suite - Write Coordinator
// Serializes a logical edit (single cell, whole-row fill, or an arbitrary
// batch) into exactly one revision bump: the revision is allocated BEFORE any
// cell is persisted, and every write of the edit carries that revision. This
// is what keeps a concurrent reload from ever observing a half-applied edit
// and what makes undo rewind whole edits.

use rusqlite::Connection;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cells;
use crate::db::{self, StoreResult};
use crate::revision;

/// One cell mutation inside a logical edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellEdit {
    pub row: i64,
    pub col: u8,
    pub value: f64,
}

/// Commit one logical edit: allocate the next revision, then persist every
/// cell under it. Returns the revision the edit landed at.
///
/// The whole batch is validated before the revision is allocated, so a bad
/// batch is rejected without touching the head and without persisting any of
/// its cells; the caller re-prompts and reconciles against
/// `revision::current` on its next read.
pub fn commit_edit(conn: &Connection, year: i32, edits: &[CellEdit]) -> StoreResult<i64> {
    for edit in edits {
        if !edit.value.is_finite() {
            return Err(crate::db::StoreError::InvalidValue(edit.value));
        }
        if edit.col > 11 {
            return Err(crate::db::StoreError::InvalidInput("col must be 0-11"));
        }
    }

    let rev = revision::allocate_next(conn, year)?;
    for edit in edits {
        cells::write_cell(conn, year, edit.row, edit.col, edit.value, rev)?;
    }

    db::log_action(
        conn,
        "cell_edit",
        serde_json::json!({ "year": year, "revision": rev, "cells": edits.len() }),
    )?;

    Ok(rev)
}

/// Fill all twelve months of a row with one value as a single logical edit.
pub fn fill_row(conn: &Connection, year: i32, row: i64, value: f64) -> StoreResult<i64> {
    let edits: Vec<CellEdit> = (0..12u8)
        .map(|col| CellEdit { row, col, value })
        .collect();
    commit_edit(conn, year, &edits)
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    value: f64,
    due: Instant,
}

/// Coalesces rapid keystrokes into one write per cell.
///
/// At most one pending deferred write exists per (year, row, col); a newer
/// edit to the same key cancels-and-replaces the older one, so only the
/// latest value inside a window is ever persisted. Deadlines are checked
/// against an explicit clock instant; nothing runs in the background.
///
/// Note the debounce only defers the *value*: flushing allocates the revision
/// immediately before the writes, never ahead of them.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<(i32, i64, u8), Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Queue a value for (year, row, col), replacing any pending edit for the
    /// same key and restarting its window.
    pub fn submit(&mut self, year: i32, row: i64, col: u8, value: f64, now: Instant) {
        self.pending.insert(
            (year, row, col),
            Pending {
                value,
                due: now + self.window,
            },
        );
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Commit every edit whose window has elapsed, one logical edit per year.
    /// Returns the (year, revision) pairs that were committed.
    ///
    /// If a commit fails, the failed year's values and every not-yet-attempted
    /// group go back into the buffer before the error is returned, so a
    /// transient failure loses nothing.
    pub fn flush_due(&mut self, conn: &Connection, now: Instant) -> StoreResult<Vec<(i32, i64)>> {
        let due_keys: Vec<(i32, i64, u8)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(k, _)| *k)
            .collect();

        let mut by_year: HashMap<i32, Vec<((i32, i64, u8), Pending)>> = HashMap::new();
        for key in due_keys {
            if let Some(p) = self.pending.remove(&key) {
                by_year.entry(key.0).or_default().push((key, p));
            }
        }
        let mut groups: Vec<(i32, Vec<((i32, i64, u8), Pending)>)> = by_year.into_iter().collect();
        groups.sort_by_key(|(year, _)| *year);

        let mut committed = Vec::new();
        while !groups.is_empty() {
            let (year, group) = groups.remove(0);
            let mut edits: Vec<CellEdit> = group
                .iter()
                .map(|((_, row, col), p)| CellEdit {
                    row: *row,
                    col: *col,
                    value: p.value,
                })
                .collect();
            edits.sort_by_key(|e| (e.row, e.col));

            match commit_edit(conn, year, &edits) {
                Ok(rev) => committed.push((year, rev)),
                Err(err) => {
                    for (key, p) in group.into_iter().chain(groups.drain(..).flat_map(|(_, g)| g))
                    {
                        self.pending.insert(key, p);
                    }
                    return Err(err);
                }
            }
        }
        Ok(committed)
    }

    /// Commit everything still pending regardless of deadlines (e.g. on
    /// shutdown or before an undo, which must not race a buffered edit).
    pub fn flush_all(&mut self, conn: &Connection) -> StoreResult<Vec<(i32, i64)>> {
        let far_future = Instant::now() + self.window + self.window;
        self.flush_due(conn, far_future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_batch_shares_one_revision() {
        let conn = test_conn();
        let edits = vec![
            CellEdit { row: 0, col: 0, value: 3000.0 },
            CellEdit { row: 1, col: 0, value: 1000.0 },
            CellEdit { row: 1, col: 1, value: 1200.0 },
        ];

        let rev = commit_edit(&conn, 2024, &edits).unwrap();
        assert_eq!(rev, 1);

        let snap = cells::latest_snapshot(&conn, 2024).unwrap();
        assert_eq!(snap.len(), 3);
        assert!(snap.iter().all(|c| c.revision == rev));

        // undo rewinds the whole edit atomically
        revision::undo(&conn, 2024).unwrap();
        assert!(cells::latest_snapshot(&conn, 2024).unwrap().is_empty());
    }

    #[test]
    fn test_fill_row_is_one_edit() {
        let conn = test_conn();
        let rev = fill_row(&conn, 2024, 0, 2500.0).unwrap();

        let snap = cells::latest_snapshot(&conn, 2024).unwrap();
        assert_eq!(snap.len(), 12);
        assert!(snap.iter().all(|c| c.revision == rev && c.value == 2500.0));
    }

    #[test]
    fn test_debounce_latest_value_wins() {
        let conn = test_conn();
        let mut deb = Debouncer::new(Duration::from_millis(300));
        let t0 = Instant::now();

        // three keystrokes on the same cell inside one window
        deb.submit(2024, 1, 0, 1.0, t0);
        deb.submit(2024, 1, 0, 12.0, t0 + Duration::from_millis(100));
        deb.submit(2024, 1, 0, 123.0, t0 + Duration::from_millis(200));
        assert_eq!(deb.pending_len(), 1);

        // window measured from the LAST keystroke
        let early = deb
            .flush_due(&conn, t0 + Duration::from_millis(400))
            .unwrap();
        assert!(early.is_empty());

        let committed = deb
            .flush_due(&conn, t0 + Duration::from_millis(501))
            .unwrap();
        assert_eq!(committed.len(), 1);

        let snap = cells::latest_snapshot(&conn, 2024).unwrap();
        assert_eq!(snap.len(), 1, "only the latest value is persisted");
        assert_eq!(snap[0].value, 123.0);
    }

    #[test]
    fn test_debounce_groups_per_year() {
        let conn = test_conn();
        let mut deb = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        deb.submit(2024, 0, 0, 10.0, t0);
        deb.submit(2024, 1, 0, 20.0, t0);
        deb.submit(2025, 0, 0, 30.0, t0);

        let committed = deb.flush_all(&conn).unwrap();
        assert_eq!(committed.len(), 2, "one revision bump per year");

        assert_eq!(cells::latest_snapshot(&conn, 2024).unwrap().len(), 2);
        assert_eq!(cells::latest_snapshot(&conn, 2025).unwrap().len(), 1);
        assert_eq!(revision::current(&conn, 2024).unwrap(), 1);
        assert_eq!(revision::current(&conn, 2025).unwrap(), 1);
    }

    #[test]
    fn test_flush_due_keeps_undue_edits_pending() {
        let conn = test_conn();
        let mut deb = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        deb.submit(2024, 0, 0, 10.0, t0);
        deb.submit(2024, 1, 0, 20.0, t0 + Duration::from_millis(90));

        let committed = deb
            .flush_due(&conn, t0 + Duration::from_millis(110))
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(deb.pending_len(), 1, "second edit is not due yet");

        deb.flush_all(&conn).unwrap();
        assert_eq!(deb.pending_len(), 0);
        assert_eq!(cells::latest_snapshot(&conn, 2024).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_batch_does_not_advance_the_head() {
        let conn = test_conn();
        let rev = commit_edit(&conn, 2024, &[CellEdit { row: 0, col: 0, value: 5.0 }]).unwrap();

        // NaN anywhere in the batch rejects it before a revision is allocated
        let result = commit_edit(
            &conn,
            2024,
            &[
                CellEdit { row: 0, col: 1, value: 7.0 },
                CellEdit { row: 0, col: 2, value: f64::NAN },
            ],
        );
        assert!(matches!(result, Err(crate::db::StoreError::InvalidValue(_))));

        assert_eq!(revision::current(&conn, 2024).unwrap(), rev);
        let snap = cells::latest_snapshot(&conn, 2024).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].value, 5.0);
    }

    #[test]
    fn test_out_of_range_column_rejected_before_allocation() {
        let conn = test_conn();

        // the bad column comes last; earlier cells must not slip through at a
        // freshly bumped head
        let result = commit_edit(
            &conn,
            2024,
            &[
                CellEdit { row: 0, col: 0, value: 10.0 },
                CellEdit { row: 0, col: 13, value: 20.0 },
            ],
        );
        assert!(matches!(result, Err(crate::db::StoreError::InvalidInput(_))));

        assert_eq!(revision::current(&conn, 2024).unwrap(), 0);
        assert!(cells::latest_snapshot(&conn, 2024).unwrap().is_empty());
    }

    #[test]
    fn test_failed_flush_keeps_values_buffered() {
        let conn = test_conn();
        let mut deb = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        // 2024 holds an uncommittable edit; 2025 comes after it in flush order
        deb.submit(2024, 0, 13, 10.0, t0);
        deb.submit(2025, 0, 0, 20.0, t0);

        assert!(deb.flush_all(&conn).is_err());

        // nothing is lost: the failed group and the unattempted one stay put
        assert_eq!(deb.pending_len(), 2);
        assert_eq!(revision::current(&conn, 2024).unwrap(), 0);
        assert_eq!(revision::current(&conn, 2025).unwrap(), 0);
    }
}
