// Finance Suite - Cell Store
// Durable mapping of (year, row, col) -> value, tagged with the revision at
// which the value was written. The store never generates revisions itself;
// callers obtain them from the Revision Manager first.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::{round_money, StoreError, StoreResult};
use crate::revision;

/// One stored cell, as returned by snapshot reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub row: i64,
    pub col: u8,
    pub value: f64,
    pub revision: i64,
}

/// Record `value` as current for (year, row, col) starting at `revision`.
///
/// `revision` must be the one the Revision Manager just allocated for this
/// edit; anything else is a stale write and is rejected outright. That
/// includes replaying the head revision while the year sits in an undone
/// state: committed revisions are immutable, and a legitimate allocation
/// always lands at the end of the history log. Writing the same cell twice
/// within one revision upserts (a debounce window may flush the same key more
/// than once before the next edit bumps the revision).
pub fn write_cell(
    conn: &Connection,
    year: i32,
    row: i64,
    col: u8,
    value: f64,
    revision: i64,
) -> StoreResult<()> {
    if !value.is_finite() {
        return Err(StoreError::InvalidValue(value));
    }
    if col > 11 {
        return Err(StoreError::InvalidInput("col must be 0-11"));
    }

    let (head, max_issued) = revision::head_state(conn, year)?;
    if revision != head || head != max_issued {
        return Err(StoreError::StaleWrite {
            expected: max_issued,
            got: revision,
        });
    }

    conn.execute(
        "INSERT INTO finance_cell (year, row, col, value, revision, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(year, row, col, revision)
         DO UPDATE SET value = excluded.value, ts = excluded.ts",
        params![
            year,
            row,
            col,
            round_money(value),
            revision,
            Utc::now().to_rfc3339()
        ],
    )?;

    Ok(())
}

/// Every (row, col) written in `year`, each with the value tagged with the
/// greatest revision <= `at_revision`. Cells first written after
/// `at_revision` are absent; an unknown year yields an empty list.
pub fn read_snapshot(conn: &Connection, year: i32, at_revision: i64) -> StoreResult<Vec<CellRecord>> {
    let mut stmt = conn.prepare(
        "SELECT row, col, value, MAX(revision) AS revision
         FROM finance_cell
         WHERE year = ?1 AND revision <= ?2
         GROUP BY row, col
         ORDER BY row, col",
    )?;

    let cells = stmt
        .query_map(params![year, at_revision], |r| {
            Ok(CellRecord {
                row: r.get(0)?,
                col: r.get::<_, i64>(1)? as u8,
                value: r.get(2)?,
                revision: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(cells)
}

/// Snapshot at the current head revision.
pub fn latest_snapshot(conn: &Connection, year: i32) -> StoreResult<Vec<CellRecord>> {
    let head = revision::current(conn, year)?;
    read_snapshot(conn, year, head)
}

/// Purge all cells, row metadata and revision history for `year`.
///
/// Irrecoverable. The core never prompts; requiring explicit confirmation is
/// the caller's responsibility.
pub fn reset_year(conn: &Connection, year: i32) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM finance_cell WHERE year = ?1", [year])?;
    tx.execute("DELETE FROM row_meta WHERE year = ?1", [year])?;
    tx.execute("DELETE FROM revision_log WHERE year = ?1", [year])?;
    tx.execute("DELETE FROM revision_head WHERE year = ?1", [year])?;
    tx.commit()?;
    Ok(())
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

    fn edit_one(conn: &Connection, year: i32, row: i64, col: u8, value: f64) -> i64 {
        let rev = revision::allocate_next(conn, year).unwrap();
        write_cell(conn, year, row, col, value, rev).unwrap();
        rev
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let conn = test_conn();
        let rev = edit_one(&conn, 2024, 1, 3, 42.5);

        let snap = read_snapshot(&conn, 2024, rev).unwrap();
        assert_eq!(
            snap,
            vec![CellRecord {
                row: 1,
                col: 3,
                value: 42.5,
                revision: rev
            }]
        );
    }

    #[test]
    fn test_snapshot_picks_greatest_revision_at_or_below() {
        let conn = test_conn();
        let r1 = edit_one(&conn, 2024, 0, 0, 100.0);
        let r2 = edit_one(&conn, 2024, 0, 0, 200.0);
        let r3 = edit_one(&conn, 2024, 1, 0, 50.0);

        // at r1 the first value is current and row 1 does not exist yet
        let snap = read_snapshot(&conn, 2024, r1).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].value, 100.0);

        // at r3 the overwrite is current and row 1 is present
        let snap = read_snapshot(&conn, 2024, r3).unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].value, 200.0);
        assert_eq!(snap[0].revision, r2);
        assert_eq!(snap[1].value, 50.0);
    }

    #[test]
    fn test_stale_revision_is_rejected() {
        let conn = test_conn();
        let rev = edit_one(&conn, 2024, 0, 0, 10.0);

        // a slow client still holding the previous revision must not clobber
        let err = write_cell(&conn, 2024, 0, 0, 999.0, rev - 1).unwrap_err();
        match err {
            StoreError::StaleWrite { expected, got } => {
                assert_eq!(expected, rev);
                assert_eq!(got, rev - 1);
            }
            other => panic!("expected StaleWrite, got {other:?}"),
        }

        // neither may a made-up future revision
        assert!(matches!(
            write_cell(&conn, 2024, 0, 0, 999.0, rev + 7),
            Err(StoreError::StaleWrite { .. })
        ));

        let snap = latest_snapshot(&conn, 2024).unwrap();
        assert_eq!(snap[0].value, 10.0);
    }

    #[test]
    fn test_replaying_the_head_in_an_undone_state_is_rejected() {
        let conn = test_conn();
        let r1 = edit_one(&conn, 2024, 0, 0, 100.0);
        edit_one(&conn, 2024, 0, 0, 200.0);

        revision::undo(&conn, 2024).unwrap(); // head replayed at r1

        // the replayed revision matches the head, but it was never freshly
        // allocated; accepting it would rewrite committed history
        let err = write_cell(&conn, 2024, 0, 0, 999.0, r1).unwrap_err();
        assert!(matches!(err, StoreError::StaleWrite { .. }));

        let snap = read_snapshot(&conn, 2024, r1).unwrap();
        assert_eq!(snap[0].value, 100.0, "revision {r1} must stay immutable");

        // a fresh allocation writes normally again
        edit_one(&conn, 2024, 0, 0, 300.0);
        assert_eq!(latest_snapshot(&conn, 2024).unwrap()[0].value, 300.0);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let conn = test_conn();
        let rev = revision::allocate_next(&conn, 2024).unwrap();

        assert!(matches!(
            write_cell(&conn, 2024, 0, 0, f64::NAN, rev),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            write_cell(&conn, 2024, 0, 0, f64::INFINITY, rev),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(read_snapshot(&conn, 2024, rev).unwrap().is_empty());
    }

    #[test]
    fn test_values_are_rounded_on_write() {
        let conn = test_conn();
        let rev = edit_one(&conn, 2024, 0, 0, 10.0 / 3.0);
        let snap = read_snapshot(&conn, 2024, rev).unwrap();
        assert_eq!(snap[0].value, 3.33);
    }

    #[test]
    fn test_undo_then_redo_restores_exact_snapshot() {
        let conn = test_conn();
        edit_one(&conn, 2024, 0, 0, 100.0);
        edit_one(&conn, 2024, 0, 1, 200.0);
        let before = latest_snapshot(&conn, 2024).unwrap();

        revision::undo(&conn, 2024).unwrap();
        let undone = latest_snapshot(&conn, 2024).unwrap();
        assert_eq!(undone.len(), 1, "undo must hide the second edit");

        revision::redo(&conn, 2024).unwrap();
        assert_eq!(latest_snapshot(&conn, 2024).unwrap(), before);
    }

    #[test]
    fn test_edit_after_undo_discards_redo_state() {
        let conn = test_conn();
        edit_one(&conn, 2024, 0, 0, 1.0); // rev 1
        edit_one(&conn, 2024, 0, 0, 2.0); // rev 2

        revision::undo(&conn, 2024).unwrap(); // back to rev 1
        edit_one(&conn, 2024, 0, 0, 3.0); // rev 3, rev 2 discarded

        // redo as far as possible must land on the new edit, not on 2.0
        let rev = revision::redo(&conn, 2024).unwrap();
        let snap = read_snapshot(&conn, 2024, rev).unwrap();
        assert_eq!(snap[0].value, 3.0);

        // even a raw high-revision read must not resurrect the stale 2.0
        let snap = read_snapshot(&conn, 2024, 999).unwrap();
        assert_eq!(snap[0].value, 3.0);
    }

    #[test]
    fn test_reset_year_clears_everything() {
        let conn = test_conn();
        edit_one(&conn, 2024, 0, 0, 100.0);
        edit_one(&conn, 2024, 1, 5, 50.0);
        crate::rows::upsert_row(&conn, 2024, 1, &Default::default()).unwrap();

        reset_year(&conn, 2024).unwrap();

        assert!(latest_snapshot(&conn, 2024).unwrap().is_empty());
        assert_eq!(revision::current(&conn, 2024).unwrap(), 0);
        assert!(crate::rows::row_meta_map(&conn, 2024).unwrap().is_empty());
    }

    #[test]
    fn test_reset_leaves_other_years_alone() {
        let conn = test_conn();
        edit_one(&conn, 2024, 0, 0, 100.0);
        edit_one(&conn, 2025, 0, 0, 700.0);

        reset_year(&conn, 2024).unwrap();

        let snap = latest_snapshot(&conn, 2025).unwrap();
        assert_eq!(snap[0].value, 700.0);
    }
}
