// Finance Suite - Revision Manager
// Per-year monotonic revision counter with a linear undo/redo history.
//
// The history for a year is an ordered log of committed revision numbers plus
// a cursor. Undo and redo only move the cursor; a fresh edit appends
// `max_issued + 1` and discards whatever redo path lay beyond the cursor.
// Revision numbers are never reused, so an observer can always tell a fresh
// edit apart from a replayed one.

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy)]
struct Head {
    cursor: i64,
    max_issued: i64,
}

/// Read the head record for a year, creating history `[0]` on first contact.
fn ensure_head(conn: &Connection, year: i32) -> StoreResult<Head> {
    let head = conn
        .query_row(
            "SELECT cursor, max_issued FROM revision_head WHERE year = ?1",
            [year],
            |row| {
                Ok(Head {
                    cursor: row.get(0)?,
                    max_issued: row.get(1)?,
                })
            },
        )
        .optional()?;

    if let Some(head) = head {
        return Ok(head);
    }

    conn.execute(
        "INSERT INTO revision_head (year, cursor, max_issued) VALUES (?1, 0, 0)",
        [year],
    )?;
    conn.execute(
        "INSERT INTO revision_log (year, idx, revision) VALUES (?1, 0, 0)",
        [year],
    )?;

    Ok(Head {
        cursor: 0,
        max_issued: 0,
    })
}

fn revision_at(conn: &Connection, year: i32, idx: i64) -> StoreResult<i64> {
    conn.query_row(
        "SELECT revision FROM revision_log WHERE year = ?1 AND idx = ?2",
        params![year, idx],
        |row| row.get(0),
    )
    .map_err(StoreError::from)
}

fn history_len(conn: &Connection, year: i32) -> StoreResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM revision_log WHERE year = ?1",
        [year],
        |row| row.get(0),
    )
    .map_err(StoreError::from)
}

/// The revision currently pointed at for `year`.
///
/// A year with no history yet is initialized to revision 0.
pub fn current(conn: &Connection, year: i32) -> StoreResult<i64> {
    let (rev, _) = head_state(conn, year)?;
    Ok(rev)
}

/// The revision currently pointed at, paired with the highest revision ever
/// issued for `year`. The two differ exactly while the year sits in an undone
/// state; `allocate_next` always brings them back together.
pub(crate) fn head_state(conn: &Connection, year: i32) -> StoreResult<(i64, i64)> {
    let tx = conn.unchecked_transaction()?;
    let head = ensure_head(&tx, year)?;
    let rev = revision_at(&tx, year, head.cursor)?;
    tx.commit()?;
    Ok((rev, head.max_issued))
}

/// Allocate a fresh revision for `year` and make it the new head.
///
/// Must be called before any cell write belonging to the edit; every write of
/// one logical edit carries the revision returned here. Editing while not at
/// the end of history truncates the undone-but-not-overwritten future,
/// including the cells that were only reachable through it.
pub fn allocate_next(conn: &Connection, year: i32) -> StoreResult<i64> {
    let tx = conn.unchecked_transaction()?;
    let head = ensure_head(&tx, year)?;
    let head_rev = revision_at(&tx, year, head.cursor)?;

    // Drop the redo path beyond the cursor. Revisions along the log are
    // strictly increasing, so the discarded ones are exactly those > head_rev.
    tx.execute(
        "DELETE FROM revision_log WHERE year = ?1 AND idx > ?2",
        params![year, head.cursor],
    )?;
    tx.execute(
        "DELETE FROM finance_cell WHERE year = ?1 AND revision > ?2",
        params![year, head_rev],
    )?;

    let next = head.max_issued + 1;
    tx.execute(
        "INSERT INTO revision_log (year, idx, revision) VALUES (?1, ?2, ?3)",
        params![year, head.cursor + 1, next],
    )?;
    tx.execute(
        "UPDATE revision_head SET cursor = ?2, max_issued = ?3 WHERE year = ?1",
        params![year, head.cursor + 1, next],
    )?;

    tx.commit()?;
    Ok(next)
}

/// Move the cursor one history entry back. No-op at the earliest point.
pub fn undo(conn: &Connection, year: i32) -> StoreResult<i64> {
    let tx = conn.unchecked_transaction()?;
    let head = ensure_head(&tx, year)?;

    let cursor = (head.cursor - 1).max(0);
    if cursor != head.cursor {
        tx.execute(
            "UPDATE revision_head SET cursor = ?2 WHERE year = ?1",
            params![year, cursor],
        )?;
    }
    let rev = revision_at(&tx, year, cursor)?;
    tx.commit()?;
    Ok(rev)
}

/// Move the cursor one history entry forward. No-op at the latest point.
pub fn redo(conn: &Connection, year: i32) -> StoreResult<i64> {
    let tx = conn.unchecked_transaction()?;
    let head = ensure_head(&tx, year)?;
    let len = history_len(&tx, year)?;

    let cursor = (head.cursor + 1).min(len - 1);
    if cursor != head.cursor {
        tx.execute(
            "UPDATE revision_head SET cursor = ?2 WHERE year = ?1",
            params![year, cursor],
        )?;
    }
    let rev = revision_at(&tx, year, cursor)?;
    tx.commit()?;
    Ok(rev)
}
