// Finance Suite - Derived year view
// Joins the cell snapshot at the current revision with the non-deleted row
// metadata. This is what the UI renders and what the carry-over calculation
// consumes; it is derived, never stored.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cells;
use crate::db::StoreResult;
use crate::revision;
use crate::rows::{self, resolve_classification, RowClassification};

pub const MONTHS: usize = 12;

/// One visible row of the grid with its twelve monthly values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowValues {
    pub row: i64,
    pub description: String,
    pub position: i64,
    pub classification: RowClassification,
    pub values: [f64; MONTHS],
}

/// The grid of a year at its current revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearView {
    pub year: i32,
    pub revision: i64,
    pub rows: Vec<RowValues>,
}

/// Assemble the view of `year` at its current revision.
///
/// Cells belonging to soft-deleted rows stay in the store but leave the view.
/// The canonical income row 0 is always materialized, zero-filled when it has
/// no cells yet. Rows are ordered by (position, row id); position gaps are
/// expected and tolerated.
pub fn year_view(conn: &Connection, year: i32) -> StoreResult<YearView> {
    let head = revision::current(conn, year)?;
    let snapshot = cells::read_snapshot(conn, year, head)?;
    let meta = rows::row_meta_map(conn, year)?;

    let mut by_row: BTreeMap<i64, [f64; MONTHS]> = BTreeMap::new();
    for cell in snapshot {
        if meta.get(&cell.row).map(|m| m.deleted).unwrap_or(false) {
            continue;
        }
        let values = by_row.entry(cell.row).or_insert([0.0; MONTHS]);
        values[cell.col as usize] = cell.value;
    }
    if !meta.get(&0).map(|m| m.deleted).unwrap_or(false) {
        by_row.entry(0).or_insert([0.0; MONTHS]);
    }

    let mut rows: Vec<RowValues> = by_row
        .into_iter()
        .map(|(row, values)| {
            let m = meta.get(&row);
            RowValues {
                row,
                description: m
                    .map(|m| m.description.clone())
                    .unwrap_or_else(|| if row == 0 { "Income".into() } else { format!("Item {row}") }),
                position: m.map(|m| m.position).unwrap_or(row),
                classification: resolve_classification(row, m),
                values,
            }
        })
        .collect();

    rows.sort_by_key(|r| (r.position, r.row));

    Ok(YearView {
        year,
        revision: head,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::write_cell;
    use crate::db::setup_database;
    use crate::rows::{soft_delete_row, upsert_row, RowMetaPatch};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn fill_row(conn: &Connection, year: i32, row: i64, value: f64) {
        let rev = revision::allocate_next(conn, year).unwrap();
        for col in 0..MONTHS as u8 {
            write_cell(conn, year, row, col, value, rev).unwrap();
        }
    }

    #[test]
    fn test_empty_year_still_shows_income_row() {
        let conn = test_conn();
        let view = year_view(&conn, 2024).unwrap();

        assert_eq!(view.revision, 0);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].row, 0);
        assert_eq!(view.rows[0].description, "Income");
        assert_eq!(view.rows[0].classification, RowClassification::Income);
        assert_eq!(view.rows[0].values, [0.0; MONTHS]);
    }

    #[test]
    fn test_rows_sorted_by_position_with_gaps() {
        let conn = test_conn();
        fill_row(&conn, 2024, 1, 10.0);
        fill_row(&conn, 2024, 2, 20.0);

        // positions with a gap, row 2 displayed before row 1
        upsert_row(&conn, 2024, 1, &RowMetaPatch { position: Some(50), ..Default::default() }).unwrap();
        upsert_row(&conn, 2024, 2, &RowMetaPatch { position: Some(5), ..Default::default() }).unwrap();

        let view = year_view(&conn, 2024).unwrap();
        let order: Vec<i64> = view.rows.iter().map(|r| r.row).collect();
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn test_deleted_rows_leave_the_view_but_not_the_store() {
        let conn = test_conn();
        fill_row(&conn, 2024, 1, 10.0);
        soft_delete_row(&conn, 2024, 1).unwrap();

        let view = year_view(&conn, 2024).unwrap();
        assert!(view.rows.iter().all(|r| r.row != 1));

        // cells are still readable at the revision they were written
        let head = revision::current(&conn, 2024).unwrap();
        let snap = cells::read_snapshot(&conn, 2024, head).unwrap();
        assert!(snap.iter().any(|c| c.row == 1));
    }

    #[test]
    fn test_view_follows_undo() {
        let conn = test_conn();
        fill_row(&conn, 2024, 0, 3000.0);
        fill_row(&conn, 2024, 1, 1000.0);

        revision::undo(&conn, 2024).unwrap();
        let view = year_view(&conn, 2024).unwrap();
        assert_eq!(view.rows.len(), 1, "row 1 was added by the undone edit");
        assert_eq!(view.rows[0].values[0], 3000.0);
    }
}
