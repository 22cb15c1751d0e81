// Finance Suite - Row Metadata Store
// Per-year row records: display position, label, soft-delete flag and the
// income/expense/irregular classification used by the leftover calculation.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::{StoreError, StoreResult};

/// How a row contributes to the running balance.
///
/// `Irregular` marks one-off expenses; it renders differently but weighs
/// exactly like `Expense` in the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowClassification {
    Income,
    Expense,
    Irregular,
}

impl RowClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowClassification::Income => "income",
            RowClassification::Expense => "expense",
            RowClassification::Irregular => "irregular",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(RowClassification::Income),
            "expense" => Some(RowClassification::Expense),
            "irregular" => Some(RowClassification::Irregular),
            _ => None,
        }
    }

    /// Counts against the balance (expense and irregular alike).
    pub fn is_outgoing(&self) -> bool {
        !matches!(self, RowClassification::Income)
    }
}

/// Stored metadata for one row of a year's grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    pub year: i32,
    pub row: i64,
    pub position: i64,
    pub description: String,
    pub deleted: bool,
    /// None = no explicit choice stored; resolved by the legacy default rule.
    pub classification: Option<RowClassification>,
}

/// Partial update for `upsert_row`; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowMetaPatch {
    pub position: Option<i64>,
    pub description: Option<String>,
    pub deleted: Option<bool>,
    pub classification: Option<RowClassification>,
}

/// Legacy default rule, preserved exactly for pre-existing data: rows without
/// an explicit classification are expenses, except row 0 which is the
/// canonical income row.
pub fn resolve_classification(row: i64, meta: Option<&RowMeta>) -> RowClassification {
    match meta.and_then(|m| m.classification) {
        Some(c) => c,
        None if row == 0 => RowClassification::Income,
        None => RowClassification::Expense,
    }
}

fn default_description(row: i64) -> String {
    if row == 0 {
        "Income".to_string()
    } else {
        format!("Item {row}")
    }
}

fn get_row(conn: &Connection, year: i32, row: i64) -> StoreResult<Option<RowMeta>> {
    conn.query_row(
        "SELECT position, description, deleted, classification
         FROM row_meta WHERE year = ?1 AND row = ?2",
        params![year, row],
        |r| {
            let classification: Option<String> = r.get(3)?;
            Ok(RowMeta {
                year,
                row,
                position: r.get(0)?,
                description: r.get(1)?,
                deleted: r.get::<_, i64>(2)? != 0,
                classification: classification.as_deref().and_then(RowClassification::parse),
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

fn put_row(conn: &Connection, meta: &RowMeta) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO row_meta (year, row, position, description, deleted, classification)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(year, row) DO UPDATE SET
            position = excluded.position,
            description = excluded.description,
            deleted = excluded.deleted,
            classification = excluded.classification",
        params![
            meta.year,
            meta.row,
            meta.position,
            meta.description,
            meta.deleted as i64,
            meta.classification.map(|c| c.as_str()),
        ],
    )?;
    Ok(())
}

/// Merge `patch` into the row's metadata, creating the record if absent.
/// Returns the metadata as stored afterwards.
pub fn upsert_row(
    conn: &Connection,
    year: i32,
    row: i64,
    patch: &RowMetaPatch,
) -> StoreResult<RowMeta> {
    let tx = conn.unchecked_transaction()?;

    let mut meta = get_row(&tx, year, row)?.unwrap_or_else(|| RowMeta {
        year,
        row,
        position: row,
        description: default_description(row),
        deleted: false,
        classification: None,
    });

    if let Some(position) = patch.position {
        meta.position = position;
    }
    if let Some(description) = &patch.description {
        meta.description = description.clone();
    }
    if let Some(deleted) = patch.deleted {
        meta.deleted = deleted;
    }
    if let Some(classification) = patch.classification {
        meta.classification = Some(classification);
    }

    put_row(&tx, &meta)?;
    tx.commit()?;
    Ok(meta)
}

/// Flag a row as deleted. Its cells stay in the store so that snapshots taken
/// at earlier revisions remain interpretable; positions of the other rows are
/// untouched (consumers sort, gaps are fine).
pub fn soft_delete_row(conn: &Connection, year: i32, row: i64) -> StoreResult<()> {
    upsert_row(
        conn,
        year,
        row,
        &RowMetaPatch {
            deleted: Some(true),
            ..Default::default()
        },
    )?;
    Ok(())
}

/// Apply a batch of (row, new_position) assignments atomically: either every
/// position updates or none does. A row without metadata fails the batch.
pub fn reorder_rows(conn: &Connection, year: i32, assignments: &[(i64, i64)]) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;

    for &(row, position) in assignments {
        let updated = tx.execute(
            "UPDATE row_meta SET position = ?3 WHERE year = ?1 AND row = ?2",
            params![year, row, position],
        )?;
        if updated == 0 {
            // dropping the transaction rolls the earlier updates back
            return Err(StoreError::UnknownRow { year, row });
        }
    }

    tx.commit()?;
    Ok(())
}

/// Effective classification of a row, stored value first, legacy default
/// otherwise.
pub fn classification_of(conn: &Connection, year: i32, row: i64) -> StoreResult<RowClassification> {
    let meta = get_row(conn, year, row)?;
    Ok(resolve_classification(row, meta.as_ref()))
}

/// All metadata records for a year, keyed by row id.
pub fn row_meta_map(conn: &Connection, year: i32) -> StoreResult<BTreeMap<i64, RowMeta>> {
    let mut stmt = conn.prepare(
        "SELECT row, position, description, deleted, classification
         FROM row_meta WHERE year = ?1",
    )?;

    let mut map = BTreeMap::new();
    let rows = stmt.query_map([year], |r| {
        let classification: Option<String> = r.get(4)?;
        Ok(RowMeta {
            year,
            row: r.get(0)?,
            position: r.get(1)?,
            description: r.get(2)?,
            deleted: r.get::<_, i64>(3)? != 0,
            classification: classification.as_deref().and_then(RowClassification::parse),
        })
    })?;
    for meta in rows {
        let meta = meta?;
        map.insert(meta.row, meta);
    }

    Ok(map)
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
    fn test_upsert_creates_with_defaults() {
        let conn = test_conn();
        let meta = upsert_row(&conn, 2024, 3, &Default::default()).unwrap();

        assert_eq!(meta.position, 3);
        assert_eq!(meta.description, "Item 3");
        assert!(!meta.deleted);
        assert!(meta.classification.is_none());

        let meta0 = upsert_row(&conn, 2024, 0, &Default::default()).unwrap();
        assert_eq!(meta0.description, "Income");
    }

    #[test]
    fn test_upsert_merges_only_given_fields() {
        let conn = test_conn();
        upsert_row(
            &conn,
            2024,
            1,
            &RowMetaPatch {
                description: Some("Rent".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let meta = upsert_row(
            &conn,
            2024,
            1,
            &RowMetaPatch {
                position: Some(7),
                ..Default::default()
            },
        )
        .unwrap();

        // the rename from the first call must survive the second
        assert_eq!(meta.description, "Rent");
        assert_eq!(meta.position, 7);
    }

    #[test]
    fn test_legacy_classification_defaults() {
        let conn = test_conn();

        // no metadata at all: row 0 is income, everything else expense
        assert_eq!(
            classification_of(&conn, 2024, 0).unwrap(),
            RowClassification::Income
        );
        assert_eq!(
            classification_of(&conn, 2024, 5).unwrap(),
            RowClassification::Expense
        );

        // metadata without an explicit classification keeps the defaults
        upsert_row(&conn, 2024, 0, &Default::default()).unwrap();
        upsert_row(&conn, 2024, 5, &Default::default()).unwrap();
        assert_eq!(
            classification_of(&conn, 2024, 0).unwrap(),
            RowClassification::Income
        );
        assert_eq!(
            classification_of(&conn, 2024, 5).unwrap(),
            RowClassification::Expense
        );

        // an explicit choice wins over the default
        upsert_row(
            &conn,
            2024,
            5,
            &RowMetaPatch {
                classification: Some(RowClassification::Income),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            classification_of(&conn, 2024, 5).unwrap(),
            RowClassification::Income
        );
    }

    #[test]
    fn test_soft_delete_keeps_positions_of_others() {
        let conn = test_conn();
        for row in 0..3 {
            upsert_row(&conn, 2024, row, &Default::default()).unwrap();
        }

        soft_delete_row(&conn, 2024, 1).unwrap();

        let map = row_meta_map(&conn, 2024).unwrap();
        assert!(map[&1].deleted);
        assert_eq!(map[&0].position, 0);
        assert_eq!(map[&2].position, 2);
    }

    #[test]
    fn test_reorder_is_atomic() {
        let conn = test_conn();
        upsert_row(&conn, 2024, 0, &Default::default()).unwrap();
        upsert_row(&conn, 2024, 1, &Default::default()).unwrap();

        // row 9 has no metadata: the whole batch must roll back
        let err = reorder_rows(&conn, 2024, &[(0, 1), (1, 0), (9, 2)]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownRow { row: 9, .. }));

        let map = row_meta_map(&conn, 2024).unwrap();
        assert_eq!(map[&0].position, 0, "partial reorder must not stick");
        assert_eq!(map[&1].position, 1);

        // a valid batch applies in full
        reorder_rows(&conn, 2024, &[(0, 1), (1, 0)]).unwrap();
        let map = row_meta_map(&conn, 2024).unwrap();
        assert_eq!(map[&0].position, 1);
        assert_eq!(map[&1].position, 0);
    }

    #[test]
    fn test_classification_serde_wire_format() {
        let json = serde_json::to_string(&RowClassification::Irregular).unwrap();
        assert_eq!(json, "\"irregular\"");
        let parsed: RowClassification = serde_json::from_str("\"income\"").unwrap();
        assert_eq!(parsed, RowClassification::Income);
    }
}
