// Finance Suite - Core Library
// Year-partitioned finance grid: cell store with linear undo/redo, row
// metadata, carry-over calculation and the payroll/tariff estimators.
// Exposed for use in the CLI, the API server and tests.

pub mod carryover;
pub mod cells;
pub mod coordinator;
pub mod db;
pub mod payroll;
pub mod revision;
pub mod rows;
pub mod snapshot;
pub mod tarif;

// Re-export commonly used types
pub use carryover::{carry_over_seed, leftover_series, monthly_leftover, DEFAULT_EPOCH_YEAR};
pub use cells::{latest_snapshot, read_snapshot, reset_year, write_cell, CellRecord};
pub use coordinator::{commit_edit, fill_row, CellEdit, Debouncer};
pub use db::{
    log_action, open_database, recent_actions, round_money, setup_database, ActionEntry,
    StoreError, StoreResult,
};
pub use payroll::{gross_to_net, net_to_gross, PayrollInput, PayrollResult};
pub use revision::{allocate_next, current, redo, undo};
pub use rows::{
    classification_of, reorder_rows, row_meta_map, soft_delete_row, upsert_row,
    RowClassification, RowMeta, RowMetaPatch,
};
pub use snapshot::{year_view, RowValues, YearView, MONTHS};
pub use tarif::{berechne_nrw_2025, monthly_breakdown, MonthlyBreakdown, TarifInput, TarifResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
