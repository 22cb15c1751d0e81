// Finance Suite - Carry-Over Calculator
// Pure running-balance computation plus the cross-year seeding that feeds one
// year's December leftover into the next year's January.

use rusqlite::Connection;

use crate::db::{round_money, StoreResult};
use crate::snapshot::{self, RowValues, MONTHS};

/// No prior data is expected before this year; seeding stops here.
pub const DEFAULT_EPOCH_YEAR: i32 = 2000;

/// Running monthly leftover for one year.
///
/// Entry `m` is `seed` plus income minus outgoings (expense and irregular
/// alike) accumulated over months `0..=m`. Each step is rounded to 2 decimal
/// places. Pure: same rows and seed always yield the same series.
pub fn monthly_leftover(rows: &[RowValues], seed: f64) -> [f64; MONTHS] {
    let mut out = [0.0; MONTHS];
    let mut running = seed;

    for month in 0..MONTHS {
        let mut delta = 0.0;
        for row in rows {
            if row.classification.is_outgoing() {
                delta -= row.values[month];
            } else {
                delta += row.values[month];
            }
        }
        running = round_money(running + delta);
        out[month] = running;
    }

    out
}

/// Seed for `year`: the December leftover of `year - 1`, which itself is
/// seeded recursively down to `epoch`. Years at or before `epoch` seed 0.
/// Computed iteratively, oldest year first, so each year is visited once.
pub fn carry_over_seed(conn: &Connection, year: i32, epoch: i32) -> StoreResult<f64> {
    let mut seed = 0.0;
    if year <= epoch {
        return Ok(seed);
    }

    for y in epoch..year {
        let view = snapshot::year_view(conn, y)?;
        seed = monthly_leftover(&view.rows, seed)[MONTHS - 1];
    }

    Ok(seed)
}

/// The full leftover series for `year`, seeded from the prior years.
pub fn leftover_series(conn: &Connection, year: i32, epoch: i32) -> StoreResult<[f64; MONTHS]> {
    let seed = carry_over_seed(conn, year, epoch)?;
    let view = snapshot::year_view(conn, year)?;
    Ok(monthly_leftover(&view.rows, seed))
}
