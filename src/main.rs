// Finance Suite - CLI
// Inspect and maintain the finance grid from the terminal. The editing UI
// lives in the web client; this binary covers inspection, undo/redo, the
// destructive year reset and CSV export.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use finance_suite::{
    leftover_series, open_database, recent_actions, redo, reset_year, undo, year_view,
    DEFAULT_EPOCH_YEAR, MONTHS,
};

const MONTH_NAMES: [&str; MONTHS] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn db_path() -> PathBuf {
    env::var("FINANCE_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("finance.db"))
}

fn usage() -> ! {
    eprintln!("Usage: finance-suite <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  show <year>              print the grid and leftover series");
    eprintln!("  undo <year>              step one revision back");
    eprintln!("  redo <year>              step one revision forward");
    eprintln!("  reset <year> --yes       delete EVERY entry for the year");
    eprintln!("  export <year> <out.csv>  write the grid as CSV");
    eprintln!("  log [n]                  show the last n actions (default 20)");
    eprintln!();
    eprintln!("Database path is taken from FINANCE_DB (default ./finance.db).");
    std::process::exit(2);
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let conn = open_database(db_path())?;

    match args[1].as_str() {
        "show" => {
            let year = parse_year(&args, 2)?;
            run_show(&conn, year)?;
        }
        "undo" => {
            let year = parse_year(&args, 2)?;
            let rev = undo(&conn, year)?;
            println!("✓ {year} is now at revision {rev}");
        }
        "redo" => {
            let year = parse_year(&args, 2)?;
            let rev = redo(&conn, year)?;
            println!("✓ {year} is now at revision {rev}");
        }
        "reset" => {
            let year = parse_year(&args, 2)?;
            // reset is irrecoverable; the core never prompts, so we do
            if !args.iter().any(|a| a == "--yes") {
                bail!("refusing to reset {year} without --yes");
            }
            reset_year(&conn, year)?;
            println!("✓ {year} wiped (cells, rows, history)");
        }
        "export" => {
            let year = parse_year(&args, 2)?;
            let out = args.get(3).map(PathBuf::from).unwrap_or_else(|| usage());
            run_export(&conn, year, &out)?;
        }
        "log" => {
            let limit = args
                .get(2)
                .map(|s| s.parse().context("log limit must be a number"))
                .transpose()?
                .unwrap_or(20);
            for entry in recent_actions(&conn, limit)? {
                println!("{}  {:<12} {}", entry.ts, entry.action, entry.info);
            }
        }
        _ => usage(),
    }

    Ok(())
}

fn parse_year(args: &[String], idx: usize) -> Result<i32> {
    let Some(raw) = args.get(idx) else { usage() };
    raw.parse().with_context(|| format!("not a year: {raw}"))
}

fn run_show(conn: &rusqlite::Connection, year: i32) -> Result<()> {
    let view = year_view(conn, year)?;
    let leftover = leftover_series(conn, year, DEFAULT_EPOCH_YEAR)?;

    println!("Year {year} (revision {})", view.revision);
    print!("{:<24}", "");
    for name in MONTH_NAMES {
        print!("{name:>10}");
    }
    println!();

    for row in &view.rows {
        let tag = match row.classification {
            finance_suite::RowClassification::Income => "+",
            finance_suite::RowClassification::Expense => "-",
            finance_suite::RowClassification::Irregular => "~",
        };
        print!("{tag} {:<22}", row.description);
        for value in row.values {
            print!("{value:>10.2}");
        }
        println!();
    }

    print!("= {:<22}", "Leftover");
    for value in leftover {
        print!("{value:>10.2}");
    }
    println!();

    Ok(())
}

fn run_export(conn: &rusqlite::Connection, year: i32, out: &Path) -> Result<()> {
    let view = year_view(conn, year)?;
    let leftover = leftover_series(conn, year, DEFAULT_EPOCH_YEAR)?;

    let mut wtr = csv::Writer::from_path(out).context("failed to open output file")?;

    let mut header = vec!["row".to_string(), "description".to_string(), "type".to_string()];
    header.extend(MONTH_NAMES.iter().map(|m| m.to_string()));
    wtr.write_record(&header)?;

    for row in &view.rows {
        let mut record = vec![
            row.row.to_string(),
            row.description.clone(),
            row.classification.as_str().to_string(),
        ];
        record.extend(row.values.iter().map(|v| format!("{v:.2}")));
        wtr.write_record(&record)?;
    }

    let mut record = vec![String::new(), "Leftover".to_string(), String::new()];
    record.extend(leftover.iter().map(|v| format!("{v:.2}")));
    wtr.write_record(&record)?;

    wtr.flush()?;
    println!("✓ Exported {} rows to {}", view.rows.len(), out.display());

    Ok(())
}
