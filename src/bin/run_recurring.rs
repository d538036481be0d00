use std::{error::Error, process::exit};

use clap::Parser;
use rusqlite::Connection;
use time::OffsetDateTime;

use recurrent_rs::{get_local_offset, initialize_db, run_once, setup_stderr_logging};

/// Materialize the due recurring transactions once and print the report as JSON.
///
/// Exits with a non-zero status if the run could not start or any recurring
/// transaction failed. Skipped recurring transactions do not count as failures.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    setup_stderr_logging();

    let Some(local_offset) = get_local_offset(&args.timezone) else {
        eprintln!("Unknown timezone {:?}.", args.timezone);
        exit(1);
    };

    let connection = Connection::open(&args.db_path)?;
    initialize_db(&connection)?;

    let report = run_once(OffsetDateTime::now_utc(), local_offset, &connection);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        exit(1);
    }

    Ok(())
}
