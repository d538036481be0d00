use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use recurrent_rs::{
    CategoryName, Recurrence, RecurringForm, create_category, create_recurring, delete_category,
    initialize_db,
};

/// A utility for creating a test database for the REST API server of recurrent_rs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        Some(extension) if !extension.is_empty() => {}
        _ => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating categories...");
    let rent = create_category(CategoryName::new("Rent")?, &conn)?;
    let phone = create_category(CategoryName::new("Phone")?, &conn)?;
    let groceries = create_category(CategoryName::new("Groceries")?, &conn)?;
    let gym = create_category(CategoryName::new("Gym")?, &conn)?;

    println!("Creating recurring transactions for user 1...");
    let today = OffsetDateTime::now_utc().date();
    let definitions = [
        (450.0, rent.id, Recurrence::Weekly, today),
        (30.0, phone.id, Recurrence::Monthly, today - Duration::days(40)),
        (120.0, groceries.id, Recurrence::BiWeekly, today + Duration::days(3)),
        (5.5, groceries.id, Recurrence::Daily, today - Duration::days(2)),
        (60.0, gym.id, Recurrence::Monthly, today),
    ];

    for (amount, category_id, recurrence, next_occurrence) in definitions {
        let form = RecurringForm {
            amount,
            category_id,
            recurrence,
            next_occurrence,
        };
        create_recurring(1, &form, &conn)?;
    }

    // Leaves the gym membership pointing at a deleted category so that runs show a skipped item.
    delete_category(gym.id, &conn)?;

    println!("Success!");

    Ok(())
}
