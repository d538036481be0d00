//! Database operations for recurring transactions.

use rusqlite::{Connection, Row};
use time::Date;

use crate::{
    Error,
    category::get_category,
    database_id::UserId,
    recurring::{RecurringDefinition, RecurringForm, RecurringId, RecurringStatus},
};

const SELECT_COLUMNS: &str = "SELECT id, user_id, amount, category_id, recurrence, next_occurrence, status FROM recurring_transaction";
const RETURNING_COLUMNS: &str =
    "RETURNING id, user_id, amount, category_id, recurrence, next_occurrence, status";

/// Create an active recurring transaction for `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is not a positive number,
/// - [Error::InvalidCategory] if the category does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_recurring(
    user_id: UserId,
    form: &RecurringForm,
    connection: &Connection,
) -> Result<RecurringDefinition, Error> {
    form.validate()?;
    check_category_exists(form, connection)?;

    let recurring = connection
        .prepare(&format!(
            "INSERT INTO recurring_transaction (user_id, amount, category_id, recurrence, next_occurrence, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             {RETURNING_COLUMNS}"
        ))?
        .query_row(
            (
                user_id,
                form.amount,
                form.category_id,
                form.recurrence,
                form.next_occurrence,
                RecurringStatus::Active,
            ),
            map_row,
        )?;

    Ok(recurring)
}

/// Retrieve a recurring transaction by ID, regardless of its status.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `recurring_id` does not refer to a recurring transaction,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_recurring(
    recurring_id: RecurringId,
    connection: &Connection,
) -> Result<RecurringDefinition, Error> {
    connection
        .prepare(&format!("{SELECT_COLUMNS} WHERE id = :id"))?
        .query_row(&[(":id", &recurring_id)], map_row)
        .map_err(|error| error.into())
}

/// Retrieve the active recurring transactions of `user_id`.
pub fn get_active_recurring_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<RecurringDefinition>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE user_id = :user_id AND status = 'active' ORDER BY id ASC"
        ))?
        .query_map(&[(":user_id", &user_id)], map_row)?
        .map(|maybe_recurring| maybe_recurring.map_err(|error| error.into()))
        .collect()
}

/// Replace the amount, category, recurrence and next occurrence of an active
/// recurring transaction owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is not a positive number,
/// - [Error::InvalidCategory] if the category does not exist,
/// - [Error::UpdateMissingRecurring] if there is no active recurring transaction with this ID for this user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_recurring(
    recurring_id: RecurringId,
    user_id: UserId,
    form: &RecurringForm,
    connection: &Connection,
) -> Result<RecurringDefinition, Error> {
    form.validate()?;
    check_category_exists(form, connection)?;

    connection
        .prepare(&format!(
            "UPDATE recurring_transaction
             SET amount = ?1, category_id = ?2, recurrence = ?3, next_occurrence = ?4
             WHERE id = ?5 AND user_id = ?6 AND status = 'active'
             {RETURNING_COLUMNS}"
        ))?
        .query_row(
            (
                form.amount,
                form.category_id,
                form.recurrence,
                form.next_occurrence,
                recurring_id,
                user_id,
            ),
            map_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingRecurring,
            error => error.into(),
        })
}

/// Cancel an active recurring transaction owned by `user_id`.
///
/// Cancelled recurring transactions are kept in the database but are never
/// materialized again. Cancelling cannot be undone.
///
/// # Errors
/// This function will return a:
/// - [Error::CancelMissingRecurring] if there is no active recurring transaction with this ID for this user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn cancel_recurring(
    recurring_id: RecurringId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_transaction SET status = ?1
         WHERE id = ?2 AND user_id = ?3 AND status = 'active'",
        (RecurringStatus::Cancelled, recurring_id, user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::CancelMissingRecurring);
    }

    Ok(())
}

/// Retrieve the active recurring transactions that are due on or before `today`.
///
/// Rows are returned in ID order, but callers should not rely on the order.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is a SQL error.
pub fn select_due(today: Date, connection: &Connection) -> Result<Vec<RecurringDefinition>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE status = 'active' AND next_occurrence <= :today ORDER BY id ASC"
        ))?
        .query_map(&[(":today", &today)], map_row)?
        .map(|maybe_recurring| maybe_recurring.map_err(|error| error.into()))
        .collect()
}

/// Move the next occurrence of a recurring transaction from `fired` to `next`.
///
/// The update only happens if the next occurrence is still `fired`, so a
/// schedule that was edited or already advanced in the meantime is left alone.
/// Returns whether the schedule was advanced.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is a SQL error.
pub fn advance_next_occurrence(
    recurring_id: RecurringId,
    fired: Date,
    next: Date,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_transaction SET next_occurrence = ?1
         WHERE id = ?2 AND next_occurrence = ?3",
        (next, recurring_id, fired),
    )?;

    Ok(rows_affected == 1)
}

/// Initialize the recurring transaction table and indexes.
///
/// `category_id` has no foreign key constraint: deleting a
/// category must not delete or alter the recurring transactions using it.
pub fn create_recurring_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS recurring_transaction (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            amount REAL NOT NULL,
            category_id INTEGER NOT NULL,
            recurrence TEXT NOT NULL,
            next_occurrence TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'cancelled'))
        );

        CREATE INDEX IF NOT EXISTS idx_recurring_due ON recurring_transaction(status, next_occurrence);
        CREATE INDEX IF NOT EXISTS idx_recurring_user ON recurring_transaction(user_id);",
    )?;

    Ok(())
}

fn check_category_exists(form: &RecurringForm, connection: &Connection) -> Result<(), Error> {
    match get_category(form.category_id, connection) {
        Ok(_) => Ok(()),
        Err(Error::NotFound) => Err(Error::InvalidCategory(form.category_id)),
        Err(error) => Err(error),
    }
}

fn map_row(row: &Row) -> Result<RecurringDefinition, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let amount = row.get(2)?;
    let category_id = row.get(3)?;
    let recurrence = row.get(4)?;
    let next_occurrence = row.get(5)?;
    let status = row.get(6)?;

    Ok(RecurringDefinition {
        id,
        user_id,
        amount,
        category_id,
        recurrence,
        next_occurrence,
        status,
    })
}
