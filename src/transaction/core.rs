//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::CategoryId,
    database_id::{TransactionId, UserId},
    recurring::RecurringId,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money was spent or earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money was spent.
    Expense,
    /// Money was earned.
    Income,
}

impl TransactionType {
    /// The name used for the transaction type in the database and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            other => Err(format!("\"{other}\" is not a valid transaction type")),
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// Whether the money was spent or earned.
    pub transaction_type: TransactionType,
    /// A short, human readable name for the transaction.
    pub name: String,
    /// The ID of the category the transaction belongs to.
    ///
    /// `None` if the category has since been deleted.
    pub category_id: Option<CategoryId>,
    /// The amount of money spent or earned in this transaction.
    pub amount: f64,
    /// When the transaction happened.
    pub date: Date,
    /// Whether the transaction was created from a recurring transaction.
    pub recurring: bool,
    /// The recurring transaction this transaction was created from.
    pub recurring_id: Option<RecurringId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(user_id: UserId, amount: f64, date: Date, name: &str) -> TransactionBuilder {
        TransactionBuilder {
            user_id,
            transaction_type: TransactionType::Expense,
            name: name.to_owned(),
            category_id: None,
            amount,
            date,
            recurring_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// # Examples
///
/// ```ignore
/// use time::macros::date;
///
/// use crate::transaction::{Transaction, TransactionType};
///
/// let builder = Transaction::build(1, 25.0, date!(2024 - 06 - 01), "Phone (Recurring)")
///     .transaction_type(TransactionType::Expense)
///     .category_id(Some(3))
///     .recurring_id(Some(7));
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The user that owns the transaction.
    pub user_id: UserId,

    /// Whether the money was spent or earned. Defaults to an expense.
    pub transaction_type: TransactionType,

    /// A human-readable name for the transaction.
    ///
    /// Transactions created from a recurring transaction are named after
    /// their category, e.g. `"Rent (Recurring)"`.
    pub name: String,

    /// The category of the transaction, e.g. "Groceries", "Transport", "Rent".
    pub category_id: Option<CategoryId>,

    /// The amount of money spent or earned.
    pub amount: f64,

    /// The date when the transaction occurred.
    pub date: Date,

    /// The recurring transaction that this transaction is an occurrence of.
    ///
    /// Together with `date` this forms the idempotency key of a materialized
    /// occurrence: the database rejects a second transaction for the same
    /// recurring transaction and date.
    pub recurring_id: Option<RecurringId>,
}

impl TransactionBuilder {
    /// Set whether the transaction is an expense or income.
    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Set the category id for the transaction.
    pub fn category_id(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Mark the transaction as an occurrence of a recurring transaction.
    pub fn recurring_id(mut self, recurring_id: Option<RecurringId>) -> Self {
        self.recurring_id = recurring_id;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const SELECT_COLUMNS: &str = "SELECT id, user_id, transaction_type, name, category_id, amount, date, recurring, recurring_id FROM \"transaction\"";

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidForeignKey] if the category or recurring transaction does not exist,
/// - or [Error::DuplicateOccurrence] if a transaction already exists for the same recurring transaction and date,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (user_id, transaction_type, name, category_id, amount, date, recurring, recurring_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id, user_id, transaction_type, name, category_id, amount, date, recurring, recurring_id",
        )?
        .query_row(
            (
                builder.user_id,
                builder.transaction_type,
                &builder.name,
                builder.category_id,
                builder.amount,
                builder.date,
                builder.recurring_id.is_some(),
                builder.recurring_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match (error, builder.recurring_id) {
            (
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: _,
                        extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                    },
                    _,
                ),
                Some(recurring_id),
            ) => Error::DuplicateOccurrence(recurring_id, builder.date),
            (error, _) => error.into(),
        })?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!("{SELECT_COLUMNS} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Retrieve the transaction materialized for `recurring_id` on `date`, if there is one.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is a SQL error.
pub fn get_transaction_for_occurrence(
    recurring_id: RecurringId,
    date: Date,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    let transaction = connection
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE recurring_id = ?1 AND date = ?2"
        ))?
        .query_row((recurring_id, date), map_transaction_row)
        .optional()?;

    Ok(transaction)
}

/// Retrieve all transactions created from `recurring_id`, oldest first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is a SQL error.
pub fn get_transactions_for_recurring(
    recurring_id: RecurringId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE recurring_id = :recurring_id ORDER BY date ASC"
        ))?
        .query_map(&[(":recurring_id", &recurring_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                transaction_type TEXT NOT NULL CHECK (transaction_type IN ('expense', 'income')),
                name TEXT NOT NULL,
                category_id INTEGER,
                amount REAL NOT NULL,
                date TEXT NOT NULL,
                recurring INTEGER NOT NULL DEFAULT 0,
                recurring_id INTEGER,
                FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL,
                FOREIGN KEY(recurring_id) REFERENCES recurring_transaction(id) ON UPDATE CASCADE ON DELETE SET NULL
                )",
        (),
    )?;

    // One transaction per occurrence of a recurring transaction.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_occurrence ON \"transaction\"(recurring_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let transaction_type = row.get(2)?;
    let name = row.get(3)?;
    let category_id = row.get(4)?;
    let amount = row.get(5)?;
    let date = row.get(6)?;
    let recurring = row.get(7)?;
    let recurring_id = row.get(8)?;

    Ok(Transaction {
        id,
        user_id,
        transaction_type,
        name,
        category_id,
        amount,
        date,
        recurring,
        recurring_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================
