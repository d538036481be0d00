//! Recurrent is the recurring transaction engine of a personal finance tracker.
//!
//! Users define recurring transactions (rent, subscriptions, phone bills) with
//! an amount, a category and a repeat interval. This library periodically
//! materializes the definitions that are due into regular transactions and
//! advances their schedules, and serves a small JSON API for managing the
//! definitions.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use time::Date;
use tokio::signal;

mod app_state;
mod category;
mod database_id;
mod db;
mod endpoints;
mod logging;
mod recurring;
mod routing;
mod timezone;
mod transaction;

pub use app_state::AppState;
pub use category::{
    Category, CategoryId, CategoryName, create_category, delete_category, get_all_categories,
    get_category,
};
pub use database_id::{DatabaseId, TransactionId, UserId};
pub use db::initialize as initialize_db;
pub use logging::{setup_logging, setup_stderr_logging};
pub use recurring::{
    BatchReport, BatchRunner, Fired, MaterializationError, Materialized, Recurrence,
    RecurringDefinition, RecurringForm, RecurringId, RecurringStatus, RunGuard, RunPermit,
    Scheduler, SkipReason, Stored, cancel_recurring, create_recurring, fire,
    get_active_recurring_for_user, get_recurring, run_once, select_due, update_recurring,
};
pub use routing::build_router;
pub use timezone::get_local_offset;
pub use transaction::{
    Transaction, TransactionBuilder, TransactionType, create_transaction, get_transaction,
    get_transactions_for_recurring,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A recurrence kind outside of daily, weekly, bi-weekly and monthly.
    ///
    /// Definitions are validated when they are created, so this should only
    /// happen if the database was edited by hand.
    #[error("\"{0}\" is not a valid recurrence, expected one of daily, weekly, bi-weekly or monthly")]
    InvalidRecurrenceKind(String),

    /// Advancing a schedule from the given date would leave the range of
    /// representable dates.
    #[error("the next occurrence after {0} is out of range")]
    DateOutOfRange(Date),

    /// Recurring amounts must be positive, finite numbers.
    #[error("{0} is not a valid amount, amounts must be greater than zero")]
    InvalidAmount(f64),

    /// The category ID used for a recurring transaction did not match a valid category.
    #[error("the category ID {0} does not refer to a valid category")]
    InvalidCategory(CategoryId),

    /// An empty string was used to create a category name.
    #[error("Category name cannot be empty")]
    EmptyCategoryName,

    /// A transaction has already been materialized for this occurrence of a
    /// recurring transaction.
    #[error("recurring transaction {0} has already been materialized for {1}")]
    DuplicateOccurrence(RecurringId, Date),

    /// A row referenced another row that does not exist.
    #[error("a referenced row does not exist")]
    InvalidForeignKey,

    /// The schedule of a recurring transaction changed while it was being
    /// materialized, so the firing was rolled back.
    #[error("the schedule of recurring transaction {0} changed during materialization")]
    ScheduleChanged(RecurringId),

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a recurring transaction that does not exist or has been cancelled.
    #[error("tried to update a recurring transaction that is not active")]
    UpdateMissingRecurring,

    /// Tried to cancel a recurring transaction that does not exist or has already been cancelled.
    #[error("tried to cancel a recurring transaction that is not active")]
    CancelMissingRecurring,

    /// Tried to delete a category that does not exist.
    #[error("tried to delete a category that is not in the database")]
    DeleteMissingCategory,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::InvalidForeignKey,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::NotFound | Error::UpdateMissingRecurring | Error::CancelMissingRecurring => {
                StatusCode::NOT_FOUND
            }
            Error::DeleteMissingCategory => StatusCode::NOT_FOUND,
            Error::InvalidRecurrenceKind(_)
            | Error::InvalidAmount(_)
            | Error::InvalidCategory(_)
            | Error::EmptyCategoryName
            | Error::InvalidForeignKey => StatusCode::BAD_REQUEST,
            Error::DuplicateOccurrence(_, _) | Error::ScheduleChanged(_) => StatusCode::CONFLICT,
            Error::DateOutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // Any errors that are not handled above are not intended to be shown to the client.
            ref error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred, check the server logs for more details."
                    })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
