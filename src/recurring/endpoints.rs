//! JSON endpoints for managing a user's recurring transactions and running the engine on demand.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    database_id::UserId,
    recurring::{
        BatchRunner, RecurringForm, RecurringId, cancel_recurring, create_recurring,
        get_active_recurring_for_user, update_recurring,
    },
};

/// The state needed for managing recurring transactions.
#[derive(Debug, Clone)]
pub struct RecurringEndpointState {
    /// The database connection for managing recurring transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RecurringEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

fn lock(state: &RecurringEndpointState) -> Result<MutexGuard<'_, Connection>, Error> {
    state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })
}

/// Handle creating a recurring transaction for a user.
///
/// Responds with 201 and the new recurring transaction.
pub async fn create_recurring_endpoint(
    State(state): State<RecurringEndpointState>,
    Path(user_id): Path<UserId>,
    Json(form): Json<RecurringForm>,
) -> Response {
    let connection = match lock(&state) {
        Ok(connection) => connection,
        Err(error) => return error.into_response(),
    };

    match create_recurring(user_id, &form, &connection) {
        Ok(recurring) => {
            tracing::info!(
                recurring_id = recurring.id,
                user_id,
                "created recurring transaction"
            );
            (StatusCode::CREATED, Json(recurring)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// Handle listing the active recurring transactions of a user.
pub async fn get_recurring_endpoint(
    State(state): State<RecurringEndpointState>,
    Path(user_id): Path<UserId>,
) -> Response {
    let connection = match lock(&state) {
        Ok(connection) => connection,
        Err(error) => return error.into_response(),
    };

    match get_active_recurring_for_user(user_id, &connection) {
        Ok(recurring) => Json(recurring).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Handle replacing the amount, category, recurrence and next occurrence of
/// an active recurring transaction.
pub async fn update_recurring_endpoint(
    State(state): State<RecurringEndpointState>,
    Path((user_id, recurring_id)): Path<(UserId, RecurringId)>,
    Json(form): Json<RecurringForm>,
) -> Response {
    let connection = match lock(&state) {
        Ok(connection) => connection,
        Err(error) => return error.into_response(),
    };

    match update_recurring(recurring_id, user_id, &form, &connection) {
        Ok(recurring) => Json(recurring).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Handle cancelling a recurring transaction. Responds with 204 on success.
///
/// Transactions already created from the recurring transaction are kept.
pub async fn cancel_recurring_endpoint(
    State(state): State<RecurringEndpointState>,
    Path((user_id, recurring_id)): Path<(UserId, RecurringId)>,
) -> Response {
    let connection = match lock(&state) {
        Ok(connection) => connection,
        Err(error) => return error.into_response(),
    };

    match cancel_recurring(recurring_id, user_id, &connection) {
        Ok(()) => {
            tracing::info!(recurring_id, user_id, "cancelled recurring transaction");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// The state needed for running the engine on demand.
#[derive(Debug, Clone)]
pub struct RunEndpointState {
    /// Runs passes through the same guard as the scheduler.
    pub runner: BatchRunner,
}

impl FromRef<AppState> for RunEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            runner: state.runner.clone(),
        }
    }
}

/// Handle a request to materialize the due recurring transactions now.
///
/// Responds with the run's report, or 409 if a run is already in progress.
pub async fn run_recurring_endpoint(State(state): State<RunEndpointState>) -> Response {
    match state.runner.run_now(OffsetDateTime::now_utc()).await {
        Some(report) => Json(report).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a recurring transaction run is already in progress" })),
        )
            .into_response(),
    }
}
