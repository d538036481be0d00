//! Application router configuration.

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use crate::{
    AppState,
    category::{create_category_endpoint, get_categories_endpoint},
    endpoints,
    recurring::{
        cancel_recurring_endpoint, create_recurring_endpoint, get_recurring_endpoint,
        run_recurring_endpoint, update_recurring_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::COFFEE, get(get_coffee))
        .route(
            endpoints::CATEGORIES,
            post(create_category_endpoint).get(get_categories_endpoint),
        )
        .route(
            endpoints::USER_RECURRING,
            post(create_recurring_endpoint).get(get_recurring_endpoint),
        )
        .route(
            endpoints::USER_RECURRING_ITEM,
            put(update_recurring_endpoint).delete(cancel_recurring_endpoint),
        )
        .route(endpoints::RUN_RECURRING, post(run_recurring_endpoint))
        .with_state(state)
}

/// Attempt to get a cup of coffee from the server.
async fn get_coffee() -> Response {
    (StatusCode::IM_A_TEAPOT, "I'm a teapot").into_response()
}

#[cfg(test)]
mod router_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;
    use time::OffsetDateTime;

    use crate::{
        AppState,
        category::Category,
        endpoints::{self, format_endpoint},
        recurring::{BatchReport, RecurringDefinition, Stored},
        transaction::get_transactions_for_recurring,
    };

    use super::build_router;

    fn get_test_server() -> (TestServer, AppState) {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        let state = AppState::new(connection, "Etc/UTC").expect("Could not create app state");
        let server =
            TestServer::try_new(build_router(state.clone())).expect("Could not create test server.");

        (server, state)
    }

    #[tokio::test]
    async fn coffee_is_a_teapot() {
        let (server, _) = get_test_server();

        server
            .get(endpoints::COFFEE)
            .await
            .assert_status(StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn recurring_transaction_lifecycle() {
        let (server, state) = get_test_server();
        let today = OffsetDateTime::now_utc().date();

        let category: Category = server
            .post(endpoints::CATEGORIES)
            .json(&json!({ "name": "Rent" }))
            .await
            .json();

        let recurring_path = format_endpoint(endpoints::USER_RECURRING, 1);
        let response = server
            .post(&recurring_path)
            .json(&json!({
                "amount": 450.0,
                "category_id": category.id,
                "recurrence": "weekly",
                "next_occurrence": today.to_string(),
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let recurring: RecurringDefinition = response.json();

        let listed: Vec<RecurringDefinition> = server.get(&recurring_path).await.json();
        assert_eq!(listed, vec![recurring.clone()]);

        let report: BatchReport = server.post(endpoints::RUN_RECURRING).await.json();
        assert_eq!(report.succeeded.len(), 1);
        let transactions =
            get_transactions_for_recurring(recurring.id, &state.db_connection.lock().unwrap())
                .unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].name, "Rent (Recurring)");
        assert_eq!(transactions[0].date, today);

        let item_path = format_endpoint(
            &format_endpoint(endpoints::USER_RECURRING_ITEM, 1),
            recurring.id,
        );
        let updated: RecurringDefinition = server
            .put(&item_path)
            .json(&json!({
                "amount": 475.0,
                "category_id": category.id,
                "recurrence": "bi-weekly",
                "next_occurrence": today.to_string(),
            }))
            .await
            .json();
        assert_eq!(updated.amount, Stored::Valid(475.0));
        assert_eq!(
            updated.recurrence,
            Stored::Valid(crate::recurring::Recurrence::BiWeekly)
        );

        server
            .delete(&item_path)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let listed: Vec<RecurringDefinition> = server.get(&recurring_path).await.json();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn unknown_recurrence_kind_is_rejected() {
        let (server, _) = get_test_server();
        let category: Category = server
            .post(endpoints::CATEGORIES)
            .json(&json!({ "name": "Rent" }))
            .await
            .json();

        let response = server
            .post(&format_endpoint(endpoints::USER_RECURRING, 1))
            .json(&json!({
                "amount": 450.0,
                "category_id": category.id,
                "recurrence": "yearly",
                "next_occurrence": "2024-06-01",
            }))
            .expect_failure()
            .await;

        assert!(response.status_code().is_client_error());
    }

    #[tokio::test]
    async fn cancelling_missing_recurring_returns_not_found() {
        let (server, _) = get_test_server();
        let item_path = format_endpoint(&format_endpoint(endpoints::USER_RECURRING_ITEM, 1), 99);

        server
            .delete(&item_path)
            .expect_failure()
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
