//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/users/{user_id}/recurring', use [format_endpoint].

/// The route to request a cup of coffee (experimental).
pub const COFFEE: &str = "/api/coffee";
/// The route to create and list categories.
pub const CATEGORIES: &str = "/api/categories";
/// The route to create and list a user's recurring transactions.
pub const USER_RECURRING: &str = "/api/users/{user_id}/recurring";
/// The route to update and cancel one of a user's recurring transactions.
pub const USER_RECURRING_ITEM: &str = "/api/users/{user_id}/recurring/{recurring_id}";
/// The route to materialize the due recurring transactions now.
pub const RUN_RECURRING: &str = "/api/recurring/run";

/// Replace the first parameter in `endpoint_path` with `id`.
///
/// Call repeatedly to fill in endpoints with more than one parameter.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_endpoint("/api/users/{user_id}/recurring", 1), "/api/users/1/recurring");
/// ```
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|end| param_start + end + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
