//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// Database identifier for a transaction.
pub type TransactionId = DatabaseId;

/// Database identifier for a user.
///
/// Users are managed by the authentication layer, this crate only records who
/// owns a recurring transaction and the transactions created from it.
pub type UserId = DatabaseId;
