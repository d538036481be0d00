//! Turns one due recurring transaction into a regular transaction.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::{Category, CategoryId, get_category},
    recurring::{RecurringDefinition, Stored, advance_next_occurrence},
    transaction::{
        Transaction, TransactionType, create_transaction, get_transaction_for_occurrence,
    },
};

/// Why a due recurring transaction was not materialized.
///
/// Skipped recurring transactions keep their schedule, so they are retried on
/// the next run once the data is fixed.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum SkipReason {
    /// The stored next occurrence is not a valid calendar date.
    #[error("\"{0}\" is not a valid occurrence date")]
    InvalidOccurrenceDate(String),
    /// The stored amount is not a positive number.
    #[error("\"{0}\" is not a valid amount")]
    InvalidAmount(String),
    /// The stored owner is not a valid user ID.
    #[error("\"{0}\" is not a valid user reference")]
    InvalidUserReference(String),
    /// The stored category reference is not a valid category ID.
    #[error("\"{0}\" is not a valid category reference")]
    InvalidCategoryReference(String),
    /// The category has been deleted.
    #[error("category {0} does not exist")]
    CategoryNotFound(CategoryId),
}

impl SkipReason {
    /// A short, stable name for the reason, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::InvalidOccurrenceDate(_) => "invalid_occurrence_date",
            SkipReason::InvalidAmount(_) => "invalid_amount",
            SkipReason::InvalidUserReference(_) => "invalid_user_reference",
            SkipReason::InvalidCategoryReference(_) => "invalid_category_reference",
            SkipReason::CategoryNotFound(_) => "category_not_found",
        }
    }
}

/// The ways materializing a recurring transaction can go wrong.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MaterializationError {
    /// The recurring transaction has bad data and was left as-is.
    #[error("skipped: {0}")]
    Skipped(SkipReason),
    /// An unexpected error, nothing was written.
    #[error(transparent)]
    Failed(#[from] Error),
}

impl From<SkipReason> for MaterializationError {
    fn from(reason: SkipReason) -> Self {
        MaterializationError::Skipped(reason)
    }
}

/// The result of firing a recurring transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    /// The transaction for the fired occurrence.
    pub transaction: Transaction,
    /// The category the transaction was created in.
    pub category: Category,
    /// The new next occurrence of the recurring transaction.
    pub next_occurrence: Date,
}

/// Create the transaction for the next occurrence of `definition` and advance
/// its schedule by one period.
///
/// Everything that can be checked up front is checked before anything is
/// written. The transaction and the schedule update are then written in one
/// SQLite transaction. If a transaction already exists for this occurrence,
/// e.g. after a crash between the two writes, it is reused instead of
/// creating a duplicate.
///
/// # Errors
/// Returns [MaterializationError::Skipped] if the occurrence date, amount,
/// owner or category is invalid, or [MaterializationError::Failed] with:
/// - [Error::InvalidRecurrenceKind] if the stored recurrence is unknown,
/// - [Error::DateOutOfRange] if the next occurrence cannot be represented,
/// - [Error::ScheduleChanged] if the schedule was changed by someone else in the meantime,
/// - or [Error::SqlError] if there is a SQL error.
pub fn fire(
    definition: &RecurringDefinition,
    connection: &Connection,
) -> Result<Materialized, MaterializationError> {
    let occurrence = match &definition.next_occurrence {
        Stored::Valid(date) => *date,
        Stored::Invalid(raw) => return Err(SkipReason::InvalidOccurrenceDate(raw.clone()).into()),
    };

    let amount = match &definition.amount {
        Stored::Valid(amount) if amount.is_finite() && *amount > 0.0 => *amount,
        Stored::Valid(amount) => return Err(SkipReason::InvalidAmount(amount.to_string()).into()),
        Stored::Invalid(raw) => return Err(SkipReason::InvalidAmount(raw.clone()).into()),
    };

    let user_id = match &definition.user_id {
        Stored::Valid(id) => *id,
        Stored::Invalid(raw) => return Err(SkipReason::InvalidUserReference(raw.clone()).into()),
    };

    let category_id = match &definition.category_id {
        Stored::Valid(id) if *id > 0 => *id,
        Stored::Valid(id) => return Err(SkipReason::InvalidCategoryReference(id.to_string()).into()),
        Stored::Invalid(raw) => {
            return Err(SkipReason::InvalidCategoryReference(raw.clone()).into());
        }
    };

    let category = match get_category(category_id, connection) {
        Ok(category) => category,
        Err(Error::NotFound) => return Err(SkipReason::CategoryNotFound(category_id).into()),
        Err(error) => return Err(error.into()),
    };

    let recurrence = match &definition.recurrence {
        Stored::Valid(recurrence) => *recurrence,
        Stored::Invalid(raw) => return Err(Error::InvalidRecurrenceKind(raw.clone()).into()),
    };
    let next_occurrence = recurrence.advance(occurrence)?;

    let unit_of_work = connection.unchecked_transaction().map_err(Error::from)?;

    let transaction = match get_transaction_for_occurrence(definition.id, occurrence, &unit_of_work)? {
        Some(existing) => {
            tracing::warn!(
                recurring_id = definition.id,
                transaction_id = existing.id,
                "reusing the transaction already created for {occurrence}"
            );
            existing
        }
        None => {
            let builder = Transaction::build(
                user_id,
                amount,
                occurrence,
                &format!("{} (Recurring)", category.name),
            )
            .transaction_type(TransactionType::Expense)
            .category_id(Some(category.id))
            .recurring_id(Some(definition.id));

            create_transaction(builder, &unit_of_work)?
        }
    };

    if !advance_next_occurrence(definition.id, occurrence, next_occurrence, &unit_of_work)? {
        // Dropping the unit of work rolls back the transaction created above.
        return Err(Error::ScheduleChanged(definition.id).into());
    }

    unit_of_work.commit().map_err(Error::from)?;

    Ok(Materialized {
        transaction,
        category,
        next_occurrence,
    })
}

#[cfg(test)]
mod fire_tests {
    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        Error,
        category::{Category, CategoryName, create_category, delete_category},
        db::initialize,
        recurring::{
            MaterializationError, Recurrence, RecurringDefinition, RecurringForm, RecurringId,
            SkipReason, Stored, create_recurring, fire, get_recurring, update_recurring,
        },
        transaction::{
            Transaction, TransactionType, count_transactions, create_transaction,
            get_transactions_for_recurring,
        },
    };

    fn get_test_connection() -> (Connection, Category) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let category = create_category(CategoryName::new_unchecked("Phone"), &connection)
            .expect("Could not create test category");
        (connection, category)
    }

    fn create_definition(
        connection: &Connection,
        category: &Category,
        recurrence: Recurrence,
        next_occurrence: Date,
    ) -> RecurringDefinition {
        let form = RecurringForm {
            amount: 25.0,
            category_id: category.id,
            recurrence,
            next_occurrence,
        };
        create_recurring(3, &form, connection).expect("Could not create recurring transaction")
    }

    fn insert_raw(
        connection: &Connection,
        category_id: &str,
        recurrence: &str,
        next_occurrence: &str,
    ) -> RecurringDefinition {
        connection
            .execute(
                "INSERT INTO recurring_transaction (user_id, amount, category_id, recurrence, next_occurrence)
                 VALUES (3, 25.0, ?1, ?2, ?3)",
                (category_id, recurrence, next_occurrence),
            )
            .unwrap();
        get_recurring(connection.last_insert_rowid(), connection).unwrap()
    }

    fn insert_with_owner_and_amount(
        connection: &Connection,
        category: &Category,
        user_id: &str,
        amount: &str,
    ) -> RecurringDefinition {
        connection
            .execute(
                "INSERT INTO recurring_transaction (user_id, amount, category_id, recurrence, next_occurrence)
                 VALUES (?1, ?2, ?3, 'daily', '2024-06-01')",
                (user_id, amount, category.id),
            )
            .unwrap();
        get_recurring(connection.last_insert_rowid(), connection).unwrap()
    }

    fn next_occurrence(id: RecurringId, connection: &Connection) -> Stored<Date> {
        get_recurring(id, connection).unwrap().next_occurrence
    }

    #[test]
    fn fire_creates_transaction_and_advances_schedule() {
        let (connection, category) = get_test_connection();
        let definition =
            create_definition(&connection, &category, Recurrence::Monthly, date!(2024 - 01 - 31));

        let materialized = fire(&definition, &connection).expect("Could not fire");

        let transaction = materialized.transaction;
        assert_eq!(transaction.user_id, 3);
        assert_eq!(transaction.transaction_type, TransactionType::Expense);
        assert_eq!(transaction.name, "Phone (Recurring)");
        assert_eq!(transaction.category_id, Some(category.id));
        assert_eq!(transaction.amount, 25.0);
        assert_eq!(transaction.date, date!(2024 - 01 - 31));
        assert!(transaction.recurring);
        assert_eq!(transaction.recurring_id, Some(definition.id));
        assert_eq!(materialized.category, category);
        assert_eq!(materialized.next_occurrence, date!(2024 - 03 - 02));
        assert_eq!(
            next_occurrence(definition.id, &connection),
            Stored::Valid(date!(2024 - 03 - 02))
        );
    }

    #[test]
    fn fire_skips_deleted_category_without_writing() {
        let (connection, category) = get_test_connection();
        let definition =
            create_definition(&connection, &category, Recurrence::Daily, date!(2024 - 06 - 01));
        delete_category(category.id, &connection).unwrap();

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Skipped(SkipReason::CategoryNotFound(
                category.id
            )))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
        assert_eq!(
            next_occurrence(definition.id, &connection),
            Stored::Valid(date!(2024 - 06 - 01))
        );
    }

    #[test]
    fn fire_skips_invalid_occurrence_date() {
        let (connection, category) = get_test_connection();
        let definition = insert_raw(&connection, &category.id.to_string(), "daily", "2024-02-30");

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Skipped(
                SkipReason::InvalidOccurrenceDate("2024-02-30".to_owned())
            ))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn fire_skips_malformed_category_reference() {
        let (connection, _) = get_test_connection();
        let definition = insert_raw(&connection, "abc", "daily", "2024-06-01");

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Skipped(
                SkipReason::InvalidCategoryReference("abc".to_owned())
            ))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn fire_skips_non_positive_amount_without_writing() {
        let (connection, category) = get_test_connection();
        let zero = insert_with_owner_and_amount(&connection, &category, "3", "0");
        let negative = insert_with_owner_and_amount(&connection, &category, "3", "-5");

        let zero_result = fire(&zero, &connection);
        let negative_result = fire(&negative, &connection);

        assert_eq!(
            zero_result,
            Err(MaterializationError::Skipped(SkipReason::InvalidAmount(
                "0".to_owned()
            )))
        );
        assert_eq!(
            negative_result,
            Err(MaterializationError::Skipped(SkipReason::InvalidAmount(
                "-5".to_owned()
            )))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
        assert_eq!(
            next_occurrence(negative.id, &connection),
            Stored::Valid(date!(2024 - 06 - 01))
        );
    }

    #[test]
    fn fire_skips_non_numeric_amount() {
        let (connection, category) = get_test_connection();
        let definition = insert_with_owner_and_amount(&connection, &category, "3", "ten");

        let result = fire(&definition, &connection);

        assert_eq!(definition.amount, Stored::Invalid("ten".to_owned()));
        assert_eq!(
            result,
            Err(MaterializationError::Skipped(SkipReason::InvalidAmount(
                "ten".to_owned()
            )))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn fire_skips_malformed_owner() {
        let (connection, category) = get_test_connection();
        let definition = insert_with_owner_and_amount(&connection, &category, "somebody", "25");

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Skipped(
                SkipReason::InvalidUserReference("somebody".to_owned())
            ))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn fire_skips_non_positive_category_reference() {
        let (connection, _) = get_test_connection();
        let definition = insert_raw(&connection, "0", "daily", "2024-06-01");

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Skipped(
                SkipReason::InvalidCategoryReference("0".to_owned())
            ))
        );
    }

    #[test]
    fn fire_fails_on_unknown_recurrence_without_writing() {
        let (connection, category) = get_test_connection();
        let definition = insert_raw(&connection, &category.id.to_string(), "yearly", "2024-06-01");

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Failed(Error::InvalidRecurrenceKind(
                "yearly".to_owned()
            )))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
        assert_eq!(
            next_occurrence(definition.id, &connection),
            Stored::Valid(date!(2024 - 06 - 01))
        );
    }

    #[test]
    fn fire_fails_when_next_occurrence_out_of_range() {
        let (connection, category) = get_test_connection();
        let definition =
            create_definition(&connection, &category, Recurrence::Daily, Date::MAX);

        let result = fire(&definition, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Failed(Error::DateOutOfRange(Date::MAX)))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn fire_reuses_transaction_left_by_interrupted_run() {
        let (connection, category) = get_test_connection();
        let definition =
            create_definition(&connection, &category, Recurrence::Weekly, date!(2024 - 06 - 01));
        let existing = create_transaction(
            Transaction::build(3, 25.0, date!(2024 - 06 - 01), "Phone (Recurring)")
                .category_id(Some(category.id))
                .recurring_id(Some(definition.id)),
            &connection,
        )
        .unwrap();

        let materialized = fire(&definition, &connection).expect("Could not fire");

        assert_eq!(materialized.transaction, existing);
        assert_eq!(
            get_transactions_for_recurring(definition.id, &connection),
            Ok(vec![existing])
        );
        assert_eq!(
            next_occurrence(definition.id, &connection),
            Stored::Valid(date!(2024 - 06 - 08))
        );
    }

    #[test]
    fn fire_rolls_back_when_schedule_changed() {
        let (connection, category) = get_test_connection();
        let stale =
            create_definition(&connection, &category, Recurrence::Weekly, date!(2024 - 06 - 01));
        let form = RecurringForm {
            amount: 25.0,
            category_id: category.id,
            recurrence: Recurrence::Weekly,
            next_occurrence: date!(2024 - 07 - 01),
        };
        update_recurring(stale.id, 3, &form, &connection).unwrap();

        let result = fire(&stale, &connection);

        assert_eq!(
            result,
            Err(MaterializationError::Failed(Error::ScheduleChanged(stale.id)))
        );
        assert_eq!(count_transactions(&connection), Ok(0));
        assert_eq!(
            next_occurrence(stale.id, &connection),
            Stored::Valid(date!(2024 - 07 - 01))
        );
    }

    #[test]
    fn firing_same_definition_twice_does_not_duplicate() {
        let (connection, category) = get_test_connection();
        let definition =
            create_definition(&connection, &category, Recurrence::Daily, date!(2024 - 06 - 01));

        fire(&definition, &connection).expect("Could not fire");
        let second = fire(&definition, &connection);

        assert_eq!(
            second,
            Err(MaterializationError::Failed(Error::ScheduleChanged(
                definition.id
            )))
        );
        assert_eq!(count_transactions(&connection), Ok(1));
    }
}
