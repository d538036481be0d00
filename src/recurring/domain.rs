//! Core recurring transaction domain types.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::CategoryId,
    database_id::{DatabaseId, UserId},
};

/// Database identifier for a recurring transaction.
pub type RecurringId = DatabaseId;

/// How often a recurring transaction happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recurrence {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Every fourteen days.
    BiWeekly,
    /// Every calendar month, see [Recurrence::advance] for how month ends are handled.
    Monthly,
}

impl Recurrence {
    /// The name used for the recurrence in the database and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::BiWeekly => "bi-weekly",
            Recurrence::Monthly => "monthly",
        }
    }
}

impl Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = Error;

    /// Parse a recurrence.
    ///
    /// # Errors
    /// Returns an [Error::InvalidRecurrenceKind] for anything other than
    /// "daily", "weekly", "bi-weekly" or "monthly".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "bi-weekly" => Ok(Recurrence::BiWeekly),
            "monthly" => Ok(Recurrence::Monthly),
            other => Err(Error::InvalidRecurrenceKind(other.to_owned())),
        }
    }
}

impl ToSql for Recurrence {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Recurrence {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// Whether a recurring transaction still produces transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringStatus {
    /// The recurring transaction is materialized whenever it is due.
    Active,
    /// The recurring transaction was deleted by its owner.
    ///
    /// Cancelling is a soft delete and cannot be undone.
    Cancelled,
}

impl RecurringStatus {
    /// The name used for the status in the database and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringStatus::Active => "active",
            RecurringStatus::Cancelled => "cancelled",
        }
    }
}

impl ToSql for RecurringStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecurringStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "active" => Ok(RecurringStatus::Active),
            "cancelled" => Ok(RecurringStatus::Cancelled),
            other => Err(FromSqlError::Other(
                format!("\"{other}\" is not a valid recurring status").into(),
            )),
        }
    }
}

/// A column value exactly as it was read from the database.
///
/// Fields that the materializer has to validate before it can fire a
/// recurring transaction are read into `Stored` rather than failing the whole
/// query, so that one bad row only affects that row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stored<T> {
    /// The value could be converted to `T`.
    Valid(T),
    /// The value could not be converted, holds a textual rendering of the raw value.
    Invalid(String),
}

impl<T: FromSql> FromSql for Stored<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match T::column_result(value) {
            Ok(valid) => Ok(Stored::Valid(valid)),
            Err(_) => Ok(Stored::Invalid(describe(value))),
        }
    }
}

impl<T: Display> Display for Stored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stored::Valid(value) => write!(f, "{value}"),
            Stored::Invalid(raw) => write!(f, "{raw:?}"),
        }
    }
}

fn describe(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_owned(),
        ValueRef::Integer(integer) => integer.to_string(),
        ValueRef::Real(real) => real.to_string(),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(blob) => format!("<{} byte blob>", blob.len()),
    }
}

/// A user-configured template from which transactions are created on a schedule.
///
/// New recurring transactions are created with [create_recurring](crate::recurring::create_recurring).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringDefinition {
    /// The ID of the recurring transaction.
    pub id: RecurringId,
    /// The user that owns the recurring transaction and the transactions created from it.
    pub user_id: Stored<UserId>,
    /// The amount of each transaction.
    ///
    /// Always positive when written through [RecurringForm], but read as-is.
    pub amount: Stored<f64>,
    /// The category of each transaction.
    pub category_id: Stored<CategoryId>,
    /// How often a transaction is created.
    pub recurrence: Stored<Recurrence>,
    /// The date the next transaction is due.
    pub next_occurrence: Stored<Date>,
    /// Whether the recurring transaction is active or cancelled.
    pub status: RecurringStatus,
}

/// Request body for creating or updating a recurring transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringForm {
    /// The amount of each transaction.
    pub amount: f64,
    /// The category of each transaction.
    pub category_id: CategoryId,
    /// How often a transaction is created.
    pub recurrence: Recurrence,
    /// The date the first (or next) transaction is due.
    pub next_occurrence: Date,
}

impl RecurringForm {
    /// Check the amount is a positive, finite number.
    ///
    /// # Errors
    /// Returns an [Error::InvalidAmount] otherwise.
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount.is_finite() && self.amount > 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidAmount(self.amount))
        }
    }
}

#[cfg(test)]
mod recurrence_parse_tests {
    use crate::{Error, recurring::Recurrence};

    #[test]
    fn parses_every_kind() {
        for recurrence in [
            Recurrence::Daily,
            Recurrence::Weekly,
            Recurrence::BiWeekly,
            Recurrence::Monthly,
        ] {
            assert_eq!(recurrence.as_str().parse::<Recurrence>(), Ok(recurrence));
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert_eq!(
            "fortnightly".parse::<Recurrence>(),
            Err(Error::InvalidRecurrenceKind("fortnightly".to_owned()))
        );
    }

    #[test]
    fn serializes_bi_weekly_with_hyphen() {
        let json = serde_json::to_string(&Recurrence::BiWeekly).unwrap();

        assert_eq!(json, "\"bi-weekly\"");
    }
}
