//! One pass of the recurring transaction engine over every due definition.

use std::fmt::Display;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{
    TransactionId,
    recurring::{
        MaterializationError, Materialized, RecurringDefinition, RecurringId, SkipReason, fire,
        select_due,
    },
};

/// A recurring transaction that was materialized during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fired {
    /// The recurring transaction that was fired.
    pub recurring_id: RecurringId,
    /// The transaction created (or reused) for the occurrence.
    pub transaction_id: TransactionId,
    /// The date of the occurrence.
    pub date: Date,
}

/// The outcome of a run over the due recurring transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub run_at: OffsetDateTime,
    /// The local date used to decide which recurring transactions were due.
    pub today: Date,
    /// How many recurring transactions were due.
    pub attempted: usize,
    /// The recurring transactions that were materialized.
    pub succeeded: Vec<Fired>,
    /// The recurring transactions with bad data that were left for a later run.
    pub skipped: Vec<(RecurringId, SkipReason)>,
    /// The recurring transactions that failed with an unexpected error.
    pub failed: Vec<(RecurringId, String)>,
    /// Set if the run could not start, e.g. the due recurring transactions
    /// could not be read.
    pub error: Option<String>,
}

impl BatchReport {
    fn new(run_at: OffsetDateTime, today: Date) -> Self {
        Self {
            run_at,
            today,
            attempted: 0,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            error: None,
        }
    }

    /// A report for a run that did not get as far as selecting any recurring transactions.
    pub fn failed_to_start(run_at: OffsetDateTime, error: impl Display) -> Self {
        let mut report = Self::new(run_at, run_at.date());
        report.error = Some(error.to_string());
        report
    }

    /// Whether nothing failed, skipped items do not count.
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failed.is_empty()
    }
}

/// Materialize every recurring transaction due on or before the local date of `now`.
///
/// Each due recurring transaction is fired once, so a schedule that is several
/// periods behind catches up one period per run. A failure for one recurring
/// transaction is recorded in the report and the run carries on with the rest.
/// This function never fails: problems are reported in the returned
/// [BatchReport].
pub fn run_once(now: OffsetDateTime, local_offset: UtcOffset, connection: &Connection) -> BatchReport {
    let today = now.to_offset(local_offset).date();
    let mut report = BatchReport::new(now, today);

    let due = match select_due(today, connection) {
        Ok(due) => due,
        Err(error) => {
            tracing::error!("could not select due recurring transactions: {error}");
            report.error = Some(error.to_string());
            return report;
        }
    };

    report.attempted = due.len();
    tracing::debug!("{} recurring transactions due on or before {today}", due.len());

    for definition in &due {
        match fire(definition, connection) {
            Ok(materialized) => {
                log_succeeded(definition, &materialized);
                report.succeeded.push(Fired {
                    recurring_id: definition.id,
                    transaction_id: materialized.transaction.id,
                    date: materialized.transaction.date,
                });
            }
            Err(MaterializationError::Skipped(reason)) => {
                let outcome = format!("skipped:{}", reason.code());
                tracing::warn!(
                    recurring_id = definition.id,
                    outcome = outcome.as_str(),
                    category_id = %definition.category_id,
                    amount = %definition.amount,
                    fired_date = %definition.next_occurrence,
                    "skipped recurring transaction: {reason}"
                );
                report.skipped.push((definition.id, reason));
            }
            Err(MaterializationError::Failed(error)) => {
                tracing::error!(
                    recurring_id = definition.id,
                    outcome = "failed",
                    category_id = %definition.category_id,
                    amount = %definition.amount,
                    fired_date = %definition.next_occurrence,
                    "could not materialize recurring transaction: {error}"
                );
                report.failed.push((definition.id, error.to_string()));
            }
        }
    }

    tracing::info!(
        attempted = report.attempted,
        succeeded = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "finished recurring transaction run for {today}"
    );

    report
}

fn log_succeeded(definition: &RecurringDefinition, materialized: &Materialized) {
    tracing::info!(
        recurring_id = definition.id,
        outcome = "succeeded",
        category = %materialized.category.name,
        amount = materialized.transaction.amount,
        fired_date = %materialized.transaction.date,
        transaction_id = materialized.transaction.id,
        next_occurrence = %materialized.next_occurrence,
        "materialized recurring transaction"
    );
}
