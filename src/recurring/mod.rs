//! Recurring transactions and the engine that materializes them.
//!
//! A recurring transaction is a template (amount, category, repeat interval and
//! the date it is next due) from which regular transactions are created:
//! - [select_due] finds the active definitions that are due,
//! - [fire] turns one due definition into a transaction and advances its schedule,
//! - [run_once] does a full pass over the due definitions and reports the outcome,
//! - [Scheduler] runs passes periodically, never two at once.

mod batch;
mod db;
mod domain;
mod endpoints;
mod materialize;
mod recurrence;
mod scheduler;

pub use batch::{BatchReport, Fired, run_once};
pub use db::{
    advance_next_occurrence, cancel_recurring, create_recurring, create_recurring_table,
    get_active_recurring_for_user, get_recurring, select_due, update_recurring,
};
pub use domain::{
    Recurrence, RecurringDefinition, RecurringForm, RecurringId, RecurringStatus, Stored,
};
pub use endpoints::{
    RecurringEndpointState, RunEndpointState, cancel_recurring_endpoint,
    create_recurring_endpoint, get_recurring_endpoint, run_recurring_endpoint,
    update_recurring_endpoint,
};
pub use materialize::{MaterializationError, Materialized, SkipReason, fire};
pub use scheduler::{BatchRunner, RunGuard, RunPermit, Scheduler};
