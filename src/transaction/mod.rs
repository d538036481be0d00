//! Transactions, i.e. events where money was either spent or earned.
//!
//! Recurring transactions are materialized into rows of this table, one per
//! occurrence.

mod core;

pub use core::{
    Transaction, TransactionBuilder, TransactionType, create_transaction,
    create_transaction_table, get_transaction, get_transaction_for_occurrence,
    get_transactions_for_recurring,
};

#[cfg(test)]
pub use core::count_transactions;
