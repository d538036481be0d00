//! Categories for transactions, e.g. 'Groceries', 'Rent', 'Phone'.
//!
//! Recurring transactions reference a category, and the category's name is
//! used to name the transactions created from them.

mod db;
mod domain;
mod endpoints;

pub use db::{
    create_category, create_category_table, delete_category, get_all_categories, get_category,
};
pub use domain::{Category, CategoryFormData, CategoryId, CategoryName};
pub use endpoints::{CategoryEndpointState, create_category_endpoint, get_categories_endpoint};
