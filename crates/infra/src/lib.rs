//! Storage layer: SQLite store, order placement, catalog and reports.
//!
//! [`Store`] owns the connection pool. Every write runs in its own
//! transaction; [`Store::place_order`] is the only operation that touches
//! stock on behalf of an order.

pub mod catalog;
pub mod config;
pub mod db;
pub mod ledger;
pub mod orders;
pub mod placement;
pub mod reporting;
pub mod retry;


pub use catalog::CatalogError;
pub use config::{ConfigError, StoreConfig};
pub use db::{Store, StoreError};
pub use ledger::MovementReason;
pub use placement::PlacementEngine;
pub use reporting::{DailySales, IngredientUsage, MenuSales};
pub use retry::{RetryPolicy, place_order_with_retry};
