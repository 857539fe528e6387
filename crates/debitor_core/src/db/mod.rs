//! Storage driver boundary.
//!
//! # Responsibility
//! - Define driver-neutral connection, row and parameter contracts.
//! - Provide the SQLite driver and the `debitors` table bootstrap.
//!
//! # Invariants
//! - Statements receive values only through named `:name` parameters.
//! - Vendor error classification lives in the vendor driver, not in callers.

pub mod driver;
pub mod sqlite;

pub use driver::{
    Driver, DriverConnection, DriverError, Parameters, QueryError, RowError, RowHandler, RowView,
    SqlValue,
};
pub use sqlite::{create_database, SqliteConnection, SqliteDriver};
