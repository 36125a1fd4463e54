//! # Database Operations
//!
//! SQLite-backed durable storage for the offline queue and task history.
//!
//! ## Key Components
//!
//! - [`connection`] - pool construction (WAL journal, busy timeout, create-if-missing)
//! - [`migrations`] - idempotent embedded schema
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dispatch_core::config::DatabaseConfig;
//! use dispatch_core::database::{DatabaseConnection, DatabaseMigrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! DatabaseMigrations::run_all(connection.pool()).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use migrations::DatabaseMigrations;

/// Current wall-clock time as Unix epoch milliseconds, the storage format for timestamps
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
