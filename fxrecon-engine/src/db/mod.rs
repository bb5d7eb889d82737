//! Record store for trades, emails, matches and sessions
//!
//! The only mutable shared state in the engine. All writes that span
//! the Trade/Match/Email invariant run inside a single sqlx
//! transaction. Errors are classified into the four store categories
//! so callers can decide what is retry-eligible.

pub mod emails;
pub mod matches;
pub mod schema;
pub mod sessions;
pub mod tenants;
pub mod trades;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Result type for record store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Typed store failure categories
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent writer won, or a uniqueness rule was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Temporarily unavailable; retry-eligible
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Invariant violation or unrecoverable failure
    #[error("fatal store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Transient(err.to_string()),
            sqlx::Error::Database(db) => {
                let message = db.message().to_lowercase();
                if message.contains("locked") || message.contains("busy") {
                    StoreError::Transient(err.to_string())
                } else if message.contains("unique") || message.contains("constraint") {
                    StoreError::Conflict(err.to_string())
                } else {
                    StoreError::Fatal(err.to_string())
                }
            }
            _ => StoreError::Fatal(err.to_string()),
        }
    }
}

/// Upper bound on any single store call (lock waits and pool acquire)
const STORE_DEADLINE: std::time::Duration = std::time::Duration::from_secs(10);

/// Open (or create) the SQLite database and bootstrap the schema.
pub async fn init_database_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(STORE_DEADLINE);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(STORE_DEADLINE)
        .connect_with(options)
        .await?;

    schema::create_schema(&pool).await?;
    info!("database schema ready");
    Ok(pool)
}
