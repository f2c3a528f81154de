use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Data access error for {entity}: {message}")]
    DataAccess { entity: String, message: String },

    #[error("Query on {entity} timed out after {elapsed:?}")]
    Timeout { entity: String, elapsed: Duration },

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Invalid timestamp: {0}")]
    TimestampParse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for faults raised at the data access boundary (connection,
    /// query or timeout). These are the only errors the orchestrator absorbs.
    pub fn is_data_access(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::DataAccess { .. } | Error::Timeout { .. }
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
