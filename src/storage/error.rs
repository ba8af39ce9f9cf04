//! Storage error types

use thiserror::Error;

/// Errors that can occur in the reading store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection mutex was poisoned
    #[error("Lock error: {0}")]
    Lock(String),

    /// Store cannot serve requests right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Invalid time range (start >= end)
    #[error("Invalid time range: start must be less than end")]
    InvalidTimeRange,
}

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
