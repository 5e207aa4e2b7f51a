//! Error types for ordersync-core

use thiserror::Error;

/// Result type alias using ordersync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// SQLite extended result code for a violated UNIQUE constraint
const SQLITE_CONSTRAINT_UNIQUE: std::ffi::c_int = 2067;

/// Errors that can occur in ordersync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Order not found
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An order with the same client-generated id already exists in the business
    #[error("Duplicate client-generated id: {0}")]
    DuplicateClientId(String),

    /// A persistence operation exceeded its time budget
    #[error("Timed out after {0} ms")]
    Timeout(u128),

    /// The stored order kept changing underneath the reconciliation pass
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
}

impl Error {
    /// Whether resubmitting the same item later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::LibSql(_)
                | Self::Io(_)
                | Self::Timeout(_)
                | Self::ConcurrentModification(_)
        )
    }

    pub(crate) const fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::LibSql(libsql::Error::SqliteFailure(SQLITE_CONSTRAINT_UNIQUE, _))
        )
    }
}
