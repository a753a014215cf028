//! Error types for the catalog store and operation surface.

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures raised by the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write referenced a row that does not exist (unknown tag id, parent id)
    #[error("Reference error: {0}")]
    Reference(String),

    /// Any other SQLite failure, passed through unmodified
    #[error("Storage error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if is_foreign_key_violation(&err) {
            StoreError::Reference(err.to_string())
        } else {
            StoreError::Sqlite(err)
        }
    }
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Failures surfaced to callers of [`crate::surface::execute`]
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed request: unknown selected field, bad kind label
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl OperationError {
    /// Stable machine-readable label used in error responses
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Store(StoreError::Reference(_)) => "reference",
            OperationError::Store(_) => "storage",
            OperationError::InvalidRequest(_) => "invalid_request",
            OperationError::Encode(_) => "internal",
        }
    }
}
