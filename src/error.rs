// Error taxonomy for the ledger core
// Validation / NotFound are safe to show callers verbatim; storage and audit
// failures carry the underlying cause.

use thiserror::Error;

use crate::schema::Collection;

/// Failure reading or replacing a collection in the backing store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{collection} collection not found in backing store")]
    Missing { collection: Collection },

    /// Another writer holds the backing object; retry is up to the caller
    #[error("{collection} is locked by another writer. Close it and try again.")]
    Locked { collection: Collection },

    #[error("{collection} has an unexpected layout: {detail}")]
    Schema { collection: Collection, detail: String },

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// True when the caller may simply try the same call again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Locked { .. })
    }
}

/// Failure appending to (or reading) an audit log
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("{kind} audit log is locked by another writer")]
    Locked { kind: Collection },

    #[error("{kind} audit log has an unreadable entry: {detail}")]
    Corrupt { kind: Collection, detail: String },

    #[error("audit log lock poisoned")]
    Poisoned,

    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("audit SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Everything a ledger operation can report back to its caller
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Nothing to modify.")]
    NothingToModify,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        LedgerError::NotFound(message.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
