//! Error types for the task ledger.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
