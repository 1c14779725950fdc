//! Error types for the audit ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Verification findings are not errors; they are returned as data in
/// [`crate::verify::VerificationReport`].
#[derive(Error, Debug)]
pub enum Error {
    /// Submitted event was rejected before buffering
    ///
    /// Raised when the asset id is absent or zero, and when the computed
    /// transaction hash equals one already pending or already sealed (two
    /// identical events stamped in the same millisecond).
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The atomic write of a sealed block failed. Pending transactions are kept.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Row serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Canonical JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error came out of a failed seal
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Error::PersistenceFailure(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
