//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during repository and state operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A record failed to seal or open.
    #[error("crypto error: {0}")]
    Crypto(#[from] weft_crypto::CryptoError),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record was rejected by the backing store.
    #[error("record {0} rejected: {1}")]
    RecordRejected(String, String),

    /// The session was used out of order.
    #[error("invalid session state: {0}")]
    InvalidSessionState(&'static str),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
