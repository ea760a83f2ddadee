//! Error types for the sync module.

use thiserror::Error;

use weft_core::Collection;

use crate::server::ServerError;

/// Errors that can occur while a session runs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Server request failed; carries its own classification.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Repository or state database failure.
    #[error("store error: {0}")]
    Store(#[from] weft_store::StoreError),

    /// Envelope or key failure outside a record flow.
    #[error("crypto error: {0}")]
    Crypto(#[from] weft_crypto::CryptoError),

    /// A record flow for one collection did not complete.
    #[error("flow failed for {collection}: {message}")]
    Flow {
        collection: Collection,
        message: String,
    },

    /// The server's metadata was written by a newer client; syncing
    /// would corrupt it.
    #[error("server storage version {server} is newer than supported {supported}")]
    StorageVersionTooNew { server: u32, supported: u32 },

    /// The session was driven out of order.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
