//! Error types for the client facade.

use thiserror::Error;
use weft_store::StoreError;
use weft_sync::AbortReason;

/// Errors a [`SyncClient`](crate::SyncClient) can surface.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session stopped early. The reason says whether to retry,
    /// reauthenticate, wait, or upgrade.
    #[error("sync aborted: {0}")]
    Aborted(#[from] AbortReason),

    /// Local storage error outside of a sync run.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
