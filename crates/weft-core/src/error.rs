//! Error types for Weft core primitives.

use thiserror::Error;

/// Errors produced by record and identifier handling.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid GUID: {0:?}")]
    InvalidGuid(String),

    #[error("invalid server timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("payload does not belong to collection {collection}: {kind}")]
    PayloadCollectionMismatch {
        collection: &'static str,
        kind: &'static str,
    },

    #[error("malformed record payload: {0}")]
    MalformedPayload(String),

    #[error("tombstone carries type-specific fields")]
    TombstoneWithFields,
}
