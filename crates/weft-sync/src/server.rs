//! The server interface a session drives.
//!
//! Sessions never speak a wire protocol directly; they go through this
//! trait. Failures come back already classified, because the session's
//! only job on the interesting ones (auth rejection, backoff, end of
//! life) is to stop cleanly and surface them to the caller. Retry and
//! scheduling policy lives above the session, not in it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use weft_core::{Collection, ServerTimestamp};
use weft_crypto::CryptoRecord;
use weft_store::SealedRepository;

use crate::meta::{InfoCollections, MetaGlobal};

/// Classified server failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// Credentials rejected. The token is stale or the password changed.
    #[error("server rejected credentials")]
    Unauthorized,

    /// The server asked us to go away for a while.
    #[error("server requested backoff of {millis}ms")]
    Backoff { millis: u64 },

    /// The service is shutting down for good.
    #[error("server has reached end of life")]
    EndOfLife,

    /// The requested record does not exist. Expected for `meta/global`
    /// and the key ring on a new account.
    #[error("record not found")]
    NotFound,

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with something we cannot parse.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A storage server, scoped to one account.
#[async_trait]
pub trait SyncServer: Send + Sync {
    /// Resolve the storage node this account lives on. Cheap when
    /// already known.
    async fn ensure_endpoint(&self) -> Result<String, ServerError>;

    /// Fetch the `info/collections` map.
    async fn info_collections(&self) -> Result<InfoCollections, ServerError>;

    /// Fetch `meta/global` and its server modification time.
    /// `NotFound` means the account has never been provisioned.
    async fn fetch_meta_global(&self) -> Result<(MetaGlobal, ServerTimestamp), ServerError>;

    /// Upload a new `meta/global`, replacing whatever is there.
    async fn put_meta_global(&self, meta: &MetaGlobal) -> Result<ServerTimestamp, ServerError>;

    /// Fetch the sealed key-ring record (`crypto/keys`).
    async fn fetch_keys(&self) -> Result<CryptoRecord, ServerError>;

    /// Upload the sealed key-ring record.
    async fn put_keys(&self, record: &CryptoRecord) -> Result<ServerTimestamp, ServerError>;

    /// Delete every record the account has. First step of a fresh start.
    async fn wipe(&self) -> Result<(), ServerError>;

    /// Sealed repository for one data collection.
    fn collection(&self, collection: Collection) -> Arc<dyn SealedRepository>;
}
