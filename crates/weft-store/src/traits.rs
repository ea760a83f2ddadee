//! Repository traits: the abstract interface for record sources and sinks.
//!
//! A repository is one end of a record flow. Local data stores, remote
//! server collections, and the crypto middleware that sits between them
//! all present the same session interface, so the reconciliation engine
//! never cares which kind it is driving.
//!
//! Fetches stream: the session hands back a bounded channel and delivers
//! records as they arrive, ending with a `Done` event that carries the
//! source-observed fetch watermark. Stores are per record, so one bad
//! record never sinks the rest of a batch.

use async_trait::async_trait;
use tokio::sync::mpsc;

use weft_core::{Collection, Guid, Record, ServerTimestamp};

use crate::error::Result;

/// Capacity of every fetch channel; fetchers stall rather than buffer
/// an unbounded backlog.
pub const FETCH_CHANNEL_CAPACITY: usize = 64;

/// One event in a streamed fetch.
#[derive(Debug)]
pub enum FetchEvent {
    /// A record modified at or after the requested watermark.
    Record(Record),
    /// A single record could not be produced; the flow decides whether
    /// to carry on.
    Failed { guid: Guid, message: String },
    /// End of stream. `fetch_end` is the timestamp the source observed
    /// when the fetch began, suitable as the next sync watermark.
    Done { fetch_end: ServerTimestamp },
}

/// Summary returned when a session finishes storing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEnd {
    /// The timestamp the sink observed after the last accepted record.
    pub timestamp: ServerTimestamp,
    /// Records the sink rejected, with the modification time each
    /// carried. The flow clamps its new watermark below the earliest of
    /// these so rejected records are retried next sync.
    pub failed: Vec<(Guid, ServerTimestamp)>,
}

/// A source and sink of records for one collection.
#[async_trait]
pub trait Repository: Send + Sync {
    /// The collection this repository serves.
    fn collection(&self) -> Collection;

    /// Begin a session. A session sees a consistent view of the
    /// repository from this point.
    async fn create_session(&self) -> Result<Box<dyn RepositorySession>>;
}

/// One flow's view of a repository.
///
/// Lifecycle: any number of `fetch_since` and `store` calls, then
/// `store_done` once if anything was stored, then `finish`.
#[async_trait]
pub trait RepositorySession: Send {
    /// Stream every record modified at or after `since`. The watermark
    /// is inclusive so a record landing exactly on it is never skipped.
    async fn fetch_since(
        &mut self,
        since: ServerTimestamp,
    ) -> Result<mpsc::Receiver<FetchEvent>>;

    /// Store one incoming record, reconciling against local state.
    /// Rejections surface in [`StoreEnd::failed`], not as errors here,
    /// unless the session itself is broken.
    async fn store(&mut self, record: Record) -> Result<()>;

    /// Flush pending stores and report the sink-observed end state.
    async fn store_done(&mut self) -> Result<StoreEnd>;

    /// Close the session.
    async fn finish(&mut self) -> Result<()>;
}
