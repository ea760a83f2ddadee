//! One-directional record flow between two repository sessions.
//!
//! A channel pulls every record the source modified at or after a
//! watermark and pushes each into the sink as it arrives. When the
//! source reports `Done` and the sink flushes, the flow is summarized in
//! a [`FlowReport`], whose `new_watermark` is where the next sync should
//! start: the source's fetch end, pulled back to the earliest record the
//! sink rejected so nothing rejected is ever skipped.
//!
//! A failure on the fetch side kills the flow outright. Fetch failures
//! mean we cannot trust the stream (the usual cause is an envelope that
//! failed authentication), whereas a sink rejection is scoped to one
//! record.

use weft_core::{Collection, Guid, ServerTimestamp};
use weft_store::{FetchEvent, RepositorySession};

use crate::error::{Result, SyncError};

/// Summary of one completed flow.
#[derive(Debug, Clone)]
pub struct FlowReport {
    /// Records the source produced.
    pub fetched: usize,
    /// Records the sink accepted for storage.
    pub stored: usize,
    /// Source-observed timestamp at which the fetch began.
    pub fetch_end: ServerTimestamp,
    /// Sink-observed timestamp after the last store.
    pub store_end: ServerTimestamp,
    /// Records the sink rejected, with their modification times.
    pub failed: Vec<(Guid, ServerTimestamp)>,
}

impl FlowReport {
    /// The watermark to persist for this direction. Fetches are
    /// inclusive, so clamping to a rejected record's own timestamp
    /// guarantees it is fetched again next sync.
    pub fn new_watermark(&self) -> ServerTimestamp {
        self.failed
            .iter()
            .map(|(_, ts)| *ts)
            .min()
            .map_or(self.fetch_end, |earliest| self.fetch_end.min(earliest))
    }
}

/// Drives records from one session into another.
pub struct RecordsChannel {
    collection: Collection,
    since: ServerTimestamp,
}

impl RecordsChannel {
    pub fn new(collection: Collection, since: ServerTimestamp) -> Self {
        Self { collection, since }
    }

    /// Run the flow to completion.
    pub async fn flow(
        &self,
        source: &mut dyn RepositorySession,
        sink: &mut dyn RepositorySession,
    ) -> Result<FlowReport> {
        let mut rx = source.fetch_since(self.since).await?;

        let mut fetched = 0usize;
        let mut stored = 0usize;
        let mut fetch_end = None;

        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Record(record) => {
                    fetched += 1;
                    sink.store(record).await?;
                    stored += 1;
                }
                FetchEvent::Failed { guid, message } => {
                    return Err(SyncError::Flow {
                        collection: self.collection,
                        message: format!("fetch failed at {guid}: {message}"),
                    });
                }
                FetchEvent::Done { fetch_end: ts } => {
                    fetch_end = Some(ts);
                }
            }
        }

        // A stream that closes without `Done` was cut off; its watermark
        // cannot be trusted.
        let fetch_end = fetch_end.ok_or(SyncError::InvalidState(
            "fetch stream ended without completion",
        ))?;

        let store_end = sink.store_done().await?;
        tracing::debug!(
            fetched,
            stored,
            failed = store_end.failed.len(),
            "flow complete"
        );

        Ok(FlowReport {
            fetched,
            stored,
            fetch_end,
            store_end: store_end.timestamp,
            failed: store_end.failed,
        })
    }
}
