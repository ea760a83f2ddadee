//! Bidirectional synchronization of one collection.
//!
//! A synchronizer owns two repositories, remote and local, and runs two
//! flows back to back: download (remote to local) first, so local wins
//! are decided against fresh data, then upload (local to remote). Each
//! direction keeps its own inclusive watermark; the pair of new
//! watermarks comes back in the report and is only persisted by the
//! caller once both flows completed.

use std::sync::Arc;

use weft_core::{Collection, ServerTimestamp};
use weft_store::Repository;

use crate::channel::{FlowReport, RecordsChannel};
use crate::error::{Result, SyncError};

/// Watermarks a synchronizer starts from.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynchronizerConfig {
    /// Fetch remote records modified at or after this.
    pub remote_watermark: ServerTimestamp,
    /// Fetch local records modified at or after this.
    pub local_watermark: ServerTimestamp,
}

/// Outcome of a completed synchronization.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub collection: Collection,
    /// Records applied locally.
    pub downloaded: usize,
    /// Records sent to the server.
    pub uploaded: usize,
    /// Watermark to fetch remote records from next time.
    pub new_remote_watermark: ServerTimestamp,
    /// Watermark to fetch local records from next time.
    pub new_local_watermark: ServerTimestamp,
}

/// Pairs a remote and a local repository for one collection.
pub struct Synchronizer {
    collection: Collection,
    remote: Arc<dyn Repository>,
    local: Arc<dyn Repository>,
}

impl Synchronizer {
    pub fn new(remote: Arc<dyn Repository>, local: Arc<dyn Repository>) -> Result<Self> {
        let collection = remote.collection();
        if collection != local.collection() {
            return Err(SyncError::InvalidState(
                "synchronizer repositories serve different collections",
            ));
        }
        Ok(Self {
            collection,
            remote,
            local,
        })
    }

    /// Run both flows. Nothing is persisted here; the caller stores the
    /// reported watermarks after the whole collection succeeds.
    pub async fn synchronize(&self, config: SynchronizerConfig) -> Result<SyncReport> {
        let mut remote_session = self.remote.create_session().await?;
        let mut local_session = self.local.create_session().await?;

        tracing::info!(collection = %self.collection, "downloading");
        let down = RecordsChannel::new(self.collection, config.remote_watermark)
            .flow(remote_session.as_mut(), local_session.as_mut())
            .await?;

        tracing::info!(collection = %self.collection, "uploading");
        let up = RecordsChannel::new(self.collection, config.local_watermark)
            .flow(local_session.as_mut(), remote_session.as_mut())
            .await?;

        remote_session.finish().await?;
        local_session.finish().await?;

        Ok(SyncReport {
            collection: self.collection,
            downloaded: down.stored,
            uploaded: up.stored,
            new_remote_watermark: next_watermark(&down, &up),
            new_local_watermark: next_watermark(&up, &down),
        })
    }
}

/// Each repository is touched twice per sync: once as the source of one
/// flow and once as the sink of the other. Its next watermark is the
/// later of the two observations, so records we just stored into it are
/// not fetched back as echoes, pulled back to the earliest record its
/// counterpart rejected so nothing rejected is ever skipped.
fn next_watermark(fetched_from: &FlowReport, stored_into: &FlowReport) -> ServerTimestamp {
    let advanced = fetched_from.fetch_end.max(stored_into.store_end);
    fetched_from
        .failed
        .iter()
        .map(|(_, ts)| *ts)
        .min()
        .map_or(advanced, |earliest| advanced.min(earliest))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use weft_core::{Guid, Payload, Record};
    use weft_store::{FetchEvent, MemoryRepository, RepositorySession, StoreEnd};

    /// Rejects one named record the first time it is offered, then
    /// behaves like the memory repository it wraps.
    struct RejectOnce {
        inner: MemoryRepository,
        guid: Guid,
        tripped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Repository for RejectOnce {
        fn collection(&self) -> Collection {
            self.inner.collection()
        }

        async fn create_session(&self) -> weft_store::Result<Box<dyn RepositorySession>> {
            Ok(Box::new(RejectOnceSession {
                inner: self.inner.create_session().await?,
                guid: self.guid.clone(),
                tripped: Arc::clone(&self.tripped),
                rejected: None,
            }))
        }
    }

    struct RejectOnceSession {
        inner: Box<dyn RepositorySession>,
        guid: Guid,
        tripped: Arc<AtomicBool>,
        rejected: Option<(Guid, ServerTimestamp)>,
    }

    #[async_trait]
    impl RepositorySession for RejectOnceSession {
        async fn fetch_since(
            &mut self,
            since: ServerTimestamp,
        ) -> weft_store::Result<mpsc::Receiver<FetchEvent>> {
            self.inner.fetch_since(since).await
        }

        async fn store(&mut self, record: Record) -> weft_store::Result<()> {
            if record.guid == self.guid && !self.tripped.swap(true, Ordering::SeqCst) {
                self.rejected = Some((record.guid.clone(), record.modified));
                return Ok(());
            }
            self.inner.store(record).await
        }

        async fn store_done(&mut self) -> weft_store::Result<StoreEnd> {
            let mut end = self.inner.store_done().await?;
            end.failed.extend(self.rejected.take());
            Ok(end)
        }

        async fn finish(&mut self) -> weft_store::Result<()> {
            self.inner.finish().await
        }
    }

    fn bookmark(title: &str) -> Record {
        Record::new(
            Guid::random(),
            Payload::Bookmark {
                title: title.into(),
                bmk_uri: format!("https://example.com/{title}"),
                description: None,
                tags: vec![],
                parent_id: None,
                parent_name: None,
            },
        )
    }

    fn pair() -> (MemoryRepository, MemoryRepository, Synchronizer) {
        let remote = MemoryRepository::new(Collection::Bookmarks);
        let local = MemoryRepository::new(Collection::Bookmarks);
        let synchronizer =
            Synchronizer::new(Arc::new(remote.clone()), Arc::new(local.clone())).unwrap();
        (remote, local, synchronizer)
    }

    #[tokio::test]
    async fn first_sync_converges_both_sides() {
        let (remote, local, synchronizer) = pair();
        remote.put_local(bookmark("remote-only"));
        local.put_local(bookmark("local-only"));

        let report = synchronizer
            .synchronize(SynchronizerConfig::default())
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        // The record just downloaded is tracked by the local session and
        // not offered back; only the genuinely local one goes up.
        assert_eq!(report.uploaded, 1);
        assert_eq!(remote.live_count(), 2);
        assert_eq!(local.live_count(), 2);
    }

    #[tokio::test]
    async fn second_sync_moves_nothing_new() {
        let (remote, local, synchronizer) = pair();
        remote.put_local(bookmark("a"));
        local.put_local(bookmark("b"));

        let first = synchronizer
            .synchronize(SynchronizerConfig::default())
            .await
            .unwrap();

        let second = synchronizer
            .synchronize(SynchronizerConfig {
                remote_watermark: first.new_remote_watermark,
                local_watermark: first.new_local_watermark,
            })
            .await
            .unwrap();

        assert_eq!(second.downloaded, 0);
        assert_eq!(second.uploaded, 0);
        assert_eq!(remote.live_count(), 2);
        assert_eq!(local.live_count(), 2);
        // Watermarks only move forward.
        assert!(second.new_remote_watermark >= first.new_remote_watermark);
        assert!(second.new_local_watermark >= first.new_local_watermark);
    }

    #[tokio::test]
    async fn rejected_store_clamps_watermark_and_is_refetched() {
        let remote = MemoryRepository::new(Collection::Bookmarks);
        remote.put_local(bookmark("settles"));
        let balky_guid = Guid::from("balkyaaaaaaa");
        let mut balky = bookmark("balky");
        balky.guid = balky_guid.clone();
        let balky_ts = remote.put_local(balky);

        let local = MemoryRepository::new(Collection::Bookmarks);
        let sink = RejectOnce {
            inner: local.clone(),
            guid: balky_guid.clone(),
            tripped: Arc::new(AtomicBool::new(false)),
        };
        let synchronizer =
            Synchronizer::new(Arc::new(remote.clone()), Arc::new(sink)).unwrap();

        let first = synchronizer
            .synchronize(SynchronizerConfig::default())
            .await
            .unwrap();

        // The rejection reached the report and pulled the download
        // watermark back to the rejected record's own timestamp.
        assert!(local.get(&balky_guid).is_none());
        assert_eq!(first.new_remote_watermark, balky_ts);

        // An inclusive fetch from that watermark offers it again, and
        // this time it lands.
        let second = synchronizer
            .synchronize(SynchronizerConfig {
                remote_watermark: first.new_remote_watermark,
                local_watermark: first.new_local_watermark,
            })
            .await
            .unwrap();
        assert_eq!(second.downloaded, 1);
        assert!(!local.get(&balky_guid).unwrap().deleted);
    }

    #[tokio::test]
    async fn deletion_propagates() {
        let (remote, local, synchronizer) = pair();
        let record = bookmark("doomed");
        remote.put_local(record.clone());
        local.put_local(record.clone());

        let first = synchronizer
            .synchronize(SynchronizerConfig::default())
            .await
            .unwrap();

        remote.put_local(Record::tombstone(record.guid.clone(), Collection::Bookmarks));

        synchronizer
            .synchronize(SynchronizerConfig {
                remote_watermark: first.new_remote_watermark,
                local_watermark: first.new_local_watermark,
            })
            .await
            .unwrap();

        assert!(local.get(&record.guid).unwrap().deleted);
    }

    #[tokio::test]
    async fn newest_edit_wins_across_sides() {
        let (remote, local, synchronizer) = pair();
        let record = bookmark("contested");
        local.put_local(record.clone());
        // The remote edit lands strictly later, so it must win everywhere.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let remote_edit = Record::new(
            record.guid.clone(),
            Payload::Bookmark {
                title: "contested (remote edit)".into(),
                bmk_uri: "https://example.com/contested".into(),
                description: None,
                tags: vec![],
                parent_id: None,
                parent_name: None,
            },
        );
        remote.put_local(remote_edit.clone());

        synchronizer
            .synchronize(SynchronizerConfig::default())
            .await
            .unwrap();

        assert_eq!(local.get(&record.guid).unwrap().payload, remote_edit.payload);
        assert_eq!(
            remote.get(&record.guid).unwrap().payload,
            remote_edit.payload
        );
    }

    #[tokio::test]
    async fn mismatched_collections_are_rejected() {
        let remote = MemoryRepository::new(Collection::Tabs);
        let local = MemoryRepository::new(Collection::History);
        assert!(matches!(
            Synchronizer::new(Arc::new(remote), Arc::new(local)),
            Err(SyncError::InvalidState(_))
        ));
    }
}
