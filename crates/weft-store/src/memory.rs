//! In-memory implementation of the repository traits.
//!
//! This is the reference sink/source used throughout the test suite. It
//! behaves like a real backend: it assigns its own monotonic timestamps
//! on write, keeps tombstones so deletions propagate, and resolves
//! concurrent edits by newest-wins.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use weft_core::{Collection, Guid, Record, ServerTimestamp};

use crate::error::{Result, StoreError};
use crate::traits::{
    FetchEvent, Repository, RepositorySession, StoreEnd, FETCH_CHANNEL_CAPACITY,
};

/// In-memory repository for one collection.
///
/// All data is lost when the repository is dropped. Thread-safe via
/// RwLock; sessions share the same underlying map.
#[derive(Clone)]
pub struct MemoryRepository {
    collection: Collection,
    inner: Arc<RwLock<MemoryInner>>,
}

struct MemoryInner {
    /// Records (including tombstones) indexed by GUID. Each record's
    /// `modified` is the timestamp this repository assigned on write.
    records: HashMap<Guid, Record>,
    /// Last timestamp handed out; writes are strictly ordered.
    last_tick: i64,
}

impl MemoryRepository {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            inner: Arc::new(RwLock::new(MemoryInner {
                records: HashMap::new(),
                last_tick: 0,
            })),
        }
    }

    /// Write a record directly, as a local application would outside of
    /// any sync. Returns the assigned timestamp.
    pub fn put_local(&self, mut record: Record) -> ServerTimestamp {
        let mut inner = self.inner.write().unwrap();
        let ts = inner.tick();
        record.modified = ts;
        inner.records.insert(record.guid.clone(), record);
        ts
    }

    /// Snapshot of a record by id, tombstones included.
    pub fn get(&self, guid: &Guid) -> Option<Record> {
        self.inner.read().unwrap().records.get(guid).cloned()
    }

    /// Number of live (non-tombstone) records.
    pub fn live_count(&self) -> usize {
        self.inner
            .read()
            .unwrap()
            .records
            .values()
            .filter(|r| !r.deleted)
            .count()
    }
}

impl MemoryInner {
    fn tick(&mut self) -> ServerTimestamp {
        let now = now_millis();
        self.last_tick = now.max(self.last_tick + 1);
        ServerTimestamp(self.last_tick)
    }

    /// Strictly past every timestamp handed out so far, so a watermark
    /// taken from `now` never re-covers an already-stored record.
    fn now(&self) -> ServerTimestamp {
        ServerTimestamp(now_millis().max(self.last_tick + 1))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn create_session(&self) -> Result<Box<dyn RepositorySession>> {
        Ok(Box::new(MemorySession {
            collection: self.collection,
            inner: Arc::clone(&self.inner),
            stored: HashSet::new(),
            failed: Vec::new(),
            finished: false,
        }))
    }
}

struct MemorySession {
    collection: Collection,
    inner: Arc<RwLock<MemoryInner>>,
    /// GUIDs this session itself stored. Excluded from fetches so a
    /// record applied by one flow is not echoed back by the next.
    stored: HashSet<Guid>,
    failed: Vec<(Guid, ServerTimestamp)>,
    finished: bool,
}

impl MemorySession {
    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(StoreError::InvalidSessionState("session already finished"));
        }
        Ok(())
    }
}

#[async_trait]
impl RepositorySession for MemorySession {
    async fn fetch_since(
        &mut self,
        since: ServerTimestamp,
    ) -> Result<mpsc::Receiver<FetchEvent>> {
        self.check_open()?;
        let (matches, fetch_end) = {
            let inner = self.inner.read().unwrap();
            let matches: Vec<Record> = inner
                .records
                .values()
                .filter(|r| r.modified >= since && !self.stored.contains(&r.guid))
                .cloned()
                .collect();
            (matches, inner.now())
        };

        let (tx, rx) = mpsc::channel(FETCH_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for record in matches {
                if tx.send(FetchEvent::Record(record)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(FetchEvent::Done { fetch_end }).await;
        });
        Ok(rx)
    }

    async fn store(&mut self, record: Record) -> Result<()> {
        self.check_open()?;
        if record.collection != self.collection {
            return Err(StoreError::RecordRejected(
                record.guid.to_string(),
                format!(
                    "collection {} does not belong in {}",
                    record.collection, self.collection
                ),
            ));
        }
        if let Err(e) = record.validate() {
            self.failed.push((record.guid.clone(), record.modified));
            tracing::warn!(guid = %record.guid, error = %e, "rejecting invalid record");
            return Ok(());
        }

        let mut inner = self.inner.write().unwrap();
        match inner.records.get(&record.guid) {
            // Newest wins; an older incoming record is dropped, which is
            // also what absorbs echoes of our own uploads.
            Some(existing) if existing.modified >= record.modified => {}
            _ => {
                let ts = inner.tick();
                self.stored.insert(record.guid.clone());
                inner
                    .records
                    .insert(record.guid.clone(), record.with_modified(ts));
            }
        }
        Ok(())
    }

    async fn store_done(&mut self) -> Result<StoreEnd> {
        self.check_open()?;
        let timestamp = self.inner.read().unwrap().now();
        Ok(StoreEnd {
            timestamp,
            failed: std::mem::take(&mut self.failed),
        })
    }

    async fn finish(&mut self) -> Result<()> {
        self.check_open()?;
        self.finished = true;
        Ok(())
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::Payload;

    fn tab_record(name: &str) -> Record {
        Record::new(
            Guid::random(),
            Payload::Tabs {
                client_name: name.into(),
                tabs: vec![],
            },
        )
    }

    #[tokio::test]
    async fn fetch_since_is_inclusive() {
        let repo = MemoryRepository::new(Collection::Tabs);
        let ts = repo.put_local(tab_record("laptop"));

        let mut session = repo.create_session().await.unwrap();
        let mut rx = session.fetch_since(ts).await.unwrap();

        let mut saw_record = false;
        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Record(_) => saw_record = true,
                FetchEvent::Done { fetch_end } => assert!(fetch_end >= ts),
                FetchEvent::Failed { guid, message } => {
                    panic!("unexpected failure for {guid}: {message}")
                }
            }
        }
        assert!(saw_record, "record on the watermark must be fetched");
    }

    #[tokio::test]
    async fn newest_wins_on_store() {
        let repo = MemoryRepository::new(Collection::Tabs);
        let record = tab_record("laptop");
        let local_ts = repo.put_local(record.clone());

        let mut session = repo.create_session().await.unwrap();

        // A stale copy of the same record loses and leaves local intact.
        let stale = Record::new(
            record.guid.clone(),
            Payload::Tabs {
                client_name: "old name".into(),
                tabs: vec![],
            },
        )
        .with_modified(ServerTimestamp(local_ts.as_millis() - 10));
        session.store(stale).await.unwrap();
        assert_eq!(repo.get(&record.guid).unwrap().payload, record.payload);

        // A newer copy wins.
        let newer = Record::new(
            record.guid.clone(),
            Payload::Tabs {
                client_name: "new name".into(),
                tabs: vec![],
            },
        )
        .with_modified(ServerTimestamp(local_ts.as_millis() + 10));
        session.store(newer.clone()).await.unwrap();
        assert_eq!(repo.get(&record.guid).unwrap().payload, newer.payload);

        let end = session.store_done().await.unwrap();
        assert!(end.failed.is_empty());
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn tombstones_replace_live_records() {
        let repo = MemoryRepository::new(Collection::Tabs);
        let record = tab_record("laptop");
        let ts = repo.put_local(record.clone());

        let mut session = repo.create_session().await.unwrap();
        let tombstone = Record::tombstone(record.guid.clone(), Collection::Tabs)
            .with_modified(ServerTimestamp(ts.as_millis() + 1));
        session.store(tombstone).await.unwrap();

        assert!(repo.get(&record.guid).unwrap().deleted);
        assert_eq!(repo.live_count(), 0);
    }

    #[tokio::test]
    async fn finished_session_rejects_use() {
        let repo = MemoryRepository::new(Collection::Tabs);
        let mut session = repo.create_session().await.unwrap();
        session.finish().await.unwrap();
        assert!(matches!(
            session.store(tab_record("x")).await,
            Err(StoreError::InvalidSessionState(_))
        ));
    }

    #[tokio::test]
    async fn wrong_collection_is_a_session_error() {
        let repo = MemoryRepository::new(Collection::Tabs);
        let mut session = repo.create_session().await.unwrap();
        let record = Record::new(
            Guid::random(),
            Payload::History {
                hist_uri: "https://example.com/".into(),
                title: "Example".into(),
                visits: vec![],
            },
        );
        assert!(matches!(
            session.store(record).await,
            Err(StoreError::RecordRejected(_, _))
        ));
    }
}
