//! An in-process storage server.
//!
//! Implements the full [`SyncServer`] surface over shared memory with a
//! single monotonic clock, so end-to-end session tests run against
//! something that behaves like the real service: records get
//! server-assigned timestamps, `meta/global` and `crypto/keys` live
//! alongside the data collections, and the account-level calls can be
//! made to fail with a chosen classification to exercise abort paths.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use weft_core::{Collection, Guid, ServerTimestamp};
use weft_crypto::CryptoRecord;
use weft_store::{
    Result as StoreResult, SealedFetchEvent, SealedRepository, SealedSession, StoreEnd,
    FETCH_CHANNEL_CAPACITY,
};
use weft_sync::{InfoCollections, MetaGlobal, ServerError, SyncServer};

/// Fake storage endpoint reported by [`FakeServer::ensure_endpoint`].
pub const FAKE_ENDPOINT: &str = "https://storage.weft.test/1.1/account/";

#[derive(Default)]
struct FakeServerInner {
    meta: Option<(MetaGlobal, ServerTimestamp)>,
    keys: Option<CryptoRecord>,
    collections: HashMap<Collection, HashMap<Guid, CryptoRecord>>,
    last_tick: i64,
    /// When set, every account-level call fails with this until cleared.
    failure: Option<ServerError>,
}

impl FakeServerInner {
    fn tick(&mut self) -> ServerTimestamp {
        self.last_tick = now_millis().max(self.last_tick + 1);
        ServerTimestamp(self.last_tick)
    }

    /// Strictly past every timestamp handed out so far, so a watermark
    /// taken from `now` never re-covers an already-stored record.
    fn now(&self) -> ServerTimestamp {
        ServerTimestamp(now_millis().max(self.last_tick + 1))
    }

    fn check(&self) -> Result<(), ServerError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// The fake server. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct FakeServer {
    inner: Arc<RwLock<FakeServerInner>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent server call fail with `error`.
    pub fn inject_failure(&self, error: ServerError) {
        self.inner.write().unwrap().failure = Some(error);
    }

    /// Stop failing.
    pub fn clear_failure(&self) {
        self.inner.write().unwrap().failure = None;
    }

    /// The stored `meta/global`, if any.
    pub fn meta(&self) -> Option<MetaGlobal> {
        self.inner.read().unwrap().meta.as_ref().map(|(m, _)| m.clone())
    }

    /// Replace the stored `meta/global` without touching anything else,
    /// as another client would.
    pub fn set_meta(&self, meta: MetaGlobal) {
        let mut inner = self.inner.write().unwrap();
        let ts = inner.tick();
        inner.meta = Some((meta, ts));
    }

    /// Number of sealed records in one collection.
    pub fn record_count(&self, collection: Collection) -> usize {
        self.inner
            .read()
            .unwrap()
            .collections
            .get(&collection)
            .map_or(0, HashMap::len)
    }

    /// Whether a key-ring record is stored.
    pub fn has_keys(&self) -> bool {
        self.inner.read().unwrap().keys.is_some()
    }

    /// Corrupt the stored key ring's authentication tag.
    pub fn tamper_with_keys(&self) {
        let mut inner = self.inner.write().unwrap();
        if let Some(keys) = inner.keys.as_mut() {
            keys.payload = keys.payload.replace("\"hmac\":\"", "\"hmac\":\"00");
        }
    }

    /// Corrupt one sealed record's authentication tag.
    pub fn tamper_with_record(&self, collection: Collection, guid: &Guid) {
        let mut inner = self.inner.write().unwrap();
        if let Some(record) = inner
            .collections
            .get_mut(&collection)
            .and_then(|c| c.get_mut(guid))
        {
            record.payload = record.payload.replace("\"hmac\":\"", "\"hmac\":\"00");
        }
    }
}

#[async_trait]
impl SyncServer for FakeServer {
    async fn ensure_endpoint(&self) -> Result<String, ServerError> {
        self.inner.read().unwrap().check()?;
        Ok(FAKE_ENDPOINT.to_string())
    }

    async fn info_collections(&self) -> Result<InfoCollections, ServerError> {
        let inner = self.inner.read().unwrap();
        inner.check()?;
        let mut map = HashMap::new();
        if let Some((_, ts)) = &inner.meta {
            map.insert("meta".to_string(), *ts);
        }
        if let Some(keys) = &inner.keys {
            map.insert("crypto".to_string(), keys.modified);
        }
        for (collection, records) in &inner.collections {
            if let Some(latest) = records.values().map(|r| r.modified).max() {
                map.insert(collection.name().to_string(), latest);
            }
        }
        Ok(InfoCollections::new(map))
    }

    async fn fetch_meta_global(&self) -> Result<(MetaGlobal, ServerTimestamp), ServerError> {
        let inner = self.inner.read().unwrap();
        inner.check()?;
        inner.meta.clone().ok_or(ServerError::NotFound)
    }

    async fn put_meta_global(&self, meta: &MetaGlobal) -> Result<ServerTimestamp, ServerError> {
        let mut inner = self.inner.write().unwrap();
        inner.check()?;
        let ts = inner.tick();
        inner.meta = Some((meta.clone(), ts));
        Ok(ts)
    }

    async fn fetch_keys(&self) -> Result<CryptoRecord, ServerError> {
        let inner = self.inner.read().unwrap();
        inner.check()?;
        inner.keys.clone().ok_or(ServerError::NotFound)
    }

    async fn put_keys(&self, record: &CryptoRecord) -> Result<ServerTimestamp, ServerError> {
        let mut inner = self.inner.write().unwrap();
        inner.check()?;
        let ts = inner.tick();
        let mut record = record.clone();
        record.modified = ts;
        inner.keys = Some(record);
        Ok(ts)
    }

    async fn wipe(&self) -> Result<(), ServerError> {
        let mut inner = self.inner.write().unwrap();
        inner.check()?;
        inner.meta = None;
        inner.keys = None;
        inner.collections.clear();
        Ok(())
    }

    fn collection(&self, collection: Collection) -> Arc<dyn SealedRepository> {
        Arc::new(FakeCollection {
            collection,
            inner: Arc::clone(&self.inner),
        })
    }
}

/// One server-side collection of sealed records.
struct FakeCollection {
    collection: Collection,
    inner: Arc<RwLock<FakeServerInner>>,
}

#[async_trait]
impl SealedRepository for FakeCollection {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn create_session(&self) -> StoreResult<Box<dyn SealedSession>> {
        Ok(Box::new(FakeCollectionSession {
            collection: self.collection,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeCollectionSession {
    collection: Collection,
    inner: Arc<RwLock<FakeServerInner>>,
}

#[async_trait]
impl SealedSession for FakeCollectionSession {
    async fn fetch_since(
        &mut self,
        since: ServerTimestamp,
    ) -> StoreResult<mpsc::Receiver<SealedFetchEvent>> {
        let (matches, fetch_end) = {
            let inner = self.inner.read().unwrap();
            let matches: Vec<CryptoRecord> = inner
                .collections
                .get(&self.collection)
                .map(|records| {
                    records
                        .values()
                        .filter(|r| r.modified >= since)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            (matches, inner.now())
        };

        let (tx, rx) = mpsc::channel(FETCH_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for record in matches {
                if tx.send(SealedFetchEvent::Record(record)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(SealedFetchEvent::Done { fetch_end }).await;
        });
        Ok(rx)
    }

    async fn store(&mut self, mut record: CryptoRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let ts = inner.tick();
        record.modified = ts;
        inner
            .collections
            .entry(self.collection)
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn store_done(&mut self) -> StoreResult<StoreEnd> {
        let inner = self.inner.read().unwrap();
        Ok(StoreEnd {
            timestamp: inner.now(),
            failed: Vec::new(),
        })
    }

    async fn finish(&mut self) -> StoreResult<()> {
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
