//! Crypto middleware: a cleartext repository view over sealed storage.
//!
//! Remote storage only ever sees [`CryptoRecord`]s. This layer sits in
//! front of a sealed repository and does the envelope work in flight,
//! sealing on the way out and verifying-then-opening on the way in, so
//! the reconciliation engine drives remote collections through the same
//! [`Repository`] interface as local ones.
//!
//! An envelope that fails authentication poisons the fetch: the stream
//! stops without its `Done` event, which downstream treats as a failed
//! flow. Untrusted data never gets a chance to move the watermark.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use weft_core::{Collection, Record, ServerTimestamp};
use weft_crypto::{CryptoRecord, KeyBundle};

use crate::error::Result;
use crate::traits::{
    FetchEvent, Repository, RepositorySession, StoreEnd, FETCH_CHANNEL_CAPACITY,
};

/// One event in a streamed fetch of sealed records.
#[derive(Debug)]
pub enum SealedFetchEvent {
    Record(CryptoRecord),
    Done { fetch_end: ServerTimestamp },
}

/// A source and sink of sealed records, typically one server collection.
#[async_trait]
pub trait SealedRepository: Send + Sync {
    fn collection(&self) -> Collection;

    async fn create_session(&self) -> Result<Box<dyn SealedSession>>;
}

/// One flow's view of sealed storage. Same lifecycle as
/// [`RepositorySession`].
#[async_trait]
pub trait SealedSession: Send {
    async fn fetch_since(
        &mut self,
        since: ServerTimestamp,
    ) -> Result<mpsc::Receiver<SealedFetchEvent>>;

    async fn store(&mut self, record: CryptoRecord) -> Result<()>;

    async fn store_done(&mut self) -> Result<StoreEnd>;

    async fn finish(&mut self) -> Result<()>;
}

/// Wraps a sealed repository and a key bundle into a cleartext
/// [`Repository`].
pub struct CryptoRepository {
    inner: Arc<dyn SealedRepository>,
    bundle: KeyBundle,
}

impl CryptoRepository {
    pub fn new(inner: Arc<dyn SealedRepository>, bundle: KeyBundle) -> Self {
        Self { inner, bundle }
    }
}

#[async_trait]
impl Repository for CryptoRepository {
    fn collection(&self) -> Collection {
        self.inner.collection()
    }

    async fn create_session(&self) -> Result<Box<dyn RepositorySession>> {
        Ok(Box::new(CryptoSession {
            collection: self.inner.collection(),
            inner: self.inner.create_session().await?,
            bundle: self.bundle.clone(),
        }))
    }
}

struct CryptoSession {
    collection: Collection,
    inner: Box<dyn SealedSession>,
    bundle: KeyBundle,
}

#[async_trait]
impl RepositorySession for CryptoSession {
    async fn fetch_since(
        &mut self,
        since: ServerTimestamp,
    ) -> Result<mpsc::Receiver<FetchEvent>> {
        let mut sealed_rx = self.inner.fetch_since(since).await?;
        let bundle = self.bundle.clone();
        let collection = self.collection;

        let (tx, rx) = mpsc::channel(FETCH_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = sealed_rx.recv().await {
                let out = match event {
                    SealedFetchEvent::Record(sealed) => {
                        match sealed.open(collection, &bundle) {
                            Ok(record) => FetchEvent::Record(record),
                            Err(e) => {
                                tracing::warn!(
                                    guid = %sealed.id,
                                    %collection,
                                    error = %e,
                                    "sealed record failed to open; aborting fetch"
                                );
                                let _ = tx
                                    .send(FetchEvent::Failed {
                                        guid: sealed.id,
                                        message: e.to_string(),
                                    })
                                    .await;
                                return;
                            }
                        }
                    }
                    SealedFetchEvent::Done { fetch_end } => FetchEvent::Done { fetch_end },
                };
                if tx.send(out).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn store(&mut self, record: Record) -> Result<()> {
        let mut sealed = CryptoRecord::seal(&record, &self.bundle)?;
        // The sealed wrapper keeps the record's modification time so
        // newest-wins still works at a sealed sink.
        sealed.modified = record.modified;
        self.inner.store(sealed).await
    }

    async fn store_done(&mut self) -> Result<StoreEnd> {
        self.inner.store_done().await
    }

    async fn finish(&mut self) -> Result<()> {
        self.inner.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    use weft_core::{Guid, Payload};

    /// Minimal sealed backend: a map of envelopes with a tick clock.
    struct SealedMemory {
        collection: Collection,
        inner: Arc<RwLock<SealedMemoryInner>>,
    }

    struct SealedMemoryInner {
        records: HashMap<Guid, CryptoRecord>,
        last_tick: i64,
    }

    impl SealedMemory {
        fn new(collection: Collection) -> Self {
            Self {
                collection,
                inner: Arc::new(RwLock::new(SealedMemoryInner {
                    records: HashMap::new(),
                    last_tick: 0,
                })),
            }
        }
    }

    struct SealedMemorySession {
        inner: Arc<RwLock<SealedMemoryInner>>,
    }

    #[async_trait]
    impl SealedRepository for SealedMemory {
        fn collection(&self) -> Collection {
            self.collection
        }

        async fn create_session(&self) -> Result<Box<dyn SealedSession>> {
            Ok(Box::new(SealedMemorySession {
                inner: Arc::clone(&self.inner),
            }))
        }
    }

    #[async_trait]
    impl SealedSession for SealedMemorySession {
        async fn fetch_since(
            &mut self,
            since: ServerTimestamp,
        ) -> Result<mpsc::Receiver<SealedFetchEvent>> {
            let (matches, fetch_end) = {
                let inner = self.inner.read().unwrap();
                let matches: Vec<CryptoRecord> = inner
                    .records
                    .values()
                    .filter(|r| r.modified >= since)
                    .cloned()
                    .collect();
                (matches, ServerTimestamp(inner.last_tick + 1))
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

        async fn store(&mut self, mut record: CryptoRecord) -> Result<()> {
            let mut inner = self.inner.write().unwrap();
            inner.last_tick += 1;
            record.modified = ServerTimestamp(inner.last_tick);
            inner.records.insert(record.id.clone(), record);
            Ok(())
        }

        async fn store_done(&mut self) -> Result<StoreEnd> {
            let inner = self.inner.read().unwrap();
            Ok(StoreEnd {
                timestamp: ServerTimestamp(inner.last_tick),
                failed: Vec::new(),
            })
        }

        async fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn password_record() -> Record {
        Record::new(
            Guid::random(),
            Payload::Password {
                hostname: "https://example.com".into(),
                form_submit_url: None,
                username: "user".into(),
                password: "hunter2".into(),
                username_field: String::new(),
                password_field: String::new(),
            },
        )
    }

    async fn drain(mut rx: mpsc::Receiver<FetchEvent>) -> Vec<FetchEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn records_round_trip_through_the_middleware() {
        let sealed = Arc::new(SealedMemory::new(Collection::Passwords));
        let bundle = KeyBundle::generate();
        let repo = CryptoRepository::new(sealed.clone(), bundle);

        let record = password_record();
        let mut session = repo.create_session().await.unwrap();
        session.store(record.clone()).await.unwrap();
        session.store_done().await.unwrap();
        session.finish().await.unwrap();

        // The backend never saw cleartext.
        {
            let inner = sealed.inner.read().unwrap();
            let stored = inner.records.get(&record.guid).unwrap();
            assert!(!stored.payload.contains("hunter2"));
        }

        let mut session = repo.create_session().await.unwrap();
        let events = drain(session.fetch_since(ServerTimestamp::ZERO).await.unwrap()).await;
        match &events[..] {
            [FetchEvent::Record(fetched), FetchEvent::Done { .. }] => {
                assert_eq!(fetched.guid, record.guid);
                assert_eq!(fetched.payload, record.payload);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tampered_envelope_poisons_the_fetch() {
        let sealed = Arc::new(SealedMemory::new(Collection::Passwords));
        let bundle = KeyBundle::generate();
        let repo = CryptoRepository::new(sealed.clone(), bundle);

        let record = password_record();
        let mut session = repo.create_session().await.unwrap();
        session.store(record.clone()).await.unwrap();
        session.finish().await.unwrap();

        // Corrupt the stored envelope's tag.
        {
            let mut inner = sealed.inner.write().unwrap();
            let stored = inner.records.get_mut(&record.guid).unwrap();
            stored.payload = stored.payload.replace(
                "\"hmac\":\"",
                "\"hmac\":\"00",
            );
        }

        let mut session = repo.create_session().await.unwrap();
        let events = drain(session.fetch_since(ServerTimestamp::ZERO).await.unwrap()).await;
        assert!(
            matches!(events.last(), Some(FetchEvent::Failed { .. })),
            "stream must end in a failure, got {events:?}"
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, FetchEvent::Done { .. })),
            "a poisoned fetch must not report completion"
        );
    }

    #[tokio::test]
    async fn wrong_bundle_cannot_read_the_collection() {
        let sealed = Arc::new(SealedMemory::new(Collection::Passwords));
        let repo = CryptoRepository::new(sealed.clone(), KeyBundle::generate());

        let mut session = repo.create_session().await.unwrap();
        session.store(password_record()).await.unwrap();
        session.finish().await.unwrap();

        let other = CryptoRepository::new(sealed, KeyBundle::generate());
        let mut session = other.create_session().await.unwrap();
        let events = drain(session.fetch_since(ServerTimestamp::ZERO).await.unwrap()).await;
        assert!(matches!(events.last(), Some(FetchEvent::Failed { .. })));
    }
}
