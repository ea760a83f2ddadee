//! Durable sync state: per-collection watermarks and identities.
//!
//! This is the small SQLite database that survives between sessions. It
//! remembers, per collection, how far we have synced (`last_sync`), which
//! server-side incarnation of the collection we were talking to
//! (`sync_id`), the record format version we wrote, and whether the user
//! has the collection enabled. A sync-id change on the server invalidates
//! the watermark, so resets always touch both together.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use weft_core::{Collection, ServerTimestamp};

use crate::error::{Result, StoreError};

/// Current schema version.
const CURRENT_VERSION: u32 = 1;

/// Persistent state for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionState {
    /// Server-side incarnation of the collection. Changes when another
    /// client wipes or rebuilds it.
    pub sync_id: String,
    /// Record format version we last wrote.
    pub engine_version: u32,
    /// Remote high-water mark: everything on the server up to here has
    /// been applied locally. Inclusive.
    pub last_sync: ServerTimestamp,
    /// Local high-water mark: everything changed locally up to here has
    /// been uploaded. Inclusive.
    pub last_local_sync: ServerTimestamp,
    /// Whether the user syncs this collection at all.
    pub enabled: bool,
}

impl CollectionState {
    /// Fresh state for a collection we have never synced.
    pub fn fresh(collection: Collection, sync_id: String) -> Self {
        Self {
            sync_id,
            engine_version: collection.engine_version(),
            last_sync: ServerTimestamp::ZERO,
            last_local_sync: ServerTimestamp::ZERO,
            enabled: true,
        }
    }
}

/// SQLite-backed store of sync state.
///
/// Thread-safe via internal Mutex; operations are short single-row
/// reads and writes.
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Open the state database at the given path, creating it and
    /// running migrations as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory state database. Useful for testing.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&conn)
    }

    /// Read the state for one collection.
    pub fn get(&self, collection: Collection) -> Result<Option<CollectionState>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT sync_id, engine_version, last_sync, last_local_sync, enabled
                 FROM collection_state WHERE collection = ?1",
                params![collection.name()],
                |row| {
                    Ok(CollectionState {
                        sync_id: row.get(0)?,
                        engine_version: row.get(1)?,
                        last_sync: ServerTimestamp(row.get(2)?),
                        last_local_sync: ServerTimestamp(row.get(3)?),
                        enabled: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// Insert or replace the state for one collection.
    pub fn upsert(&self, collection: Collection, state: &CollectionState) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collection_state
                     (collection, sync_id, engine_version, last_sync, last_local_sync, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection) DO UPDATE SET
                     sync_id = excluded.sync_id,
                     engine_version = excluded.engine_version,
                     last_sync = excluded.last_sync,
                     last_local_sync = excluded.last_local_sync,
                     enabled = excluded.enabled",
                params![
                    collection.name(),
                    state.sync_id,
                    state.engine_version,
                    state.last_sync.as_millis(),
                    state.last_local_sync.as_millis(),
                    state.enabled as i64,
                ],
            )?;
            Ok(())
        })
    }

    /// Advance (or rewind) one collection's watermarks after a completed
    /// flow pair.
    pub fn set_watermarks(
        &self,
        collection: Collection,
        last_sync: ServerTimestamp,
        last_local_sync: ServerTimestamp,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE collection_state
                 SET last_sync = ?2, last_local_sync = ?3 WHERE collection = ?1",
                params![
                    collection.name(),
                    last_sync.as_millis(),
                    last_local_sync.as_millis()
                ],
            )?;
            Ok(())
        })
    }

    /// Adopt a new server-side incarnation of one collection. The
    /// watermark is zeroed: none of our previous progress applies.
    pub fn reset_collection(&self, collection: Collection, sync_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE collection_state
                 SET sync_id = ?2, last_sync = 0, last_local_sync = 0
                 WHERE collection = ?1",
                params![collection.name(), sync_id],
            )?;
            Ok(())
        })
    }

    /// Zero every collection watermark. Used when the global sync id
    /// changes and nothing we know about the server still holds.
    pub fn reset_all(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE collection_state SET last_sync = 0, last_local_sync = 0",
                [],
            )?;
            Ok(())
        })
    }

    /// Set whether a collection syncs. Valid before the first sync:
    /// a collection never seen gets a placeholder row whose sync id is
    /// adopted from the server later.
    pub fn set_enabled(&self, collection: Collection, enabled: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collection_state
                     (collection, sync_id, engine_version, last_sync, last_local_sync, enabled)
                 VALUES (?1, '', ?2, 0, 0, ?3)
                 ON CONFLICT(collection) DO UPDATE SET enabled = excluded.enabled",
                params![
                    collection.name(),
                    collection.engine_version(),
                    enabled as i64
                ],
            )?;
            Ok(())
        })
    }

    /// The global sync id we last saw in the server's metadata record.
    pub fn global_sync_id(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM global_state WHERE key = 'sync_id'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn set_global_sync_id(&self, sync_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO global_state (key, value) VALUES ('sync_id', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![sync_id],
            )?;
            Ok(())
        })
    }
}

/// Initialize or migrate the database schema. Idempotent.
fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            match version {
                1 => apply_v1(&tx)?,
                _ => {
                    return Err(StoreError::Migration(format!(
                        "unknown migration version: {}",
                        version
                    )))
                }
            }
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, now_millis()],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Per-collection sync progress
        CREATE TABLE collection_state (
            collection TEXT PRIMARY KEY,
            sync_id TEXT NOT NULL,
            engine_version INTEGER NOT NULL,
            last_sync INTEGER NOT NULL DEFAULT 0,        -- Unix ms, inclusive
            last_local_sync INTEGER NOT NULL DEFAULT 0,  -- Unix ms, inclusive
            enabled INTEGER NOT NULL DEFAULT 1
        );

        -- Account-wide values (global sync id)
        CREATE TABLE global_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
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

    #[test]
    fn round_trips_collection_state() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get(Collection::Bookmarks).unwrap().is_none());

        let state = CollectionState::fresh(Collection::Bookmarks, "aaaaaaaaaaaa".into());
        store.upsert(Collection::Bookmarks, &state).unwrap();
        assert_eq!(store.get(Collection::Bookmarks).unwrap().unwrap(), state);

        store
            .set_watermarks(
                Collection::Bookmarks,
                ServerTimestamp(1_700_000_000_000),
                ServerTimestamp(1_700_000_000_500),
            )
            .unwrap();
        let read = store.get(Collection::Bookmarks).unwrap().unwrap();
        assert_eq!(read.last_sync, ServerTimestamp(1_700_000_000_000));
        assert_eq!(read.last_local_sync, ServerTimestamp(1_700_000_000_500));
    }

    #[test]
    fn reset_collection_zeroes_the_watermark() {
        let store = StateStore::open_in_memory().unwrap();
        let mut state = CollectionState::fresh(Collection::History, "aaaaaaaaaaaa".into());
        state.last_sync = ServerTimestamp(42);
        store.upsert(Collection::History, &state).unwrap();

        store
            .reset_collection(Collection::History, "bbbbbbbbbbbb")
            .unwrap();
        let read = store.get(Collection::History).unwrap().unwrap();
        assert_eq!(read.sync_id, "bbbbbbbbbbbb");
        assert_eq!(read.last_sync, ServerTimestamp::ZERO);
        assert_eq!(read.last_local_sync, ServerTimestamp::ZERO);
        assert!(read.enabled);
    }

    #[test]
    fn reset_all_touches_every_collection() {
        let store = StateStore::open_in_memory().unwrap();
        for collection in Collection::SYNC_ORDER {
            let mut state = CollectionState::fresh(collection, "aaaaaaaaaaaa".into());
            state.last_sync = ServerTimestamp(99);
            store.upsert(collection, &state).unwrap();
        }
        store.reset_all().unwrap();
        for collection in Collection::SYNC_ORDER {
            let read = store.get(collection).unwrap().unwrap();
            assert_eq!(read.last_sync, ServerTimestamp::ZERO);
            assert_eq!(read.sync_id, "aaaaaaaaaaaa");
        }
    }

    #[test]
    fn set_enabled_works_before_the_first_sync() {
        let store = StateStore::open_in_memory().unwrap();
        store.set_enabled(Collection::History, false).unwrap();

        // A placeholder row exists and remembers the choice.
        let read = store.get(Collection::History).unwrap().unwrap();
        assert!(!read.enabled);
        assert_eq!(read.sync_id, "");
        assert_eq!(read.last_sync, ServerTimestamp::ZERO);

        store.set_enabled(Collection::History, true).unwrap();
        assert!(store.get(Collection::History).unwrap().unwrap().enabled);
    }

    #[test]
    fn global_sync_id_round_trips() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.global_sync_id().unwrap().is_none());
        store.set_global_sync_id("gggggggggggg").unwrap();
        assert_eq!(store.global_sync_id().unwrap().unwrap(), "gggggggggggg");
        store.set_global_sync_id("hhhhhhhhhhhh").unwrap();
        assert_eq!(store.global_sync_id().unwrap().unwrap(), "hhhhhhhhhhhh");
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");
        {
            let store = StateStore::open(&path).unwrap();
            store
                .upsert(
                    Collection::Tabs,
                    &CollectionState::fresh(Collection::Tabs, "aaaaaaaaaaaa".into()),
                )
                .unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert!(store.get(Collection::Tabs).unwrap().is_some());
    }
}
