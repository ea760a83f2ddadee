//! Account-wide server metadata.
//!
//! Two small unencrypted records steer every session. `info/collections`
//! maps collection names to their last-modified times, which lets us skip
//! collections with nothing new. The `meta/global` record declares the
//! storage format version, the account's global sync id, and the set of
//! engines other clients are syncing; it is how clients coordinate
//! resets and format upgrades without talking to each other directly.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use weft_core::{Collection, Guid, ServerTimestamp};

/// The storage format version this client reads and writes.
pub const STORAGE_VERSION: u32 = 5;

/// Per-engine settings inside `meta/global`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Record format version the engine's records use.
    pub version: u32,
    /// Server-side incarnation of the engine's collection.
    #[serde(rename = "syncID")]
    pub sync_id: String,
}

/// The `meta/global` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaGlobal {
    #[serde(rename = "storageVersion")]
    pub storage_version: u32,
    #[serde(rename = "syncID")]
    pub sync_id: String,
    /// Engines by collection name. A collection absent here is not
    /// being synced by the account.
    pub engines: BTreeMap<String, EngineSettings>,
}

impl MetaGlobal {
    /// A brand-new record enabling every collection, as written during a
    /// fresh start.
    pub fn fresh() -> Self {
        let engines = Collection::SYNC_ORDER
            .into_iter()
            .map(|c| {
                (
                    c.name().to_string(),
                    EngineSettings {
                        version: c.engine_version(),
                        sync_id: Guid::random().to_string(),
                    },
                )
            })
            .collect();
        Self {
            storage_version: STORAGE_VERSION,
            sync_id: Guid::random().to_string(),
            engines,
        }
    }

    pub fn engine(&self, collection: Collection) -> Option<&EngineSettings> {
        self.engines.get(collection.name())
    }

    /// How this record's storage version relates to what we support.
    pub fn evaluate(&self) -> MetaGlobalOutcome {
        if self.storage_version > STORAGE_VERSION {
            MetaGlobalOutcome::RequiresUpgrade {
                server: self.storage_version,
            }
        } else if self.storage_version < STORAGE_VERSION {
            // An older format on the server gets rebuilt, not read.
            MetaGlobalOutcome::FreshStartRequired
        } else {
            MetaGlobalOutcome::Usable
        }
    }
}

/// Verdict on a fetched `meta/global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaGlobalOutcome {
    /// Same format; proceed.
    Usable,
    /// Older format; wipe and rebuild the server.
    FreshStartRequired,
    /// Newer format; this client must not touch the account.
    RequiresUpgrade { server: u32 },
}

/// The `info/collections` map: collection name to last-modified time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfoCollections(HashMap<String, ServerTimestamp>);

impl InfoCollections {
    pub fn new(map: HashMap<String, ServerTimestamp>) -> Self {
        Self(map)
    }

    pub fn modified(&self, name: &str) -> Option<ServerTimestamp> {
        self.0.get(name).copied()
    }

    /// Whether `collection` changed on the server after our watermark.
    /// A collection the server has never seen reports unchanged.
    pub fn changed_since(&self, collection: Collection, since: ServerTimestamp) -> bool {
        match self.modified(collection.name()) {
            Some(modified) => modified >= since,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_meta_enables_every_collection() {
        let meta = MetaGlobal::fresh();
        assert_eq!(meta.storage_version, STORAGE_VERSION);
        for collection in Collection::SYNC_ORDER {
            let engine = meta.engine(collection).unwrap();
            assert_eq!(engine.version, collection.engine_version());
            assert_eq!(engine.sync_id.len(), Guid::LENGTH);
        }
    }

    #[test]
    fn evaluate_orders_versions() {
        let mut meta = MetaGlobal::fresh();
        assert_eq!(meta.evaluate(), MetaGlobalOutcome::Usable);

        meta.storage_version = STORAGE_VERSION + 1;
        assert_eq!(
            meta.evaluate(),
            MetaGlobalOutcome::RequiresUpgrade {
                server: STORAGE_VERSION + 1
            }
        );

        meta.storage_version = STORAGE_VERSION - 1;
        assert_eq!(meta.evaluate(), MetaGlobalOutcome::FreshStartRequired);
    }

    #[test]
    fn meta_wire_format_uses_camel_case() {
        let meta = MetaGlobal::fresh();
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("storageVersion").is_some());
        assert!(value.get("syncID").is_some());
        let engine = &value["engines"][Collection::Bookmarks.name()];
        assert!(engine.get("syncID").is_some());
        assert!(engine.get("version").is_some());

        let back: MetaGlobal = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn unknown_collections_report_unchanged() {
        let info = InfoCollections::default();
        assert!(!info.changed_since(Collection::Tabs, ServerTimestamp::ZERO));

        let mut map = HashMap::new();
        map.insert("tabs".to_string(), ServerTimestamp(100));
        let info = InfoCollections::new(map);
        assert!(info.changed_since(Collection::Tabs, ServerTimestamp(100)));
        assert!(!info.changed_since(Collection::Tabs, ServerTimestamp(101)));
    }
}
