//! The collection key ring.
//!
//! Per-collection key bundles live on the server inside a single sealed
//! record (id `keys` in the `crypto` collection), itself sealed under the
//! bundle derived from the user's sync secret. Collections without an
//! entry of their own fall back to the default bundle. Keys are stored
//! and used exactly as found; they are never re-derived client side.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use weft_core::{Collection, Guid, ServerTimestamp};

use crate::error::CryptoError;
use crate::key_bundle::KeyBundle;
use crate::record::CryptoRecord;

/// Well-known id of the key-ring record.
pub const KEYS_RECORD_ID: &str = "keys";
/// Server collection the key-ring record lives in.
pub const KEYS_COLLECTION: &str = "crypto";

/// Cleartext wire form of the key-ring record.
#[derive(Serialize, Deserialize)]
struct WireKeys {
    id: String,
    collection: String,
    /// `[encryption_b64, hmac_b64]`.
    default: [String; 2],
    #[serde(default)]
    collections: HashMap<String, [String; 2]>,
}

/// The decrypted key ring held for the duration of a session.
#[derive(Clone)]
pub struct CollectionKeyring {
    default: KeyBundle,
    collections: HashMap<String, KeyBundle>,
}

impl CollectionKeyring {
    /// A brand-new ring with a random default bundle and no
    /// per-collection entries, for provisioning a fresh account.
    pub fn fresh() -> Self {
        Self {
            default: KeyBundle::generate(),
            collections: HashMap::new(),
        }
    }

    pub fn default_bundle(&self) -> &KeyBundle {
        &self.default
    }

    /// The bundle that seals records of `collection`.
    pub fn bundle_for(&self, collection: Collection) -> &KeyBundle {
        self.collections
            .get(collection.name())
            .unwrap_or(&self.default)
    }

    /// Whether `collection` has a dedicated bundle rather than the
    /// default.
    pub fn has_dedicated_bundle(&self, collection: Collection) -> bool {
        self.collections.contains_key(collection.name())
    }

    /// Replace the bundle for one collection, the granularity at which
    /// keys are rotated.
    pub fn set_bundle(&mut self, collection: Collection, bundle: KeyBundle) {
        self.collections.insert(collection.name().to_string(), bundle);
    }

    /// Open a downloaded key-ring record with the sync-secret bundle.
    ///
    /// Any failure here is fatal to the session: a ring that cannot be
    /// authenticated means either the wrong secret or a tampered server.
    pub fn from_crypto_record(
        record: &CryptoRecord,
        sync_bundle: &KeyBundle,
    ) -> Result<Self, CryptoError> {
        let opened = record_cleartext(record, sync_bundle)?;
        let wire: WireKeys =
            serde_json::from_slice(&opened).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        if wire.id != KEYS_RECORD_ID || wire.collection != KEYS_COLLECTION {
            return Err(CryptoError::Malformed(format!(
                "not a key-ring record: id {:?} collection {:?}",
                wire.id, wire.collection
            )));
        }
        let default = KeyBundle::from_base64(&wire.default[0], &wire.default[1])?;
        let mut collections = HashMap::with_capacity(wire.collections.len());
        for (name, [enc, mac]) in wire.collections {
            collections.insert(name, KeyBundle::from_base64(&enc, &mac)?);
        }
        Ok(Self {
            default,
            collections,
        })
    }

    /// Seal the ring for upload under the sync-secret bundle.
    pub fn to_crypto_record(&self, sync_bundle: &KeyBundle) -> Result<CryptoRecord, CryptoError> {
        let (enc, mac) = self.default.to_base64();
        let wire = WireKeys {
            id: KEYS_RECORD_ID.to_string(),
            collection: KEYS_COLLECTION.to_string(),
            default: [enc, mac],
            collections: self
                .collections
                .iter()
                .map(|(name, bundle)| {
                    let (enc, mac) = bundle.to_base64();
                    (name.clone(), [enc, mac])
                })
                .collect(),
        };
        let cleartext =
            serde_json::to_vec(&wire).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let envelope = crate::envelope::EncryptedEnvelope::seal(sync_bundle, &cleartext)?;
        let payload =
            serde_json::to_string(&envelope).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok(CryptoRecord {
            id: Guid::parse(KEYS_RECORD_ID).map_err(|e| CryptoError::Malformed(e.to_string()))?,
            modified: ServerTimestamp::ZERO,
            payload,
        })
    }
}

fn record_cleartext(
    record: &CryptoRecord,
    sync_bundle: &KeyBundle,
) -> Result<Vec<u8>, CryptoError> {
    let envelope: crate::envelope::EncryptedEnvelope = serde_json::from_str(&record.payload)
        .map_err(|e| CryptoError::Malformed(format!("payload: {e}")))?;
    envelope.open(sync_bundle)
}

impl std::fmt::Debug for CollectionKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionKeyring")
            .field("collections", &self.collections.len())
            .finish_non_exhaustive()
    }
}
