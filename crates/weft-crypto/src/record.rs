//! Sealed records in their on-the-wire basic storage object form.
//!
//! The server never sees record contents. What it stores is a small
//! wrapper: an id, the server-assigned modification time, and a `payload`
//! string that is itself the JSON of an [`EncryptedEnvelope`]. This
//! module converts between that wrapper and the cleartext [`Record`]
//! types the rest of the client works with.

use serde::{Deserialize, Serialize};

use weft_core::{Collection, Guid, Record, ServerTimestamp};

use crate::envelope::EncryptedEnvelope;
use crate::error::CryptoError;
use crate::key_bundle::KeyBundle;

/// A record as uploaded to or downloaded from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoRecord {
    pub id: Guid,
    /// Server-assigned, in decimal seconds on the wire.
    #[serde(with = "decimal_seconds", default)]
    pub modified: ServerTimestamp,
    /// Stringified [`EncryptedEnvelope`] JSON.
    pub payload: String,
}

impl CryptoRecord {
    /// Seal a cleartext record under `bundle`.
    ///
    /// The `modified` field is zero on upload; the server assigns the
    /// real value and reports it back.
    pub fn seal(record: &Record, bundle: &KeyBundle) -> Result<Self, CryptoError> {
        let cleartext = record
            .to_cleartext()
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let bytes =
            serde_json::to_vec(&cleartext).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let envelope = EncryptedEnvelope::seal(bundle, &bytes)?;
        let payload =
            serde_json::to_string(&envelope).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok(Self {
            id: record.guid.clone(),
            modified: ServerTimestamp::ZERO,
            payload,
        })
    }

    /// Verify, decrypt, and parse back into a cleartext record.
    ///
    /// The id inside the cleartext must match the wrapper id, otherwise a
    /// record has been swapped under a valid envelope.
    pub fn open(&self, collection: Collection, bundle: &KeyBundle) -> Result<Record, CryptoError> {
        let envelope: EncryptedEnvelope = serde_json::from_str(&self.payload)
            .map_err(|e| CryptoError::Malformed(format!("payload: {e}")))?;
        let cleartext = envelope.open(bundle)?;
        let value: serde_json::Value = serde_json::from_slice(&cleartext)
            .map_err(|e| CryptoError::Malformed(format!("cleartext: {e}")))?;
        let record = Record::from_cleartext(collection, self.modified, value)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        if record.guid != self.id {
            return Err(CryptoError::Malformed(format!(
                "cleartext id {} does not match record id {}",
                record.guid, self.id
            )));
        }
        Ok(record)
    }
}

/// Wire timestamps are decimal seconds; internally they are integer
/// milliseconds.
mod decimal_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use weft_core::ServerTimestamp;

    pub fn serialize<S: Serializer>(ts: &ServerTimestamp, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(ts.as_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ServerTimestamp, D::Error> {
        let seconds = f64::deserialize(d)?;
        Ok(ServerTimestamp((seconds * 1000.0).round() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::Payload;

    fn history_record() -> Record {
        Record::new(
            Guid::random(),
            Payload::History {
                hist_uri: "https://example.com/".into(),
                title: "Example".into(),
                visits: vec![],
            },
        )
    }

    #[test]
    fn seal_then_open_preserves_record() {
        let bundle = KeyBundle::generate();
        let record = history_record();
        let sealed = CryptoRecord::seal(&record, &bundle).unwrap();
        assert_eq!(sealed.id, record.guid);

        let opened = sealed.open(Collection::History, &bundle).unwrap();
        assert_eq!(opened.guid, record.guid);
        assert_eq!(opened.payload, record.payload);
        assert!(!opened.deleted);
    }

    #[test]
    fn tombstones_survive_sealing() {
        let bundle = KeyBundle::generate();
        let record = Record::tombstone(Guid::random(), Collection::Passwords);
        let sealed = CryptoRecord::seal(&record, &bundle).unwrap();
        let opened = sealed.open(Collection::Passwords, &bundle).unwrap();
        assert!(opened.deleted);
        assert!(opened.payload.is_none());
    }

    #[test]
    fn swapped_id_is_rejected() {
        let bundle = KeyBundle::generate();
        let mut sealed = CryptoRecord::seal(&history_record(), &bundle).unwrap();
        sealed.id = Guid::random();
        assert!(matches!(
            sealed.open(Collection::History, &bundle),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_bundle_is_an_authentication_failure() {
        let sealed = CryptoRecord::seal(&history_record(), &KeyBundle::generate()).unwrap();
        assert!(matches!(
            sealed.open(Collection::History, &KeyBundle::generate()),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn wire_modified_is_decimal_seconds() {
        let record = CryptoRecord {
            id: Guid::random(),
            modified: ServerTimestamp(1_318_263_043_650),
            payload: String::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["modified"], 1_318_263_043.65);

        let back: CryptoRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.modified, record.modified);
    }
}
