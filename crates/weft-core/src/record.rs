//! Record: the typed unit of user data flowing between repositories.
//!
//! A record is identified by a GUID within its owning collection and carries
//! a server-assigned modification time. Deletions travel as tombstones: a
//! record with `deleted` set and every type-specific field suppressed, so
//! other devices learn about the removal instead of silently resurrecting
//! the data.
//!
//! The per-collection field sets are a tagged union rather than a type
//! hierarchy, so dispatch on record type is exhaustive and checked by the
//! compiler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::{Collection, Guid, ServerTimestamp};

/// A single visit to a history URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    /// Visit time in microseconds since the epoch.
    pub date: i64,
    /// Transition type (link, typed, bookmark, ...), numeric on the wire.
    #[serde(rename = "type")]
    pub transition: u32,
}

/// One open tab within a tab-set record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabEntry {
    pub title: String,
    /// Back/forward history for the tab, most recent first.
    #[serde(rename = "urlHistory")]
    pub url_history: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "lastUsed")]
    pub last_used: i64,
}

/// Type-specific record fields, one variant per collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Client {
        name: String,
        #[serde(rename = "type")]
        device_type: String,
    },
    Tabs {
        #[serde(rename = "clientName")]
        client_name: String,
        tabs: Vec<TabEntry>,
    },
    Password {
        hostname: String,
        #[serde(rename = "formSubmitURL", skip_serializing_if = "Option::is_none")]
        form_submit_url: Option<String>,
        username: String,
        password: String,
        #[serde(rename = "usernameField", default)]
        username_field: String,
        #[serde(rename = "passwordField", default)]
        password_field: String,
    },
    Bookmark {
        title: String,
        #[serde(rename = "bmkUri")]
        bmk_uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
        #[serde(rename = "parentid", skip_serializing_if = "Option::is_none")]
        parent_id: Option<Guid>,
        #[serde(rename = "parentName", skip_serializing_if = "Option::is_none")]
        parent_name: Option<String>,
    },
    History {
        #[serde(rename = "histUri")]
        hist_uri: String,
        title: String,
        #[serde(default)]
        visits: Vec<Visit>,
    },
    FormField {
        name: String,
        value: String,
    },
}

impl Payload {
    /// The collection this payload belongs to.
    pub fn collection(&self) -> Collection {
        match self {
            Payload::Client { .. } => Collection::Clients,
            Payload::Tabs { .. } => Collection::Tabs,
            Payload::Password { .. } => Collection::Passwords,
            Payload::Bookmark { .. } => Collection::Bookmarks,
            Payload::History { .. } => Collection::History,
            Payload::FormField { .. } => Collection::FormData,
        }
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(CoreError::MalformedPayload(format!(
                "payload serialized to non-object {other}"
            ))),
            Err(e) => Err(CoreError::MalformedPayload(e.to_string())),
        }
    }

    fn from_fields(collection: Collection, value: Value) -> Result<Self, CoreError> {
        // The cleartext carries no type tag of its own; the variants have
        // mutually exclusive required fields, so untagged deserialization
        // is unambiguous, and the ambient collection is checked after.
        let payload: Payload = serde_json::from_value(value)
            .map_err(|e| CoreError::MalformedPayload(e.to_string()))?;
        if payload.collection() != collection {
            return Err(CoreError::PayloadCollectionMismatch {
                collection: collection.name(),
                kind: payload.collection().name(),
            });
        }
        Ok(payload)
    }
}

/// A typed unit of user data, or a tombstone marking its deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Identifier, unique within `collection`.
    pub guid: Guid,
    /// The owning collection.
    pub collection: Collection,
    /// Server-assigned last-modified time. `ZERO` until first upload.
    pub modified: ServerTimestamp,
    /// Tombstone flag. A deleted record carries no payload.
    pub deleted: bool,
    /// Type-specific fields; `None` exactly when `deleted`.
    pub payload: Option<Payload>,
}

impl Record {
    /// Create a live record. The payload's variant fixes the collection.
    pub fn new(guid: Guid, payload: Payload) -> Self {
        Self {
            guid,
            collection: payload.collection(),
            modified: ServerTimestamp::ZERO,
            deleted: false,
            payload: Some(payload),
        }
    }

    /// Create a tombstone for a record in `collection`.
    pub fn tombstone(guid: Guid, collection: Collection) -> Self {
        Self {
            guid,
            collection,
            modified: ServerTimestamp::ZERO,
            deleted: true,
            payload: None,
        }
    }

    /// Set the server-assigned modification time.
    pub fn with_modified(mut self, modified: ServerTimestamp) -> Self {
        self.modified = modified;
        self
    }

    /// Check the record's structural invariants.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.deleted {
            if self.payload.is_some() {
                return Err(CoreError::TombstoneWithFields);
            }
            return Ok(());
        }
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| CoreError::MalformedPayload("live record without payload".into()))?;
        if payload.collection() != self.collection {
            return Err(CoreError::PayloadCollectionMismatch {
                collection: self.collection.name(),
                kind: payload.collection().name(),
            });
        }
        Ok(())
    }

    /// Serialize to the cleartext JSON object that gets sealed into an
    /// envelope: `{"id": ..., fields...}` or `{"id": ..., "deleted": true}`.
    pub fn to_cleartext(&self) -> Result<Value, CoreError> {
        self.validate()?;
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.guid.as_str().to_string()));
        if self.deleted {
            map.insert("deleted".into(), Value::Bool(true));
        } else if let Some(payload) = &self.payload {
            for (k, v) in payload.to_fields()? {
                map.insert(k, v);
            }
        }
        Ok(Value::Object(map))
    }

    /// Parse a cleartext JSON object fetched from `collection`.
    pub fn from_cleartext(
        collection: Collection,
        modified: ServerTimestamp,
        value: Value,
    ) -> Result<Self, CoreError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(CoreError::MalformedPayload(format!(
                    "cleartext is not an object: {other}"
                )))
            }
        };
        let guid = match map.remove("id") {
            Some(Value::String(s)) => Guid::parse(&s)?,
            _ => return Err(CoreError::MalformedPayload("missing record id".into())),
        };
        let deleted = matches!(map.remove("deleted"), Some(Value::Bool(true)));
        if deleted {
            return Ok(Record::tombstone(guid, collection).with_modified(modified));
        }
        let payload = Payload::from_fields(collection, Value::Object(map))?;
        Ok(Record::new(guid, payload).with_modified(modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark() -> Record {
        Record::new(
            Guid::from("abcdefghijkl"),
            Payload::Bookmark {
                title: "Example".into(),
                bmk_uri: "https://example.com/".into(),
                description: None,
                tags: vec!["reading".into()],
                parent_id: Some(Guid::from("menu________")),
                parent_name: Some("Bookmarks Menu".into()),
            },
        )
    }

    #[test]
    fn cleartext_round_trip() {
        let record = bookmark().with_modified(ServerTimestamp(1_000));
        let value = record.to_cleartext().unwrap();
        assert_eq!(value["id"], "abcdefghijkl");
        assert_eq!(value["bmkUri"], "https://example.com/");
        let back =
            Record::from_cleartext(Collection::Bookmarks, ServerTimestamp(1_000), value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn tombstone_round_trip() {
        let record = Record::tombstone(Guid::from("abcdefghijkl"), Collection::History)
            .with_modified(ServerTimestamp(5));
        let value = record.to_cleartext().unwrap();
        assert_eq!(value["deleted"], true);
        assert!(value.get("histUri").is_none());
        let back =
            Record::from_cleartext(Collection::History, ServerTimestamp(5), value).unwrap();
        assert!(back.deleted);
        assert!(back.payload.is_none());
    }

    #[test]
    fn payload_collection_mismatch_is_rejected() {
        let value = serde_json::json!({
            "id": "abcdefghijkl",
            "hostname": "https://example.com",
            "username": "u",
            "password": "p",
        });
        let err = Record::from_cleartext(Collection::Bookmarks, ServerTimestamp::ZERO, value)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::MalformedPayload(_) | CoreError::PayloadCollectionMismatch { .. }
        ));
    }

    #[test]
    fn history_visits_parse() {
        let value = serde_json::json!({
            "id": "histguid0001",
            "histUri": "https://example.com/page",
            "title": "A page",
            "visits": [{"date": 1319149012372425i64, "type": 1}],
        });
        let record =
            Record::from_cleartext(Collection::History, ServerTimestamp::ZERO, value).unwrap();
        match record.payload.unwrap() {
            Payload::History { visits, .. } => {
                assert_eq!(visits.len(), 1);
                assert_eq!(visits[0].transition, 1);
            }
            other => panic!("wrong payload variant: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_mismatched_collection() {
        let mut record = bookmark();
        record.collection = Collection::History;
        assert!(record.validate().is_err());
    }
}
