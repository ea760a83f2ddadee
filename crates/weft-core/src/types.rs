//! Strong type definitions for Weft.
//!
//! Identifiers and timestamps are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::CoreError;

/// A 12-character record identifier, unique within a collection.
///
/// New GUIDs are the URL-safe base64 encoding of 9 random bytes, which is
/// what the storage servers hand out as well.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Expected length of a GUID in characters.
    pub const LENGTH: usize = 12;

    /// Generate a fresh random GUID.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 9];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap an existing identifier, checking its length.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() || s.len() > 64 {
            return Err(CoreError::InvalidGuid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.0)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Guid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A server-observed modification time in milliseconds since the epoch.
///
/// The storage servers report time as decimal seconds with millisecond
/// precision ("1318263043.65"); we convert at the boundary and keep
/// milliseconds internally. Local wall-clock time is never used for sync
/// decisions.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServerTimestamp(pub i64);

impl ServerTimestamp {
    /// The epoch: "never synced".
    pub const ZERO: Self = Self(0);

    /// Milliseconds since the epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Parse a decimal-seconds string as reported by the server.
    pub fn from_decimal_seconds(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        let (secs, frac) = match trimmed.split_once('.') {
            Some((s, f)) => (s, f),
            None => (trimmed, ""),
        };
        let secs: i64 = secs
            .parse()
            .map_err(|_| CoreError::InvalidTimestamp(s.to_string()))?;
        // Truncate or zero-pad the fraction to exactly three digits.
        let mut millis = 0i64;
        for i in 0..3 {
            let digit = frac.as_bytes().get(i).copied().unwrap_or(b'0');
            if !digit.is_ascii_digit() {
                return Err(CoreError::InvalidTimestamp(s.to_string()));
            }
            millis = millis * 10 + (digit - b'0') as i64;
        }
        Ok(Self(secs * 1000 + millis))
    }

    /// Format as the decimal-seconds string the server expects.
    pub fn to_decimal_seconds(&self) -> String {
        format!("{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

impl fmt::Debug for ServerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerTimestamp({})", self.0)
    }
}

impl fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, independently synchronized category of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Clients,
    Tabs,
    Passwords,
    Bookmarks,
    History,
    #[serde(rename = "forms")]
    FormData,
}

impl Collection {
    /// All collections in the fixed order they are synchronized.
    ///
    /// Clients first (device metadata gates the rest), then user data from
    /// most to least latency-sensitive.
    pub const SYNC_ORDER: [Collection; 6] = [
        Collection::Clients,
        Collection::Tabs,
        Collection::Passwords,
        Collection::Bookmarks,
        Collection::History,
        Collection::FormData,
    ];

    /// The collection's name on the server.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Clients => "clients",
            Collection::Tabs => "tabs",
            Collection::Passwords => "passwords",
            Collection::Bookmarks => "bookmarks",
            Collection::History => "history",
            Collection::FormData => "forms",
        }
    }

    /// Parse a server-side collection name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "clients" => Some(Collection::Clients),
            "tabs" => Some(Collection::Tabs),
            "passwords" => Some(Collection::Passwords),
            "bookmarks" => Some(Collection::Bookmarks),
            "history" => Some(Collection::History),
            "forms" => Some(Collection::FormData),
            _ => None,
        }
    }

    /// The engine version this client implements for the collection.
    pub fn engine_version(&self) -> u32 {
        match self {
            Collection::Bookmarks => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_guids_are_twelve_chars() {
        for _ in 0..64 {
            assert_eq!(Guid::random().as_str().len(), Guid::LENGTH);
        }
    }

    #[test]
    fn random_guids_are_distinct() {
        let a = Guid::random();
        let b = Guid::random();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(Guid::parse("").is_err());
    }

    #[test]
    fn decimal_seconds_round_trip() {
        let ts = ServerTimestamp::from_decimal_seconds("1318263043.65").unwrap();
        assert_eq!(ts.as_millis(), 1_318_263_043_650);
        assert_eq!(ts.to_decimal_seconds(), "1318263043.650");
        assert_eq!(
            ServerTimestamp::from_decimal_seconds(&ts.to_decimal_seconds()).unwrap(),
            ts
        );
    }

    #[test]
    fn decimal_seconds_without_fraction() {
        let ts = ServerTimestamp::from_decimal_seconds("1318263043").unwrap();
        assert_eq!(ts.as_millis(), 1_318_263_043_000);
    }

    #[test]
    fn decimal_seconds_rejects_garbage() {
        assert!(ServerTimestamp::from_decimal_seconds("not-a-time").is_err());
        assert!(ServerTimestamp::from_decimal_seconds("12.x4").is_err());
    }

    #[test]
    fn collection_names_round_trip() {
        for c in Collection::SYNC_ORDER {
            assert_eq!(Collection::from_name(c.name()), Some(c));
        }
    }
}
