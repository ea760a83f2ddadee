//! # Weft Core
//!
//! Pure primitives for the Weft sync client: records, GUIDs, and server
//! timestamps.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the data that flows between repositories.
//!
//! ## Key Types
//!
//! - [`Record`] - A typed unit of user data, keyed by GUID within a collection
//! - [`Payload`] - Tagged union over collection kind (bookmarks, history, ...)
//! - [`Guid`] - 12-character random record identifier
//! - [`ServerTimestamp`] - Server-assigned modification time in milliseconds
//!
//! ## Collections
//!
//! Each record belongs to a named collection. Collections are synchronized
//! independently, each with its own engine version and sync identifier. See
//! [`Collection`].

pub mod error;
pub mod record;
pub mod types;

pub use error::CoreError;
pub use record::{Payload, Record, TabEntry, Visit};
pub use types::{Collection, Guid, ServerTimestamp};
