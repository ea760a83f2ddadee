//! # Weft
//!
//! The unified API for the weft system - end-to-end encrypted sync of
//! per-device data over an untrusted server.
//!
//! ## Overview
//!
//! Weft keeps collections of records (passwords, bookmarks, history,
//! tabs, form data, client metadata) converged across a user's devices:
//!
//! - **Records**: Typed, per-collection documents addressed by GUID
//! - **Envelopes**: AES-256-CBC + HMAC-SHA256 sealing; the server only
//!   ever sees ciphertext
//! - **Key ring**: Per-collection key bundles, themselves stored sealed
//!   under a key derived from the user's secret
//! - **Sessions**: A staged pipeline that provisions, validates, and then
//!   reconciles each collection in a fixed order
//!
//! ## Key Concepts
//!
//! - **Sync secret**: The friendly-base32 string the user carries between
//!   devices. Everything else derives from it.
//! - **Watermark**: The server timestamp a collection has been synced up
//!   to. Fetches are inclusive of the watermark.
//! - **Tombstone**: A deleted record; deletions propagate like edits.
//! - **Fresh start**: Wiping and re-provisioning the server when its
//!   storage format is missing or outdated.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weft::{ClientConfig, SyncClient};
//! use weft::core::Collection;
//! use weft::store::MemoryRepository;
//! # async fn example(server: Arc<dyn weft::sync::SyncServer>) {
//! let config = ClientConfig {
//!     account_id: "johndoe".into(),
//!     sync_secret: "abcdeabcdeabcdeabcdeabcdea".into(),
//! };
//! let mut client = SyncClient::open(config, server, "weft.db").unwrap();
//!
//! let passwords = MemoryRepository::new(Collection::Passwords);
//! client.register(Collection::Passwords, Arc::new(passwords.clone()));
//!
//! let reports = client.sync().await.unwrap();
//! for report in reports {
//!     println!("{}: {} down, {} up", report.collection, report.downloaded, report.uploaded);
//! }
//! # }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `weft::core` - Core types (Record, Payload, Collection, Guid)
//! - `weft::crypto` - Key derivation, envelopes, and the key ring
//! - `weft::store` - Repository traits, in-memory backend, state store
//! - `weft::sync` - Reconciliation flows and the session pipeline

pub mod client;
pub mod error;

// Re-export component crates
pub use weft_core as core;
pub use weft_crypto as crypto;
pub use weft_store as store;
pub use weft_sync as sync;

// Re-export main types for convenience
pub use client::{ClientConfig, SyncClient};
pub use error::{ClientError, Result};

// Re-export commonly used component types
pub use weft_core::{Collection, Guid, Payload, Record, ServerTimestamp};
pub use weft_sync::{AbortReason, StagePhase, SyncReport};
