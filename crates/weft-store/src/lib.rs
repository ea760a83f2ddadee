//! # Weft Store
//!
//! Repository abstraction for Weft. Provides a trait-based interface for
//! record sources and sinks, an in-memory implementation, the crypto
//! middleware that seals and opens records in flight, and the SQLite
//! database that remembers sync progress between sessions.
//!
//! ## Overview
//!
//! Everything that produces or consumes records implements the
//! [`Repository`] trait: local stores, remote server collections, and
//! the middleware in between. The reconciliation engine drives a flow
//! between two repository sessions without knowing which is which.
//!
//! ## Key Types
//!
//! - [`Repository`] / [`RepositorySession`] - Cleartext record sources and sinks
//! - [`SealedRepository`] / [`SealedSession`] - The same interface over envelopes
//! - [`CryptoRepository`] - Middleware bridging the two
//! - [`MemoryRepository`] - In-memory repository for tests
//! - [`StateStore`] - SQLite-backed per-collection sync state
//! - [`FetchEvent`] - One event in a streamed fetch
//!
//! ## Design Notes
//!
//! - **Streamed fetches**: Records arrive over a bounded channel, ending
//!   with a `Done` event carrying the fetch watermark
//! - **Per-record stores**: One rejected record never sinks a batch;
//!   rejections surface in [`StoreEnd`]
//! - **Verify before trust**: The middleware aborts a fetch on the first
//!   envelope that fails to open

pub mod error;
pub mod memory;
pub mod middleware;
pub mod state;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryRepository;
pub use middleware::{CryptoRepository, SealedFetchEvent, SealedRepository, SealedSession};
pub use state::{CollectionState, StateStore};
pub use traits::{
    FetchEvent, Repository, RepositorySession, StoreEnd, FETCH_CHANNEL_CAPACITY,
};
