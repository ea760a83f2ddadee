//! # Weft Sync
//!
//! The reconciliation engine and staged session state machine.
//!
//! ## Overview
//!
//! A sync is a pipeline of stages run by a [`GlobalSession`]: check
//! preconditions, resolve the storage endpoint, fetch server metadata,
//! establish keys, then synchronize each collection in a fixed order.
//! Per collection, a [`Synchronizer`] runs two one-directional record
//! flows ([`RecordsChannel`]): download then upload, each advancing its
//! own inclusive watermark.
//!
//! ## Key Properties
//!
//! - **Convergent**: after a sync, both sides hold the newest version of
//!   every record, tombstones included
//! - **Resumable**: watermarks move only after a flow pair completes, and
//!   are clamped below any rejected record so nothing is skipped
//! - **Fail-stop**: auth rejections, backoff requests, and end-of-life
//!   notices abort the session with a closed [`AbortReason`]; retry
//!   policy lives with the caller
//!
//! ## Session Flow
//!
//! ```text
//! Idle -> CheckPreconditions -> EnsureEndpoint -> FetchInfoCollections
//!      -> FetchMetaGlobal -> EnsureKeys
//!      -> SyncCollection(clients .. forms)  -> Completed -> Idle
//! ```

pub mod channel;
pub mod error;
pub mod global;
pub mod meta;
pub mod server;
pub mod session;
pub mod stage;
pub mod stages;

pub use channel::{FlowReport, RecordsChannel};
pub use error::{Result, SyncError};
pub use global::{fresh_start, AbortReason, GlobalSession, SessionConfig, SessionContext};
pub use meta::{
    EngineSettings, InfoCollections, MetaGlobal, MetaGlobalOutcome, STORAGE_VERSION,
};
pub use server::{ServerError, SyncServer};
pub use session::{SyncReport, Synchronizer, SynchronizerConfig};
pub use stage::{StagePhase, SyncStage};
pub use stages::default_stages;
