//! The client: unified API for the weft system.
//!
//! A [`SyncClient`] owns the pieces a long-lived application needs to keep
//! its collections converged with a sync server: a session orchestrator,
//! persistent per-collection state, and a registry of local repositories.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use weft_core::Collection;
use weft_store::{Repository, StateStore};
use weft_sync::{
    GlobalSession, SessionConfig, SessionContext, StagePhase, SyncReport, SyncServer,
};

use crate::error::Result;

/// Configuration for a [`SyncClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account identifier, mixed into key derivation.
    pub account_id: String,
    /// The user's friendly-base32 sync secret.
    pub sync_secret: String,
}

/// The main client struct.
///
/// Provides a unified API for:
/// - Registering local repositories per collection
/// - Running full sync sessions
/// - Enabling and disabling collections
/// - Recovering from aborted sessions
pub struct SyncClient {
    config: ClientConfig,
    server: Arc<dyn SyncServer>,
    state: Arc<StateStore>,
    local: HashMap<Collection, Arc<dyn Repository>>,
    session: GlobalSession,
}

impl SyncClient {
    /// Open a client with persistent state at `path`.
    pub fn open(
        config: ClientConfig,
        server: Arc<dyn SyncServer>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let state = StateStore::open(path)?;
        Ok(Self::with_state(config, server, Arc::new(state)))
    }

    /// Open a client whose state lives only in memory. Every sync after a
    /// restart starts from zero watermarks.
    pub fn in_memory(config: ClientConfig, server: Arc<dyn SyncServer>) -> Result<Self> {
        let state = StateStore::open_in_memory()?;
        Ok(Self::with_state(config, server, Arc::new(state)))
    }

    /// Build a client over an already-open state store.
    pub fn with_state(
        config: ClientConfig,
        server: Arc<dyn SyncServer>,
        state: Arc<StateStore>,
    ) -> Self {
        Self {
            config,
            server,
            state,
            local: HashMap::new(),
            session: GlobalSession::with_default_stages(),
        }
    }

    /// The persistent state store, for direct inspection.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Collection Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Register the local repository backing `collection`. Collections
    /// without a registered repository are skipped during sync.
    pub fn register(&mut self, collection: Collection, repository: Arc<dyn Repository>) {
        self.local.insert(collection, repository);
    }

    /// Enable or disable syncing for a collection. Disabled collections
    /// keep their state but are skipped.
    pub fn set_enabled(&self, collection: Collection, enabled: bool) -> Result<()> {
        self.state.set_enabled(collection, enabled)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one full sync session across every registered collection.
    ///
    /// On success returns one report per synced collection. On failure the
    /// session keeps the phase it stopped at; call [`SyncClient::reset`]
    /// once the abort has been dealt with, then sync again.
    pub async fn sync(&mut self) -> Result<Vec<SyncReport>> {
        let mut ctx = SessionContext::new(
            SessionConfig {
                account_id: self.config.account_id.clone(),
                sync_secret: self.config.sync_secret.clone(),
            },
            Arc::clone(&self.server),
            Arc::clone(&self.state),
            self.local.clone(),
        );
        let reports = self.session.sync(&mut ctx).await?;
        info!(collections = reports.len(), "sync session completed");
        Ok(reports)
    }

    /// The phase the session is currently parked at. [`StagePhase::Idle`]
    /// means a sync can start.
    pub fn phase(&self) -> StagePhase {
        self.session.phase()
    }

    /// Acknowledge an abort and return the session to idle.
    pub fn reset(&mut self) {
        self.session.reset();
    }
}
