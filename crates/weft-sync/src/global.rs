//! The session orchestrator.
//!
//! A [`GlobalSession`] owns an ordered list of stages and runs them once
//! per sync. Stages communicate only through the shared
//! [`SessionContext`]; the orchestrator itself holds nothing but the
//! pipeline and the current phase. When a stage fails, the session stops
//! where it is and reports a closed [`AbortReason`]. What to do about an
//! abort (reauthenticate, wait out a backoff, upgrade) is the caller's
//! problem; the session never retries on its own.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use weft_core::Collection;
use weft_crypto::{CollectionKeyring, CryptoError, KeyBundle};
use weft_store::{Repository, StateStore, StoreError};

use crate::error::SyncError;
use crate::meta::{InfoCollections, MetaGlobal, STORAGE_VERSION};
use crate::server::{ServerError, SyncServer};
use crate::session::SyncReport;
use crate::stage::{StagePhase, SyncStage};

/// Account credentials a session runs under.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Account identifier, mixed into key derivation.
    pub account_id: String,
    /// The user's friendly-base32 sync secret.
    pub sync_secret: String,
}

/// Shared state the stages read and write.
pub struct SessionContext {
    pub config: SessionConfig,
    pub server: Arc<dyn SyncServer>,
    pub state: Arc<StateStore>,
    /// Local repository per collection. Collections without one are
    /// skipped.
    pub local: HashMap<Collection, Arc<dyn Repository>>,

    // Established as stages run.
    pub sync_bundle: Option<KeyBundle>,
    pub endpoint: Option<String>,
    pub info: Option<InfoCollections>,
    pub meta: Option<MetaGlobal>,
    pub keyring: Option<CollectionKeyring>,
    pub reports: Vec<SyncReport>,
}

impl SessionContext {
    pub fn new(
        config: SessionConfig,
        server: Arc<dyn SyncServer>,
        state: Arc<StateStore>,
        local: HashMap<Collection, Arc<dyn Repository>>,
    ) -> Self {
        Self {
            config,
            server,
            state,
            local,
            sync_bundle: None,
            endpoint: None,
            info: None,
            meta: None,
            keyring: None,
            reports: Vec::new(),
        }
    }
}

/// Why a session stopped early. Closed: every abort a caller can see is
/// named here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// The session is not idle; a run is in progress or an earlier
    /// abort has not been acknowledged with [`GlobalSession::reset`].
    #[error("session is not idle")]
    Busy,

    /// Credentials rejected; reauthentication needed before retrying.
    #[error("credentials rejected")]
    Unauthorized,

    /// The server asked us to stay away for at least this long.
    #[error("server requested backoff of {millis}ms")]
    Backoff { millis: u64 },

    /// The service is shutting down permanently.
    #[error("server has reached end of life")]
    EndOfLife,

    /// The account's storage format is newer than this client.
    #[error("server storage version {server} requires a client upgrade")]
    RequiresUpgrade { server: u32 },

    /// The key ring failed authentication: wrong secret or a tampered
    /// server. Nothing encrypted can be trusted.
    #[error("key ring could not be authenticated")]
    KeyringUntrusted,

    /// A stage failed for a reason with no dedicated handling.
    #[error("stage {phase} failed: {message}")]
    StageFailed { phase: StagePhase, message: String },
}

fn classify(phase: StagePhase, error: SyncError) -> AbortReason {
    match error {
        SyncError::Server(ServerError::Unauthorized) => AbortReason::Unauthorized,
        SyncError::Server(ServerError::Backoff { millis }) => AbortReason::Backoff { millis },
        SyncError::Server(ServerError::EndOfLife) => AbortReason::EndOfLife,
        SyncError::StorageVersionTooNew { server, .. } => AbortReason::RequiresUpgrade { server },
        SyncError::Crypto(CryptoError::Authentication)
        | SyncError::Store(StoreError::Crypto(CryptoError::Authentication)) => {
            AbortReason::KeyringUntrusted
        }
        other => AbortReason::StageFailed {
            phase,
            message: other.to_string(),
        },
    }
}

/// Runs the stage pipeline.
pub struct GlobalSession {
    stages: Vec<Box<dyn SyncStage>>,
    phase: StagePhase,
}

impl GlobalSession {
    /// Build a session around an explicit pipeline.
    pub fn new(stages: Vec<Box<dyn SyncStage>>) -> Self {
        Self {
            stages,
            phase: StagePhase::Idle,
        }
    }

    /// The standard pipeline, in [`StagePhase::next`] order.
    pub fn with_default_stages() -> Self {
        Self::new(crate::stages::default_stages())
    }

    /// Where the session currently is.
    pub fn phase(&self) -> StagePhase {
        self.phase
    }

    /// Acknowledge an abort and return to idle.
    pub fn reset(&mut self) {
        self.phase = StagePhase::Idle;
    }

    /// Run every stage once. On success the session returns to idle and
    /// yields the per-collection reports. On abort the session stays
    /// parked at the failing phase until [`reset`](Self::reset).
    pub async fn sync(
        &mut self,
        ctx: &mut SessionContext,
    ) -> std::result::Result<Vec<SyncReport>, AbortReason> {
        if self.phase != StagePhase::Idle {
            return Err(AbortReason::Busy);
        }

        for stage in &self.stages {
            self.phase = stage.phase();
            tracing::debug!(phase = %self.phase, "entering stage");
            if let Err(e) = stage.execute(ctx).await {
                let reason = classify(self.phase, e);
                tracing::warn!(phase = %self.phase, %reason, "session aborted");
                return Err(reason);
            }
        }

        self.phase = StagePhase::Completed;
        let reports = std::mem::take(&mut ctx.reports);
        tracing::info!(collections = reports.len(), "session complete");
        self.phase = StagePhase::Idle;
        Ok(reports)
    }
}

/// Rebuild the account from scratch: wipe the server, upload fresh
/// metadata and a fresh key ring, and forget all local progress.
///
/// Runs when the account was never provisioned or when its storage
/// format predates ours.
pub async fn fresh_start(ctx: &mut SessionContext) -> crate::error::Result<()> {
    let bundle = ctx
        .sync_bundle
        .as_ref()
        .ok_or(SyncError::InvalidState("fresh start before key derivation"))?
        .clone();

    tracing::info!("fresh start: wiping server and reprovisioning");
    ctx.server.wipe().await?;

    let meta = MetaGlobal::fresh();
    debug_assert_eq!(meta.storage_version, STORAGE_VERSION);
    ctx.server.put_meta_global(&meta).await?;

    ctx.state.reset_all()?;
    ctx.state.set_global_sync_id(&meta.sync_id)?;
    for collection in Collection::SYNC_ORDER {
        if let Some(engine) = meta.engine(collection) {
            let mut seed = weft_store::CollectionState::fresh(collection, engine.sync_id.clone());
            // Enablement is the user's choice, not server state; it
            // survives reprovisioning.
            if let Some(existing) = ctx.state.get(collection)? {
                seed.enabled = existing.enabled;
            }
            ctx.state.upsert(collection, &seed)?;
        }
    }

    let keyring = CollectionKeyring::fresh();
    ctx.server.put_keys(&keyring.to_crypto_record(&bundle)?).await?;

    ctx.meta = Some(meta);
    ctx.keyring = Some(keyring);
    Ok(())
}
