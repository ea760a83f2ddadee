//! The standard stage pipeline.
//!
//! Each stage does one thing to the shared context and gets out of the
//! way. None of them loop or retry; a failure surfaces immediately and
//! the orchestrator decides what it means.

use std::sync::Arc;

use async_trait::async_trait;

use weft_core::Collection;
use weft_crypto::{derive_sync_key_bundle, CollectionKeyring};
use weft_store::{CollectionState, CryptoRepository};

use crate::error::{Result, SyncError};
use crate::global::{fresh_start, SessionContext};
use crate::meta::MetaGlobalOutcome;
use crate::server::ServerError;
use crate::session::{Synchronizer, SynchronizerConfig};
use crate::stage::{StagePhase, SyncStage};

/// The standard pipeline in execution order.
pub fn default_stages() -> Vec<Box<dyn SyncStage>> {
    let mut stages: Vec<Box<dyn SyncStage>> = vec![
        Box::new(CheckPreconditions),
        Box::new(EnsureEndpoint),
        Box::new(FetchInfoCollections),
        Box::new(FetchMetaGlobal),
        Box::new(EnsureKeys),
    ];
    for collection in Collection::SYNC_ORDER {
        stages.push(Box::new(SyncCollectionStage { collection }));
    }
    stages
}

/// Derive the sync key bundle before anything touches the network. A bad
/// secret fails here, cheaply and offline.
pub struct CheckPreconditions;

#[async_trait]
impl SyncStage for CheckPreconditions {
    fn phase(&self) -> StagePhase {
        StagePhase::CheckPreconditions
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<()> {
        let bundle = derive_sync_key_bundle(&ctx.config.sync_secret, &ctx.config.account_id)?;
        ctx.sync_bundle = Some(bundle);
        Ok(())
    }
}

/// Resolve which storage node the account lives on.
pub struct EnsureEndpoint;

#[async_trait]
impl SyncStage for EnsureEndpoint {
    fn phase(&self) -> StagePhase {
        StagePhase::EnsureEndpoint
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<()> {
        let endpoint = ctx.server.ensure_endpoint().await?;
        tracing::debug!(%endpoint, "storage endpoint resolved");
        ctx.endpoint = Some(endpoint);
        Ok(())
    }
}

/// Fetch the server's collection timestamps.
pub struct FetchInfoCollections;

#[async_trait]
impl SyncStage for FetchInfoCollections {
    fn phase(&self) -> StagePhase {
        StagePhase::FetchInfoCollections
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<()> {
        ctx.info = Some(ctx.server.info_collections().await?);
        Ok(())
    }
}

/// Fetch `meta/global` and decide whether this client may proceed.
///
/// Three outcomes: the record is usable and its sync id either matches
/// ours or forces a full local reset; the record is from an older format
/// (or missing entirely) and the account gets a fresh start; or the
/// record is from a newer client and we must stop.
pub struct FetchMetaGlobal;

#[async_trait]
impl SyncStage for FetchMetaGlobal {
    fn phase(&self) -> StagePhase {
        StagePhase::FetchMetaGlobal
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<()> {
        let meta = match ctx.server.fetch_meta_global().await {
            Ok((meta, _modified)) => meta,
            Err(ServerError::NotFound) => return fresh_start(ctx).await,
            Err(e) => return Err(e.into()),
        };

        match meta.evaluate() {
            MetaGlobalOutcome::RequiresUpgrade { server } => {
                return Err(SyncError::StorageVersionTooNew {
                    server,
                    supported: crate::meta::STORAGE_VERSION,
                })
            }
            MetaGlobalOutcome::FreshStartRequired => return fresh_start(ctx).await,
            MetaGlobalOutcome::Usable => {}
        }

        match ctx.state.global_sync_id()? {
            Some(known) if known == meta.sync_id => {}
            known => {
                // Another client reset the account. Our watermarks and
                // any cached keys describe a server that no longer
                // exists.
                tracing::info!(
                    old = known.as_deref().unwrap_or("<none>"),
                    new = %meta.sync_id,
                    "global sync id changed; resetting local state"
                );
                ctx.state.reset_all()?;
                ctx.state.set_global_sync_id(&meta.sync_id)?;
                ctx.keyring = None;
            }
        }

        ctx.meta = Some(meta);
        Ok(())
    }
}

/// Fetch the collection key ring, or provision one if the account has
/// none. An unauthenticatable ring aborts the session.
pub struct EnsureKeys;

#[async_trait]
impl SyncStage for EnsureKeys {
    fn phase(&self) -> StagePhase {
        StagePhase::EnsureKeys
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<()> {
        if ctx.keyring.is_some() {
            // A fresh start already installed one.
            return Ok(());
        }
        let bundle = ctx
            .sync_bundle
            .as_ref()
            .ok_or(SyncError::InvalidState("keys before key derivation"))?;

        let keyring = match ctx.server.fetch_keys().await {
            Ok(record) => CollectionKeyring::from_crypto_record(&record, bundle)?,
            Err(ServerError::NotFound) => {
                tracing::info!("no key ring on server; provisioning one");
                let keyring = CollectionKeyring::fresh();
                ctx.server
                    .put_keys(&keyring.to_crypto_record(bundle)?)
                    .await?;
                keyring
            }
            Err(e) => return Err(e.into()),
        };
        ctx.keyring = Some(keyring);
        Ok(())
    }
}

/// Synchronize one collection end to end.
pub struct SyncCollectionStage {
    pub collection: Collection,
}

#[async_trait]
impl SyncStage for SyncCollectionStage {
    fn phase(&self) -> StagePhase {
        StagePhase::SyncCollection(self.collection)
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<()> {
        let collection = self.collection;
        let meta = ctx
            .meta
            .as_ref()
            .ok_or(SyncError::InvalidState("collection sync before metadata"))?;
        let keyring = ctx
            .keyring
            .as_ref()
            .ok_or(SyncError::InvalidState("collection sync before keys"))?;

        let Some(engine) = meta.engine(collection) else {
            tracing::info!(%collection, "not enabled for this account; skipping");
            return Ok(());
        };
        if engine.version > collection.engine_version() {
            // Records written in a format we cannot read. Touching them
            // risks destroying data for newer clients.
            tracing::warn!(
                %collection,
                server_version = engine.version,
                "record format is newer than this client; skipping"
            );
            return Ok(());
        }
        let Some(local) = ctx.local.get(&collection).cloned() else {
            tracing::debug!(%collection, "no local repository; skipping");
            return Ok(());
        };

        // Load our durable state, adopting the engine's incarnation if
        // it changed or we have never synced this collection.
        let state = match ctx.state.get(collection)? {
            Some(state) if state.sync_id == engine.sync_id => state,
            Some(stale) => {
                tracing::info!(
                    %collection,
                    old = %stale.sync_id,
                    new = %engine.sync_id,
                    "collection sync id changed; resetting watermarks"
                );
                ctx.state.reset_collection(collection, &engine.sync_id)?;
                // `reset_collection` leaves the enabled flag alone; so
                // does adoption.
                let mut adopted = CollectionState::fresh(collection, engine.sync_id.clone());
                adopted.enabled = stale.enabled;
                adopted
            }
            None => {
                let fresh = CollectionState::fresh(collection, engine.sync_id.clone());
                ctx.state.upsert(collection, &fresh)?;
                fresh
            }
        };
        if !state.enabled {
            tracing::debug!(%collection, "disabled locally; skipping");
            return Ok(());
        }
        if let Some(info) = &ctx.info {
            if !info.changed_since(collection, state.last_sync) {
                tracing::debug!(%collection, "no server-side changes since last sync");
            }
        }

        let remote = CryptoRepository::new(
            ctx.server.collection(collection),
            keyring.bundle_for(collection).clone(),
        );
        let synchronizer = Synchronizer::new(Arc::new(remote), local)?;
        let report = synchronizer
            .synchronize(SynchronizerConfig {
                remote_watermark: state.last_sync,
                local_watermark: state.last_local_sync,
            })
            .await?;

        // Watermarks move only after both flows completed.
        ctx.state.set_watermarks(
            collection,
            report.new_remote_watermark,
            report.new_local_watermark,
        )?;
        tracing::info!(
            %collection,
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            "collection synchronized"
        );
        ctx.reports.push(report);
        Ok(())
    }
}
