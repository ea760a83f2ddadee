//! Session stages and their ordering.
//!
//! A session is a straight line: preconditions, endpoint, server
//! metadata, keys, then one stage per collection. [`StagePhase`] names
//! every position on that line and [`StagePhase::next`] is the single
//! place the order is written down. The stages themselves are plain
//! values handed to the session at construction, so a caller (or a test)
//! can run a shortened or instrumented pipeline.

use async_trait::async_trait;

use weft_core::Collection;

use crate::error::Result;
use crate::global::SessionContext;

/// A position in the session pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    /// Not syncing.
    Idle,
    /// Check local requirements and derive the sync key bundle.
    CheckPreconditions,
    /// Resolve the storage endpoint.
    EnsureEndpoint,
    /// Fetch `info/collections`.
    FetchInfoCollections,
    /// Fetch and evaluate `meta/global`.
    FetchMetaGlobal,
    /// Fetch or provision the collection key ring.
    EnsureKeys,
    /// Synchronize one collection.
    SyncCollection(Collection),
    /// All stages ran.
    Completed,
}

impl StagePhase {
    /// The phase that follows this one. Total and cycle-free apart from
    /// `Completed`, which returns to `Idle`.
    pub fn next(self) -> StagePhase {
        use StagePhase::*;
        match self {
            Idle => CheckPreconditions,
            CheckPreconditions => EnsureEndpoint,
            EnsureEndpoint => FetchInfoCollections,
            FetchInfoCollections => FetchMetaGlobal,
            FetchMetaGlobal => EnsureKeys,
            EnsureKeys => SyncCollection(Collection::SYNC_ORDER[0]),
            SyncCollection(current) => {
                let order = Collection::SYNC_ORDER;
                match order.iter().position(|c| *c == current) {
                    Some(i) if i + 1 < order.len() => SyncCollection(order[i + 1]),
                    _ => Completed,
                }
            }
            Completed => Idle,
        }
    }
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagePhase::SyncCollection(c) => write!(f, "sync({c})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// One unit of session work.
#[async_trait]
pub trait SyncStage: Send + Sync {
    /// The phase this stage occupies.
    fn phase(&self) -> StagePhase;

    /// Run the stage against shared session state. Returning an error
    /// aborts the whole session; a stage that merely has nothing to do
    /// returns `Ok`.
    async fn execute(&self, ctx: &mut SessionContext) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_is_a_single_cycle_through_every_phase() {
        let mut phase = StagePhase::Idle;
        let mut seen = vec![phase];
        loop {
            phase = phase.next();
            if phase == StagePhase::Idle {
                break;
            }
            assert!(!seen.contains(&phase), "phase {phase} repeated");
            seen.push(phase);
        }
        // Idle + 5 fixed phases + one per collection + Completed.
        assert_eq!(seen.len(), 6 + Collection::SYNC_ORDER.len() + 1);
    }

    #[test]
    fn collections_run_in_declared_order() {
        let mut phase = StagePhase::EnsureKeys;
        for expected in Collection::SYNC_ORDER {
            phase = phase.next();
            assert_eq!(phase, StagePhase::SyncCollection(expected));
        }
        assert_eq!(phase.next(), StagePhase::Completed);
    }
}
