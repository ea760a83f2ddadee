//! Pre-wired sync environments for integration tests.
//!
//! A [`SyncFixture`] bundles everything a [`GlobalSession`] needs to run
//! end to end: a [`FakeServer`], an in-memory state store, and one
//! [`MemoryRepository`] per collection. Tests seed the local repositories,
//! run a session against [`SyncFixture::context`], and assert on what the
//! fake server saw.
//!
//! [`GlobalSession`]: weft_sync::GlobalSession

use std::collections::HashMap;
use std::sync::Arc;

use weft_core::Collection;
use weft_store::{MemoryRepository, Repository, StateStore};
use weft_sync::{SessionConfig, SessionContext};

use crate::fake::FakeServer;

/// Account identifier every fixture syncs under.
pub const FIXTURE_ACCOUNT: &str = "johndoe";

/// Friendly-base32 sync secret paired with [`FIXTURE_ACCOUNT`].
pub const FIXTURE_SECRET: &str = "abcdeabcdeabcdeabcdeabcdea";

/// A complete in-process sync environment.
pub struct SyncFixture {
    pub server: FakeServer,
    pub state: Arc<StateStore>,
    pub config: SessionConfig,
    locals: HashMap<Collection, MemoryRepository>,
}

impl SyncFixture {
    /// A fresh environment: empty server, empty state store, and an empty
    /// local repository for every collection in the sync order.
    pub fn new() -> Self {
        Self::with_server(FakeServer::new())
    }

    /// A fresh device attached to an existing server. Two fixtures built
    /// over the same [`FakeServer`] model two devices on one account.
    pub fn with_server(server: FakeServer) -> Self {
        let state = StateStore::open_in_memory().expect("in-memory state store");
        let mut locals = HashMap::new();
        for &collection in &Collection::SYNC_ORDER {
            locals.insert(collection, MemoryRepository::new(collection));
        }
        Self {
            server,
            state: Arc::new(state),
            config: SessionConfig {
                account_id: FIXTURE_ACCOUNT.to_string(),
                sync_secret: FIXTURE_SECRET.to_string(),
            },
            locals,
        }
    }

    /// The local repository for `collection`, for seeding records and
    /// asserting on what a sync left behind.
    pub fn local(&self, collection: Collection) -> &MemoryRepository {
        &self.locals[&collection]
    }

    /// A session context wired to this fixture's server, state, and local
    /// repositories. Each call yields an independent context over the same
    /// shared stores, so a test can run several sessions back to back.
    pub fn context(&self) -> SessionContext {
        let local: HashMap<Collection, Arc<dyn Repository>> = self
            .locals
            .iter()
            .map(|(&c, repo)| (c, Arc::new(repo.clone()) as Arc<dyn Repository>))
            .collect();
        SessionContext::new(
            self.config.clone(),
            Arc::new(self.server.clone()),
            Arc::clone(&self.state),
            local,
        )
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use weft_core::{Guid, Payload, Record};
    use weft_sync::{GlobalSession, StagePhase};

    use super::*;

    fn password(guid: &str) -> Record {
        Record::new(
            Guid::from(guid),
            Payload::Password {
                hostname: "https://example.com".into(),
                form_submit_url: None,
                username: "john".into(),
                password: "hunter2".into(),
                username_field: String::new(),
                password_field: String::new(),
            },
        )
    }

    #[tokio::test]
    async fn fixture_runs_a_full_session() {
        let fixture = SyncFixture::new();
        fixture
            .local(Collection::Passwords)
            .put_local(password("records00001"));

        let mut session = GlobalSession::with_default_stages();
        let mut ctx = fixture.context();
        let reports = session.sync(&mut ctx).await.expect("first sync");

        assert_eq!(session.phase(), StagePhase::Idle);
        assert_eq!(reports.len(), Collection::SYNC_ORDER.len());
        assert!(fixture.server.has_keys());
        assert_eq!(fixture.server.record_count(Collection::Passwords), 1);
    }

    #[tokio::test]
    async fn contexts_share_server_and_state() {
        let fixture = SyncFixture::new();

        let mut session = GlobalSession::with_default_stages();
        let mut ctx = fixture.context();
        session.sync(&mut ctx).await.expect("first sync");

        // A second context sees the provisioned server; nothing is
        // re-uploaded.
        let meta_before = fixture.server.meta().expect("meta after first sync");
        let mut second = GlobalSession::with_default_stages();
        let mut ctx = fixture.context();
        second.sync(&mut ctx).await.expect("second sync");
        let meta_after = fixture.server.meta().expect("meta after second sync");
        assert_eq!(meta_before.sync_id, meta_after.sync_id);
    }
}
