//! Test support for the weft sync engine.
//!
//! This crate is a dev-dependency for the rest of the workspace. It is not
//! published and makes no API stability promises.
//!
//! # Contents
//!
//! - [`fake`] — an in-process [`FakeServer`] implementing the full server
//!   trait, with failure injection and tampering helpers.
//! - [`fixtures`] — [`SyncFixture`], a pre-wired environment for running
//!   whole sessions in tests.
//! - [`generators`] — proptest strategies for records and payloads.
//! - [`vectors`] — golden key-derivation and envelope vectors with known
//!   inputs and outputs.

pub mod fake;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fake::{FakeServer, FAKE_ENDPOINT};
pub use fixtures::{SyncFixture, FIXTURE_ACCOUNT, FIXTURE_SECRET};
pub use generators::{guid, payload, record};
pub use vectors::{envelope_vector, key_derivation_vectors, verify_all_vectors};
