//! # Weft Crypto
//!
//! End-to-end encryption for Weft: deterministic key derivation from the
//! user's sync secret, the authenticated record envelope, and the
//! server-held collection key ring.
//!
//! ## Overview
//!
//! Every record payload is sealed inside an [`EncryptedEnvelope`]
//! (AES-256-CBC + HMAC-SHA256 over the transmitted ciphertext) before it
//! leaves the device. The per-collection key bundles come from a
//! [`CollectionKeyring`], itself bootstrapped by decrypting a server-held
//! envelope with the bundle derived from the user's secret — see
//! [`derive_sync_key_bundle`].
//!
//! ## Invariants
//!
//! - The authentication tag is verified against the exact bytes received,
//!   in constant time, before any decryption is attempted.
//! - Key bundles are never generated randomly per record; they are derived
//!   or delivered inside the decrypted key ring.
//! - A failed authentication or parse during key-ring bootstrap is fatal:
//!   there is no plaintext fallback.

pub mod envelope;
pub mod error;
pub mod hkdf;
pub mod key_bundle;
pub mod keyring;
pub mod record;

pub use envelope::EncryptedEnvelope;
pub use error::CryptoError;
pub use hkdf::{decode_friendly_base32, derive_sync_key_bundle, hkdf_expand, hkdf_extract};
pub use key_bundle::KeyBundle;
pub use keyring::CollectionKeyring;
pub use record::CryptoRecord;

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
