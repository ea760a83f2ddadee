//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur while deriving keys or handling envelopes.
///
/// `Authentication` and `Malformed` are deliberately separate: an HMAC
/// mismatch means the ciphertext (or the keys) cannot be trusted and must
/// abort the session, while `Malformed` points at a structural problem in
/// otherwise-authenticated data.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication tag did not match the received ciphertext.
    #[error("record authentication failed: HMAC mismatch")]
    Authentication,

    /// Authenticated data failed structural parsing.
    #[error("malformed crypto payload: {0}")]
    Malformed(String),

    /// The sync secret is not valid friendly base32.
    #[error("invalid sync secret encoding: {0}")]
    InvalidSecret(String),

    /// A key was the wrong length or otherwise unusable.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// No key bundle is available for the requested operation.
    #[error("no key bundle set")]
    MissingKeys,

    /// Block cipher padding was invalid after an authenticated decrypt.
    #[error("invalid ciphertext padding")]
    Padding,
}
