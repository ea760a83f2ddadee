//! A paired encryption/authentication key set.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Key length in bytes for both halves of a bundle.
pub const KEY_LENGTH: usize = 32;

/// An AES-256 encryption key and an HMAC-SHA256 key that travel together.
///
/// Bundles are never mixed and matched: a record sealed under one bundle
/// is only ever opened with the same bundle. Key material is wiped when
/// the bundle is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyBundle {
    encryption: [u8; KEY_LENGTH],
    hmac: [u8; KEY_LENGTH],
}

impl KeyBundle {
    pub fn new(encryption: [u8; KEY_LENGTH], hmac: [u8; KEY_LENGTH]) -> Self {
        Self { encryption, hmac }
    }

    /// A bundle of fresh random keys, used when provisioning a new key
    /// ring from scratch.
    pub fn generate() -> Self {
        let mut encryption = [0u8; KEY_LENGTH];
        let mut hmac = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut encryption);
        rand::thread_rng().fill_bytes(&mut hmac);
        Self { encryption, hmac }
    }

    /// Build a bundle from the two base64 strings a key ring carries.
    pub fn from_base64(encryption_b64: &str, hmac_b64: &str) -> Result<Self, CryptoError> {
        let decode = |label: &str, b64: &str| -> Result<[u8; KEY_LENGTH], CryptoError> {
            let bytes = STANDARD
                .decode(b64)
                .map_err(|e| CryptoError::InvalidKey(format!("{label} key: {e}")))?;
            bytes.try_into().map_err(|_| {
                CryptoError::InvalidKey(format!("{label} key is not {KEY_LENGTH} bytes"))
            })
        };
        Ok(Self {
            encryption: decode("encryption", encryption_b64)?,
            hmac: decode("hmac", hmac_b64)?,
        })
    }

    pub fn encryption_key(&self) -> &[u8; KEY_LENGTH] {
        &self.encryption
    }

    pub fn hmac_key(&self) -> &[u8; KEY_LENGTH] {
        &self.hmac
    }

    /// The base64 pair used when a bundle is written into a key ring.
    pub fn to_base64(&self) -> (String, String) {
        (STANDARD.encode(self.encryption), STANDARD.encode(self.hmac))
    }
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("KeyBundle { .. }")
    }
}
