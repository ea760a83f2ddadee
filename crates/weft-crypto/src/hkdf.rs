//! HKDF-SHA256 key derivation (RFC 5869) and the sync-key bundle scheme.
//!
//! The sync secret the user holds is a 26-character "friendly" base32
//! string. Its decoded 16 bytes are used directly as the pseudorandom key
//! for the expand step, with an info string that binds the derivation to
//! both a fixed purpose tag and the account identifier. Expanding 64 bytes
//! yields the encryption key (first block) and the HMAC key (second block):
//! the RFC's per-block counter doubles as the purpose byte, 1 for
//! encryption and 2 for authentication.
//!
//! Everything here is deterministic and does no I/O.

use data_encoding::BASE32_NOPAD;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::key_bundle::{KeyBundle, KEY_LENGTH};

/// Fixed purpose tag mixed into the sync-key bundle derivation.
pub const SYNC_KEY_INFO: &[u8] = b"Sync-AES_256_CBC-HMAC256";

/// RFC 5869 extract step: HMAC-SHA256(salt, ikm) -> pseudorandom key.
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// RFC 5869 expand step: iterated HMAC over the pseudorandom key, a
/// per-block counter, and `info`, truncated to `out.len()` bytes.
///
/// Implemented directly over HMAC rather than through the `hkdf` crate's
/// expand, because the sync scheme keys it with the raw 16-byte decoded
/// secret and the crate rejects pseudorandom keys shorter than the hash
/// output.
pub fn hkdf_expand(prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    const HASH_LENGTH: usize = 32;
    if out.len() > 255 * HASH_LENGTH {
        return Err(CryptoError::InvalidKey(
            "requested HKDF output too long".into(),
        ));
    }
    let mut block: Vec<u8> = Vec::new();
    let mut written = 0;
    let mut counter = 1u8;
    while written < out.len() {
        let mut mac = Hmac::<Sha256>::new_from_slice(prk)
            .map_err(|_| CryptoError::InvalidKey("unusable pseudorandom key".into()))?;
        mac.update(&block);
        mac.update(info);
        mac.update(&[counter]);
        block = mac.finalize().into_bytes().to_vec();
        let take = block.len().min(out.len() - written);
        out[written..written + take].copy_from_slice(&block[..take]);
        written += take;
        if written == out.len() {
            break;
        }
        // The length guard keeps this at most 255, the last value a
        // block byte can hold.
        counter += 1;
    }
    Ok(())
}

/// Decode a friendly base32 sync secret.
///
/// The user-facing alphabet substitutes `8` for `L` and `9` for `O` to
/// avoid lookalike characters; translate back, uppercase, then decode as
/// RFC 4648 base32 without padding.
pub fn decode_friendly_base32(secret: &str) -> Result<Vec<u8>, CryptoError> {
    let translated: String = secret
        .chars()
        .map(|c| match c {
            '8' => 'L',
            '9' => 'O',
            _ => c.to_ascii_uppercase(),
        })
        .collect();
    BASE32_NOPAD
        .decode(translated.as_bytes())
        .map_err(|e| CryptoError::InvalidSecret(e.to_string()))
}

/// Derive the sync key bundle from the user's secret and account id.
///
/// Deterministic: the same secret and account always produce the same two
/// keys, and a different account produces unrelated keys from the same
/// secret. Fails fast on a malformed secret before any derivation.
pub fn derive_sync_key_bundle(secret: &str, account_id: &str) -> Result<KeyBundle, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::InvalidSecret("empty sync secret".into()));
    }
    if account_id.is_empty() {
        return Err(CryptoError::InvalidKey("empty account id".into()));
    }
    let prk = decode_friendly_base32(secret)?;

    let mut info = Vec::with_capacity(SYNC_KEY_INFO.len() + account_id.len());
    info.extend_from_slice(SYNC_KEY_INFO);
    info.extend_from_slice(account_id.as_bytes());

    let mut okm = [0u8; KEY_LENGTH * 2];
    hkdf_expand(&prk, &info, &mut okm)?;

    let mut encryption = [0u8; KEY_LENGTH];
    let mut hmac = [0u8; KEY_LENGTH];
    encryption.copy_from_slice(&okm[..KEY_LENGTH]);
    hmac.copy_from_slice(&okm[KEY_LENGTH..]);
    Ok(KeyBundle::new(encryption, hmac))
}
