//! The authenticated-encryption envelope every record travels in.
//!
//! A sealed record is a small JSON object `{ciphertext, IV, hmac}`:
//! AES-256-CBC ciphertext and IV as base64, and a hex HMAC-SHA256 tag.
//! The tag is computed over the ASCII bytes of the base64 ciphertext
//! string exactly as it appears on the wire, so verification needs no
//! decoding and a tampered envelope is rejected before any ciphertext is
//! touched. A fresh random IV is drawn for every seal, so sealing the
//! same cleartext twice never repeats an envelope.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::key_bundle::KeyBundle;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size, and the length of every IV.
pub const IV_LENGTH: usize = 16;

/// A sealed record as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64 AES-256-CBC ciphertext.
    pub ciphertext: String,
    /// Base64 initialization vector.
    #[serde(rename = "IV")]
    pub iv: String,
    /// Hex HMAC-SHA256 tag over the base64 ciphertext string.
    pub hmac: String,
}

impl EncryptedEnvelope {
    /// Encrypt and authenticate `cleartext` under `bundle`.
    pub fn seal(bundle: &KeyBundle, cleartext: &[u8]) -> Result<Self, CryptoError> {
        let mut iv = [0u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);
        Self::seal_with_iv(bundle, cleartext, &iv)
    }

    fn seal_with_iv(
        bundle: &KeyBundle,
        cleartext: &[u8],
        iv: &[u8; IV_LENGTH],
    ) -> Result<Self, CryptoError> {
        let ciphertext = Aes256CbcEnc::new(bundle.encryption_key().into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(cleartext);
        let ciphertext_b64 = STANDARD.encode(&ciphertext);

        let mut mac = HmacSha256::new_from_slice(bundle.hmac_key())
            .map_err(|_| CryptoError::InvalidKey("hmac key rejected".into()))?;
        mac.update(ciphertext_b64.as_bytes());
        let tag = mac.finalize().into_bytes();

        Ok(Self {
            ciphertext: ciphertext_b64,
            iv: STANDARD.encode(iv),
            hmac: hex::encode(tag),
        })
    }

    /// Verify the tag, then decrypt. Verification happens on the encoded
    /// ciphertext string before anything is base64-decoded, and the tag
    /// comparison is constant time. Any authentication failure is
    /// reported identically, with no hint of where the mismatch was.
    pub fn open(&self, bundle: &KeyBundle) -> Result<Vec<u8>, CryptoError> {
        let expected = hex::decode(&self.hmac).map_err(|_| CryptoError::Authentication)?;
        let mut mac = HmacSha256::new_from_slice(bundle.hmac_key())
            .map_err(|_| CryptoError::InvalidKey("hmac key rejected".into()))?;
        mac.update(self.ciphertext.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| CryptoError::Authentication)?;

        let ciphertext = STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| CryptoError::Malformed(format!("ciphertext: {e}")))?;
        let iv: [u8; IV_LENGTH] = STANDARD
            .decode(&self.iv)
            .map_err(|e| CryptoError::Malformed(format!("IV: {e}")))?
            .try_into()
            .map_err(|_| CryptoError::Malformed("IV is not 16 bytes".into()))?;

        Aes256CbcDec::new(bundle.encryption_key().into(), (&iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::Padding)
    }
}
