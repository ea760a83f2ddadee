//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the key derivation scheme and the envelope format
//! to known-good outputs, so a change that still round-trips but breaks
//! interoperability cannot slip through.

use weft_crypto::{derive_sync_key_bundle, EncryptedEnvelope, KeyBundle};

/// A key derivation vector: secret and account in, key bundle out.
#[derive(Debug, Clone)]
pub struct KeyDerivationVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Friendly-base32 sync secret.
    pub secret: &'static str,
    /// Account identifier mixed into the derivation.
    pub account_id: &'static str,
    /// Expected encryption key, base64.
    pub expected_encryption: &'static str,
    /// Expected HMAC key, base64.
    pub expected_hmac: &'static str,
}

/// Get all key derivation vectors.
pub fn key_derivation_vectors() -> Vec<KeyDerivationVector> {
    vec![
        KeyDerivationVector {
            name: "hashed account id",
            secret: "6m8mv8ex2brqnrmsb9fjuvfg7y",
            account_id: "c6o7dvmr2c4ud2fyv6woz2u4zi22bcyd",
            expected_encryption: "/8RzbFT396htpZu5rwgIg2WKfyARgm7dLzsF5pwrVz8=",
            expected_hmac: "NChGjrqoXYyw8vIYP2334cvmMtsjAMUZNqFwV2LGNkM=",
        },
        KeyDerivationVector {
            name: "plain account id",
            secret: "abcdeabcdeabcdeabcdeabcdea",
            account_id: "johndoe",
            expected_encryption: "pq2FS3mdhJk6VN8pMmA+49eQIHtR/74uVObpSFup168=",
            expected_hmac: "kxuXyH1UWABesiWqeJxM5S5tOG+8BTDemreqZOuPHjQ=",
        },
    ]
}

/// A full envelope vector: keys and wire fields in, record id out.
#[derive(Debug, Clone)]
pub struct EnvelopeVector {
    pub encryption_key: &'static str,
    pub hmac_key: &'static str,
    pub ciphertext: &'static str,
    pub iv: &'static str,
    pub hmac: &'static str,
    /// The `id` field of the decrypted cleartext.
    pub expected_id: &'static str,
}

/// The known-good envelope decrypt vector.
pub fn envelope_vector() -> EnvelopeVector {
    EnvelopeVector {
        encryption_key: "9K/wLdXdw+nrTtXo4ZpECyHFNr4d7aYHqeg3KW9+m6Q=",
        hmac_key: "MMntEfutgLTc8FlTLQFms8/xMPmCldqPlq/QQXEjx70=",
        ciphertext: "NMsdnRulLwQsVcwxKW9XwaUe7ouJk5Wn80QhbD80l0HEcZGCynh45qIbeYBik0lg\
            cHbKmlIxTJNwU+OeqipN+/j7MqhjKOGIlvbpiPQQLC6/ffF2vbzL0nzMUuSyvaQz\
            yGGkSYM2xUFt06aNivoQTvU2GgGmUK6MvadoY38hhW2LCMkoZcNfgCqJ26lO1O0s\
            EO6zHsk3IVz6vsKiJ2Hq6VCo7hu123wNegmujHWQSGyf8JeudZjKzfi0OFRRvvm4\
            QAKyBWf0MgrW1F8SFDnVfkq8amCB7NhdwhgLWbN+21NitNwWYknoEWe1m6hmGZDg\
            DT32uxzWxCV8QqqrpH/ZggViEr9uMgoy4lYaWqP7G5WKvvechc62aqnsNEYhH26A\
            5QgzmlNyvB+KPFvPsYzxDnSCjOoRSLx7GG86wT59QZw=",
        iv: "GX8L37AAb2FZJMzIoXlX8w==",
        hmac: "b1e6c18ac30deb70236bc0d65a46f7a4dce3b8b0e02cf92182b914e3afa5eebc",
        expected_id: "5qRsgXWRJZXr",
    }
}

/// Check every vector against the implementation. Returns one
/// `(name, passed, detail)` row per check.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    for v in key_derivation_vectors() {
        let row = match derive_sync_key_bundle(v.secret, v.account_id) {
            Ok(bundle) => {
                let (enc, mac) = bundle.to_base64();
                let passed = enc == v.expected_encryption && mac == v.expected_hmac;
                (v.name.to_string(), passed, format!("enc={enc} mac={mac}"))
            }
            Err(e) => (v.name.to_string(), false, e.to_string()),
        };
        results.push(row);
    }

    let v = envelope_vector();
    let row = match open_envelope_vector(&v) {
        Ok(id) => ("envelope decrypt".to_string(), id == v.expected_id, id),
        Err(detail) => ("envelope decrypt".to_string(), false, detail),
    };
    results.push(row);

    results
}

fn open_envelope_vector(v: &EnvelopeVector) -> Result<String, String> {
    let bundle =
        KeyBundle::from_base64(v.encryption_key, v.hmac_key).map_err(|e| e.to_string())?;
    let envelope = EncryptedEnvelope {
        ciphertext: v.ciphertext.to_string(),
        iv: v.iv.to_string(),
        hmac: v.hmac.to_string(),
    };
    let cleartext = envelope.open(&bundle).map_err(|e| e.to_string())?;
    let value: serde_json::Value =
        serde_json::from_slice(&cleartext).map_err(|e| e.to_string())?;
    value["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| "cleartext has no id".to_string())
}
