//! Keyed hashing and reversible encryption for sensitive input.
//!
//! `Hasher` gives deterministic, non-reversible HMAC-SHA256 digests so blacklist
//! lookups and cross-record correlation never need plaintext. `Vault` gives
//! reversible AES-256-GCM ciphertexts for operator disclosure. Modeled on the
//! teacher's `crypto-primitives::HmacKey` wrapper (itself wrapping `ring::hmac`);
//! here we wrap the `hmac`/`sha2` pair instead.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Deterministic keyed hasher. The key is a secret configured at boot; constructing
/// one with an empty key is treated as a fatal initialization error by the caller.
#[derive(Clone)]
pub struct Hasher {
    key: Vec<u8>,
}

impl Hasher {
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(anyhow!("hasher initialization failed: empty HMAC key"));
        }
        Ok(Self { key: key.as_bytes().to_vec() })
    }

    fn mac(&self) -> HmacSha256 {
        // Key length is not bounded by HMAC, so this never fails.
        <HmacSha256 as Mac>::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }

    /// `Hash(value) -> hex`. Idempotent under re-normalization: two differently
    /// cased/whitespaced spellings of the same logical value hash identically.
    pub fn hash(&self, value: &str) -> String {
        let mut mac = self.mac();
        mac.update(normalize(value).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// First 16 hex chars of `Hash`, used for low-cardinality cache/index keys.
    pub fn index_hash(&self, value: &str) -> String {
        self.hash(value)[..16].to_string()
    }

    /// `CompositeHash(values) -> Hash(sorted(values) joined by "|")`.
    pub fn composite_hash(&self, values: &[&str]) -> String {
        let mut sorted: Vec<String> = values.iter().map(|v| normalize(v)).collect();
        sorted.sort();
        self.hash(&sorted.join("|"))
    }

    /// Constant-time verification of a value against a previously computed hex digest.
    pub fn verify(&self, value: &str, hex_digest: &str) -> bool {
        let computed = self.hash(value);
        computed.as_bytes().ct_eq(hex_digest.as_bytes()).into()
    }
}

/// Reversible AES-256-GCM ciphertext vault for operator disclosure of sensitive
/// fields an operator may need to disclose later. Ciphertexts are base64(nonce || ciphertext).
#[derive(Clone)]
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    pub fn new(key_b64: &str) -> Result<Self> {
        let key_bytes = STANDARD
            .decode(key_b64)
            .map_err(|e| anyhow!("encryption key is not valid base64: {e}"))?;
        if key_bytes.len() != 32 {
            return Err(anyhow!(
                "encryption key must decode to 32 bytes, got {}",
                key_bytes.len()
            ));
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow!("encryption key rejected: {e}"))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("encryption failed: {e}"))?;
        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| anyhow!("ciphertext is not valid base64: {e}"))?;
        if raw.len() < 12 {
            return Err(anyhow!("ciphertext too short"));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow!("decryption failed: {e}"))?;
        String::from_utf8(plaintext).map_err(|e| anyhow!("decrypted value is not utf8: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_idempotent_under_normalization() {
        let h = Hasher::new("test-key").unwrap();
        assert_eq!(h.hash("Alice@Example.com"), h.hash("  alice@example.com  "));
    }

    #[test]
    fn index_hash_is_prefix_of_hash() {
        let h = Hasher::new("test-key").unwrap();
        let full = h.hash("8.8.8.8");
        assert_eq!(h.index_hash("8.8.8.8"), full[..16]);
    }

    #[test]
    fn composite_hash_is_order_independent() {
        let h = Hasher::new("test-key").unwrap();
        assert_eq!(
            h.composite_hash(&["a@example.com", "8.8.8.8"]),
            h.composite_hash(&["8.8.8.8", "a@example.com"])
        );
    }

    #[test]
    fn verify_roundtrips() {
        let h = Hasher::new("test-key").unwrap();
        let digest = h.hash("bob@example.com");
        assert!(h.verify("Bob@Example.com", &digest));
        assert!(!h.verify("eve@example.com", &digest));
    }

    #[test]
    fn empty_key_is_fatal() {
        assert!(Hasher::new("").is_err());
    }

    #[test]
    fn vault_roundtrips() {
        let v = Vault::new("MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").unwrap();
        let ct = v.encrypt("+14155551234").unwrap();
        assert_ne!(ct, "+14155551234");
        assert_eq!(v.decrypt(&ct).unwrap(), "+14155551234");
    }
}
