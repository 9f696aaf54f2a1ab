//! AES-256-GCM sealing for the stored credential.
//!
//! The credential is sealed with a fresh nonce on every write. The master key
//! is provided from the environment and never touches disk.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Master key used to seal the credential column.
#[derive(Clone)]
pub struct SealingKey {
    cipher: Aes256Gcm,
}

impl SealingKey {
    /// Builds a key from its base64 encoding. Must decode to exactly 32 bytes.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64.trim())
            .context("Failed to decode base64 encryption key")?;

        if key_bytes.len() != KEY_SIZE {
            return Err(anyhow!(
                "Encryption key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        Ok(Self { cipher })
    }

    /// Seals `plaintext`, returning `(ciphertext, nonce)` both base64-encoded.
    pub fn seal(&self, plaintext: &str) -> Result<(String, String)> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        Ok((BASE64.encode(ciphertext), BASE64.encode(nonce)))
    }

    /// Opens a value produced by [`SealingKey::seal`].
    ///
    /// Fails on a wrong key, a mismatched nonce, or tampered ciphertext.
    pub fn open(&self, ciphertext: &str, nonce: &str) -> Result<String> {
        let ciphertext = BASE64
            .decode(ciphertext)
            .context("Failed to decode ciphertext")?;
        let nonce = BASE64.decode(nonce).context("Failed to decode nonce")?;

        if nonce.len() != NONCE_SIZE {
            return Err(anyhow!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce.len()
            ));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SealingKey {
        SealingKey::from_base64(&BASE64.encode([byte; 32])).unwrap()
    }

    #[test]
    fn test_key_length_is_enforced() {
        assert!(SealingKey::from_base64(&BASE64.encode([0u8; 32])).is_ok());
        assert!(SealingKey::from_base64(&BASE64.encode([0u8; 16])).is_err());
        assert!(SealingKey::from_base64(&BASE64.encode([0u8; 64])).is_err());
        assert!(SealingKey::from_base64("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_seal_hides_plaintext() {
        let key = key(0);
        let (ciphertext, nonce) = key.seal("sk-secret-api-key").unwrap();

        assert!(!ciphertext.contains("sk-secret-api-key"));
        assert_eq!(key.open(&ciphertext, &nonce).unwrap(), "sk-secret-api-key");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = key(0);
        let (c1, n1) = key.seal("same").unwrap();
        let (c2, n2) = key.seal("same").unwrap();

        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (ciphertext, nonce) = key(0).seal("secret").unwrap();
        assert!(key(1).open(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = key(0);
        let (mut ciphertext, nonce) = key.seal("secret").unwrap();
        ciphertext.push('X');

        assert!(key.open(&ciphertext, &nonce).is_err());
    }
}
