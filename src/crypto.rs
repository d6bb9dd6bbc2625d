//! Credential encryption.
//!
//! Stored access tokens are AES-256-GCM ciphertexts, base64-framed, with a
//! 12-byte random nonce prefix. The key is derived from the process
//! passphrase with PBKDF2-SHA256 at 100 000 iterations over a fixed process
//! salt, so the same passphrase always yields the same key and tokens written
//! by the external OAuth flow round-trip here.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// Key length in bytes (256 bits for AES-256)
const KEY_LENGTH: usize = 32;

/// Nonce length in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// PBKDF2 iteration count shared with the credential-writing flow.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed process salt. Key derivation must be stable across processes so
/// tokens encrypted by the OAuth flow decrypt here.
const PROCESS_SALT: &[u8] = b"tidemark:token-cipher:v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to decode ciphertext: {0}")]
    Decode(String),

    #[error("Ciphertext too short")]
    TooShort,

    #[error("Decryption failed: invalid key or corrupted data")]
    Decrypt,

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decrypted token is not valid UTF-8")]
    NotUtf8,
}

/// Cipher handle holding the derived key.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Derive the cipher key from a passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2::pbkdf2::<Hmac<Sha256>>(
            passphrase.as_bytes(),
            PROCESS_SALT,
            PBKDF2_ITERATIONS,
            &mut key,
        )
        .expect("PBKDF2 output length is fixed");
        Self { key }
    }

    /// Encrypt a plaintext token. Returns `BASE64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    /// Decrypt a base64-framed token.
    pub fn decrypt(&self, framed: &str) -> Result<String, CryptoError> {
        let combined = BASE64
            .decode(framed.trim())
            .map_err(|e| CryptoError::Decode(e.to_string()))?;

        if combined.len() < NONCE_LENGTH {
            return Err(CryptoError::TooShort);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = TokenCipher::from_passphrase("test-passphrase");
        let token = "gho_abc123def456";

        let framed = cipher.encrypt(token).unwrap();
        assert_ne!(framed, token);

        let decrypted = cipher.decrypt(&framed).unwrap();
        assert_eq!(decrypted, token);
    }

    #[test]
    fn same_passphrase_same_key() {
        let a = TokenCipher::from_passphrase("shared");
        let b = TokenCipher::from_passphrase("shared");

        let framed = a.encrypt("secret-token").unwrap();
        assert_eq!(b.decrypt(&framed).unwrap(), "secret-token");
    }

    #[test]
    fn different_encryptions_differ() {
        let cipher = TokenCipher::from_passphrase("p");
        let one = cipher.encrypt("same-token").unwrap();
        let two = cipher.encrypt("same-token").unwrap();

        // Random nonces produce different ciphertext for identical input.
        assert_ne!(one, two);
        assert_eq!(cipher.decrypt(&one).unwrap(), "same-token");
        assert_eq!(cipher.decrypt(&two).unwrap(), "same-token");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let good = TokenCipher::from_passphrase("right");
        let bad = TokenCipher::from_passphrase("wrong");

        let framed = good.encrypt("secret").unwrap();
        assert!(matches!(bad.decrypt(&framed), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let cipher = TokenCipher::from_passphrase("p");
        assert!(matches!(
            cipher.decrypt("!!not-base64!!"),
            Err(CryptoError::Decode(_))
        ));
        assert!(matches!(
            cipher.decrypt(&BASE64.encode([0u8; 4])),
            Err(CryptoError::TooShort)
        ));
    }

    #[test]
    fn empty_token_roundtrip() {
        let cipher = TokenCipher::from_passphrase("p");
        let framed = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&framed).unwrap(), "");
    }
}
