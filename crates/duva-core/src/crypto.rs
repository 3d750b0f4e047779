//! Symmetric encryption for secrets at rest.
//!
//! Tokens and client secrets are stored as [`EncryptedSecret`] values:
//! base64 of `nonce (12 bytes) || ciphertext || tag (16 bytes)` produced by
//! AES-256-GCM. The key is derived from the process-wide secret with
//! HKDF-SHA256, so any sufficiently random string can serve as the secret.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, generic_array::GenericArray},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AppError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_INFO: &[u8] = b"duva-secret-key-v1";

/// Ciphertext as stored in the database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    /// Wrap a value read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptedSecret").field(&"[ENCRYPTED]").finish()
    }
}

/// Decrypted secret, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Plaintext view. Do not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretString").field(&"[REDACTED]").finish()
    }
}

/// Encrypts and decrypts secrets with a key derived from the process secret.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive the cipher key from the configured secret.
    pub fn from_secret_key(secret: &str) -> Result<Self, AppError> {
        if secret.trim().is_empty() {
            return Err(AppError::ConfigError("secret key must not be empty".to_string()));
        }

        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|_| AppError::CryptoError("key derivation failed".to_string()))?;

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&key));
        key.zeroize();
        Ok(Self { cipher })
    }

    /// Generate a fresh random secret suitable for `DUVA_SECRET_KEY`.
    pub fn generate_secret_key() -> String {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        let encoded = STANDARD.encode(bytes);
        bytes.zeroize();
        encoded
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, AppError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::CryptoError("encryption error".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(EncryptedSecret(STANDARD.encode(out)))
    }

    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<SecretString, AppError> {
        let raw = STANDARD
            .decode(secret.as_str())
            .map_err(|e| AppError::CryptoError(format!("invalid ciphertext encoding: {}", e)))?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AppError::CryptoError("ciphertext too short".to_string()));
        }

        let (nonce, body) = raw.split_at(NONCE_SIZE);
        let mut plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| AppError::CryptoError("decryption error".to_string()))?;

        let text = String::from_utf8(plain.clone())
            .map_err(|_| AppError::CryptoError("secret is not valid UTF-8".to_string()));
        plain.zeroize();
        text.map(SecretString)
    }
}
