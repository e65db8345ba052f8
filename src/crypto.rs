//! Credential encryption.
//!
//! Vendor API tokens are stored as `<nonce-hex>:<ciphertext-hex>` using
//! AES-256-GCM with a fresh random 96-bit nonce per call, so the same token
//! never encrypts to the same string twice.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use tracing::warn;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Errors constructing or using the credential cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption key is not configured")]
    MissingKey,

    #[error("Encryption failed")]
    Encrypt,
}

/// Symmetric cipher for stored vendor credentials.
///
/// The key is injected once at construction and never read from the
/// environment afterwards.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Build a cipher from the configured secret.
    ///
    /// A 64-character hex string is used as the raw 256-bit key. Any other
    /// non-empty secret is stretched with SHA-256.
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CipherError::MissingKey);
        }

        let key_bytes: [u8; KEY_LEN] = match hex::decode(secret) {
            Ok(bytes) if bytes.len() == KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                key
            }
            _ => Sha256::digest(secret.as_bytes()).into(),
        };

        Ok(Self::from_key(key_bytes))
    }

    /// Build a cipher from raw key bytes.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a plaintext credential.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    /// Decrypt a stored credential.
    ///
    /// Returns `None` for malformed input, a wrong key or non-UTF-8 output.
    pub fn decrypt(&self, stored: &str) -> Option<String> {
        let Some((nonce_hex, cipher_hex)) = stored.split_once(':') else {
            warn!("Stored credential has no nonce separator");
            return None;
        };

        let nonce_bytes = hex::decode(nonce_hex).ok()?;
        if nonce_bytes.len() != NONCE_LEN {
            warn!(len = nonce_bytes.len(), "Stored credential nonce has wrong length");
            return None;
        }
        let ciphertext = hex::decode(cipher_hex).ok()?;

        let plaintext = match self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        {
            Ok(plaintext) => plaintext,
            Err(_) => {
                warn!("Stored credential failed authentication");
                return None;
            }
        };

        String::from_utf8(plaintext).ok()
    }
}
