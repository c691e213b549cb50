/// At-rest encryption for delegated third-party tokens
///
/// Uses AES-256-GCM. Sealed values are stored as:
/// - nonce (12 bytes, random per call)
/// - ciphertext followed by the 16-byte authentication tag
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::engine::{general_purpose::STANDARD, Engine};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum TokenCipherError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build from a base64-encoded 256-bit key
    pub fn from_base64_key(key_base64: &str) -> Result<Self, TokenCipherError> {
        let key_bytes = STANDARD
            .decode(key_base64.trim())
            .map_err(|e| TokenCipherError::InvalidKey(format!("not base64: {e}")))?;

        if key_bytes.len() != 32 {
            return Err(TokenCipherError::InvalidKey(format!(
                "key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| TokenCipherError::InvalidKey(e.to_string()))?;

        Ok(Self { cipher })
    }

    pub fn seal(&self, token: &str) -> Result<Vec<u8>, TokenCipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, token.as_bytes())
            .map_err(|e| TokenCipherError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<String, TokenCipherError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(TokenCipherError::DecryptionFailed(
                "sealed value too short".to_string(),
            ));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| TokenCipherError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| TokenCipherError::DecryptionFailed(format!("invalid UTF-8: {e}")))
    }
}

/// Generate a fresh base64 key suitable for `TOKEN_ENCRYPTION_KEY`
pub fn generate_key() -> String {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    STANDARD.encode(key)
}
