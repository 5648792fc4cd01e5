//! AES-256-GCM envelope used for snapshot exports.
//!
//! Wire layout of a payload, base64 encoded as a whole:
//! `12-byte nonce || ciphertext || 16-byte tag`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key is not configured")]
    MissingKey,
    #[error("encryption key must be 32 bytes, base64-encoded: {0}")]
    InvalidKey(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("payload failed authentication")]
    AuthenticationFailed,
}

#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        EncryptionKey::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("got {} bytes", bytes.len())))?;
        Ok(EncryptionKey(arr))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Encrypts under a fresh random nonce and returns the base64 payload.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<String, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Malformed("encryption failed".to_string()))?;
    let mut combined = Vec::with_capacity(NONCE_LEN + sealed.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&sealed);
    Ok(BASE64.encode(combined))
}

pub fn decrypt(payload: &str, key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    let combined = BASE64
        .decode(payload.trim())
        .map_err(|e| CryptoError::Malformed(e.to_string()))?;
    if combined.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Malformed(format!(
            "payload is {} bytes, shorter than nonce and tag",
            combined.len()
        )));
    }
    let (nonce, sealed) = combined.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

pub fn encrypt_json<T: Serialize + ?Sized>(
    value: &T,
    key: &EncryptionKey,
) -> Result<String, CryptoError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    encrypt(&bytes, key)
}

pub fn decrypt_json<T: DeserializeOwned>(payload: &str, key: &EncryptionKey) -> Result<T, CryptoError> {
    let bytes = decrypt(payload, key)?;
    serde_json::from_slice(&bytes).map_err(|e| CryptoError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_bytes(&[byte; KEY_LEN]).expect("key")
    }

    #[test]
    fn json_roundtrip_reproduces_payload() {
        let payload = json!([
            { "prn": "P1", "subject": "Math", "exam_type": "UT1", "marks": 10 },
            { "prn": "P2", "subject": "Art", "exam_type": "ESE", "marks": "AB", "note": "ü" }
        ]);
        let sealed = encrypt_json(&payload, &key(7)).expect("encrypt");
        let opened: serde_json::Value = decrypt_json(&sealed, &key(7)).expect("decrypt");
        assert_eq!(opened, payload);
    }

    #[test]
    fn payload_layout_is_nonce_ciphertext_tag() {
        let sealed = encrypt(b"hello", &key(1)).expect("encrypt");
        let raw = BASE64.decode(sealed).expect("base64");
        assert_eq!(raw.len(), NONCE_LEN + 5 + TAG_LEN);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = encrypt(b"hello", &key(1)).expect("encrypt");
        let e = decrypt(&sealed, &key(2)).expect_err("wrong key");
        assert!(matches!(e, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn short_payload_is_malformed() {
        let e = decrypt(&BASE64.encode([0u8; 20]), &key(1)).expect_err("short");
        assert!(matches!(e, CryptoError::Malformed(_)));
    }

    #[test]
    fn key_must_be_32_bytes() {
        let e = EncryptionKey::from_base64(&BASE64.encode([0u8; 16])).expect_err("short key");
        assert!(matches!(e, CryptoError::InvalidKey(_)));
        assert!(EncryptionKey::from_base64(&BASE64.encode([3u8; 32])).is_ok());
        assert!(EncryptionKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn debug_output_hides_key_material() {
        assert_eq!(format!("{:?}", key(9)), "EncryptionKey(<redacted>)");
    }
}
