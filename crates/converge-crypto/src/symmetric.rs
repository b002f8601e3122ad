//! Symmetric encryption using AES-256-GCM
//!
//! The envelope is `nonce (12 bytes) || ciphertext || tag (16 bytes)`, the
//! same layout the message payload encryption puts on the wire.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::{secure_random_bytes, CryptoError, CryptoResult};

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;
/// Authentication tag length in bytes
pub const TAG_LEN: usize = 16;
/// Required key length in bytes
pub const KEY_LEN: usize = 32;

fn cipher_for(key: &[u8]) -> CryptoResult<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyFormat(
            "key must be 32 bytes for AES-256".into(),
        ));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
}

/// Encrypt plaintext with AES-256-GCM
///
/// Returns `nonce || ciphertext || tag`. The optional associated data is
/// authenticated but not encrypted.
pub fn encrypt(plaintext: &[u8], key: &[u8], associated_data: Option<&[u8]>) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce_bytes = secure_random_bytes(NONCE_LEN);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let payload = Payload {
        msg: plaintext,
        aad: associated_data.unwrap_or(b""),
    };
    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an AES-256-GCM envelope produced by [`encrypt`]
pub fn decrypt(envelope: &[u8], key: &[u8], associated_data: Option<&[u8]>) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_for(key)?;
    if envelope.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed("ciphertext too short".into()));
    }
    let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let payload = Payload {
        msg: ciphertext,
        aad: associated_data.unwrap_or(b""),
    };
    cipher
        .decrypt(nonce, payload)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
