//! Whole-payload XChaCha20-Poly1305 encryption/decryption
//!
//! Ciphertext layout: `[N bytes: ciphertext][16 bytes: Poly1305 tag]`.
//! The 24-byte nonce is generated by the caller (`generate_nonce`) and
//! transported out-of-band in the attachment descriptor. Nonce reuse under
//! the same key breaks confidentiality, so a nonce is generated fresh, at
//! random, per file.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed key or nonce length; a programming defect, not transient.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The AEAD primitive failed during encryption.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed: wrong key, or tampered/corrupted ciphertext.
    #[error("integrity verification failed: wrong key or tampered ciphertext")]
    Integrity,
}

/// Generate a fresh random 192-bit nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt a plaintext buffer. Returns `ciphertext || tag`.
pub fn encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    validate_lengths(key, nonce)?;

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidParameters(format!("key rejected by cipher: {e}")))?;
    let nonce = XNonce::from_slice(nonce);

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypt and verify `ciphertext || tag`. Any corruption, truncation, or
/// key mismatch yields `CryptoError::Integrity`, never garbage plaintext.
pub fn decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    validate_lengths(key, nonce)?;

    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::InvalidParameters(format!(
            "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        )));
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidParameters(format!("key rejected by cipher: {e}")))?;
    let nonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Integrity)
}

fn validate_lengths(key: &[u8], nonce: &[u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidParameters(format!(
            "key must be {KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidParameters(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    Ok(())
}
