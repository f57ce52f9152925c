use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Parses a key from 64 hexadecimal characters.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|e| AppError::Encryption(format!("Invalid key hex: {}", e)))?,
        );

        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            AppError::Encryption(format!("Key must be exactly {} bytes", KEY_SIZE))
        })?;

        Ok(Self(key))
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureKey(<redacted>)")
    }
}

/// Generates a new random AES-256 key.
pub fn generate_key() -> SecureKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    SecureKey::new(key)
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// The three parts of an AES-GCM seal, kept apart so they can be framed separately.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

/// Encrypts a plaintext using AES-256-GCM under a fresh random nonce.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `plaintext` - The data to encrypt.
///
/// # Returns
///
/// The nonce, the ciphertext and the detached authentication tag.
pub fn seal(key: &SecureKey, plaintext: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;

    let tag_start = ciphertext
        .len()
        .checked_sub(TAG_SIZE)
        .ok_or_else(|| AppError::Encryption("Ciphertext shorter than tag".to_string()))?;
    let tag: [u8; TAG_SIZE] = ciphertext
        .split_off(tag_start)
        .try_into()
        .map_err(|_| AppError::Encryption("Invalid tag size".to_string()))?;

    Ok(Sealed {
        nonce: nonce_bytes,
        ciphertext,
        tag,
    })
}

/// Decrypts and authenticates a detached AES-256-GCM seal.
///
/// Returns `None` when the tag does not authenticate the ciphertext under `key`.
pub fn open(
    key: &SecureKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
) -> Option<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from(*nonce);

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher.decrypt(&nonce, combined.as_slice()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_recovers_plaintext() {
        let key = generate_key();
        let sealed = seal(&key, b"roll call").unwrap();

        assert_eq!(sealed.ciphertext.len(), b"roll call".len());
        let plain = open(&key, &sealed.nonce, &sealed.ciphertext, &sealed.tag).unwrap();
        assert_eq!(plain, b"roll call");
    }

    #[test]
    fn open_fails_under_another_key() {
        let sealed = seal(&generate_key(), b"roll call").unwrap();
        assert!(open(&generate_key(), &sealed.nonce, &sealed.ciphertext, &sealed.tag).is_none());
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let key = generate_key();
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn from_hex_rejects_short_keys() {
        assert!(SecureKey::from_hex("abcd").is_err());
        assert!(SecureKey::from_hex(&"zz".repeat(32)).is_err());
        let key = SecureKey::from_hex(&"11".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[0x11; KEY_SIZE]);
    }
}
