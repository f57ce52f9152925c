use argon2::Argon2;
use zeroize::Zeroizing;

use crate::crypto::aes::{SecureKey, KEY_SIZE};
use crate::error::{AppError, Result};

/// Minimum passphrase length accepted for key stretching.
pub const MIN_PASSPHRASE_LEN: usize = 16;
/// Minimum salt length accepted by Argon2.
pub const MIN_SALT_LEN: usize = 8;

/// Derives the envelope key from a passphrase and salt using Argon2.
fn derive_key(passphrase: &str, salt: &[u8]) -> Result<SecureKey> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| AppError::Encryption(format!("Argon2 key derivation error: {}", e)))?;
    Ok(SecureKey::new(*key))
}

/// Resolves the system-wide envelope key from its configured form.
///
/// Exactly 64 hex characters are taken as the raw key. Anything else is
/// treated as a passphrase and stretched with Argon2id, which then requires
/// a salt.
pub fn resolve_envelope_key(configured: &str, salt: Option<&str>) -> Result<SecureKey> {
    let configured = configured.trim();

    if configured.len() == KEY_SIZE * 2 && configured.chars().all(|c| c.is_ascii_hexdigit()) {
        return SecureKey::from_hex(configured);
    }

    if configured.len() < MIN_PASSPHRASE_LEN {
        return Err(AppError::Validation(format!(
            "Envelope key passphrase must be at least {} characters",
            MIN_PASSPHRASE_LEN
        )));
    }

    let salt = salt.ok_or_else(|| {
        AppError::Validation("A key salt is required when the envelope key is a passphrase".to_string())
    })?;

    if salt.len() < MIN_SALT_LEN {
        return Err(AppError::Validation(format!(
            "Key salt must be at least {} bytes",
            MIN_SALT_LEN
        )));
    }

    tracing::debug!("Deriving envelope key from passphrase with Argon2id");
    derive_key(configured, salt.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_keys_are_used_verbatim() {
        let key = resolve_envelope_key(&"ab".repeat(32), None).unwrap();
        assert_eq!(key.as_bytes(), &[0xab; KEY_SIZE]);
    }

    #[test]
    fn passphrase_derivation_is_stable_per_salt() {
        let a = resolve_envelope_key("correct horse battery staple", Some("rollcall-salt")).unwrap();
        let b = resolve_envelope_key("correct horse battery staple", Some("rollcall-salt")).unwrap();
        let c = resolve_envelope_key("correct horse battery staple", Some("another-salt")).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn passphrase_requires_salt_and_length() {
        assert!(resolve_envelope_key("correct horse battery staple", None).is_err());
        assert!(resolve_envelope_key("correct horse battery staple", Some("short")).is_err());
        assert!(resolve_envelope_key("too-short", Some("rollcall-salt")).is_err());
    }
}
