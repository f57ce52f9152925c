//! Per-session secrets and the time-stepped one-time codes derived from them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The size of a session secret in bytes.
pub const SECRET_SIZE: usize = 32;
/// The number of HMAC output bytes kept in a one-time code.
pub const CODE_SIZE: usize = 16;

/// A per-session HMAC key. Never leaves the server.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; SECRET_SIZE]);

impl SessionSecret {
    /// Wraps raw secret bytes.
    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a secret previously rendered with [`SessionSecret::to_hex`].
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(encoded)
                .map_err(|e| AppError::Validation(format!("Invalid session secret: {}", e)))?,
        );
        let secret: [u8; SECRET_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            AppError::Validation(format!("Session secret must be {} bytes", SECRET_SIZE))
        })?;
        Ok(Self(secret))
    }

    /// Renders the secret as lowercase hex, for storage by the session owner.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(<redacted>)")
    }
}

/// Generates a fresh 256-bit session secret from the OS CSPRNG.
pub fn new_secret() -> SessionSecret {
    let mut bytes = [0u8; SECRET_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let secret = SessionSecret(bytes);
    bytes.zeroize();
    secret
}

/// Returns `floor(unix_seconds / interval)`.
///
/// Instants before the epoch map to step 0. A zero interval is treated as one second.
pub fn time_step(now: DateTime<Utc>, interval: Duration) -> u64 {
    let seconds = u64::try_from(now.timestamp()).unwrap_or(0);
    seconds / interval.as_secs().max(1)
}

/// Computes the one-time code for `step`: HMAC-SHA256 over the decimal step,
/// truncated to [`CODE_SIZE`] bytes and hex encoded.
pub fn one_time_code(secret: &SessionSecret, step: u64) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(step.to_string().as_bytes());
    let digest = mac.finalize().into_bytes();
    hex::encode(&digest[..CODE_SIZE])
}

/// Compares two codes in constant time.
pub fn codes_match(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
