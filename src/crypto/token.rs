//! Rotating QR attendance tokens.
//!
//! An envelope is `nonce.ciphertext.tag`, each segment base64url without
//! padding. The plaintext is the compact JSON record
//! `{"sid": <session id>, "t": <one-time code>, "ts": <issued at, epoch ms>}`
//! sealed with AES-256-GCM under the system-wide envelope key.
//!
//! Issuer and verifier must run with the same rotation interval. A mismatch is
//! not detected here; codes simply stop matching.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::aes::{self, SecureKey, NONCE_SIZE, TAG_SIZE};
use crate::crypto::otp::{codes_match, one_time_code, time_step, SessionSecret};
use crate::error::{AppError, Result};

/// Default seconds between code rotations.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(10);
/// Default number of adjacent steps accepted on each side of "now".
pub const DEFAULT_TOLERANCE_STEPS: u64 = 1;

const SEGMENT_DELIMITER: char = '.';

/// Timing parameters shared by issuer and verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    pub rotation_interval: Duration,
    /// Maximum distance between an envelope's `issued_at` and "now".
    pub staleness_bound: Duration,
    pub tolerance_steps: u64,
}

impl CodecConfig {
    /// Builds a config with the default staleness bound (2x the interval)
    /// and the default tolerance.
    pub fn new(rotation_interval: Duration) -> Self {
        let rotation_interval = rotation_interval.max(Duration::from_secs(1));
        Self {
            rotation_interval,
            staleness_bound: rotation_interval * 2,
            tolerance_steps: DEFAULT_TOLERANCE_STEPS,
        }
    }

    pub fn with_staleness_bound(mut self, staleness_bound: Duration) -> Self {
        self.staleness_bound = staleness_bound;
        self
    }

    pub fn with_tolerance_steps(mut self, tolerance_steps: u64) -> Self {
        self.tolerance_steps = tolerance_steps;
        self
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION_INTERVAL)
    }
}

/// The record sealed inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sid")]
    pub session_id: String,
    #[serde(rename = "t")]
    pub code: String,
    #[serde(rename = "ts")]
    pub issued_at_ms: i64,
}

/// A successfully verified envelope.
///
/// `session_id` is whatever the envelope carried. Callers must still compare it
/// with the session whose secret they verified against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub session_id: String,
    pub matched_step: u64,
    pub issued_at_ms: i64,
}

/// Why an envelope was not accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Bad framing, bad base64, failed authentication or an unreadable record.
    #[error("malformed or tampered envelope")]
    MalformedEnvelope,

    /// `issued_at` is further from "now" than the staleness bound.
    #[error("envelope expired")]
    Expired,

    /// No step in the tolerance window reproduces the embedded code.
    #[error("code mismatch")]
    CodeMismatch,
}

impl Rejection {
    /// Message safe to show to the scanning user.
    ///
    /// Malformed envelopes and code mismatches share one message so the
    /// response does not reveal which check failed.
    pub fn user_message(&self) -> &'static str {
        match self {
            Rejection::Expired => "code expired, scan again",
            Rejection::MalformedEnvelope | Rejection::CodeMismatch => "invalid or expired code",
        }
    }

    /// Stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MalformedEnvelope => "malformed_envelope",
            Rejection::Expired => "expired",
            Rejection::CodeMismatch => "code_mismatch",
        }
    }
}

/// Issues and verifies QR envelopes.
///
/// Holds only the envelope key and timing config; clones share the key.
#[derive(Clone, Debug)]
pub struct TokenCodec {
    key: Arc<SecureKey>,
    config: CodecConfig,
}

impl TokenCodec {
    pub fn new(key: SecureKey, config: CodecConfig) -> Self {
        Self {
            key: Arc::new(key),
            config,
        }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Returns a codec sharing this key but running with `config`.
    pub fn with_config(&self, config: CodecConfig) -> Self {
        Self {
            key: Arc::clone(&self.key),
            config,
        }
    }

    /// Seals the current one-time code for `session_id` into a fresh envelope.
    ///
    /// # Panics
    ///
    /// Panics if `session_id` is empty or contains only whitespace.
    pub fn issue(
        &self,
        session_id: &str,
        secret: &SessionSecret,
        now: DateTime<Utc>,
    ) -> Result<String> {
        assert!(
            !session_id.trim().is_empty(),
            "cannot issue an envelope for an empty session id"
        );

        let step = time_step(now, self.config.rotation_interval);
        let claims = Claims {
            session_id: session_id.to_string(),
            code: one_time_code(secret, step),
            issued_at_ms: now.timestamp_millis(),
        };

        let plaintext = sonic_rs::to_vec(&claims)
            .map_err(|e| AppError::Internal(format!("Claims serialization failed: {}", e)))?;
        let sealed = aes::seal(&self.key, &plaintext)?;

        Ok(format!(
            "{}{delim}{}{delim}{}",
            URL_SAFE_NO_PAD.encode(sealed.nonce),
            URL_SAFE_NO_PAD.encode(&sealed.ciphertext),
            URL_SAFE_NO_PAD.encode(sealed.tag),
            delim = SEGMENT_DELIMITER,
        ))
    }

    /// Authenticates and decrypts an envelope without checking time or code.
    ///
    /// Needs only the envelope key, so the embedded session id can be used to
    /// pick the single candidate secret before calling [`TokenCodec::check`].
    pub fn open(&self, envelope: &str) -> std::result::Result<Claims, Rejection> {
        let mut segments = envelope.trim().split(SEGMENT_DELIMITER);
        let (Some(nonce), Some(ciphertext), Some(tag), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(Rejection::MalformedEnvelope);
        };

        let nonce: [u8; NONCE_SIZE] = decode_segment(nonce)?
            .try_into()
            .map_err(|_| Rejection::MalformedEnvelope)?;
        let tag: [u8; TAG_SIZE] = decode_segment(tag)?
            .try_into()
            .map_err(|_| Rejection::MalformedEnvelope)?;
        let ciphertext = decode_segment(ciphertext)?;

        let plaintext =
            aes::open(&self.key, &nonce, &ciphertext, &tag).ok_or(Rejection::MalformedEnvelope)?;

        let claims: Claims =
            sonic_rs::from_slice(&plaintext).map_err(|_| Rejection::MalformedEnvelope)?;
        if claims.session_id.is_empty() {
            return Err(Rejection::MalformedEnvelope);
        }

        Ok(claims)
    }

    /// Checks freshness and the one-time code of already opened claims.
    pub fn check(
        &self,
        claims: &Claims,
        secret: &SessionSecret,
        now: DateTime<Utc>,
        tolerance_steps: u64,
    ) -> std::result::Result<Verified, Rejection> {
        let skew_ms = now.timestamp_millis().abs_diff(claims.issued_at_ms);
        let bound_ms = u64::try_from(self.config.staleness_bound.as_millis()).unwrap_or(u64::MAX);
        if skew_ms > bound_ms {
            return Err(Rejection::Expired);
        }

        let current = time_step(now, self.config.rotation_interval);
        let first = current.saturating_sub(tolerance_steps);
        let last = current.saturating_add(tolerance_steps);

        (first..=last)
            .find(|step| codes_match(&one_time_code(secret, *step), &claims.code))
            .map(|matched_step| Verified {
                session_id: claims.session_id.clone(),
                matched_step,
                issued_at_ms: claims.issued_at_ms,
            })
            .ok_or(Rejection::CodeMismatch)
    }

    /// Opens and checks an envelope using the configured tolerance.
    pub fn verify(
        &self,
        envelope: &str,
        secret: &SessionSecret,
        now: DateTime<Utc>,
    ) -> std::result::Result<Verified, Rejection> {
        self.verify_with_tolerance(envelope, secret, now, self.config.tolerance_steps)
    }

    /// Opens and checks an envelope accepting `tolerance_steps` on each side of "now".
    pub fn verify_with_tolerance(
        &self,
        envelope: &str,
        secret: &SessionSecret,
        now: DateTime<Utc>,
        tolerance_steps: u64,
    ) -> std::result::Result<Verified, Rejection> {
        let claims = self.open(envelope)?;
        self.check(&claims, secret, now, tolerance_steps)
    }
}

fn decode_segment(segment: &str) -> std::result::Result<Vec<u8>, Rejection> {
    if segment.is_empty() {
        return Err(Rejection::MalformedEnvelope);
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| Rejection::MalformedEnvelope)
}
