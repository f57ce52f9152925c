use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::crypto::aes::SecureKey;
use crate::crypto::key::resolve_envelope_key;
use crate::models::settings::Settings;

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The system-wide key QR envelopes are sealed with. Distinct from every session secret.
    pub envelope_key: SecureKey,
    /// The initial attendance policy.
    pub settings: Settings,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Creates a new `Config` reading each variable through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_material = Zeroizing::new(lookup("QR_ENCRYPTION_KEY").context(
            "QR_ENCRYPTION_KEY must be set (generate with: openssl rand -hex 32)",
        )?);
        let key_salt = lookup("QR_KEY_SALT");
        let envelope_key = resolve_envelope_key(&key_material, key_salt.as_deref())
            .context("QR_ENCRYPTION_KEY is not usable")?;

        let defaults = Settings::default();
        let rotation_interval_secs: u64 =
            parse_or(&lookup, "QR_ROTATION_INTERVAL_SECS", defaults.rotation_interval_secs)?;

        let settings = Settings {
            rotation_interval_secs,
            staleness_secs: parse_or(
                &lookup,
                "QR_STALENESS_SECS",
                rotation_interval_secs.saturating_mul(2),
            )?,
            tolerance_steps: parse_or(&lookup, "QR_TOLERANCE_STEPS", defaults.tolerance_steps)?,
            geolocation_radius_m: parse_or(
                &lookup,
                "GEOLOCATION_RADIUS_METERS",
                defaults.geolocation_radius_m,
            )?,
            require_geolocation: parse_or(
                &lookup,
                "REQUIRE_GEOLOCATION",
                defaults.require_geolocation,
            )?,
            late_threshold_minutes: parse_or(
                &lookup,
                "LATE_THRESHOLD_MINUTES",
                defaults.late_threshold_minutes,
            )?,
            allow_manual_attendance: parse_or(
                &lookup,
                "ALLOW_MANUAL_ATTENDANCE",
                defaults.allow_manual_attendance,
            )?,
            auto_end_sessions: parse_or(&lookup, "AUTO_END_SESSIONS", defaults.auto_end_sessions)?,
            auto_end_hours: parse_or(&lookup, "AUTO_END_HOURS", defaults.auto_end_hours)?,
        };

        let clamped = settings.clamped();
        if clamped != settings {
            tracing::warn!("⚠️  Some attendance settings were out of range and have been clamped");
        }

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            envelope_key,
            settings: clamped,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        None => Ok(default),
    }
}
