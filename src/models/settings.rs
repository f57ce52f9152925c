use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::token::CodecConfig;

/// Runtime attendance policy, editable by administrators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub rotation_interval_secs: u64,
    /// Maximum age of a scanned envelope. Never below the rotation interval.
    pub staleness_secs: u64,
    pub tolerance_steps: u64,
    pub geolocation_radius_m: f64,
    pub require_geolocation: bool,
    pub late_threshold_minutes: i64,
    pub allow_manual_attendance: bool,
    pub auto_end_sessions: bool,
    pub auto_end_hours: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rotation_interval_secs: 10,
            staleness_secs: 20,
            tolerance_steps: 1,
            geolocation_radius_m: 100.0,
            require_geolocation: false,
            late_threshold_minutes: 15,
            allow_manual_attendance: true,
            auto_end_sessions: true,
            auto_end_hours: 4,
        }
    }
}

impl Settings {
    /// Pulls every field into its supported range.
    pub fn clamped(self) -> Self {
        let rotation_interval_secs = self.rotation_interval_secs.clamp(5, 120);
        let radius = if self.geolocation_radius_m.is_finite() {
            self.geolocation_radius_m.clamp(10.0, 500.0)
        } else {
            Settings::default().geolocation_radius_m
        };

        Self {
            rotation_interval_secs,
            staleness_secs: self
                .staleness_secs
                .clamp(rotation_interval_secs, rotation_interval_secs * 6),
            tolerance_steps: self.tolerance_steps.min(5),
            geolocation_radius_m: radius,
            require_geolocation: self.require_geolocation,
            late_threshold_minutes: self.late_threshold_minutes.clamp(1, 60),
            allow_manual_attendance: self.allow_manual_attendance,
            auto_end_sessions: self.auto_end_sessions,
            auto_end_hours: self.auto_end_hours.clamp(1, 12),
        }
    }

    /// The token codec timing derived from this policy.
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig::new(Duration::from_secs(self.rotation_interval_secs))
            .with_staleness_bound(Duration::from_secs(self.staleness_secs))
            .with_tolerance_steps(self.tolerance_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_codec_defaults() {
        assert_eq!(Settings::default().codec_config(), CodecConfig::default());
    }

    #[test]
    fn clamping_pulls_values_into_range() {
        let wild = Settings {
            rotation_interval_secs: 1,
            staleness_secs: 0,
            tolerance_steps: 99,
            geolocation_radius_m: f64::NAN,
            require_geolocation: true,
            late_threshold_minutes: 600,
            allow_manual_attendance: false,
            auto_end_sessions: true,
            auto_end_hours: 0,
        }
        .clamped();

        assert_eq!(wild.rotation_interval_secs, 5);
        assert_eq!(wild.staleness_secs, 5);
        assert_eq!(wild.tolerance_steps, 5);
        assert_eq!(wild.geolocation_radius_m, 100.0);
        assert_eq!(wild.late_threshold_minutes, 60);
        assert_eq!(wild.auto_end_hours, 1);
        assert!(wild.require_geolocation);
        assert!(!wild.allow_manual_attendance);
    }
}
