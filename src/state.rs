use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::crypto::token::TokenCodec;
use crate::models::settings::Settings;
use crate::repositories::{
    attendance::AttendanceRepository, class_session::ClassSessionRepository,
    course::CourseRepository,
};

/// The live attendance policy.
///
/// Readers take a copy per request, so a concurrent update never changes
/// the rules halfway through a scan.
#[derive(Clone)]
pub struct SettingsStore {
    current: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    /// Creates a new `SettingsStore`.
    pub fn new(initial: Settings) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial.clamped())),
        }
    }

    /// Returns a copy of the current settings.
    pub async fn snapshot(&self) -> Settings {
        *self.current.read().await
    }

    /// Replaces the settings, clamping them first. Returns what was stored.
    pub async fn replace(&self, settings: Settings) -> Settings {
        let clamped = settings.clamped();
        *self.current.write().await = clamped;
        clamped
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The QR envelope codec. Timing is replaced per call from `settings`.
    pub codec: TokenCodec,
    /// The attendance policy.
    pub settings: SettingsStore,
    /// Class sessions and their secrets.
    pub sessions: ClassSessionRepository,
    /// Attendance records.
    pub attendance: AttendanceRepository,
    /// Course ownership and rosters.
    pub courses: CourseRepository,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    pub fn new(config: &Config) -> Self {
        let codec = TokenCodec::new(config.envelope_key.clone(), config.settings.codec_config());
        tracing::info!("✅ QR token codec initialized");

        let settings = SettingsStore::new(config.settings);
        tracing::info!(
            "✅ Attendance settings loaded (rotation every {}s)",
            config.settings.rotation_interval_secs
        );

        AppState {
            codec,
            settings,
            sessions: ClassSessionRepository::new(),
            attendance: AttendanceRepository::new(),
            courses: CourseRepository::new(),
        }
    }

    /// The codec configured with the current settings.
    pub async fn current_codec(&self) -> (TokenCodec, Settings) {
        let settings = self.settings.snapshot().await;
        (self.codec.with_config(settings.codec_config()), settings)
    }
}
