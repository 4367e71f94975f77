// src/settings/mod.rs
pub mod io;

use crate::sheets::systems::BackfillConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_KEYRING_SERVICE: &str = "sheetsync_google";
pub const DEFAULT_KEYRING_USER: &str = "oauth_refresh_token";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GoogleSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub keyring_service: String,
    pub keyring_user: String,
    /// Pre-issued bearer token. Never written back to disk.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            keyring_user: DEFAULT_KEYRING_USER.to_string(),
            access_token: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BackfillSettings {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub guard_minutes: i64,
    pub retry_after_minutes: i64,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause_ms: 1000,
            guard_minutes: 5,
            retry_after_minutes: 10,
        }
    }
}

impl BackfillSettings {
    /// Replace out-of-range values with defaults. Returns true when anything changed.
    pub fn sanitize(&mut self) -> bool {
        let defaults = Self::default();
        let mut changed = false;
        if self.batch_size == 0 {
            warn!("backfill.batch_size must be positive, using {}", defaults.batch_size);
            self.batch_size = defaults.batch_size;
            changed = true;
        }
        if self.guard_minutes < 0 {
            warn!(
                "backfill.guard_minutes={} is negative, using {}",
                self.guard_minutes, defaults.guard_minutes
            );
            self.guard_minutes = defaults.guard_minutes;
            changed = true;
        }
        if self.retry_after_minutes < 0 {
            warn!(
                "backfill.retry_after_minutes={} is negative, using {}",
                self.retry_after_minutes, defaults.retry_after_minutes
            );
            self.retry_after_minutes = defaults.retry_after_minutes;
            changed = true;
        }
        changed
    }

    pub fn engine_config(&self) -> BackfillConfig {
        BackfillConfig {
            batch_size: self.batch_size.max(1),
            batch_pause: Duration::from_millis(self.batch_pause_ms),
            guard_window: chrono::Duration::minutes(self.guard_minutes),
        }
    }

    pub fn retry_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.retry_after_minutes)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    /// Cache database file; the platform data directory is used when unset.
    pub database_path: Option<PathBuf>,
    pub google: GoogleSettings,
    pub backfill: BackfillSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "backfill": { "batch_size": 25 } }"#).unwrap();
        assert_eq!(settings.backfill.batch_size, 25);
        assert_eq!(settings.backfill.guard_minutes, 5);
        assert_eq!(settings.google.keyring_service, DEFAULT_KEYRING_SERVICE);
        assert!(settings.database_path.is_none());
    }

    #[test]
    fn engine_config_follows_settings() {
        let settings = BackfillSettings {
            batch_size: 0,
            batch_pause_ms: 250,
            guard_minutes: 3,
            retry_after_minutes: 15,
        };
        let config = settings.engine_config();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.batch_pause, Duration::from_millis(250));
        assert_eq!(config.guard_window, chrono::Duration::minutes(3));
        assert_eq!(settings.retry_after(), chrono::Duration::minutes(15));
    }

    #[test]
    fn access_token_is_not_serialized() {
        let mut settings = AppSettings::default();
        settings.google.access_token = Some("tok-XYZ".into());
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("tok-XYZ"));
        assert!(!json.contains("access_token"));
        assert!(json.contains("client_secret"));
    }

    #[test]
    fn sanitize_replaces_negative_windows() {
        let mut settings = BackfillSettings {
            batch_size: 0,
            batch_pause_ms: 0,
            guard_minutes: -5,
            retry_after_minutes: -1,
        };
        assert!(settings.sanitize());
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.batch_pause_ms, 0);
        assert_eq!(settings.guard_minutes, 5);
        assert_eq!(settings.retry_after_minutes, 10);

        let mut valid = BackfillSettings::default();
        assert!(!valid.sanitize());
        assert_eq!(valid, BackfillSettings::default());
    }
}
