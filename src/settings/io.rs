// src/settings/io.rs
use super::AppSettings;
use directories_next::ProjectDirs;
use std::fs;
use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const QUALIFIER: &str = "com";
pub const ORGANIZATION: &str = "SheetSync";
pub const APPLICATION: &str = "sheetsync";
const CONFIG_FILE: &str = "app_settings.json";

pub const ENV_DATABASE: &str = "SHEETSYNC_DATABASE";
pub const ENV_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_ACCESS_TOKEN";
pub const ENV_BATCH_SIZE: &str = "SHEETSYNC_BATCH_SIZE";
pub const ENV_GUARD_MINUTES: &str = "SHEETSYNC_GUARD_MINUTES";

pub fn get_config_path() -> io::Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION) {
        let config_dir = proj_dirs.config_dir();
        fs::create_dir_all(config_dir)?;
        Ok(config_dir.join(CONFIG_FILE))
    } else {
        Err(io::Error::new(
            ErrorKind::NotFound,
            "Could not determine project directories for app settings.",
        ))
    }
}

/// Read settings from `path`. A missing file yields defaults.
pub fn load_settings_from(path: &Path) -> io::Result<AppSettings> {
    info!("AppSettings: Attempting to load settings from {:?}", path);
    match fs::File::open(path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            match serde_json::from_reader::<_, AppSettings>(reader) {
                Ok(mut settings) => {
                    debug!("AppSettings: Successfully deserialized settings.");
                    if settings.backfill.sanitize() {
                        warn!("AppSettings: Corrected invalid backfill values from {:?}", path);
                    }
                    Ok(settings)
                }
                Err(e) => {
                    error!("AppSettings: Failed to parse settings file {:?}: {}", path, e);
                    Err(io::Error::new(
                        ErrorKind::InvalidData,
                        format!("Failed to parse settings file: {}", e),
                    ))
                }
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("AppSettings: Settings file not found at {:?}. Using defaults.", path);
            Ok(AppSettings::default())
        }
        Err(e) => {
            error!("AppSettings: Failed to open settings file {:?}: {}", path, e);
            Err(e)
        }
    }
}

/// Write `settings` as pretty JSON, creating the parent directory when needed.
pub fn save_settings_to(path: &Path, settings: &AppSettings) -> io::Result<()> {
    info!("AppSettings: Saving settings to {:?}", path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, settings).map_err(|e| {
        error!("AppSettings: Failed to serialize settings to {:?}: {}", path, e);
        io::Error::new(ErrorKind::Other, e)
    })
}

/// Apply environment overrides on top of file settings. `lookup` abstracts `std::env::var`.
pub fn apply_env_overrides<F>(settings: &mut AppSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_DATABASE) {
        settings.database_path = Some(PathBuf::from(path));
    }
    if let Some(id) = lookup(ENV_CLIENT_ID) {
        settings.google.client_id = Some(id);
    }
    if let Some(secret) = lookup(ENV_CLIENT_SECRET) {
        settings.google.client_secret = Some(secret);
    }
    if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
        settings.google.access_token = Some(token);
    }
    if let Some(raw) = lookup(ENV_BATCH_SIZE) {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => settings.backfill.batch_size = n,
            _ => warn!("Ignoring {}={:?}: expected a positive integer", ENV_BATCH_SIZE, raw),
        }
    }
    if let Some(raw) = lookup(ENV_GUARD_MINUTES) {
        match raw.parse::<i64>() {
            Ok(n) if n >= 0 => settings.backfill.guard_minutes = n,
            _ => warn!("Ignoring {}={:?}: expected minutes", ENV_GUARD_MINUTES, raw),
        }
    }
}

/// Settings file (or `explicit` path) plus `.env` and process environment overrides.
pub fn load_settings(explicit: Option<&Path>) -> io::Result<AppSettings> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("AppSettings: Could not read .env file: {}", e);
        }
    }

    let mut settings = match explicit {
        Some(path) => load_settings_from(path)?,
        None => load_settings_from(&get_config_path()?)?,
    };
    apply_env_overrides(&mut settings, |key| {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    });
    Ok(settings)
}
