//! Settings file loading and saving

use std::path::{Path, PathBuf};

use bgloc_core::prelude::*;

use super::types::Settings;

/// Directory name under the platform config dir
pub const APP_DIR: &str = "background-location";

/// Settings filename
pub const CONFIG_FILENAME: &str = "config.toml";

/// Default location of the settings file (`~/.config/background-location/config.toml`)
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from `path`
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to `path`
///
/// Uses atomic write (temp file + rename) and regenerates the header comment.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::config(format!("Failed to create {:?}: {}", dir, e)))?;
        }
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("{}{}", generate_config_header(), content);

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &full_content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    info!("Saved settings to {:?}", path);
    Ok(())
}

/// Write a default settings file if none exists.
///
/// Returns `true` if a file was created.
pub fn init_settings_file(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_settings(path, &Settings::default())?;
    Ok(true)
}

fn generate_config_header() -> String {
    r#"# Background Location Service Configuration
#
# [retry]       backoff for transient provider errors (base_ms, max_ms, jitter)
# [permission]  request_timeout_ms for unanswered permission prompts
# [events]      listener_capacity; events beyond it are dropped, never buffered
# [tracking]    default TrackingConfig used when none is supplied

"#
    .to_string()
}
