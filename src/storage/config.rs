//! App configuration storage.
//!
//! Handles loading and saving `config.json` from the user config directory.
//! Cross-platform: uses the appropriate config directory for each OS.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::LightProfile;
use crate::error::{NeewerError, Result};
use crate::protocol::{MAX_BRIGHTNESS, MAX_KELVIN, MIN_KELVIN};

// =============================================================================
// Config Path
// =============================================================================

pub(crate) const APP_NAME: &str = "neewerctl";
const CONFIG_FILE: &str = "config.json";

/// Well-known daemon socket.
pub const DEFAULT_SOCKET_PATH: &str = "/run/neewer.sock";

/// Serial port used when neither the CLI nor the config names one.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Get the configuration directory path.
/// - Linux: ~/.config/neewerctl/
/// - Windows: %APPDATA%\neewerctl\
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .ok_or_else(|| NeewerError::InvalidInput("Could not find config directory".into()))
}

/// Get the full path to the config file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

// =============================================================================
// Storage Structures
// =============================================================================

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Serial port of the panel.
    #[serde(default = "default_port")]
    pub port: String,

    /// How long a connection may take to send its request (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Delay before closing a get-state connection (ms).
    #[serde(default = "default_reply_linger_ms")]
    pub reply_linger_ms: u64,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_reply_linger_ms() -> u64 {
    100
}

impl DaemonConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reply_linger(&self) -> Duration {
        Duration::from_millis(self.reply_linger_ms)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            reply_linger_ms: default_reply_linger_ms(),
        }
    }
}

/// Stored custom light profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub brightness: u8,
    pub temperature: u16,
}

/// Main configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Custom light profiles by name
    #[serde(default)]
    pub profiles: HashMap<String, StoredProfile>,
}

impl AppConfig {
    /// Resolve a profile name: built-in presets first, then custom profiles.
    pub fn profile(&self, name: &str) -> Result<LightProfile> {
        if let Some(profile) = LightProfile::builtin(name) {
            return Ok(profile);
        }

        let key = name.to_lowercase();
        self.profiles
            .iter()
            .find(|(n, _)| n.to_lowercase() == key)
            .map(|(n, p)| LightProfile::Custom {
                name: n.clone(),
                brightness: p.brightness.min(MAX_BRIGHTNESS),
                temperature: p.temperature.clamp(MIN_KELVIN, MAX_KELVIN),
            })
            .ok_or_else(|| NeewerError::InvalidInput(format!("Unknown profile: {}", name)))
    }

    /// All profile names, built-in first.
    pub fn profile_names(&self) -> Vec<String> {
        let mut custom: Vec<String> = self.profiles.keys().cloned().collect();
        custom.sort();
        LightProfile::BUILTIN
            .iter()
            .map(|p| p.name().to_string())
            .chain(custom)
            .collect()
    }
}

// =============================================================================
// Storage Functions
// =============================================================================

/// Load configuration from disk, falling back to defaults if absent.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from an explicit file.
pub fn load_config_from(path: &std::path::Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| NeewerError::InvalidInput(format!("Failed to read config: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| NeewerError::InvalidInput(format!("Failed to parse config: {}", e)))
}

/// Save configuration to disk.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let dir = get_config_dir()?;
    let path = dir.join(CONFIG_FILE);

    std::fs::create_dir_all(&dir)
        .map_err(|e| NeewerError::InvalidInput(format!("Failed to create config dir: {}", e)))?;

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| NeewerError::InvalidInput(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(&path, content)
        .map_err(|e| NeewerError::InvalidInput(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Ensure that the configuration file exists, writing defaults if it doesn't.
pub fn ensure_config_exists() -> Result<PathBuf> {
    let path = get_config_path()?;
    if !path.exists() {
        save_config(&AppConfig::default())?;
        tracing::info!(path = %path.display(), "Created default config");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.daemon.socket_path, PathBuf::from("/run/neewer.sock"));
        assert_eq!(config.daemon.port, "/dev/ttyUSB0");
        assert_eq!(config.daemon.reply_linger(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_daemon_section() {
        let config: AppConfig =
            serde_json::from_str(r#"{"daemon":{"port":"/dev/ttyACM0"}}"#).unwrap();
        assert_eq!(config.daemon.port, "/dev/ttyACM0");
        assert_eq!(config.daemon.request_timeout_ms, 5000);
    }

    #[test]
    fn test_profile_resolution() {
        let mut config = AppConfig::default();
        config.profiles.insert(
            "Reading".into(),
            StoredProfile {
                brightness: 150,
                temperature: 4000,
            },
        );

        assert_eq!(config.profile("cold").unwrap(), LightProfile::Cold);

        let reading = config.profile("reading").unwrap();
        assert_eq!(reading.name(), "Reading");
        assert_eq!(reading.brightness(), 100);
        assert_eq!(reading.temperature(), 4000);

        assert!(config.profile("disco").is_err());
        assert_eq!(config.profile_names().last().unwrap(), "Reading");
    }

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
