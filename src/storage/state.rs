//! Persisted light state.
//!
//! Remembers the last state a client *requested* so that `power on` and
//! `set` can start from it. Lives in the per-user state directory:
//! - Linux: `$XDG_STATE_HOME/neewerctl/state.json` (default `~/.local/state/...`)
//! - elsewhere: the local data directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{NeewerError, Result};
use crate::protocol::DeviceState;

use super::config::APP_NAME;

const STATE_FILE: &str = "state.json";

/// Get the state directory path.
pub fn get_state_dir() -> Result<PathBuf> {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
        .or_else(dirs::data_local_dir)
        .map(|p| p.join(APP_NAME))
        .ok_or_else(|| NeewerError::persistence(STATE_FILE, "could not find a state directory"))
}

/// Get the full path to the state file.
pub fn get_state_path() -> Result<PathBuf> {
    Ok(get_state_dir()?.join(STATE_FILE))
}

/// JSON file holding the last requested [`DeviceState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the per-user default location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::at(get_state_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state.
    ///
    /// A missing file is not an error: the default state (off, 100%, 7000 K,
    /// no port) is returned instead.
    ///
    /// # Errors
    /// Returns `PersistenceFailure` if the file exists but cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<DeviceState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved state, using defaults");
                return Ok(DeviceState::default());
            }
            Err(e) => {
                return Err(NeewerError::persistence(
                    &self.path,
                    format!("failed to read state: {}", e),
                ));
            }
        };

        let state: DeviceState = serde_json::from_str(&content).map_err(|e| {
            NeewerError::persistence(&self.path, format!("failed to parse state: {}", e))
        })?;

        Ok(state.clamped())
    }

    /// Save a state.
    ///
    /// The JSON is written to a temporary file next to the target and renamed
    /// over it, so a concurrent [`load`](Self::load) sees either the old or the
    /// new file, never a partial one.
    ///
    /// # Errors
    /// Returns `PersistenceFailure` if the directory or file cannot be written.
    pub fn save(&self, state: &DeviceState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        std::fs::create_dir_all(&dir).map_err(|e| {
            NeewerError::persistence(&self.path, format!("failed to create state dir: {}", e))
        })?;

        let content = serde_json::to_string_pretty(&state.clone().clamped()).map_err(|e| {
            NeewerError::persistence(&self.path, format!("failed to serialize state: {}", e))
        })?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| {
            NeewerError::persistence(&self.path, format!("failed to create temp file: {}", e))
        })?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| {
                NeewerError::persistence(&self.path, format!("failed to write state: {}", e))
            })?;
        tmp.persist(&self.path).map_err(|e| {
            NeewerError::persistence(&self.path, format!("failed to replace state: {}", e.error))
        })?;

        debug!(path = %self.path.display(), "Saved state");
        Ok(())
    }
}
