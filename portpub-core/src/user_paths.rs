//! User directory helpers for portpub.

use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Get the user's home directory.
#[must_use = "home directory path should be used"]
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| CoreError::Internal("Could not find home directory".into()))
}

/// Get the user's configuration directory for portpub.
///
/// Returns:
/// - Linux: `~/.config/portpub` or `$XDG_CONFIG_HOME/portpub`
/// - macOS: `~/Library/Application Support/portpub`
#[must_use = "configuration directory path should be used"]
pub fn user_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("portpub"))
        .ok_or_else(|| CoreError::Internal("Could not find configuration directory".into()))
}

/// Get portpub's state directory (`~/.portpub`).
#[must_use = "state directory path should be used"]
pub fn state_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".portpub"))
}

/// Get the global configuration path (`<config dir>/config.yaml`).
#[must_use = "global configuration path should be used"]
pub fn global_config_path() -> Result<PathBuf> {
    Ok(user_config_dir()?.join("config.yaml"))
}

/// Get the default binding state file (`~/.portpub/bindings.json`).
#[must_use = "binding state path should be used"]
pub fn bindings_state_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("bindings.json"))
}
