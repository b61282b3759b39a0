// Standard library imports
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

// External crate imports
use portpub_core::error::{CoreError, Result};
use portpub_core::user_paths;
use tracing::debug;

// Internal imports
use crate::config::{EngineConfig, EphemeralRange};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PORTPUB_CONFIG";
/// `START-END` override for the ephemeral range.
pub const EPHEMERAL_ENV: &str = "PORTPUB_EPHEMERAL_RANGE";
/// Override for the default host address.
pub const DEFAULT_HOST_ENV: &str = "PORTPUB_DEFAULT_HOST";
/// Override for the CLI state file.
pub const STATE_FILE_ENV: &str = "PORTPUB_STATE_FILE";

/// Finds and loads the engine configuration.
///
/// Priority chain:
/// 1. **Explicit file:** `$PORTPUB_CONFIG`, which must exist.
/// 2. **Global file:** `~/.config/portpub/config.yaml`, if present.
/// 3. **Built-in defaults.**
///
/// `PORTPUB_*` environment overrides are applied on top, then the result is
/// validated.
#[derive(Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self) -> Result<EngineConfig> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                debug!("Loading config from {}: {}", CONFIG_ENV, path.display());
                self.load_file(&path)?
            }
            None => {
                let global = user_paths::global_config_path()?;
                if global.exists() {
                    debug!("Loading config from: {}", global.display());
                    self.load_file(&global)?
                } else {
                    debug!("No config file found, using defaults");
                    EngineConfig::default()
                }
            }
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config file without environment overrides.
    pub fn load_file(&self, path: &Path) -> Result<EngineConfig> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if contents.trim().is_empty() {
            return Ok(EngineConfig::default());
        }

        let config: EngineConfig = serde_yaml_ng::from_str(&contents).map_err(|e| {
            CoreError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(config: &mut EngineConfig) -> Result<()> {
        if let Ok(range) = std::env::var(EPHEMERAL_ENV) {
            config.ephemeral = EphemeralRange::parse(&range)?;
            debug!(
                "Ephemeral range overridden to {}-{}",
                config.ephemeral.start, config.ephemeral.end
            );
        }

        if let Ok(host) = std::env::var(DEFAULT_HOST_ENV) {
            config.default_host_address = host.trim().parse::<IpAddr>().map_err(|_| {
                CoreError::Config(format!("{} is not an IP address: {}", DEFAULT_HOST_ENV, host))
            })?;
        }

        if let Some(path) = std::env::var_os(STATE_FILE_ENV) {
            config.state_file = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// State file path after overrides, falling back to `~/.portpub/bindings.json`.
    pub fn state_file(config: &EngineConfig) -> Result<PathBuf> {
        match &config.state_file {
            Some(path) => Ok(path.clone()),
            None => user_paths::bindings_state_path(),
        }
    }
}
