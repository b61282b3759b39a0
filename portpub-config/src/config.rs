//! Engine configuration structures.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use portpub_core::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Root structure for engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Host address used when a port spec names none (default: 0.0.0.0)
    #[serde(default = "default_host_address")]
    pub default_host_address: IpAddr,

    /// Host ports eligible for automatic allocation
    #[serde(default, skip_serializing_if = "EphemeralRange::is_default")]
    pub ephemeral: EphemeralRange,

    /// Where the CLI keeps its binding snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

fn default_host_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_host_address: default_host_address(),
            ephemeral: EphemeralRange::default(),
            state_file: None,
        }
    }
}

impl EngineConfig {
    /// Rejects settings the allocator cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.ephemeral.validate()
    }

    /// Builder-style override of the ephemeral range, mostly for tests.
    pub fn with_ephemeral(mut self, start: u16, end: u16) -> Self {
        self.ephemeral = EphemeralRange { start, end };
        self
    }
}

/// Inclusive range of host ports handed out when no host port is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralRange {
    #[serde(default = "default_ephemeral_start")]
    pub start: u16,

    #[serde(default = "default_ephemeral_end")]
    pub end: u16,
}

fn default_ephemeral_start() -> u16 {
    32768
}

fn default_ephemeral_end() -> u16 {
    60999
}

impl Default for EphemeralRange {
    fn default() -> Self {
        Self {
            start: default_ephemeral_start(),
            end: default_ephemeral_end(),
        }
    }
}

impl EphemeralRange {
    /// Check if settings are at defaults
    pub fn is_default(&self) -> bool {
        self.start == default_ephemeral_start() && self.end == default_ephemeral_end()
    }

    pub fn validate(&self) -> Result<()> {
        if self.start == 0 {
            return Err(CoreError::Config(
                "ephemeral range may not include port 0".to_string(),
            ));
        }
        if self.start > self.end {
            return Err(CoreError::Config(format!(
                "ephemeral range {}-{} is reversed",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Parses the `START-END` form used by `PORTPUB_EPHEMERAL_RANGE`.
    pub fn parse(value: &str) -> Result<Self> {
        let (start, end) = value.trim().split_once('-').ok_or_else(|| {
            CoreError::Config(format!(
                "invalid ephemeral range '{}', expected START-END",
                value
            ))
        })?;
        let parse_bound = |bound: &str| {
            bound.trim().parse::<u16>().map_err(|_| {
                CoreError::Config(format!("invalid ephemeral range bound '{}'", bound))
            })
        };
        let range = EphemeralRange {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        };
        range.validate()?;
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.default_host_address.to_string(), "0.0.0.0");
        assert!(config.ephemeral.is_default());
        assert_eq!(config.ephemeral, EphemeralRange { start: 32768, end: 60999 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: EngineConfig = serde_yaml_ng::from_str("ephemeral:\n  start: 40000\n").unwrap();
        assert_eq!(config.ephemeral.start, 40000);
        assert_eq!(config.ephemeral.end, 60999);
        assert_eq!(config.default_host_address.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_default_config_serializes_minimally() {
        let yaml = serde_yaml_ng::to_string(&EngineConfig::default()).unwrap();
        assert!(yaml.contains("default_host_address: 0.0.0.0"));
        assert!(!yaml.contains("ephemeral"));
        assert!(!yaml.contains("state_file"));
    }

    #[test]
    fn test_reversed_range_rejected() {
        let config = EngineConfig::default().with_ephemeral(5000, 4000);
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_parse_ephemeral_range() {
        let range = EphemeralRange::parse("49152-49160").unwrap();
        assert_eq!(range.start, 49152);
        assert_eq!(range.end, 49160);

        assert!(EphemeralRange::parse("49152").is_err());
        assert!(EphemeralRange::parse("0-10").is_err());
        assert!(EphemeralRange::parse("10-x").is_err());
        assert!(EphemeralRange::parse("20-10").is_err());
    }
}
