//! Engine configuration.
//!
//! [`EngineConfig`] is plain serde data, read from and written to TOML:
//!
//! ```toml
//! sample_rate = 48000.0
//! block_size = 512
//! event_capacity = 1024
//! max_channels = 2
//! ```
//!
//! Missing fields take their defaults, so an empty file is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::MAX_CHANNELS;
use crate::error::ConfigError;
use crate::processor::ProcessorSetup;

/// Runtime settings for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Largest sub-block rendered at once; longer requests are split.
    pub block_size: usize,
    /// Events the audio context can queue before new ones are dropped.
    pub event_capacity: usize,
    /// Output channels rendered by default.
    pub max_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 512,
            event_capacity: 1024,
            max_channels: 2,
        }
    }
}

impl EngineConfig {
    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::invalid(
                "sample_rate",
                format!("must be a positive number of Hz, got {}", self.sample_rate),
            ));
        }
        if self.block_size == 0 {
            return Err(ConfigError::invalid("block_size", "must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be at least 1"));
        }
        if self.max_channels == 0 || self.max_channels > MAX_CHANNELS {
            return Err(ConfigError::invalid(
                "max_channels",
                format!("must be between 1 and {MAX_CHANNELS}, got {}", self.max_channels),
            ));
        }
        Ok(())
    }

    /// Construction parameters for processors.
    pub fn processor_setup(&self) -> ProcessorSetup {
        ProcessorSetup {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = EngineConfig::from_toml("block_size = 64\nmax_channels = 8\n").unwrap();
        assert_eq!(config.block_size, 64);
        assert_eq!(config.max_channels, 8);
        assert_eq!(config.sample_rate, 48000.0);
    }

    #[test]
    fn rejects_too_many_channels() {
        let err = EngineConfig::from_toml("max_channels = 33").unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "max_channels", .. }),
            "got: {err}"
        );
    }

    #[test]
    fn rejects_zero_block_size() {
        let config = EngineConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml("block_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.toml");
        let config = EngineConfig {
            sample_rate: 44100.0,
            block_size: 128,
            event_capacity: 16,
            max_channels: 4,
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let err = EngineConfig::load("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
