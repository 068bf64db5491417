//! Scanner configuration.

use super::Facing;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for camera selection and device access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Output sizes wider than this are skipped when choosing a resolution.
    pub max_output_width: u32,
    /// How long `open` waits for the device lock before giving up.
    pub lock_timeout_ms: u64,
    /// Which camera to use. Front cameras are skipped unless requested.
    pub preferred_facing: Facing,
    /// Request continuous autofocus on the repeating preview request.
    pub continuous_autofocus: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_output_width: 1024,
            lock_timeout_ms: 2500,
            preferred_facing: Facing::Back,
            continuous_autofocus: true,
        }
    }
}

impl ScannerConfig {
    /// Returns the lock timeout as a `Duration`.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_output_width == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid maximum output width")]
    InvalidDimensions,
    #[error("invalid lock timeout (must be non-zero)")]
    InvalidTimeout,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.scanner.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let config = ScannerConfig {
            lock_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [scanner]
            max_output_width = 1920
            preferred_facing = "front"
            "#,
        )
        .unwrap();

        assert_eq!(config.scanner.max_output_width, 1920);
        assert_eq!(config.scanner.preferred_facing, Facing::Front);
        assert_eq!(config.scanner.lock_timeout_ms, 2500);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        let result = FileConfig::from_toml("[scanner]\nmax_output_width = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidDimensions)));
    }
}
