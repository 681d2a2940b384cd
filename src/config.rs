//! Configuration management for the feedit proxy

use crate::error::{FeedError, Result};
use crate::models::BufferSizeBounds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the streaming proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Address the HTTP front end binds to (default: 127.0.0.1:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Window used until a bitrate estimate exists for a URL (default: 1,024,000 bytes)
    #[serde(default = "default_window_size")]
    pub default_window_size: u64,

    /// Lower bound for bitrate-derived windows (default: 1MB)
    #[serde(default = "default_min_buffer_size")]
    pub min_buffer_size: u64,

    /// Upper bound for bitrate-derived windows (default: 10MB)
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: u64,

    /// Directory holding one bitrate file per probed URL (default: .feedit)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Whether to consult and populate the bitrate cache (default: true)
    #[serde(default = "default_true")]
    pub enable_bitrate_cache: bool,

    /// Timeout for the upstream HEAD request in seconds (default: 10)
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    /// Connect timeout for the upstream ranged fetch in seconds (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Raise bitrate cache diagnostics to info level (default: false)
    #[serde(default)]
    pub debug: bool,

    /// External bitrate probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for the external bitrate probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Program invoked to measure bitrate (default: "ffprobe")
    #[serde(default = "default_probe_program")]
    pub program: String,

    /// Seconds before the probe subprocess is killed (default: 30)
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_probe_program(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_window_size() -> u64 {
    1024 * 1000
}

fn default_min_buffer_size() -> u64 {
    BufferSizeBounds::DEFAULT_MIN
}

fn default_max_buffer_size() -> u64 {
    BufferSizeBounds::DEFAULT_MAX
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".feedit")
}

fn default_true() -> bool {
    true
}

fn default_metadata_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_probe_program() -> String {
    "ffprobe".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            listen_address: default_listen_address(),
            default_window_size: default_window_size(),
            min_buffer_size: default_min_buffer_size(),
            max_buffer_size: default_max_buffer_size(),
            cache_dir: default_cache_dir(),
            enable_bitrate_cache: default_true(),
            metadata_timeout_secs: default_metadata_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            debug: false,
            probe: ProbeConfig::default(),
            metrics_endpoint: None,
        }
    }
}

impl FeedConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(FeedConfig)` if loading and validation succeed
    /// * `Err(FeedError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            FeedError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: FeedConfig = serde_yaml::from_str(content).map_err(|e| {
            FeedError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - default_window_size must be > 0
    /// - min_buffer_size must be > 0 and <= max_buffer_size
    /// - metadata_timeout_secs and probe.timeout_secs must be > 0
    /// - probe.program must not be empty when the bitrate cache is enabled
    pub fn validate(&self) -> Result<()> {
        if self.default_window_size == 0 {
            return Err(FeedError::ConfigError(
                "default_window_size must be greater than 0".to_string(),
            ));
        }

        BufferSizeBounds::new(self.min_buffer_size, self.max_buffer_size)
            .map_err(|e| FeedError::ConfigError(e.to_string()))?;

        if self.metadata_timeout_secs == 0 {
            return Err(FeedError::ConfigError(
                "metadata_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.enable_bitrate_cache {
            if self.probe.program.trim().is_empty() {
                return Err(FeedError::ConfigError(
                    "probe.program must not be empty when the bitrate cache is enabled".to_string(),
                ));
            }
            if self.probe.timeout_secs == 0 {
                return Err(FeedError::ConfigError(
                    "probe.timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Bounds for one call, with optional per-call overrides
    pub fn bounds_with_overrides(
        &self,
        min: Option<u64>,
        max: Option<u64>,
    ) -> Result<BufferSizeBounds> {
        BufferSizeBounds::new(
            min.unwrap_or(self.min_buffer_size),
            max.unwrap_or(self.max_buffer_size),
        )
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_window_size, 1_024_000);
        assert_eq!(config.cache_dir, PathBuf::from(".feedit"));
        assert_eq!(config.probe.program, "ffprobe");
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = FeedConfig {
            default_window_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FeedError::ConfigError(_))));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = FeedConfig {
            min_buffer_size: 2048,
            max_buffer_size: 1024,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FeedError::ConfigError(_))));
    }

    #[test]
    fn test_empty_probe_program_rejected_only_when_cache_enabled() {
        let mut config = FeedConfig::default();
        config.probe.program = String::new();
        assert!(config.validate().is_err());

        config.enable_bitrate_cache = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bounds_with_overrides() {
        let config = FeedConfig::default();
        let bounds = config.bounds_with_overrides(Some(10), None).unwrap();
        assert_eq!(bounds.min, 10);
        assert_eq!(bounds.max, config.max_buffer_size);

        assert!(config.bounds_with_overrides(None, Some(10)).is_err());
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = FeedConfig::from_yaml("default_window_size: 500\ncache_dir: /tmp/feedit\n").unwrap();
        assert_eq!(config.default_window_size, 500);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/feedit"));
        assert_eq!(config.min_buffer_size, BufferSizeBounds::DEFAULT_MIN);
    }
}
