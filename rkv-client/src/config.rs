//! Registry configuration loaded from JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Limits and defaults for the connection registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Upper bound on concurrently registered connections.
    pub max_connections: usize,
    /// Connections unused for longer than this are reaped.
    pub idle_timeout_secs: u64,
    /// Serve new connections from the in-process store.
    pub local_mode: bool,
    /// Connect timeout for remote connections.
    pub connect_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            max_connections: 10,
            idle_timeout_secs: 30 * 60,
            local_mode: false,
            connect_timeout_ms: 5_000,
        }
    }
}

impl RegistryConfig {
    /// Loads a JSON file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "registry config not found, using defaults");
                return Ok(RegistryConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let config: RegistryConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "maxConnections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.idle_timeout(), Duration::from_secs(1800));
        assert!(!config.local_mode);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"maxConnections": 3, "localMode": true}"#).unwrap();
        assert_eq!(config.max_connections, 3);
        assert!(config.local_mode);
        assert_eq!(config.idle_timeout_secs, 1800);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = RegistryConfig::load("/nonexistent/rkv-registry.json").unwrap();
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn load_rejects_bad_files() {
        let dir = std::env::temp_dir();
        let bad_json = dir.join(format!("rkv-registry-bad-{}.json", std::process::id()));
        fs::write(&bad_json, "{ not json").unwrap();
        assert!(matches!(
            RegistryConfig::load(&bad_json),
            Err(ConfigError::Parse { .. })
        ));

        let zero = dir.join(format!("rkv-registry-zero-{}.json", std::process::id()));
        fs::write(&zero, r#"{"maxConnections": 0}"#).unwrap();
        assert!(matches!(
            RegistryConfig::load(&zero),
            Err(ConfigError::Invalid(_))
        ));

        let _ = fs::remove_file(bad_json);
        let _ = fs::remove_file(zero);
    }
}
