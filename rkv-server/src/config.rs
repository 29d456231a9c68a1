//! Server configuration: JSON file, then environment overrides.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

pub const ENV_BIND: &str = "RKV_BIND";
pub const ENV_LOG_LEVEL: &str = "RKV_LOG_LEVEL";

/// Where the loaded values came from.
///
/// `load` runs before logging is installed, so the caller reports this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// The file was missing; built-in defaults were used.
    Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Pause between background expiry sweeps.
    pub sweep_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:6380".to_string(),
            log_level: "info".to_string(),
            sweep_interval_ms: 1_000,
        }
    }
}

impl ServerConfig {
    /// Reads `path` (defaults when missing), applies `RKV_*` overrides, and
    /// validates the result.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        let (mut config, source) = match fs::read_to_string(path) {
            Ok(raw) => {
                let config = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                (config, ConfigSource::File)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                (ServerConfig::default(), ConfigSource::Defaults)
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        config.apply_env(|name| env::var(name).ok());
        config.validate()?;
        Ok((config, source))
    }

    /// Applies overrides from `lookup` (the process environment in `load`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval_ms == 0 {
            bail!("sweepIntervalMs must be greater than zero");
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))
    }

    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.bind_addr().unwrap().port(), 6380);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: ServerConfig =
            serde_json::from_str(r#"{"bind": "0.0.0.0:7000", "logLevel": "warn"}"#).unwrap();
        config.apply_env(|name| match name {
            ENV_BIND => Some("127.0.0.1:7001".to_string()),
            _ => None,
        });
        assert_eq!(config.bind, "127.0.0.1:7001");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.sweep_interval_ms, 1_000);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let zero_sweep = ServerConfig {
            sweep_interval_ms: 0,
            ..ServerConfig::default()
        };
        assert!(zero_sweep.validate().is_err());

        let bad_bind = ServerConfig {
            bind: "not an address".to_string(),
            ..ServerConfig::default()
        };
        assert!(bad_bind.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let (config, source) = ServerConfig::load("/nonexistent/rkv-server.json").unwrap();
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(config.sweep_interval_ms, 1_000);
    }

    #[test]
    fn present_file_is_reported_as_source() {
        let path = env::temp_dir().join(format!("rkv-server-{}.json", std::process::id()));
        fs::write(&path, r#"{"sweepIntervalMs": 250}"#).unwrap();
        let loaded = ServerConfig::load(&path);
        fs::remove_file(&path).unwrap();

        let (config, source) = loaded.unwrap();
        assert_eq!(source, ConfigSource::File);
        assert_eq!(config.sweep_interval(), Duration::from_millis(250));
    }
}
