//! Runtime configuration: optional JSON file, then process environment.
//!
//! File lookup: env `ADAOPS_CONFIG_PATH`, then `./config/adaops.json`, then `./adaops.json`.
//! Environment variables override file values:
//!
//! | variable | field |
//! |----------|-------|
//! | `ADAOPS_CARDANO_CLI` | `cardano_cli` |
//! | `CARDANO_ERA` | `era` |
//! | `CARDANO_NODE_NETWORK_ID` | `network` (`mainnet`, `1`, `2`) |
//! | `CARDANO_NODE_SOCKET_PATH` | `socket_path` |
//! | `ADAOPS_OFFLINE` | `offline` |
//! | `ADAOPS_CACHE_PATH` | `cache_path` |
//! | `ADAOPS_COMMAND_TIMEOUT_SECS` | `command_timeout_secs` |

use crate::era::{CliEra, UnknownEra};
use crate::network::{Network, UnknownNetwork};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "ADAOPS_CONFIG_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Network(#[from] UnknownNetwork),
    #[error(transparent)]
    Era(#[from] UnknownEra),
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaopsConfig {
    /// Binary name looked up in `PATH`, or a path to it.
    pub cardano_cli: String,
    pub era: CliEra,
    pub network: Network,
    pub socket_path: Option<PathBuf>,
    /// Answer queries from the cache only; never touch the node socket.
    pub offline: bool,
    pub cache_path: Option<PathBuf>,
    pub command_timeout_secs: Option<u64>,
    pub tip_retries: u32,
    pub tip_retry_delay_ms: u64,
    pub tx_poll_interval_ms: u64,
}

impl Default for AdaopsConfig {
    fn default() -> Self {
        Self {
            cardano_cli: "cardano-cli".to_string(),
            era: CliEra::Conway,
            network: Network::Mainnet,
            socket_path: None,
            offline: false,
            cache_path: None,
            command_timeout_secs: None,
            tip_retries: 3,
            tip_retry_delay_ms: 3_000,
            tx_poll_interval_ms: 1_000,
        }
    }
}

impl AdaopsConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Config file (if any) overridden by the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::locate_file() {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                Self::load_from_path(&path)?
            }
            None => Self::default(),
        };
        config.apply_vars(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    /// Defaults overridden by the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_vars(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    fn locate_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }
        [
            Path::new("./config/adaops.json"),
            Path::new("./adaops.json"),
        ]
        .into_iter()
        .find(|p| p.exists())
        .map(Path::to_path_buf)
    }

    /// Apply overrides from a variable lookup (the process environment in practice).
    pub fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let non_empty = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ADAOPS_CARDANO_CLI") {
            self.cardano_cli = v;
        }
        if let Some(v) = non_empty("CARDANO_ERA") {
            self.era = v.parse()?;
        }
        if let Some(v) = non_empty("CARDANO_NODE_NETWORK_ID") {
            self.network = Network::from_network_id(&v)?;
        }
        if let Some(v) = non_empty("CARDANO_NODE_SOCKET_PATH") {
            self.socket_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ADAOPS_OFFLINE") {
            self.offline = is_truthy(&v);
        }
        if let Some(v) = non_empty("ADAOPS_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("ADAOPS_COMMAND_TIMEOUT_SECS") {
            let secs = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: "ADAOPS_COMMAND_TIMEOUT_SECS",
                value: v.clone(),
            })?;
            self.command_timeout_secs = Some(secs);
        }
        Ok(())
    }
}

/// Environment-style boolean: everything except `""`, `false`, `0`, `no`, `n`, `off` is true.
pub fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "false" | "0" | "no" | "n" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn truthy_values() {
        for v in ["true", "1", "yes", "Y", "on", "anything"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["", "false", "0", "No", "n", "OFF"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn env_overrides_defaults() {
        let mut c = AdaopsConfig::default();
        c.apply_vars(vars(&[
            ("ADAOPS_CARDANO_CLI", "/opt/bin/cardano-cli"),
            ("CARDANO_ERA", "babbage"),
            ("CARDANO_NODE_NETWORK_ID", "1"),
            ("CARDANO_NODE_SOCKET_PATH", "/run/node.socket"),
            ("ADAOPS_OFFLINE", "yes"),
            ("ADAOPS_COMMAND_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(c.cardano_cli, "/opt/bin/cardano-cli");
        assert_eq!(c.era, CliEra::Babbage);
        assert_eq!(c.network, Network::Preprod);
        assert_eq!(c.socket_path, Some(PathBuf::from("/run/node.socket")));
        assert!(c.offline);
        assert_eq!(c.command_timeout_secs, Some(30));
    }

    #[test]
    fn bad_env_values_error() {
        let mut c = AdaopsConfig::default();
        assert!(matches!(
            c.apply_vars(vars(&[("CARDANO_NODE_NETWORK_ID", "preprod")])),
            Err(ConfigError::Network(_))
        ));
        assert!(matches!(
            c.apply_vars(vars(&[("ADAOPS_COMMAND_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn file_values_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adaops.json");
        std::fs::write(
            &path,
            r#"{"network": "preview", "era": "latest", "tip_retries": 5}"#,
        )
        .unwrap();
        let c = AdaopsConfig::load_from_path(&path).unwrap();
        assert_eq!(c.network, Network::Preview);
        assert_eq!(c.era, CliEra::Latest);
        assert_eq!(c.tip_retries, 5);
        assert_eq!(c.cardano_cli, "cardano-cli");
    }
}
