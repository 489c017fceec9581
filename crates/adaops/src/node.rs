//! Locating a running `cardano-node`, its config file and genesis files.

use crate::epoch::{ByronGenesis, EpochError, ShelleyGenesis};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const NODE_PROCESS_NAME: &str = "cardano-node";

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("no running process matching '{0}'")]
    NotRunning(String),
    #[error("node process has no --config argument and no config path was given")]
    ConfigNotGiven,
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
    #[error("node config has no {0} entry")]
    MissingGenesisKey(String),
    #[error("unknown genesis phase '{0}'; must be one of byron, shelley, alonzo")]
    UnknownPhase(String),
    #[error(transparent)]
    Epoch(#[from] EpochError),
}

/// Ledger phase whose genesis file a node config references.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenesisPhase {
    Byron,
    Shelley,
    Alonzo,
}

impl GenesisPhase {
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Byron => "ByronGenesisFile",
            Self::Shelley => "ShelleyGenesisFile",
            Self::Alonzo => "AlonzoGenesisFile",
        }
    }
}

impl fmt::Display for GenesisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Byron => "byron",
            Self::Shelley => "shelley",
            Self::Alonzo => "alonzo",
        })
    }
}

impl std::str::FromStr for GenesisPhase {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "byron" => Ok(Self::Byron),
            "shelley" => Ok(Self::Shelley),
            "alonzo" => Ok(Self::Alonzo),
            other => Err(NodeError::UnknownPhase(other.to_string())),
        }
    }
}

/// A running node process and its `--flag value` arguments.
/// Flags given without a value map to `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeProcess {
    pub pid: u32,
    pub args: BTreeMap<String, Option<String>>,
}

impl NodeProcess {
    pub fn arg(&self, flag: &str) -> Option<&str> {
        self.args.get(flag).and_then(|v| v.as_deref())
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.arg("config").map(PathBuf::from)
    }

    pub fn socket_path(&self) -> Option<PathBuf> {
        self.arg("socket-path").map(PathBuf::from)
    }
}

/// Collects `--flag value` pairs from a command line. Leading positionals
/// (program name, `run`) are skipped.
pub fn parse_node_args<S: AsRef<str>>(cmdline: &[S]) -> BTreeMap<String, Option<String>> {
    let mut args = BTreeMap::new();
    let mut iter = cmdline.iter().map(AsRef::as_ref).peekable();
    while let Some(token) = iter.next() {
        let Some(flag) = token.strip_prefix("--") else {
            continue;
        };
        let value = match iter.peek() {
            Some(next) if !next.starts_with("--") => iter.next().map(str::to_string),
            _ => None,
        };
        args.insert(flag.to_string(), value);
    }
    args
}

/// First running process whose name contains `name`.
pub fn find_node_process(name: &str) -> Result<NodeProcess, NodeError> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    let mut found: Vec<NodeProcess> = sys
        .processes()
        .iter()
        .filter(|(_, p)| p.name().to_string_lossy().contains(name))
        .map(|(pid, p)| {
            let cmd: Vec<String> = p
                .cmd()
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            NodeProcess {
                pid: pid.as_u32(),
                args: parse_node_args(&cmd),
            }
        })
        .collect();
    found.sort_by_key(|p| p.pid);
    if found.len() > 1 {
        warn!(count = found.len(), name, "several node processes, using lowest pid");
    }
    let process = found
        .into_iter()
        .next()
        .ok_or_else(|| NodeError::NotRunning(name.to_string()))?;
    debug!(pid = process.pid, args = ?process.args, "node process found");
    Ok(process)
}

fn read_json(path: &Path) -> Result<Value, NodeError> {
    let raw = std::fs::read_to_string(path).map_err(|source| NodeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| NodeError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Parsed node config plus the directory its relative paths resolve against.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub data: Value,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref().to_path_buf();
        let data = read_json(&path)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!(path = %path.display(), "node config loaded");
        Ok(Self { path, dir, data })
    }

    /// Loads `explicit` when given, otherwise the `--config` of the running node.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, NodeError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let process = find_node_process(NODE_PROCESS_NAME)?;
                let path = process.config_path().ok_or(NodeError::ConfigNotGiven)?;
                Self::load(path)
            }
        }
    }

    pub fn genesis_path(&self, phase: GenesisPhase) -> Result<PathBuf, NodeError> {
        let key = phase.config_key();
        let file = self
            .data
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::MissingGenesisKey(key.to_string()))?;
        let file = Path::new(file);
        Ok(if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.dir.join(file)
        })
    }

    pub fn genesis(&self, phase: GenesisPhase) -> Result<Value, NodeError> {
        read_json(&self.genesis_path(phase)?)
    }

    pub fn shelley_genesis(&self) -> Result<ShelleyGenesis, NodeError> {
        Ok(ShelleyGenesis::load(self.genesis_path(GenesisPhase::Shelley)?)?)
    }

    pub fn byron_genesis(&self) -> Result<ByronGenesis, NodeError> {
        Ok(ByronGenesis::load(self.genesis_path(GenesisPhase::Byron)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn args_collected() {
        let args = parse_node_args(&[
            "/usr/local/bin/cardano-node",
            "run",
            "--topology",
            "topology.json",
            "--database-path",
            "/db",
            "--validate-db",
            "--config",
            "/opt/cardano/config.json",
            "--port",
            "3001",
        ]);
        assert_eq!(args["topology"].as_deref(), Some("topology.json"));
        assert_eq!(args["validate-db"], None);
        assert_eq!(args["port"].as_deref(), Some("3001"));
        let process = NodeProcess { pid: 7, args };
        assert_eq!(
            process.config_path(),
            Some(PathBuf::from("/opt/cardano/config.json"))
        );
        assert_eq!(process.socket_path(), None);
    }

    #[test]
    fn trailing_flag_has_no_value() {
        let args = parse_node_args(&["cardano-node", "--shutdown-on-slot-synced"]);
        assert_eq!(args.len(), 1);
        assert_eq!(args["shutdown-on-slot-synced"], None);
    }

    #[test]
    fn phases() {
        assert_eq!("Shelley".parse::<GenesisPhase>().unwrap(), GenesisPhase::Shelley);
        assert_eq!(GenesisPhase::Alonzo.config_key(), "AlonzoGenesisFile");
        assert!(matches!(
            "conway".parse::<GenesisPhase>(),
            Err(NodeError::UnknownPhase(_))
        ));
    }

    #[test]
    fn genesis_resolves_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"ShelleyGenesisFile": "shelley-genesis.json", "ByronGenesisFile": "/abs/byron.json"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("shelley-genesis.json"),
            r#"{"systemStart": "2022-06-01T00:00:00Z", "epochLength": 86400,
                "slotLength": 1, "slotsPerKESPeriod": 129600, "maxKESEvolutions": 62}"#,
        )
        .unwrap();

        let cfg = NodeConfig::discover(Some(&dir.path().join("config.json"))).unwrap();
        assert_eq!(
            cfg.genesis_path(GenesisPhase::Byron).unwrap(),
            PathBuf::from("/abs/byron.json")
        );
        assert_eq!(cfg.shelley_genesis().unwrap().epoch_length, 86400);
        assert_eq!(cfg.genesis(GenesisPhase::Shelley).unwrap()["slotLength"], 1);
        assert!(matches!(
            cfg.genesis_path(GenesisPhase::Alonzo),
            Err(NodeError::MissingGenesisKey(_))
        ));
    }

    #[test]
    fn missing_config_file() {
        assert!(matches!(
            NodeConfig::load("/nonexistent/config.json"),
            Err(NodeError::Io { .. })
        ));
    }
}
