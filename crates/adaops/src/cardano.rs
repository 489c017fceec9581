//! `CardanoCli`: era-aware command assembly on top of a [`CommandRunner`].
//!
//! Operations live in the sibling modules (`query`, `tx`, `keys`, `certs`,
//! `governance`, `pool`) as further `impl` blocks on this type.

use crate::cache::{Cache, CacheError};
use crate::config::AdaopsConfig;
use crate::era::CliEra;
use crate::exec::{resolve_binary, CommandOutput, CommandRunner, ExecError, Invocation, ProcessRunner};
use crate::network::Network;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const SOCKET_PATH_ENV: &str = "CARDANO_NODE_SOCKET_PATH";

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{msg}. Bad command: {cmd}")]
    BadCmd {
        msg: String,
        cmd: String,
        stderr: String,
    },
    #[error("cardano-node is down or still loading; the node socket is not responding")]
    NodeDown,
    #[error("requested key '{key}' is missing; available: {available}")]
    MissingKey { key: String, available: String },
    #[error("parse {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("CARDANO_NODE_SOCKET_PATH is not set; online commands need a running, synced cardano-node")]
    SocketNotSet,
    #[error("CARDANO_NODE_SOCKET_PATH is set, but file does not exist: {0}")]
    SocketMissing(String),
    #[error("file does not exist: {0}")]
    FileNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unexpected output from '{cmd}': '{output}'")]
    UnexpectedOutput { cmd: String, output: String },
    #[error("offline mode: no cached response for '{0}'")]
    OfflineMiss(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GET {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub struct CardanoCli<R: CommandRunner = ProcessRunner> {
    binary: String,
    era: CliEra,
    network: Network,
    socket_path: Option<PathBuf>,
    runner: R,
    cache: Option<Cache>,
    offline: bool,
    pub(crate) tip_retries: u32,
    pub(crate) tip_retry_delay: Duration,
    pub(crate) tx_poll_interval: Duration,
}

impl CardanoCli<ProcessRunner> {
    /// Real-process wrapper. Fails when the configured binary is not found or not executable.
    pub fn new(config: &AdaopsConfig) -> Result<Self, CliError> {
        let path = resolve_binary(&config.cardano_cli)?;
        debug!(binary = %path.display(), era = %config.era, network = %config.network, "cardano-cli resolved");
        let runner = match config.command_timeout_secs {
            Some(secs) => ProcessRunner::with_timeout(Duration::from_secs(secs)),
            None => ProcessRunner::new(),
        };
        let mut cli = Self::with_runner(config, runner);
        if let Some(path) = &config.cache_path {
            cli.cache = Some(Cache::open(path)?);
        }
        Ok(cli)
    }
}

impl<R: CommandRunner> CardanoCli<R> {
    /// Wrapper over an arbitrary runner; skips binary resolution and does not open a cache.
    pub fn with_runner(config: &AdaopsConfig, runner: R) -> Self {
        Self {
            binary: config.cardano_cli.clone(),
            era: config.era,
            network: config.network,
            socket_path: config.socket_path.clone(),
            runner,
            cache: None,
            offline: config.offline,
            tip_retries: config.tip_retries.max(1),
            tip_retry_delay: Duration::from_millis(config.tip_retry_delay_ms),
            tx_poll_interval: Duration::from_millis(config.tx_poll_interval_ms),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn era(&self) -> CliEra {
        self.era
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// `--mainnet` or `--testnet-magic <n>`.
    pub fn net_args(&self) -> Vec<String> {
        self.network.cli_args()
    }

    /// Build `<binary> <group> <args...>`; the group defaults to the configured era.
    pub fn invocation<I, S>(&self, group: Option<&str>, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = group.unwrap_or_else(|| self.era.command_group());
        let mut inv = Invocation::new(&self.binary).arg(group).args(args);
        if let Some(socket) = &self.socket_path {
            inv = inv.env(SOCKET_PATH_ENV, socket.display().to_string());
        }
        inv
    }

    /// Run under the era command group; the exit code is not checked.
    pub async fn run<I, S>(&self, args: I) -> Result<CommandOutput, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = self.invocation(None, args);
        Ok(self.runner.run(&inv).await?)
    }

    /// Run under an explicit command group such as `debug`.
    pub async fn run_group<I, S>(&self, group: &str, args: I) -> Result<CommandOutput, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = self.invocation(Some(group), args);
        Ok(self.runner.run(&inv).await?)
    }

    /// Run in `cwd`; relative file arguments resolve against it.
    pub async fn run_in<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<CommandOutput, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = self
            .invocation(None, args)
            .cwd(cwd.map(Path::to_path_buf));
        Ok(self.runner.run(&inv).await?)
    }

    /// Offline command: run in `cwd` and fail with `BadCmd(msg)` on a non-zero exit.
    pub(crate) async fn run_checked<I, S>(
        &self,
        cwd: Option<&Path>,
        args: I,
        msg: &str,
    ) -> Result<String, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let out = self.run_in(cwd, args).await?;
        Ok(ensure_success(out, msg)?.stdout)
    }

    /// Online query: needs the node socket, or a cached response in offline mode.
    /// Successful responses are recorded in the cache when one is configured.
    pub(crate) async fn query<I, S>(&self, args: I, msg: &str) -> Result<String, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = self.invocation(None, args);
        if self.offline {
            return self.cached(&inv);
        }
        self.require_socket()?;
        let out = ensure_success(self.runner.run(&inv).await?, msg)?;
        self.record(&inv, &out.stdout);
        Ok(out.stdout)
    }

    /// Online query whose stdout is JSON; `what` names the document in errors.
    pub async fn query_json<T, I, S>(&self, args: I, what: &str, msg: &str) -> Result<T, CliError>
    where
        T: serde::de::DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw = self.query(args, msg).await?;
        parse_json(what, &raw)
    }

    pub(crate) fn cached(&self, inv: &Invocation) -> Result<String, CliError> {
        let key = cache_key(inv);
        let hit = match &self.cache {
            Some(cache) => cache.get(&key)?,
            None => None,
        };
        match hit {
            Some(resp) => {
                debug!(cmd = %key, recorded_at = %resp.recorded_at, "answered from cache");
                Ok(resp.stdout)
            }
            None => Err(CliError::OfflineMiss(key)),
        }
    }

    pub(crate) fn record(&self, inv: &Invocation, stdout: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&cache_key(inv), stdout) {
                warn!(error = %e, "failed to record response in cache");
            }
        }
    }

    /// The node socket must be configured and present on disk.
    pub fn require_socket(&self) -> Result<&Path, CliError> {
        let Some(socket) = self.socket_path.as_deref() else {
            error!("{SOCKET_PATH_ENV} is absent or has no value assigned");
            return Err(CliError::SocketNotSet);
        };
        if !socket.exists() {
            error!(socket = %socket.display(), "{SOCKET_PATH_ENV} is set, but file does not exist");
            return Err(CliError::SocketMissing(socket.display().to_string()));
        }
        Ok(socket)
    }
}

/// Cache key: the command without the binary path, so hosts with different install
/// locations share recorded responses.
fn cache_key(inv: &Invocation) -> String {
    let mut key = inv.clone();
    key.program = "cardano-cli".to_string();
    key.command_line()
}

/// Map a non-zero exit to [`CliError::BadCmd`], logging the failed command.
pub(crate) fn ensure_success(out: CommandOutput, msg: &str) -> Result<CommandOutput, CliError> {
    if out.success() {
        return Ok(out);
    }
    Err(bad_cmd(out, msg))
}

pub(crate) fn bad_cmd(out: CommandOutput, msg: &str) -> CliError {
    error!(cmd = %out.cmd, code = ?out.code, stderr = %out.stderr.trim(), "{msg}");
    CliError::BadCmd {
        msg: msg.to_string(),
        cmd: out.cmd,
        stderr: out.stderr,
    }
}

/// Absolute path of an existing file.
pub fn check_file_exists(path: impl AsRef<Path>) -> Result<PathBuf, CliError> {
    let path = path.as_ref();
    path.canonicalize().map_err(|_| {
        error!(path = %path.display(), "file does not exist");
        CliError::FileNotFound(path.display().to_string())
    })
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    what: &str,
    raw: &str,
) -> Result<T, CliError> {
    serde_json::from_str(raw).map_err(|source| {
        error!(what, output = %raw.trim(), "not able to parse JSON");
        CliError::Json {
            what: what.to_string(),
            source,
        }
    })
}

pub(crate) fn path_arg(path: impl AsRef<Path>) -> String {
    path.as_ref().display().to_string()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::exec::ScriptedRunner;

    #[tokio::test]
    async fn run_prepends_era_group() {
        let cli = offline_tool(Network::Preprod);
        cli.runner().push_ok("");
        cli.run(["query", "tip"]).await.unwrap();
        let inv = &cli.runner().invocations()[0];
        assert_eq!(inv.program, "cardano-cli");
        assert_eq!(inv.args, vec!["conway", "query", "tip"]);
    }

    #[tokio::test]
    async fn run_group_overrides_era() {
        let cli = offline_tool(Network::Mainnet);
        cli.runner().push_ok("");
        cli.run_group("debug", ["version"]).await.unwrap();
        assert_eq!(cli.runner().args_of(0), vec!["debug", "version"]);
    }

    #[tokio::test]
    async fn socket_passed_to_child_env() {
        let (cli, socket) = online(Network::Mainnet);
        cli.runner().push_ok("{}");
        cli.query(["query", "tip"], "tip").await.unwrap();
        let inv = &cli.runner().invocations()[0];
        assert_eq!(
            inv.env,
            vec![(
                SOCKET_PATH_ENV.to_string(),
                socket.path().display().to_string()
            )]
        );
    }

    #[tokio::test]
    async fn query_requires_socket() {
        let cli = offline_tool(Network::Mainnet);
        let err = cli.query(["query", "tip"], "tip").await.unwrap_err();
        assert!(matches!(err, CliError::SocketNotSet));
        assert!(cli.runner().invocations().is_empty());

        let mut cfg = config(Network::Mainnet);
        cfg.socket_path = Some(PathBuf::from("/nonexistent/node.socket"));
        let cli = CardanoCli::with_runner(&cfg, ScriptedRunner::new());
        let err = cli.query(["query", "tip"], "tip").await.unwrap_err();
        assert!(matches!(err, CliError::SocketMissing(_)));
    }

    #[tokio::test]
    async fn non_zero_exit_is_bad_cmd() {
        let cli = offline_tool(Network::Mainnet);
        cli.runner().push_failure(1, "Invalid argument");
        let err = cli
            .run_checked(None, ["address", "key-gen"], "Was not able to generate keys")
            .await
            .unwrap_err();
        match err {
            CliError::BadCmd { msg, cmd, stderr } => {
                assert_eq!(msg, "Was not able to generate keys");
                assert_eq!(cmd, "cardano-cli conway address key-gen");
                assert_eq!(stderr, "Invalid argument");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_queries_use_recorded_responses() {
        let (online_cli, _socket) = online(Network::Preview);
        let online_cli = online_cli.with_cache(Cache::in_memory().unwrap());
        online_cli.runner().push_ok(r#"{"slot": 5}"#);
        online_cli.query(["query", "tip"], "tip").await.unwrap();
        let recorded = online_cli
            .cache()
            .unwrap()
            .get("cardano-cli conway query tip")
            .unwrap()
            .unwrap();
        assert_eq!(recorded.stdout, r#"{"slot": 5}"#);

        let mut cfg = config(Network::Preview);
        cfg.offline = true;
        let cache = Cache::in_memory().unwrap();
        cache
            .put("cardano-cli conway query tip", r#"{"slot": 5}"#)
            .unwrap();
        let offline = CardanoCli::with_runner(&cfg, ScriptedRunner::new()).with_cache(cache);
        assert_eq!(
            offline.query(["query", "tip"], "tip").await.unwrap(),
            r#"{"slot": 5}"#
        );
        assert!(matches!(
            offline.query(["query", "utxo"], "utxo").await,
            Err(CliError::OfflineMiss(_))
        ));
        assert!(offline.runner().invocations().is_empty());
    }

    #[test]
    fn missing_file_reported() {
        assert!(matches!(
            check_file_exists("/nonexistent/metadata.json"),
            Err(CliError::FileNotFound(_))
        ));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(check_file_exists(tmp.path()).unwrap().is_absolute());
    }
}
