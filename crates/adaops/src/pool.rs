//! Stake pool identity, ledger state and registration metadata.

use crate::cardano::{check_file_exists, parse_json, path_arg, CardanoCli, CliError};
use crate::exec::CommandRunner;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const MAX_DESCRIPTION_LEN: usize = 255;
const DOWNLOAD_RETRIES: u32 = 3;
const DOWNLOAD_BACKOFF_MS: u64 = 500;

fn ticker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{3,5}$").expect("static regex"))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolIdFormat {
    #[default]
    Hex,
    Bech32,
}

impl PoolIdFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Bech32 => "bech32",
        }
    }
}

impl fmt::Display for PoolIdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolIdFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(Self::Hex),
            "bech32" => Ok(Self::Bech32),
            other => Err(CliError::InvalidArgument(format!(
                "wrong output format '{other}'; allowed values are hex, bech32"
            ))),
        }
    }
}

/// Registration metadata document published at the pool's metadata URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub name: String,
    pub description: String,
    pub ticker: String,
    pub homepage: String,
}

impl PoolMetadata {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let path = check_file_exists(path)?;
        let raw = std::fs::read_to_string(&path)?;
        parse_json("pool metadata", &raw)
    }

    /// Ticker of 3 to 5 characters from `A-Z0-9`; description of at most 255 characters.
    pub fn validate(&self) -> Result<(), CliError> {
        if !ticker_regex().is_match(&self.ticker) {
            error!(ticker = %self.ticker, "ticker must be 3-5 characters, A-Z and 0-9 only");
            return Err(CliError::InvalidArgument(format!(
                "ticker must be 3-5 characters, A-Z and 0-9 only; got {}",
                self.ticker
            )));
        }
        let len = self.description.chars().count();
        if len > MAX_DESCRIPTION_LEN {
            error!(len, "pool description exceeds {MAX_DESCRIPTION_LEN} characters");
            return Err(CliError::InvalidArgument(format!(
                "pool description exceeds {MAX_DESCRIPTION_LEN} characters; length {len}"
            )));
        }
        Ok(())
    }
}

impl<R: CommandRunner> CardanoCli<R> {
    /// Pool id derived from the cold verification key. A relative key path is looked up
    /// in `cwd`.
    pub async fn pool_id(
        &self,
        cold_vkey: &Path,
        format: PoolIdFormat,
        cwd: Option<&Path>,
    ) -> Result<String, CliError> {
        let key = match cwd {
            Some(dir) if cold_vkey.is_relative() => check_file_exists(dir.join(cold_vkey))?,
            _ => check_file_exists(cold_vkey)?,
        };
        let out = self
            .run_checked(
                cwd,
                [
                    "stake-pool",
                    "id",
                    "--cold-verification-key-file",
                    &path_arg(&key),
                    "--output-format",
                    format.as_str(),
                ],
                "Not able to get pool ID",
            )
            .await?;
        Ok(out.trim().to_string())
    }

    /// `query stake-snapshot`; memory hungry on the node side.
    pub async fn stake_snapshot(&self, pool_id: &str) -> Result<Value, CliError> {
        let mut args = vec![
            "query".to_string(),
            "stake-snapshot".to_string(),
            "--stake-pool-id".to_string(),
            pool_id.to_string(),
        ];
        args.extend(self.net_args());
        self.query_json(
            args,
            "stake snapshot",
            "Was not able to get stakes snapshot; check that the host has enough memory",
        )
        .await
    }

    pub async fn pool_params(&self, pool_id: &str) -> Result<Value, CliError> {
        let mut args = vec![
            "query".to_string(),
            "pool-params".to_string(),
            "--stake-pool-id".to_string(),
            pool_id.to_string(),
        ];
        args.extend(self.net_args());
        self.query_json(args, "pool params", "Was not able to get pool params")
            .await
    }

    /// Hash of a metadata file, after checking its ticker and description.
    pub async fn metadata_hash(&self, metadata_file: &Path, cwd: Option<&Path>) -> Result<String, CliError> {
        let resolved = match cwd {
            Some(dir) if metadata_file.is_relative() => dir.join(metadata_file),
            _ => metadata_file.to_path_buf(),
        };
        PoolMetadata::load(&resolved)?.validate()?;
        let out = self
            .run_checked(
                cwd,
                [
                    "stake-pool",
                    "metadata-hash",
                    "--pool-metadata-file",
                    &path_arg(metadata_file),
                ],
                "Was not able to generate hash for pool's metadata",
            )
            .await?;
        Ok(out.trim().to_string())
    }
}

/// Download a JSON document (normally pool metadata) to `dst`, replacing any existing
/// file. The body must parse as JSON; no schema is enforced.
pub async fn download_metadata(url: &str, dst: &Path) -> Result<PathBuf, CliError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| CliError::InvalidArgument(format!("invalid metadata URL '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CliError::InvalidArgument(format!(
            "metadata URL must be http(s), got '{url}'"
        )));
    }
    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(30))
        .build()?;

    let mut last_err = None;
    let mut body = None;
    for attempt in 0..DOWNLOAD_RETRIES {
        match client.get(parsed.clone()).send().await {
            Ok(resp) if resp.status().is_success() => {
                body = Some(resp.bytes().await?);
                break;
            }
            Ok(resp) => {
                last_err = Some(CliError::HttpStatus {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
                if resp.status().is_client_error() {
                    break;
                }
            }
            Err(e) => last_err = Some(CliError::Http(e)),
        }
        if attempt + 1 < DOWNLOAD_RETRIES {
            let ms = DOWNLOAD_BACKOFF_MS * (1 << attempt);
            warn!(attempt, ms, url, "retry after error");
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
    let Some(body) = body else {
        return Err(last_err.unwrap_or_else(|| CliError::HttpStatus {
            url: url.to_string(),
            status: 0,
        }));
    };

    serde_json::from_slice::<Value>(&body).map_err(|source| {
        error!(url, "downloaded file is not a valid JSON file");
        CliError::Json {
            what: format!("downloaded file from {url}"),
            source,
        }
    })?;
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dst, &body).await?;
    debug!(bytes = body.len(), "metadata written");
    info!(url, dst = %dst.display(), "downloaded metadata");
    Ok(dst.to_path_buf())
}
