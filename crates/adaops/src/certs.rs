//! Certificates: operational, stake address, delegation, vote delegation and
//! stake pool (de)registration. Meant for the air-gapped host.

use crate::cardano::{path_arg, CardanoCli, CliError};
use crate::exec::CommandRunner;
use std::path::{Path, PathBuf};
use tracing::error;

/// Longest metadata URL the ledger accepts in a pool registration.
pub const MAX_METADATA_URL_LEN: usize = 64;

/// Voting power delegation target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrepTarget {
    AlwaysAbstain,
    AlwaysNoConfidence,
    /// 28-byte DRep key hash in hex.
    KeyHash(String),
}

impl DrepTarget {
    /// Pick a target from loose flags: abstain wins over no-confidence, which wins
    /// over a key hash.
    pub fn from_flags(
        always_abstain: bool,
        always_no_confidence: bool,
        drep_key_hash: Option<&str>,
    ) -> Result<Self, CliError> {
        if always_abstain {
            return Ok(Self::AlwaysAbstain);
        }
        if always_no_confidence {
            return Ok(Self::AlwaysNoConfidence);
        }
        match drep_key_hash {
            Some(hash) => Self::key_hash(hash),
            None => {
                error!("provide one of always-abstain, always-no-confidence or a DRep key hash");
                Err(CliError::InvalidArgument(
                    "a vote delegation target is required".to_string(),
                ))
            }
        }
    }

    pub fn key_hash(hash: &str) -> Result<Self, CliError> {
        let hash = hash.trim();
        if hash.len() != 56 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CliError::InvalidArgument(format!(
                "DRep key hash must be 56 hex characters, got '{hash}'"
            )));
        }
        Ok(Self::KeyHash(hash.to_lowercase()))
    }

    fn to_args(&self) -> Vec<String> {
        match self {
            Self::AlwaysAbstain => vec!["--always-abstain".to_string()],
            Self::AlwaysNoConfidence => vec!["--always-no-confidence".to_string()],
            Self::KeyHash(h) => vec!["--drep-key-hash".to_string(), h.clone()],
        }
    }
}

/// Inputs of `stake-pool registration-certificate`. IPv4 and DNS relays all listen on
/// `relay_port`.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolRegistration {
    pub cold_vkey: PathBuf,
    pub vrf_vkey: PathBuf,
    pub pledge: u64,
    pub cost: u64,
    /// Fraction of rewards kept by the operator, `0.0..=1.0`.
    pub margin: f64,
    pub reward_stake_vkey: PathBuf,
    pub owner_stake_vkeys: Vec<PathBuf>,
    pub metadata_url: String,
    pub metadata_hash: String,
    pub relay_port: u16,
    pub relays_ipv4: Vec<String>,
    pub relays_dns: Vec<String>,
    pub out_file: PathBuf,
}

impl PoolRegistration {
    pub fn validate(&self) -> Result<(), CliError> {
        if self.metadata_url.len() > MAX_METADATA_URL_LEN {
            error!(url = %self.metadata_url, "metadata URL is longer than {MAX_METADATA_URL_LEN} characters");
            return Err(CliError::InvalidArgument(format!(
                "metadata URL is longer than {MAX_METADATA_URL_LEN} characters"
            )));
        }
        if self.relays_ipv4.is_empty() && self.relays_dns.is_empty() {
            return Err(CliError::InvalidArgument(
                "at least one IPv4 or DNS relay is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.margin) {
            return Err(CliError::InvalidArgument(format!(
                "pool margin must be within 0..=1, got {}",
                self.margin
            )));
        }
        Ok(())
    }

    fn to_args(&self, net_args: Vec<String>) -> Vec<String> {
        let mut args = vec![
            "stake-pool".to_string(),
            "registration-certificate".to_string(),
            "--cold-verification-key-file".to_string(),
            path_arg(&self.cold_vkey),
            "--vrf-verification-key-file".to_string(),
            path_arg(&self.vrf_vkey),
            "--pool-pledge".to_string(),
            self.pledge.to_string(),
            "--pool-cost".to_string(),
            self.cost.to_string(),
            "--pool-margin".to_string(),
            self.margin.to_string(),
            "--pool-reward-account-verification-key-file".to_string(),
            path_arg(&self.reward_stake_vkey),
            "--metadata-url".to_string(),
            self.metadata_url.clone(),
            "--metadata-hash".to_string(),
            self.metadata_hash.clone(),
        ];
        for owner in &self.owner_stake_vkeys {
            args.extend([
                "--pool-owner-stake-verification-key-file".to_string(),
                path_arg(owner),
            ]);
        }
        let port = self.relay_port.to_string();
        for relay in &self.relays_ipv4 {
            args.extend([
                "--pool-relay-ipv4".to_string(),
                relay.clone(),
                "--pool-relay-port".to_string(),
                port.clone(),
            ]);
        }
        for relay in &self.relays_dns {
            args.extend([
                "--single-host-pool-relay".to_string(),
                relay.clone(),
                "--pool-relay-port".to_string(),
                port.clone(),
            ]);
        }
        args.extend(net_args);
        args.extend(["--out-file".to_string(), path_arg(&self.out_file)]);
        args
    }
}

fn output_path(cwd: Option<&Path>, out_file: &Path) -> PathBuf {
    match cwd {
        Some(dir) if out_file.is_relative() => dir.join(out_file),
        _ => out_file.to_path_buf(),
    }
}

impl<R: CommandRunner> CardanoCli<R> {
    /// Operational certificate; reissue whenever the KES key pair is rotated.
    pub async fn issue_op_cert(
        &self,
        kes_vkey: &Path,
        cold_skey: &Path,
        cold_counter: &Path,
        kes_period: u64,
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        self.run_checked(
            cwd,
            [
                "node".to_string(),
                "issue-op-cert".to_string(),
                "--kes-verification-key-file".to_string(),
                path_arg(kes_vkey),
                "--cold-signing-key-file".to_string(),
                path_arg(cold_skey),
                "--operational-certificate-issue-counter".to_string(),
                path_arg(cold_counter),
                "--kes-period".to_string(),
                kes_period.to_string(),
                "--out-file".to_string(),
                path_arg(out_file),
            ],
            "Was not able to generate node cert",
        )
        .await?;
        Ok(output_path(cwd, out_file))
    }

    /// Stake address registration; newer eras require the key deposit amount.
    pub async fn stake_registration_cert(
        &self,
        stake_vkey: &Path,
        deposit: Option<u64>,
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        let mut args = vec![
            "stake-address".to_string(),
            "registration-certificate".to_string(),
            "--stake-verification-key-file".to_string(),
            path_arg(stake_vkey),
        ];
        if let Some(amount) = deposit {
            args.extend(["--key-reg-deposit-amt".to_string(), amount.to_string()]);
        }
        args.extend(["--out-file".to_string(), path_arg(out_file)]);
        self.run_checked(cwd, args, "Was not able to create stake registration cert")
            .await?;
        Ok(output_path(cwd, out_file))
    }

    pub async fn stake_deregistration_cert(
        &self,
        stake_vkey: &Path,
        deposit: Option<u64>,
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        let mut args = vec![
            "stake-address".to_string(),
            "deregistration-certificate".to_string(),
            "--stake-verification-key-file".to_string(),
            path_arg(stake_vkey),
        ];
        if let Some(amount) = deposit {
            args.extend(["--key-reg-deposit-amt".to_string(), amount.to_string()]);
        }
        args.extend(["--out-file".to_string(), path_arg(out_file)]);
        self.run_checked(
            cwd,
            args,
            "Was not able to create stake address deregistration cert",
        )
        .await?;
        Ok(output_path(cwd, out_file))
    }

    /// Delegate the owner's stake to the pool identified by its cold key.
    pub async fn stake_delegation_cert(
        &self,
        owner_stake_vkey: &Path,
        cold_vkey: &Path,
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        self.run_checked(
            cwd,
            [
                "stake-address".to_string(),
                self.era().stake_delegation_command().to_string(),
                "--stake-verification-key-file".to_string(),
                path_arg(owner_stake_vkey),
                "--cold-verification-key-file".to_string(),
                path_arg(cold_vkey),
                "--out-file".to_string(),
                path_arg(out_file),
            ],
            "Delegation cert creation didn't work",
        )
        .await?;
        Ok(output_path(cwd, out_file))
    }

    /// Voting power delegation. Unrelated to stake delegation; required to withdraw
    /// rewards in the Conway era.
    pub async fn vote_delegation_cert(
        &self,
        owner_stake_vkey: &Path,
        target: &DrepTarget,
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        let mut args = vec![
            "stake-address".to_string(),
            "vote-delegation-certificate".to_string(),
            "--stake-verification-key-file".to_string(),
            path_arg(owner_stake_vkey),
        ];
        args.extend(target.to_args());
        args.extend(["--out-file".to_string(), path_arg(out_file)]);
        self.run_checked(cwd, args, "Vote delegation cert creation didn't work")
            .await?;
        Ok(output_path(cwd, out_file))
    }

    pub async fn pool_registration_cert(
        &self,
        reg: &PoolRegistration,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        reg.validate()?;
        self.run_checked(
            cwd,
            reg.to_args(self.net_args()),
            "Pool registration certificate creation didn't work",
        )
        .await?;
        Ok(output_path(cwd, &reg.out_file))
    }

    /// Pool retirement at the start of `epoch`.
    pub async fn pool_deregistration_cert(
        &self,
        cold_vkey: &Path,
        epoch: u64,
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        self.run_checked(
            cwd,
            [
                "stake-pool".to_string(),
                "deregistration-certificate".to_string(),
                "--cold-verification-key-file".to_string(),
                path_arg(cold_vkey),
                "--epoch".to_string(),
                epoch.to_string(),
                "--out-file".to_string(),
                path_arg(out_file),
            ],
            "Was not able to create pool deregistration cert",
        )
        .await?;
        Ok(output_path(cwd, out_file))
    }
}
