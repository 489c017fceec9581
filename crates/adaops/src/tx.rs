//! Transaction lifecycle: build-raw, fee and min-UTXO calculation, signing,
//! id, submission and arrival polling.

use crate::cardano::{check_file_exists, parse_json, path_arg, CardanoCli, CliError};
use crate::exec::CommandRunner;
use crate::units::lovelace_to_ada;
use crate::utxo::{TxOut, UtxoRef};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Inputs of `transaction build-raw`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxBuildRequest {
    /// `tx_hash#index` references.
    pub tx_ins: Vec<String>,
    /// `address+lovelace[+"<qty> <policy>.<name> + ..."]` strings.
    pub tx_outs: Vec<String>,
    pub fee: u64,
    pub invalid_hereafter: Option<u64>,
    pub invalid_before: Option<u64>,
    /// `stake_address+amount`.
    pub withdrawal: Option<String>,
    pub certificates: Vec<PathBuf>,
    pub mint: Option<String>,
    pub minting_script_file: Option<PathBuf>,
    pub metadata_json_file: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub out_file: PathBuf,
    /// Only changes the wording of failure messages.
    pub draft: bool,
    pub cwd: Option<PathBuf>,
}

impl Default for TxBuildRequest {
    fn default() -> Self {
        Self {
            tx_ins: Vec::new(),
            tx_outs: Vec::new(),
            fee: 0,
            invalid_hereafter: None,
            invalid_before: None,
            withdrawal: None,
            certificates: Vec::new(),
            mint: None,
            minting_script_file: None,
            metadata_json_file: None,
            extra_args: Vec::new(),
            out_file: PathBuf::from("tx.draft"),
            draft: true,
            cwd: None,
        }
    }
}

impl TxBuildRequest {
    pub fn new(tx_ins: Vec<String>, tx_outs: Vec<String>) -> Self {
        Self {
            tx_ins,
            tx_outs,
            ..Default::default()
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.cwd {
            Some(cwd) if path.is_relative() => cwd.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Reject malformed inputs before anything is executed.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.tx_ins.is_empty() {
            return Err(CliError::InvalidArgument(
                "at least one tx-in is required".to_string(),
            ));
        }
        for tx_in in &self.tx_ins {
            tx_in
                .parse::<UtxoRef>()
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        }
        match (&self.mint, &self.minting_script_file) {
            (Some(_), Some(script)) => {
                check_file_exists(self.resolve(script))?;
            }
            (Some(_), None) => {
                error!("got a mint value but the minting script file is missing; both are required");
                return Err(CliError::InvalidArgument(
                    "mint requires a minting script file".to_string(),
                ));
            }
            (None, Some(_)) => {
                error!("got a minting script file but no mint value; both are required");
                return Err(CliError::InvalidArgument(
                    "minting script file requires a mint value".to_string(),
                ));
            }
            (None, None) => {}
        }
        if let Some(metadata) = &self.metadata_json_file {
            info!(file = %metadata.display(), "checking metadata JSON file");
            check_file_exists(self.resolve(metadata))?;
        }
        Ok(())
    }

    /// Arguments after `transaction build-raw`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for tx_in in &self.tx_ins {
            args.extend(["--tx-in".to_string(), tx_in.clone()]);
        }
        for tx_out in &self.tx_outs {
            args.extend(["--tx-out".to_string(), tx_out.clone()]);
        }
        if let Some(slot) = self.invalid_hereafter {
            args.extend(["--invalid-hereafter".to_string(), slot.to_string()]);
        }
        if let Some(slot) = self.invalid_before {
            args.extend(["--invalid-before".to_string(), slot.to_string()]);
        }
        args.extend(["--fee".to_string(), self.fee.to_string()]);
        args.extend(["--out-file".to_string(), path_arg(&self.out_file)]);
        for cert in &self.certificates {
            args.extend(["--certificate-file".to_string(), path_arg(cert)]);
        }
        if let Some(withdrawal) = &self.withdrawal {
            args.extend(["--withdrawal".to_string(), withdrawal.clone()]);
        }
        if let (Some(mint), Some(script)) = (&self.mint, &self.minting_script_file) {
            args.extend([
                "--mint".to_string(),
                mint.clone(),
                "--minting-script-file".to_string(),
                path_arg(script),
            ]);
        }
        if let Some(metadata) = &self.metadata_json_file {
            args.extend(["--metadata-json-file".to_string(), path_arg(metadata)]);
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Inputs of `transaction calculate-min-fee`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinFeeRequest {
    pub tx_body_file: PathBuf,
    pub tx_in_count: u32,
    pub tx_out_count: u32,
    /// Keys that will sign: payment only for a plain transfer, plus stake or cold keys
    /// for certificates.
    pub witness_count: u32,
    pub byron_witness_count: u32,
    pub protocol_params_file: PathBuf,
    pub cwd: Option<PathBuf>,
}

impl Default for MinFeeRequest {
    fn default() -> Self {
        Self {
            tx_body_file: PathBuf::from("tx.draft"),
            tx_in_count: 1,
            tx_out_count: 1,
            witness_count: 1,
            byron_witness_count: 0,
            protocol_params_file: PathBuf::from("protocol.json"),
            cwd: None,
        }
    }
}

/// A UTXO of the awaited transaction appeared at the watched address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxArrival {
    pub utxo: String,
    pub lovelace: u64,
    pub elapsed: Duration,
}

#[derive(Deserialize)]
struct TxIdJson {
    txhash: String,
}

impl<R: CommandRunner> CardanoCli<R> {
    /// `transaction build-raw`; returns the path of the written body file.
    pub async fn build_raw(&self, req: &TxBuildRequest) -> Result<PathBuf, CliError> {
        req.validate()?;
        let mut args = vec!["transaction".to_string(), "build-raw".to_string()];
        args.extend(req.to_args());
        let msg = if req.draft {
            "Was not able to build Transaction Draft"
        } else {
            "Was not able to build Raw Transaction"
        };
        self.run_checked(req.cwd.as_deref(), args, msg).await?;
        Ok(req.resolve(&req.out_file))
    }

    /// Minimum fee in lovelace: the leading integer of the command output.
    pub async fn calculate_min_fee(&self, req: &MinFeeRequest) -> Result<u64, CliError> {
        let params = check_file_exists(match &req.cwd {
            Some(cwd) if req.protocol_params_file.is_relative() => {
                cwd.join(&req.protocol_params_file)
            }
            _ => req.protocol_params_file.clone(),
        })?;
        let mut args = vec![
            "transaction".to_string(),
            "calculate-min-fee".to_string(),
            "--tx-body-file".to_string(),
            path_arg(&req.tx_body_file),
            "--tx-in-count".to_string(),
            req.tx_in_count.to_string(),
            "--tx-out-count".to_string(),
            req.tx_out_count.to_string(),
            "--witness-count".to_string(),
            req.witness_count.to_string(),
            "--byron-witness-count".to_string(),
            req.byron_witness_count.to_string(),
            "--protocol-params-file".to_string(),
            path_arg(params),
        ];
        args.extend(self.net_args());
        let stdout = self
            .run_checked(req.cwd.as_deref(), args, "Was not able to calculate fees")
            .await?;
        nth_integer(&stdout, 0, "calculate-min-fee")
    }

    /// Ledger-computed minimum lovelace for `tx_out`: the second token of the output
    /// (`Coin 1344798`).
    pub async fn calculate_min_required_utxo(
        &self,
        tx_out: &TxOut,
        protocol_params_file: &Path,
    ) -> Result<u64, CliError> {
        let params = check_file_exists(protocol_params_file)?;
        let args = vec![
            "transaction".to_string(),
            "calculate-min-required-utxo".to_string(),
            "--protocol-params-file".to_string(),
            path_arg(params),
            "--tx-out".to_string(),
            tx_out.to_string(),
        ];
        let stdout = self
            .run_checked(
                None,
                args,
                "Was not able to calculate minimum required UTXO amount for assets transaction",
            )
            .await?;
        nth_integer(&stdout, 1, "calculate-min-required-utxo")
    }

    /// `transaction sign` with every key in `signing_keys`; returns the signed file path.
    pub async fn sign(
        &self,
        tx_body_file: &Path,
        signing_keys: &[PathBuf],
        out_file: &Path,
        cwd: Option<&Path>,
    ) -> Result<PathBuf, CliError> {
        if signing_keys.is_empty() {
            return Err(CliError::InvalidArgument(
                "at least one signing key is required".to_string(),
            ));
        }
        let mut args = vec![
            "transaction".to_string(),
            "sign".to_string(),
            "--tx-body-file".to_string(),
            path_arg(tx_body_file),
        ];
        for key in signing_keys {
            args.extend(["--signing-key-file".to_string(), path_arg(key)]);
        }
        args.extend(self.net_args());
        args.extend(["--out-file".to_string(), path_arg(out_file)]);
        self.run_checked(cwd, args, "Signing TX did not work").await?;
        Ok(match cwd {
            Some(dir) if out_file.is_relative() => dir.join(out_file),
            _ => out_file.to_path_buf(),
        })
    }

    /// Transaction id from the signed file, or from the body file when no signed file
    /// is given.
    pub async fn tx_id(
        &self,
        tx_file: Option<&Path>,
        tx_body_file: Option<&Path>,
    ) -> Result<String, CliError> {
        let (flag, file) = match (tx_file, tx_body_file) {
            (Some(f), _) => ("--tx-file", f),
            (None, Some(f)) => ("--tx-body-file", f),
            (None, None) => {
                error!("either a tx file or a tx body file should be provided");
                return Err(CliError::InvalidArgument(
                    "either a tx file or a tx body file is required".to_string(),
                ));
            }
        };
        check_file_exists(file)?;
        let stdout = self
            .run_checked(
                None,
                ["transaction", "txid", flag, &path_arg(file)],
                "Was not able to get transaction ID",
            )
            .await?;
        let out = stdout.trim();
        if out.starts_with('{') {
            let parsed: TxIdJson = parse_json("transaction id", out)?;
            return Ok(parsed.txhash);
        }
        Ok(out.to_string())
    }

    /// Submit a signed transaction; returns its id.
    pub async fn submit(&self, signed_tx_file: &Path, cwd: Option<&Path>) -> Result<String, CliError> {
        if self.is_offline() {
            return Err(CliError::InvalidArgument(
                "transactions cannot be submitted in offline mode".to_string(),
            ));
        }
        self.require_socket()?;
        let mut args = vec![
            "transaction".to_string(),
            "submit".to_string(),
            "--tx-file".to_string(),
            path_arg(signed_tx_file),
        ];
        args.extend(self.net_args());
        self.run_checked(cwd, args, "Submitting TX did not work").await?;

        let signed = match cwd {
            Some(dir) if signed_tx_file.is_relative() => dir.join(signed_tx_file),
            _ => signed_tx_file.to_path_buf(),
        };
        let tx_id = self.tx_id(Some(&signed), None).await?;
        info!(tx_id = %tx_id, "successfully submitted transaction");
        Ok(tx_id)
    }

    /// Poll the balances of `address` until a UTXO created by `tx_id` shows up or
    /// `timeout` elapses.
    pub async fn wait_for_tx(
        &self,
        address: &str,
        tx_id: &str,
        timeout: Duration,
    ) -> Result<Option<TxArrival>, CliError> {
        let start = tokio::time::Instant::now();
        loop {
            let balances = self.balances(address, None).await?;
            let arrived = balances
                .iter()
                .find(|(utxo, _)| utxo.split('#').next() == Some(tx_id));
            if let Some((utxo, balance)) = arrived {
                let elapsed = start.elapsed();
                info!(
                    tx_id,
                    secs = %format!("{:.1}", elapsed.as_secs_f64()),
                    "transaction arrived"
                );
                info!(
                    ada = lovelace_to_ada(balance.lovelace),
                    lovelace = balance.lovelace,
                    "balance"
                );
                return Ok(Some(TxArrival {
                    utxo: utxo.clone(),
                    lovelace: balance.lovelace,
                    elapsed,
                }));
            }
            if start.elapsed() >= timeout {
                warn!(
                    tx_id,
                    secs = start.elapsed().as_secs(),
                    "transaction did not arrive in time"
                );
                return Ok(None);
            }
            tokio::time::sleep(self.tx_poll_interval).await;
        }
    }
}

fn nth_integer(stdout: &str, n: usize, cmd: &str) -> Result<u64, CliError> {
    stdout
        .split_whitespace()
        .nth(n)
        .and_then(|tok| tok.parse().ok())
        .ok_or_else(|| CliError::UnexpectedOutput {
            cmd: cmd.to_string(),
            output: stdout.trim().to_string(),
        })
}
