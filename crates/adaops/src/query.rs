//! Node queries: tip, protocol parameters, UTXO balances, stake rewards.

use crate::cardano::{bad_cmd, parse_json, CardanoCli, CliError};
use crate::exec::CommandRunner;
use crate::utxo::{parse_utxo_json, total_lovelace, AddressBalances, Balance, ProtocolParams, UtxoRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

/// `query tip` output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tip {
    pub block: Option<u64>,
    pub epoch: Option<u64>,
    pub era: Option<String>,
    pub hash: Option<String>,
    pub slot: Option<u64>,
    pub slot_in_epoch: Option<u64>,
    pub slots_to_epoch_end: Option<u64>,
    pub sync_progress: Option<String>,
}

impl<R: CommandRunner> CardanoCli<R> {
    pub async fn protocol_params_json(&self) -> Result<Value, CliError> {
        let mut args = vec!["query".to_string(), "protocol-parameters".to_string()];
        args.extend(self.net_args());
        self.query_json(
            args,
            "protocol parameters",
            "Was not able to get protocol parameters",
        )
        .await
    }

    pub async fn protocol_params(&self) -> Result<ProtocolParams, CliError> {
        let value = self.protocol_params_json().await?;
        serde_json::from_value(value).map_err(|source| CliError::Json {
            what: "protocol parameters".to_string(),
            source,
        })
    }

    /// Raw `query tip` JSON.
    ///
    /// A `MuxError` on stderr is transient: the query sleeps and retries up to the
    /// configured number of attempts. A refused socket connection means the node is
    /// down or still loading.
    pub async fn tip_json(&self) -> Result<Value, CliError> {
        let mut args = vec!["query".to_string(), "tip".to_string()];
        args.extend(self.net_args());
        let inv = self.invocation(None, args);
        if self.is_offline() {
            return parse_json("tip", &self.cached(&inv)?);
        }

        let mut last = None;
        for attempt in 1..=self.tip_retries {
            self.require_socket()?;
            let out = self.runner().run(&inv).await?;
            if out.success() {
                self.record(&inv, &out.stdout);
                return parse_json("tip", &out.stdout);
            }
            let stderr = out.stderr.trim();
            warn!(attempt, "was not able to get the current tip");
            if stderr.starts_with("MuxError") {
                warn!(error = %stderr, delay = ?self.tip_retry_delay, "non-fatal error, retrying");
                last = Some(out);
                tokio::time::sleep(self.tip_retry_delay).await;
                continue;
            }
            if stderr.contains("Connection refused") {
                error!(error = %stderr, "cardano-node is offline or still loading");
                return Err(CliError::NodeDown);
            }
            return Err(bad_cmd(out, "Was not able to get the current tip"));
        }
        match last {
            Some(out) => Err(bad_cmd(out, "Was not able to get the current tip after retries")),
            None => Err(CliError::InvalidArgument("tip retries must be at least 1".to_string())),
        }
    }

    pub async fn tip(&self) -> Result<Tip, CliError> {
        let value = self.tip_json().await?;
        serde_json::from_value(value).map_err(|source| CliError::Json {
            what: "tip".to_string(),
            source,
        })
    }

    /// One field of the tip (`slot`, `epoch`, `syncProgress`, ...) or `all`.
    pub async fn tip_item(&self, item: &str) -> Result<Value, CliError> {
        let tip = self.tip_json().await?;
        tip_field(tip, item)
    }

    /// UTXOs under `address`; `utxo_prefix` keeps only references starting with it.
    pub async fn balances(
        &self,
        address: &str,
        utxo_prefix: Option<&str>,
    ) -> Result<AddressBalances, CliError> {
        let mut args = vec!["query", "utxo", "--address", address]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        args.extend(self.net_args());
        args.push("--output-json".to_string());
        let raw = self
            .query(args, "Was not able to get address balances")
            .await?;
        let mut balances = parse_utxo_json(&raw).map_err(|source| CliError::Json {
            what: "address balances".to_string(),
            source,
        })?;

        if let Some(prefix) = utxo_prefix {
            balances.retain(|utxo, _| utxo.starts_with(prefix));
            match balances.len() {
                0 => error!(utxo = prefix, address, "UTXO does not exist under the given address"),
                1 => {}
                n => warn!(
                    utxo = prefix,
                    matches = n,
                    available = %balances.keys().cloned().collect::<Vec<_>>().join(", "),
                    "more than one UTXO matches; specify the exact hash with index"
                ),
            }
        }
        Ok(balances)
    }

    /// Balance of one UTXO; a spent or unknown reference yields an empty balance.
    pub async fn query_utxo(&self, utxo: &str) -> Result<Balance, CliError> {
        let utxo_ref: UtxoRef = utxo
            .parse()
            .map_err(|e: crate::utxo::InvalidUtxoRef| CliError::InvalidArgument(e.to_string()))?;
        let mut args = vec![
            "query".to_string(),
            "utxo".to_string(),
            "--tx-in".to_string(),
            utxo.to_string(),
        ];
        args.extend(self.net_args());
        args.push("--output-json".to_string());
        let raw = self
            .query(args, &format!("Was not able to query UTXO {utxo_ref}"))
            .await?;
        let mut balances = parse_utxo_json(&raw).map_err(|source| CliError::Json {
            what: "UTXO balance".to_string(),
            source,
        })?;
        Ok(balances
            .remove(utxo)
            .or_else(|| balances.remove(&utxo_ref.to_string()))
            .unwrap_or_default())
    }

    /// Sum of lovelace over all UTXOs of `address`.
    pub async fn total_balance(&self, address: &str) -> Result<u64, CliError> {
        Ok(total_lovelace(&self.balances(address, None).await?))
    }

    /// `query stake-address-info` JSON for a stake address.
    pub async fn stake_rewards(&self, stake_address: &str) -> Result<Value, CliError> {
        let mut args = vec![
            "query".to_string(),
            "stake-address-info".to_string(),
            "--address".to_string(),
            stake_address.to_string(),
        ];
        args.extend(self.net_args());
        self.query_json(
            args,
            "stake address rewards balance",
            "Was not able to get rewards balance for stake address",
        )
        .await
    }
}

fn tip_field(tip: Value, item: &str) -> Result<Value, CliError> {
    if item == "all" {
        return Ok(tip);
    }
    let Value::Object(mut map) = tip else {
        return Err(CliError::MissingKey {
            key: item.to_string(),
            available: "all".to_string(),
        });
    };
    match map.remove(item) {
        Some(v) => Ok(v),
        None => {
            let available = std::iter::once("all".to_string())
                .chain(map.keys().cloned())
                .collect::<Vec<_>>()
                .join(", ");
            error!(item, available = %available, "item is not available");
            Err(CliError::MissingKey {
                key: item.to_string(),
                available,
            })
        }
    }
}
