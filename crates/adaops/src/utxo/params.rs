//! Typed view over `cardano-cli query protocol-parameters` output.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse protocol parameters: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ledger constants consumed read-only by fee and min-UTXO calculations.
/// Fields the current era does not define are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParams {
    #[serde(rename = "minUTxOValue")]
    pub min_utxo_value: Option<u64>,
    pub utxo_cost_per_word: Option<u64>,
    pub utxo_cost_per_byte: Option<u64>,
    pub tx_fee_per_byte: Option<u64>,
    pub tx_fee_fixed: Option<u64>,
    pub stake_address_deposit: Option<u64>,
    pub stake_pool_deposit: Option<u64>,
    pub max_tx_size: Option<u64>,
}

impl ProtocolParams {
    /// Load a protocol parameters file as written by `query protocol-parameters --out-file`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Cost per 8-byte word; derived from the per-byte cost on eras that only publish that.
    pub fn cost_per_word(&self) -> Option<u64> {
        self.utxo_cost_per_word
            .or_else(|| self.utxo_cost_per_byte.map(|b| b.saturating_mul(8)))
    }
}
