//! Minimum lovelace an output carrying native assets must hold, per the
//! Mary/Alonzo-era ledger formula.
//!
//! `minAda = floor(minUTxOValue / adaOnlyUTxOSize) * (utxoEntrySizeWithoutVal + tokenBundleSize)`,
//! never less than the flat `minUTxOValue` itself.

use crate::units::{ascii_to_hex, warn_if_odd_length};
use crate::utxo::params::ProtocolParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// coinSize in the Alonzo era; 0 in Mary.
const ALONZO_COIN_SIZE: u64 = 2;
const TOKEN_BUNDLE_OVERHEAD: u64 = 6;
const ASSET_SIZE: u64 = 12;
const POLICY_ID_SIZE: u64 = 28;
const WORD_BYTES: u64 = 8;
/// 6 + txOutLenNoVal(14) + txInLen(7)
const UTXO_ENTRY_SIZE_WITHOUT_VAL: u64 = 27;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MinUtxoError {
    #[error("malformed tx out '{input}': {reason}")]
    Format { input: String, reason: String },
    #[error("asset field '{0}' is not valid hex")]
    Encoding(String),
    #[error("protocol parameter '{0}' is missing")]
    MissingParam(&'static str),
}

fn format_err(input: &str, reason: impl Into<String>) -> MinUtxoError {
    MinUtxoError::Format {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Constant set used by the formula.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEra {
    /// Flat `minUTxOValue`, coinSize 0.
    Mary,
    /// `utxoCostPerWord * adaOnlyUTxOSize`, coinSize 2.
    #[default]
    Alonzo,
}

impl LedgerEra {
    fn coin_size(self) -> u64 {
        match self {
            Self::Mary => 0,
            Self::Alonzo => ALONZO_COIN_SIZE,
        }
    }
}

impl FromStr for LedgerEra {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mary" => Ok(Self::Mary),
            "alonzo" => Ok(Self::Alonzo),
            other => Err(format!("unknown ledger era '{other}' (expected mary or alonzo)")),
        }
    }
}

/// How asset names are written in a tx-out descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameEncoding {
    #[default]
    Hex,
    /// Plain text; hex-encoded from its UTF-8 bytes before use.
    Utf8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub policy_id: String,
    /// Hex encoded; empty for a nameless asset.
    pub asset_name: String,
    pub quantity: u64,
}

impl AssetEntry {
    /// Hex policy ids and names are lowercased, so `ABCD` and `abcd` name the same
    /// asset: both spell the same bytes on the ledger.
    fn parse(raw: &str, encoding: NameEncoding) -> Result<Self, MinUtxoError> {
        let cleaned = raw.replace('"', "");
        let fields: Vec<&str> = cleaned.split_whitespace().collect();
        let [quantity, asset_id] = fields.as_slice() else {
            return Err(format_err(raw, "expected '<quantity> <policyid>.<assetname>'"));
        };
        let quantity = quantity
            .parse::<u64>()
            .map_err(|_| format_err(raw, format!("invalid quantity '{quantity}'")))?;

        let mut id_parts = asset_id.split('.');
        let policy_id = id_parts.next().unwrap_or_default();
        let name = id_parts.next().unwrap_or_default();
        if id_parts.next().is_some() {
            return Err(format_err(raw, "more than one '.' in asset id"));
        }
        if policy_id.is_empty() {
            return Err(format_err(raw, "empty policy id"));
        }
        if !is_hex(policy_id) {
            return Err(MinUtxoError::Encoding(policy_id.to_string()));
        }
        let asset_name = match encoding {
            NameEncoding::Hex => {
                if !is_hex(name) {
                    return Err(MinUtxoError::Encoding(name.to_string()));
                }
                warn_if_odd_length(name);
                name.to_lowercase()
            }
            NameEncoding::Utf8 => ascii_to_hex(name),
        };
        Ok(Self {
            policy_id: policy_id.to_lowercase(),
            asset_name,
            quantity,
        })
    }

    /// `policyid.assetname` (or just `policyid` for a nameless asset).
    pub fn asset_id(&self) -> String {
        if self.asset_name.is_empty() {
            self.policy_id.clone()
        } else {
            format!("{}.{}", self.policy_id, self.asset_name)
        }
    }
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Transaction output descriptor: `address+lovelace[+"qty policy.name + ..."]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub lovelace: u64,
    pub assets: Vec<AssetEntry>,
}

impl TxOut {
    pub fn new(address: impl Into<String>, lovelace: u64) -> Self {
        Self {
            address: address.into(),
            lovelace,
            assets: Vec::new(),
        }
    }

    pub fn with_asset(
        mut self,
        policy_id: impl Into<String>,
        asset_name_hex: impl Into<String>,
        quantity: u64,
    ) -> Self {
        self.assets.push(AssetEntry {
            policy_id: policy_id.into(),
            asset_name: asset_name_hex.into(),
            quantity,
        });
        self
    }

    pub fn parse(descriptor: &str, encoding: NameEncoding) -> Result<Self, MinUtxoError> {
        let mut parts = descriptor.trim().split('+');
        let address = parts.next().unwrap_or_default().trim();
        if address.is_empty() {
            return Err(format_err(descriptor, "missing address"));
        }
        let lovelace_raw = parts
            .next()
            .ok_or_else(|| format_err(descriptor, "missing lovelace amount"))?
            .trim();
        let lovelace = lovelace_raw
            .parse::<u64>()
            .map_err(|_| format_err(descriptor, format!("invalid lovelace '{lovelace_raw}'")))?;
        let assets = parts
            .map(|raw| AssetEntry::parse(raw, encoding))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            address: address.to_string(),
            lovelace,
            assets,
        })
    }
}

/// Parses with hex-encoded asset names.
impl FromStr for TxOut {
    type Err = MinUtxoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, NameEncoding::Hex)
    }
}

/// Renders the `--tx-out` argument form.
impl fmt::Display for TxOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.address, self.lovelace)?;
        if !self.assets.is_empty() {
            let bundle = self
                .assets
                .iter()
                .map(|a| format!("{} {}", a.quantity, a.asset_id()))
                .collect::<Vec<_>>()
                .join(" + ");
            write!(f, "+\"{bundle}\"")?;
        }
        Ok(())
    }
}

/// Minimum lovelace `out` must carry under `era`'s constants.
pub fn min_utxo_lovelace(
    out: &TxOut,
    params: &ProtocolParams,
    era: LedgerEra,
) -> Result<u64, MinUtxoError> {
    let ada_only_utxo_size = UTXO_ENTRY_SIZE_WITHOUT_VAL + era.coin_size();
    let min_utxo_value = match era {
        LedgerEra::Mary => params
            .min_utxo_value
            .ok_or(MinUtxoError::MissingParam("minUTxOValue"))?,
        LedgerEra::Alonzo => params
            .cost_per_word()
            .ok_or(MinUtxoError::MissingParam("utxoCostPerWord"))?
            .saturating_mul(ada_only_utxo_size),
    };
    if out.assets.is_empty() {
        return Ok(min_utxo_value);
    }

    let mut policy_ids = BTreeSet::new();
    let mut asset_ids = BTreeSet::new();
    let mut names = BTreeSet::new();
    for asset in &out.assets {
        policy_ids.insert(asset.policy_id.as_str());
        asset_ids.insert((asset.policy_id.as_str(), asset.asset_name.as_str()));
        if !asset.asset_name.is_empty() {
            names.insert(asset.asset_name.as_str());
        }
    }
    let num_pids = policy_ids.len() as u64;
    let num_assets = asset_ids.len() as u64;
    // two hex chars per byte, counted over the concatenation of unique names
    let sum_asset_name_lengths = names.iter().map(|n| n.len() as u64).sum::<u64>() / 2;

    let roundup_bytes_to_words = (num_assets * ASSET_SIZE
        + sum_asset_name_lengths
        + num_pids * POLICY_ID_SIZE
        + (WORD_BYTES - 1))
        / WORD_BYTES;
    let token_bundle_size = TOKEN_BUNDLE_OVERHEAD + roundup_bytes_to_words;
    let min_ada = (min_utxo_value / ada_only_utxo_size)
        .saturating_mul(UTXO_ENTRY_SIZE_WITHOUT_VAL + token_bundle_size);

    debug!(
        num_assets,
        num_pids, sum_asset_name_lengths, token_bundle_size, min_ada, "min utxo computed"
    );
    Ok(min_ada.max(min_utxo_value))
}

/// Parse a tx-out descriptor and compute its minimum lovelace.
pub fn min_utxo_for_descriptor(
    descriptor: &str,
    params: &ProtocolParams,
    era: LedgerEra,
    hex_names: bool,
) -> Result<u64, MinUtxoError> {
    let encoding = if hex_names {
        NameEncoding::Hex
    } else {
        NameEncoding::Utf8
    };
    let out = TxOut::parse(descriptor, encoding)?;
    min_utxo_lovelace(&out, params, era)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PID_A: &str = "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a7";
    const PID_B: &str = "d5e6bf0500378d4f0da4e8dde6becec7621cd8cbf5cbb9b87013d4cc";

    fn alonzo() -> ProtocolParams {
        ProtocolParams {
            utxo_cost_per_word: Some(34482),
            ..Default::default()
        }
    }

    fn mary() -> ProtocolParams {
        ProtocolParams {
            min_utxo_value: Some(1_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn ada_only_returns_baseline() {
        let out = TxOut::new("addr_test1", 0);
        assert_eq!(
            min_utxo_lovelace(&out, &alonzo(), LedgerEra::Alonzo).unwrap(),
            999_978
        );
        assert_eq!(
            min_utxo_lovelace(&out, &mary(), LedgerEra::Mary).unwrap(),
            1_000_000
        );
    }

    #[test]
    fn alonzo_one_policy_eight_byte_name() {
        let out = TxOut::new("addr_test1", 0).with_asset(PID_A, "546f6b656e303031", 1);
        assert_eq!(
            min_utxo_lovelace(&out, &alonzo(), LedgerEra::Alonzo).unwrap(),
            1_344_798
        );
    }

    #[test]
    fn mary_reference_values() {
        let one_char = TxOut::new("a", 0).with_asset(PID_A, "41", 1);
        assert_eq!(
            min_utxo_lovelace(&one_char, &mary(), LedgerEra::Mary).unwrap(),
            1_444_443
        );
        let no_name = TxOut::new("a", 0).with_asset(PID_A, "", 1);
        assert_eq!(
            min_utxo_lovelace(&no_name, &mary(), LedgerEra::Mary).unwrap(),
            1_407_406
        );
        let three_names = TxOut::new("a", 0)
            .with_asset(PID_A, "41", 1)
            .with_asset(PID_A, "42", 1)
            .with_asset(PID_A, "43", 1);
        assert_eq!(
            min_utxo_lovelace(&three_names, &mary(), LedgerEra::Mary).unwrap(),
            1_555_554
        );
    }

    #[test]
    fn duplicate_assets_count_once() {
        let once = TxOut::new("a", 0).with_asset(PID_A, "41", 1);
        let twice = once.clone().with_asset(PID_A, "41", 5);
        assert_eq!(
            min_utxo_lovelace(&once, &mary(), LedgerEra::Mary).unwrap(),
            min_utxo_lovelace(&twice, &mary(), LedgerEra::Mary).unwrap()
        );
    }

    #[test]
    fn hex_case_names_one_asset() {
        let upper_pid = PID_A.to_uppercase();
        let mixed: TxOut = format!("addr+1+\"1 {upper_pid}.4A4B + 2 {PID_A}.4a4b\"")
            .parse()
            .unwrap();
        assert_eq!(mixed.assets[0].policy_id, PID_A);
        assert_eq!(mixed.assets[0].asset_name, "4a4b");
        let single = TxOut::new("addr", 1).with_asset(PID_A, "4a4b", 1);
        assert_eq!(
            min_utxo_lovelace(&mixed, &mary(), LedgerEra::Mary).unwrap(),
            min_utxo_lovelace(&single, &mary(), LedgerEra::Mary).unwrap()
        );
    }

    #[test]
    fn missing_params_are_reported() {
        let out = TxOut::new("a", 0);
        assert_eq!(
            min_utxo_lovelace(&out, &ProtocolParams::default(), LedgerEra::Mary),
            Err(MinUtxoError::MissingParam("minUTxOValue"))
        );
        assert_eq!(
            min_utxo_lovelace(&out, &ProtocolParams::default(), LedgerEra::Alonzo),
            Err(MinUtxoError::MissingParam("utxoCostPerWord"))
        );
    }

    #[test]
    fn parse_multi_asset_descriptor() {
        let desc = format!("addr_test1qz+1500000+\"1 {PID_A}.546f6b656e + 20 {PID_B}\"");
        let out: TxOut = desc.parse().unwrap();
        assert_eq!(out.address, "addr_test1qz");
        assert_eq!(out.lovelace, 1_500_000);
        assert_eq!(out.assets.len(), 2);
        assert_eq!(out.assets[0].asset_name, "546f6b656e");
        assert_eq!(out.assets[1].quantity, 20);
        assert_eq!(out.assets[1].asset_name, "");
        assert_eq!(out.to_string(), desc);
    }

    #[test]
    fn ascii_names_are_hex_encoded() {
        let desc = format!("addr+0+\"1 {PID_A}.Token\"");
        let out = TxOut::parse(&desc, NameEncoding::Utf8).unwrap();
        assert_eq!(out.assets[0].asset_name, "546f6b656e");
        let hex_desc = format!("addr+0+\"1 {PID_A}.546f6b656e\"");
        assert_eq!(
            min_utxo_for_descriptor(&desc, &alonzo(), LedgerEra::Alonzo, false).unwrap(),
            min_utxo_for_descriptor(&hex_desc, &alonzo(), LedgerEra::Alonzo, true).unwrap()
        );
    }

    #[test]
    fn malformed_descriptors() {
        assert!(matches!(
            "addr".parse::<TxOut>(),
            Err(MinUtxoError::Format { .. })
        ));
        assert!(matches!(
            "addr+abc".parse::<TxOut>(),
            Err(MinUtxoError::Format { .. })
        ));
        assert!(matches!(
            format!("addr+1+\"{PID_A}.41\"").parse::<TxOut>(),
            Err(MinUtxoError::Format { .. })
        ));
        assert!(matches!(
            format!("addr+1+\"1 {PID_A}.41.42\"").parse::<TxOut>(),
            Err(MinUtxoError::Format { .. })
        ));
        assert!(matches!(
            format!("addr+1+\"x {PID_A}.41\"").parse::<TxOut>(),
            Err(MinUtxoError::Format { .. })
        ));
    }

    #[test]
    fn non_hex_names_are_encoding_errors() {
        assert_eq!(
            format!("addr+1+\"1 {PID_A}.Token\"").parse::<TxOut>(),
            Err(MinUtxoError::Encoding("Token".to_string()))
        );
        assert!(matches!(
            "addr+1+\"1 policy.41\"".parse::<TxOut>(),
            Err(MinUtxoError::Encoding(_))
        ));
    }

    #[test]
    fn odd_length_hex_name_is_accepted() {
        let out: TxOut = format!("addr+1+\"1 {PID_A}.414\"").parse().unwrap();
        assert_eq!(out.assets[0].asset_name, "414");
    }

    #[test]
    fn ledger_era_from_str() {
        assert_eq!("Alonzo".parse::<LedgerEra>(), Ok(LedgerEra::Alonzo));
        assert_eq!("mary".parse::<LedgerEra>(), Ok(LedgerEra::Mary));
        assert!("babbage".parse::<LedgerEra>().is_err());
    }
}
