//! UTXO references, address balances and greedy selection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("'{0}' is not a UTXO reference in `<tx_hash>#<index>` format")]
pub struct InvalidUtxoRef(pub String);

fn utxo_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{64}#[0-9]+$").expect("static regex"))
}

/// `<64 hex tx hash>#<output index>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtxoRef {
    pub tx_hash: String,
    pub index: u32,
}

impl UtxoRef {
    pub fn is_valid(s: &str) -> bool {
        utxo_ref_regex().is_match(s)
    }
}

impl FromStr for UtxoRef {
    type Err = InvalidUtxoRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(InvalidUtxoRef(s.to_string()));
        }
        let (hash, idx) = s.split_once('#').ok_or_else(|| InvalidUtxoRef(s.to_string()))?;
        let index = idx.parse().map_err(|_| InvalidUtxoRef(s.to_string()))?;
        Ok(Self {
            tx_hash: hash.to_lowercase(),
            index,
        })
    }
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

/// Lovelace plus native tokens (`policy_id -> asset_name_hex -> quantity`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub lovelace: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Balances keyed by `tx_hash#index`.
pub type AddressBalances = BTreeMap<String, Balance>;

#[derive(Deserialize)]
struct RawEntry {
    value: RawValue,
}

#[derive(Deserialize)]
struct RawValue {
    #[serde(default)]
    lovelace: u64,
    #[serde(flatten)]
    tokens: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Parse `cardano-cli query utxo --output-json` output.
pub fn parse_utxo_json(json: &str) -> Result<AddressBalances, serde_json::Error> {
    let raw: BTreeMap<String, RawEntry> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|(utxo, entry)| {
            (
                utxo,
                Balance {
                    lovelace: entry.value.lovelace,
                    tokens: entry.value.tokens,
                },
            )
        })
        .collect())
}

/// Merge lovelace and token quantities of several balances.
pub fn combine_balances<'a>(balances: impl IntoIterator<Item = &'a Balance>) -> Balance {
    let mut merged = Balance::default();
    for b in balances {
        merged.lovelace = merged.lovelace.saturating_add(b.lovelace);
        for (policy, tokens) in &b.tokens {
            let slot = merged.tokens.entry(policy.clone()).or_default();
            for (name, qty) in tokens {
                let q = slot.entry(name.clone()).or_default();
                *q = q.saturating_add(*qty);
            }
        }
    }
    merged
}

pub fn total_lovelace(balances: &AddressBalances) -> u64 {
    balances
        .values()
        .fold(0u64, |acc, b| acc.saturating_add(b.lovelace))
}

/// First UTXO, scanning from the last entry, holding at least `amount` lovelace.
pub fn select_utxo_with_enough_balance(balances: &AddressBalances, amount: u64) -> Option<&str> {
    let found = balances
        .iter()
        .rev()
        .find(|(_, b)| b.lovelace >= amount)
        .map(|(utxo, _)| utxo.as_str());
    if found.is_none() {
        warn!(amount, utxos = balances.len(), "no single UTXO with enough balance");
        warn!("join multiple UTXOs in the input list or use a different address");
    }
    found
}

/// UTXOs holding `asset_name` (hex), optionally restricted to `policy_id`.
pub fn find_asset_utxos(
    balances: &AddressBalances,
    asset_name: &str,
    policy_id: Option<&str>,
) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (utxo, balance) in balances {
        for (pid, tokens) in &balance.tokens {
            if policy_id.is_some_and(|p| p != pid) {
                continue;
            }
            if tokens.contains_key(asset_name) {
                found.insert(utxo.clone());
            }
        }
    }
    found.into_iter().collect()
}

/// Token bundle of `utxo` rendered for a tx-out (`"5 pid.name + 1 pid.other"`),
/// with `deduct` taken (floored at zero) from `asset_name`.
///
/// `None` when the UTXO is unknown or holds no tokens.
pub fn assets_str(
    balances: &AddressBalances,
    utxo: &str,
    asset_name: &str,
    policy_id: Option<&str>,
    deduct: u64,
) -> Option<String> {
    let balance = balances.get(utxo)?;
    if balance.tokens.is_empty() {
        return None;
    }
    let mut rendered = Vec::new();
    for (pid, tokens) in &balance.tokens {
        if policy_id.is_some_and(|p| p != pid) {
            continue;
        }
        for (name, count) in tokens {
            let count = if name == asset_name {
                count.saturating_sub(deduct)
            } else {
                *count
            };
            rendered.push(format!("{count} {pid}.{name}"));
        }
    }
    Some(rendered.join(" + "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "a0f3b2c1d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f";

    fn sample() -> AddressBalances {
        let json = format!(
            r#"{{
            "{HASH}#0": {{"address": "addr_test1", "value": {{"lovelace": 1000000000}}}},
            "{HASH}#1": {{"address": "addr_test1", "value": {{
                "lovelace": 979279256,
                "policy1": {{"746f6b656e31": 9995000, "616e6f74686572": 9999996}}
            }}}}
        }}"#
        );
        parse_utxo_json(&json).unwrap()
    }

    #[test]
    fn utxo_ref_validation() {
        let r: UtxoRef = format!("{HASH}#3").parse().unwrap();
        assert_eq!(r.index, 3);
        assert_eq!(r.to_string(), format!("{HASH}#3"));
        assert!("abc#0".parse::<UtxoRef>().is_err());
        assert!(HASH.parse::<UtxoRef>().is_err());
        assert!(!UtxoRef::is_valid(&format!("{HASH}#x")));
    }

    #[test]
    fn parses_cli_utxo_json() {
        let b = sample();
        assert_eq!(b.len(), 2);
        let with_tokens = &b[&format!("{HASH}#1")];
        assert_eq!(with_tokens.lovelace, 979_279_256);
        assert_eq!(with_tokens.tokens["policy1"]["746f6b656e31"], 9_995_000);
        assert!(b[&format!("{HASH}#0")].tokens.is_empty());
        assert_eq!(total_lovelace(&b), 1_979_279_256);
    }

    #[test]
    fn combine_merges_tokens() {
        let mut a = Balance {
            lovelace: 5_000_000,
            ..Default::default()
        };
        a.tokens
            .entry("p1".into())
            .or_default()
            .insert("tA".into(), 1000);
        let mut b = Balance {
            lovelace: 2_700_000,
            ..Default::default()
        };
        b.tokens
            .entry("p1".into())
            .or_default()
            .insert("tA".into(), 300);
        b.tokens
            .entry("p3".into())
            .or_default()
            .insert("tE".into(), 700);
        let merged = combine_balances([&a, &b]);
        assert_eq!(merged.lovelace, 7_700_000);
        assert_eq!(merged.tokens["p1"]["tA"], 1300);
        assert_eq!(merged.tokens["p3"]["tE"], 700);
    }

    #[test]
    fn select_scans_from_last() {
        let b = sample();
        assert_eq!(
            select_utxo_with_enough_balance(&b, 900_000_000),
            Some(format!("{HASH}#1").as_str())
        );
        assert_eq!(
            select_utxo_with_enough_balance(&b, 990_000_000),
            Some(format!("{HASH}#0").as_str())
        );
        assert_eq!(select_utxo_with_enough_balance(&b, 2_000_000_000), None);
        assert_eq!(
            select_utxo_with_enough_balance(&AddressBalances::new(), 1),
            None
        );
    }

    #[test]
    fn find_assets_by_name_and_policy() {
        let b = sample();
        assert_eq!(
            find_asset_utxos(&b, "746f6b656e31", None),
            vec![format!("{HASH}#1")]
        );
        assert!(find_asset_utxos(&b, "746f6b656e31", Some("other")).is_empty());
        assert!(find_asset_utxos(&b, "missing", None).is_empty());
    }

    #[test]
    fn assets_string_deducts() {
        let b = sample();
        let s = assets_str(&b, &format!("{HASH}#1"), "746f6b656e31", None, 5000).unwrap();
        assert_eq!(
            s,
            "9999996 policy1.616e6f74686572 + 9990000 policy1.746f6b656e31"
        );
        let floored =
            assets_str(&b, &format!("{HASH}#1"), "746f6b656e31", None, u64::MAX).unwrap();
        assert!(floored.contains("0 policy1.746f6b656e31"));
        assert_eq!(assets_str(&b, &format!("{HASH}#0"), "x", None, 0), None);
        assert_eq!(assets_str(&b, "nope", "x", None, 0), None);
    }
}
