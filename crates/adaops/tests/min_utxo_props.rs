//! Property tests for the minimum-UTXO calculator.

use adaops::units::ascii_to_hex;
use adaops::{min_utxo_for_descriptor, min_utxo_lovelace, LedgerEra, ProtocolParams, TxOut};
use proptest::prelude::*;

const ADDR: &str = "addr_test1vqxmeh5tjvcwp0kf5pkdsq8xwl3d8nzzkm6yw4yhu7zkmfg4t0pfq";

fn params(min_utxo_value: u64, cost_per_word: u64) -> ProtocolParams {
    ProtocolParams {
        min_utxo_value: Some(min_utxo_value),
        utxo_cost_per_word: Some(cost_per_word),
        ..Default::default()
    }
}

fn out_with(assets: &[(String, String, u64)]) -> TxOut {
    assets
        .iter()
        .fold(TxOut::new(ADDR, 0), |out, (pid, name, qty)| {
            out.with_asset(pid.clone(), name.clone(), *qty)
        })
}

fn era() -> impl Strategy<Value = LedgerEra> {
    prop_oneof![Just(LedgerEra::Mary), Just(LedgerEra::Alonzo)]
}

fn asset() -> impl Strategy<Value = (String, String, u64)> {
    ("[0-9a-f]{56}", "([0-9a-f]{2}){0,32}", 1u64..1_000_000_000)
}

fn baseline(p: &ProtocolParams, era: LedgerEra) -> u64 {
    min_utxo_lovelace(&TxOut::new(ADDR, 0), p, era).unwrap()
}

proptest! {
    #[test]
    fn empty_bundle_is_baseline(
        min_value in 1u64..10_000_000,
        cost in 1u64..100_000,
    ) {
        let p = params(min_value, cost);
        prop_assert_eq!(baseline(&p, LedgerEra::Mary), min_value);
        prop_assert_eq!(baseline(&p, LedgerEra::Alonzo), cost * 29);
    }

    #[test]
    fn never_below_baseline(
        assets in prop::collection::vec(asset(), 0..8),
        min_value in 1u64..10_000_000,
        cost in 1u64..100_000,
        era in era(),
    ) {
        let p = params(min_value, cost);
        let v = min_utxo_lovelace(&out_with(&assets), &p, era).unwrap();
        prop_assert!(v >= baseline(&p, era));
    }

    #[test]
    fn adding_assets_never_lowers(
        assets in prop::collection::vec(asset(), 0..8),
        extra in asset(),
        min_value in 1u64..10_000_000,
        cost in 1u64..100_000,
        era in era(),
    ) {
        let p = params(min_value, cost);
        let before = min_utxo_lovelace(&out_with(&assets), &p, era).unwrap();
        let mut more = assets.clone();
        more.push(extra);
        let after = min_utxo_lovelace(&out_with(&more), &p, era).unwrap();
        prop_assert!(before <= after, "{before} > {after} after adding an asset");
    }

    #[test]
    fn deterministic(
        assets in prop::collection::vec(asset(), 0..8),
        cost in 1u64..100_000,
        era in era(),
    ) {
        let p = params(1_000_000, cost);
        let out = out_with(&assets);
        prop_assert_eq!(
            min_utxo_lovelace(&out, &p, era).unwrap(),
            min_utxo_lovelace(&out, &p, era).unwrap()
        );
    }

    #[test]
    fn duplicate_entries_counted_once(
        assets in prop::collection::vec(asset(), 1..8),
        pick in any::<prop::sample::Index>(),
        qty in 1u64..1_000,
        era in era(),
    ) {
        let p = params(1_000_000, 34_482);
        let (pid, name, _) = assets[pick.index(assets.len())].clone();
        let mut duplicated = assets.clone();
        duplicated.push((pid, name, qty));
        prop_assert_eq!(
            min_utxo_lovelace(&out_with(&assets), &p, era).unwrap(),
            min_utxo_lovelace(&out_with(&duplicated), &p, era).unwrap()
        );
    }

    #[test]
    fn text_names_match_hex_names(
        entries in prop::collection::vec(("[0-9a-f]{56}", "[A-Za-z0-9]{1,16}", 1u64..1_000), 1..5),
        era in era(),
    ) {
        let p = params(1_000_000, 34_482);
        let render = |names_as_hex: bool| {
            let bundle = entries
                .iter()
                .map(|(pid, name, qty)| {
                    let name = if names_as_hex { ascii_to_hex(name) } else { name.clone() };
                    format!("{qty} {pid}.{name}")
                })
                .collect::<Vec<_>>()
                .join(" + ");
            format!("{ADDR}+2000000+\"{bundle}\"")
        };
        prop_assert_eq!(
            min_utxo_for_descriptor(&render(false), &p, era, false).unwrap(),
            min_utxo_for_descriptor(&render(true), &p, era, true).unwrap()
        );
    }
}
