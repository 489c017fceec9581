//! UTXO descriptors, balances and the minimum-UTXO calculator.

mod balance;
mod min_utxo;
mod params;

pub use balance::{
    assets_str, combine_balances, find_asset_utxos, parse_utxo_json,
    select_utxo_with_enough_balance, total_lovelace, AddressBalances, Balance, InvalidUtxoRef,
    UtxoRef,
};
pub use min_utxo::{
    min_utxo_for_descriptor, min_utxo_lovelace, AssetEntry, LedgerEra, MinUtxoError,
    NameEncoding, TxOut,
};
pub use params::{ParamsError, ProtocolParams};
