//! Lovelace/ADA conversion, asset-name hex helpers and change arithmetic.

use thiserror::Error;
use tracing::warn;

pub const LOVELACE_PER_ADA: u64 = 1_000_000;

#[derive(Error, Debug, PartialEq)]
pub enum HexNameError {
    #[error("invalid hex '{0}': {1}")]
    Hex(String, hex::FromHexError),
    #[error("hex '{0}' does not decode to UTF-8")]
    Utf8(String),
}

pub fn lovelace_to_ada(lovelace: u64) -> f64 {
    lovelace as f64 / LOVELACE_PER_ADA as f64
}

/// Truncates toward zero; negative input yields 0.
pub fn ada_to_lovelace(ada: f64) -> u64 {
    (ada * LOVELACE_PER_ADA as f64) as u64
}

/// `"Token"` -> `"546f6b656e"`.
pub fn ascii_to_hex(name: &str) -> String {
    hex::encode(name.as_bytes())
}

/// `"546f6b656e"` -> `"Token"`. Odd-length input is logged before decoding fails.
pub fn hex_to_ascii(hex_name: &str) -> Result<String, HexNameError> {
    warn_if_odd_length(hex_name);
    let bytes =
        hex::decode(hex_name).map_err(|e| HexNameError::Hex(hex_name.to_string(), e))?;
    String::from_utf8(bytes).map_err(|_| HexNameError::Utf8(hex_name.to_string()))
}

pub(crate) fn warn_if_odd_length(hex_name: &str) {
    if hex_name.len() % 2 != 0 {
        warn!(
            name = %hex_name,
            len = hex_name.len(),
            "hex string has an odd number of characters and might be broken"
        );
    }
}

/// Change to return after deducting fees/amounts from `initial`.
///
/// Deductions are taken by absolute value; the result is negative when the
/// input cannot cover them.
pub fn change_calc(initial: u64, deductions: &[i64]) -> i64 {
    let total: i128 = deductions.iter().map(|d| i128::from(d.unsigned_abs())).sum();
    let change = i128::from(initial) - total;
    change.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ada_lovelace_conversion() {
        assert_eq!(ada_to_lovelace(15.0), 15_000_000);
        assert_eq!(ada_to_lovelace(1.5), 1_500_000);
        assert_eq!(lovelace_to_ada(2_500_000), 2.5);
        assert_eq!(ada_to_lovelace(-1.0), 0);
    }

    #[test]
    fn hex_names() {
        assert_eq!(ascii_to_hex("Token"), "546f6b656e");
        assert_eq!(hex_to_ascii("546f6b656e").unwrap(), "Token");
        assert!(matches!(hex_to_ascii("546"), Err(HexNameError::Hex(..))));
        assert!(matches!(hex_to_ascii("zz"), Err(HexNameError::Hex(..))));
        assert!(matches!(hex_to_ascii("ff"), Err(HexNameError::Utf8(_))));
    }

    #[test]
    fn hex_name_errors_compare() {
        assert_eq!(hex_to_ascii("ff"), Err(HexNameError::Utf8("ff".into())));
        assert_eq!(
            hex_to_ascii("546"),
            Err(HexNameError::Hex("546".into(), hex::FromHexError::OddLength))
        );
    }

    #[test]
    fn change_deducts_absolute_values() {
        assert_eq!(change_calc(10_000_000, &[2_000_000, -170_000]), 7_830_000);
        assert_eq!(change_calc(100, &[]), 100);
        assert_eq!(change_calc(100, &[150]), -50);
    }
}
