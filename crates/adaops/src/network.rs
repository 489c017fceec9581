//! Known Cardano networks and their `cardano-cli` network arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAINNET_MAGIC: u32 = 764_824_073;
pub const PREPROD_MAGIC: u32 = 1;
pub const PREVIEW_MAGIC: u32 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown network id '{0}'; known ids: mainnet for mainnet, 1 for preprod, 2 for preview")]
pub struct UnknownNetwork(pub String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Preprod,
    Preview,
}

impl Network {
    /// Look up by `CARDANO_NODE_NETWORK_ID` value: `mainnet`, `1` or `2`.
    pub fn from_network_id(id: &str) -> Result<Self, UnknownNetwork> {
        match id.trim() {
            "mainnet" => Ok(Self::Mainnet),
            "1" => Ok(Self::Preprod),
            "2" => Ok(Self::Preview),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Preprod => "preprod",
            Self::Preview => "preview",
        }
    }

    pub fn magic(self) -> u32 {
        match self {
            Self::Mainnet => MAINNET_MAGIC,
            Self::Preprod => PREPROD_MAGIC,
            Self::Preview => PREVIEW_MAGIC,
        }
    }

    pub fn is_testnet(self) -> bool {
        !matches!(self, Self::Mainnet)
    }

    /// `["--mainnet"]` or `["--testnet-magic", "<magic>"]`.
    pub fn cli_args(self) -> Vec<String> {
        if self.is_testnet() {
            vec!["--testnet-magic".to_string(), self.magic().to_string()]
        } else {
            vec!["--mainnet".to_string()]
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts both network ids (`1`, `2`) and names (`preprod`, `preview`).
impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preprod" => Ok(Self::Preprod),
            "preview" => Ok(Self::Preview),
            other => Self::from_network_id(other),
        }
    }
}
