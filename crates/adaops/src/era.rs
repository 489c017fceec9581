//! `cardano-cli` era command groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown cardano-cli era '{0}'")]
pub struct UnknownEra(pub String);

/// Command group placed right after the binary name, e.g. `cardano-cli conway ...`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliEra {
    #[default]
    Conway,
    Babbage,
    Latest,
    Legacy,
}

impl CliEra {
    pub fn command_group(self) -> &'static str {
        match self {
            Self::Conway => "conway",
            Self::Babbage => "babbage",
            Self::Latest => "latest",
            Self::Legacy => "legacy",
        }
    }

    /// The legacy group still names the stake delegation certificate `delegation-certificate`.
    pub fn stake_delegation_command(self) -> &'static str {
        match self {
            Self::Legacy => "delegation-certificate",
            _ => "stake-delegation-certificate",
        }
    }
}

impl fmt::Display for CliEra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_group())
    }
}

impl FromStr for CliEra {
    type Err = UnknownEra;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conway" => Ok(Self::Conway),
            "babbage" => Ok(Self::Babbage),
            "latest" => Ok(Self::Latest),
            "legacy" | "" => Ok(Self::Legacy),
            other => Err(UnknownEra(other.to_string())),
        }
    }
}
