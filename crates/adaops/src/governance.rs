//! Governance votes cast with the pool cold key.

use crate::cardano::{parse_json, path_arg, CardanoCli, CliError};
use crate::exec::CommandRunner;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteDecision {
    Yes,
    No,
    Abstain,
}

impl VoteDecision {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Yes => "--yes",
            Self::No => "--no",
            Self::Abstain => "--abstain",
        }
    }
}

impl fmt::Display for VoteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flag()[2..])
    }
}

impl FromStr for VoteDecision {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "abstain" => Ok(Self::Abstain),
            other => Err(CliError::InvalidArgument(format!(
                "invalid decision '{other}'; must be one of yes, no, abstain"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GovernanceVote {
    pub action_tx_id: String,
    pub action_index: u32,
    pub decision: VoteDecision,
    pub cold_vkey: PathBuf,
    pub out_file: PathBuf,
}

impl<R: CommandRunner> CardanoCli<R> {
    /// `governance vote create`; returns the vote file path.
    pub async fn vote_create(&self, vote: &GovernanceVote, cwd: Option<&Path>) -> Result<PathBuf, CliError> {
        self.run_checked(
            cwd,
            [
                "governance".to_string(),
                "vote".to_string(),
                "create".to_string(),
                vote.decision.flag().to_string(),
                "--governance-action-tx-id".to_string(),
                vote.action_tx_id.clone(),
                "--governance-action-index".to_string(),
                vote.action_index.to_string(),
                "--cold-verification-key-file".to_string(),
                path_arg(&vote.cold_vkey),
                "--out-file".to_string(),
                path_arg(&vote.out_file),
            ],
            "Governance vote creation didn't work",
        )
        .await?;
        Ok(match cwd {
            Some(dir) if vote.out_file.is_relative() => dir.join(&vote.out_file),
            _ => vote.out_file.clone(),
        })
    }

    /// Decoded contents of a vote file.
    pub async fn vote_view(&self, vote_file: &Path, cwd: Option<&Path>) -> Result<Value, CliError> {
        let out = self
            .run_checked(
                cwd,
                [
                    "governance",
                    "vote",
                    "view",
                    "--output-json",
                    "--vote-file",
                    &path_arg(vote_file),
                ],
                "Getting data from the vote file did not work",
            )
            .await?;
        parse_json("vote file", &out)
    }
}
