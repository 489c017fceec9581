//! adaops: typed wrapper around `cardano-cli`.
//!
//! Every node operation is a typed request that becomes one `cardano-cli`
//! invocation; exit codes and output are mapped to library errors. The only
//! self-contained algorithm is the historical minimum-UTXO formula in [`utxo`].

pub mod cache;
pub mod cardano;
pub mod certs;
pub mod config;
pub mod epoch;
pub mod era;
pub mod exec;
pub mod governance;
pub mod keys;
pub mod network;
pub mod node;
pub mod pool;
pub mod query;
pub mod tx;
pub mod units;
pub mod utxo;

pub use cache::Cache;
pub use cardano::{CardanoCli, CliError};
pub use certs::{DrepTarget, PoolRegistration};
pub use config::AdaopsConfig;
pub use epoch::{ByronGenesis, EpochBoundary, EpochError, KesExpiration, ShelleyGenesis};
pub use era::CliEra;
pub use exec::{CommandOutput, CommandRunner, Invocation, ProcessRunner, ScriptedRunner};
pub use governance::{GovernanceVote, VoteDecision};
pub use network::Network;
pub use node::{GenesisPhase, NodeConfig, NodeError, NodeProcess};
pub use pool::{PoolIdFormat, PoolMetadata};
pub use query::Tip;
pub use tx::{MinFeeRequest, TxArrival, TxBuildRequest};
pub use utxo::{
    min_utxo_lovelace, min_utxo_for_descriptor, AddressBalances, AssetEntry, Balance, LedgerEra,
    MinUtxoError, NameEncoding, ProtocolParams, TxOut, UtxoRef,
};
