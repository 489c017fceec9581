//! adaops CLI: min-UTXO, node queries, epoch/KES timing, pool and governance helpers.

use adaops::epoch::{ShelleyGenesis, MAINNET_SHELLEY_START_EPOCH};
use adaops::governance::{GovernanceVote, VoteDecision};
use adaops::node::{find_node_process, NodeConfig, NODE_PROCESS_NAME};
use adaops::pool::{download_metadata, PoolIdFormat};
use adaops::units::lovelace_to_ada;
use adaops::utxo::{min_utxo_for_descriptor, total_lovelace, LedgerEra, ProtocolParams};
use adaops::{AdaopsConfig, CardanoCli, CliEra, CliError, Invocation, Network, ScriptedRunner};
use adaops_calendar::{render_calendar, CalendarInput};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    let config = cli.global.config()?;
    match cli.command {
        Command::MinUtxo(args) => run_min_utxo(&config, args),
        Command::Tip(args) => run_tip(&config, args),
        Command::Balance(args) => run_balance(&config, args),
        Command::Epoch(args) => run_epoch(&config, args),
        Command::Kes(args) => run_kes(&config, args),
        Command::Calendar(args) => run_calendar(&config, args),
        Command::PoolId(args) => run_pool_id(&config, args),
        Command::MetadataHash(args) => run_metadata_hash(&config, args),
        Command::FetchMetadata(args) => run_fetch_metadata(args),
        Command::Vote(args) => run_vote(&config, args),
        Command::Submit(args) => run_submit(&config, args),
        Command::Node => run_node(),
    }
}

#[derive(Parser)]
#[command(name = "adaops")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Stake pool and wallet operations on top of cardano-cli")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Overrides applied on top of the config file and environment.
#[derive(Args)]
struct GlobalArgs {
    #[arg(long, global = true)]
    network: Option<Network>,
    #[arg(long, global = true)]
    era: Option<CliEra>,
    #[arg(long, global = true)]
    socket_path: Option<PathBuf>,
    #[arg(long, global = true)]
    cache: Option<PathBuf>,
    /// Answer queries from the cache only.
    #[arg(long, global = true)]
    offline: bool,
}

impl GlobalArgs {
    fn config(&self) -> Result<AdaopsConfig, Box<dyn std::error::Error>> {
        let mut config = AdaopsConfig::load()?;
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(era) = self.era {
            config.era = era;
        }
        if let Some(socket) = &self.socket_path {
            config.socket_path = Some(socket.clone());
        }
        if let Some(cache) = &self.cache {
            config.cache_path = Some(cache.clone());
        }
        config.offline |= self.offline;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Minimum lovelace for a tx out carrying native assets.
    MinUtxo(MinUtxoArgs),
    /// Node tip, or a single item of it.
    Tip(TipArgs),
    /// UTXOs and balances of an address.
    Balance(BalanceArgs),
    /// Current epoch and time to the next one.
    Epoch(EpochArgs),
    /// KES key expiry.
    Kes(KesArgs),
    /// Write upcoming epoch starts and KES expiry as an .ics file.
    Calendar(CalendarArgs),
    /// Pool id from the cold verification key.
    PoolId(PoolIdArgs),
    /// Validate pool metadata and print its hash.
    MetadataHash(MetadataHashArgs),
    /// Download a pool metadata file.
    FetchMetadata(FetchMetadataArgs),
    /// Create a governance vote with the pool cold key.
    Vote(VoteArgs),
    /// Submit a signed transaction.
    Submit(SubmitArgs),
    /// Show the running cardano-node process arguments.
    Node,
}

#[derive(Parser)]
struct MinUtxoArgs {
    /// address+lovelace+"qty policy.name + ..."
    #[arg(long)]
    tx_out: String,
    /// Protocol parameters JSON; queried from the node when omitted.
    #[arg(long)]
    protocol_params: Option<PathBuf>,
    #[arg(long, default_value = "alonzo")]
    ledger_era: LedgerEra,
    /// Asset names are plain text rather than hex.
    #[arg(long)]
    ascii_names: bool,
}

#[derive(Parser)]
struct TipArgs {
    #[arg(long, default_value = "all")]
    item: String,
}

#[derive(Parser)]
struct BalanceArgs {
    #[arg(long)]
    address: String,
    #[arg(long)]
    utxo_prefix: Option<String>,
}

/// Where to read genesis data from.
#[derive(Args)]
struct GenesisArgs {
    #[arg(long)]
    shelley_genesis: Option<PathBuf>,
    /// Node config; defaults to the --config of the running node.
    #[arg(long)]
    node_config: Option<PathBuf>,
}

impl GenesisArgs {
    fn shelley(&self) -> Result<ShelleyGenesis, Box<dyn std::error::Error>> {
        Ok(match &self.shelley_genesis {
            Some(path) => ShelleyGenesis::load(path)?,
            None => NodeConfig::discover(self.node_config.as_deref())?.shelley_genesis()?,
        })
    }
}

#[derive(Parser)]
struct EpochArgs {
    #[command(flatten)]
    genesis: GenesisArgs,
    /// Also compare the node tip with the slot expected from Byron + Shelley genesis.
    #[arg(long)]
    check_sync: bool,
}

#[derive(Parser)]
struct KesArgs {
    #[command(flatten)]
    genesis: GenesisArgs,
    /// KES period the operational certificate was issued at.
    #[arg(long)]
    start_kes_period: u64,
    /// Current slot; queried from the node when omitted.
    #[arg(long)]
    slot: Option<u64>,
}

#[derive(Parser)]
struct CalendarArgs {
    #[command(flatten)]
    genesis: GenesisArgs,
    #[arg(long, default_value = "epochs.ics")]
    out: PathBuf,
    #[arg(long, default_value_t = 6)]
    count: usize,
    #[arg(long, default_value = "Cardano")]
    label: String,
    /// Add a KES expiry event for a certificate issued at this period.
    #[arg(long)]
    start_kes_period: Option<u64>,
    #[arg(long)]
    slot: Option<u64>,
}

#[derive(Parser)]
struct PoolIdArgs {
    #[arg(long)]
    cold_vkey: PathBuf,
    #[arg(long, default_value = "hex")]
    format: String,
}

#[derive(Parser)]
struct MetadataHashArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Parser)]
struct FetchMetadataArgs {
    #[arg(long)]
    url: String,
    #[arg(long, default_value = "poolMetaData.json")]
    out: PathBuf,
}

#[derive(Parser)]
struct VoteArgs {
    #[arg(long)]
    action_tx_id: String,
    #[arg(long, default_value_t = 0)]
    action_index: u32,
    /// yes, no or abstain
    #[arg(long)]
    decision: String,
    #[arg(long)]
    cold_vkey: PathBuf,
    #[arg(long, default_value = "vote.vote")]
    out: PathBuf,
    /// Print the cardano-cli command instead of running it.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser)]
struct SubmitArgs {
    #[arg(long)]
    tx_file: PathBuf,
}

fn run_min_utxo(config: &AdaopsConfig, args: MinUtxoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let params = match &args.protocol_params {
        Some(path) => ProtocolParams::load(path)?,
        None => {
            let cli = CardanoCli::new(config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async { cli.protocol_params().await })?
        }
    };
    let lovelace = min_utxo_for_descriptor(&args.tx_out, &params, args.ledger_era, !args.ascii_names)?;
    info!(lovelace, era = ?args.ledger_era, "min utxo");
    println!("{lovelace}");
    Ok(())
}

fn run_tip(config: &AdaopsConfig, args: TipArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cli = CardanoCli::new(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let value = rt.block_on(async { cli.tip_item(&args.item).await })?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_balance(config: &AdaopsConfig, args: BalanceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cli = CardanoCli::new(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let balances = rt.block_on(async {
        cli.balances(&args.address, args.utxo_prefix.as_deref())
            .await
    })?;
    let total = total_lovelace(&balances);
    info!(utxos = balances.len(), total, "balance");
    println!("{}", serde_json::to_string_pretty(&balances)?);
    println!("total: {} ADA", lovelace_to_ada(total));
    Ok(())
}

fn run_epoch(config: &AdaopsConfig, args: EpochArgs) -> Result<(), Box<dyn std::error::Error>> {
    let genesis = args.genesis.shelley()?;
    let now = OffsetDateTime::now_utc();
    let epoch = genesis.current_epoch(now)?;
    println!("epoch: {epoch}");
    println!("started: {}", genesis.epoch_start(epoch)?.format(&Rfc3339)?);
    println!("seconds in epoch: {}", genesis.time_in_epoch(now)?);
    println!("seconds to next epoch: {}", genesis.time_until_next_epoch(now)?);

    if args.check_sync {
        let node_config = NodeConfig::discover(args.genesis.node_config.as_deref())?;
        let byron = node_config.byron_genesis()?;
        let expected = genesis.expected_slot(&byron, MAINNET_SHELLEY_START_EPOCH, now)?;
        let cli = CardanoCli::new(config)?;
        let rt = tokio::runtime::Runtime::new()?;
        let tip = rt.block_on(async { cli.tip().await })?;
        let slot = tip.slot.unwrap_or_default();
        info!(expected, slot, behind = expected.saturating_sub(slot), "sync check");
        println!("expected slot: {expected}");
        println!("tip slot: {slot}");
    }
    Ok(())
}

fn current_slot(config: &AdaopsConfig, slot: Option<u64>) -> Result<u64, Box<dyn std::error::Error>> {
    if let Some(slot) = slot {
        return Ok(slot);
    }
    let cli = CardanoCli::new(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let tip = rt.block_on(async { cli.tip().await })?;
    tip.slot.ok_or_else(|| "tip has no slot".into())
}

fn run_kes(config: &AdaopsConfig, args: KesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let genesis = args.genesis.shelley()?;
    let slot = current_slot(config, args.slot)?;
    let remaining = genesis.remaining_kes_periods(args.start_kes_period, slot);
    let expiry = genesis.kes_expiration(remaining, slot, OffsetDateTime::now_utc())?;
    info!(slot, remaining, seconds = expiry.seconds_remaining, "kes expiry");
    println!("current KES period: {}", genesis.kes_period(slot));
    println!("remaining KES periods: {remaining}");
    println!("expires: {}", expiry.expires_at.format(&Rfc3339)?);
    Ok(())
}

fn run_calendar(config: &AdaopsConfig, args: CalendarArgs) -> Result<(), Box<dyn std::error::Error>> {
    let genesis = args.genesis.shelley()?;
    let now = OffsetDateTime::now_utc();
    let kes_expiry = match args.start_kes_period {
        Some(start) => {
            let slot = current_slot(config, args.slot)?;
            let remaining = genesis.remaining_kes_periods(start, slot);
            Some(genesis.kes_expiration(remaining, slot, now)?)
        }
        None => None,
    };
    let input = CalendarInput {
        label: args.label,
        epochs: genesis.upcoming_epochs(now, args.count)?,
        kes_expiry,
        generated_at: now,
    };
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    render_calendar(&input, &args.out)?;
    info!(out = ?args.out, events = input.epochs.len(), "calendar written");
    Ok(())
}

fn run_pool_id(config: &AdaopsConfig, args: PoolIdArgs) -> Result<(), Box<dyn std::error::Error>> {
    let format: PoolIdFormat = args.format.parse()?;
    let cli = CardanoCli::new(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let id = rt.block_on(async { cli.pool_id(&args.cold_vkey, format, None).await })?;
    println!("{id}");
    Ok(())
}

fn run_metadata_hash(config: &AdaopsConfig, args: MetadataHashArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cli = CardanoCli::new(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let hash = rt.block_on(async { cli.metadata_hash(&args.file, None).await })?;
    println!("{hash}");
    Ok(())
}

fn run_fetch_metadata(args: FetchMetadataArgs) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let path = rt.block_on(async { download_metadata(&args.url, &args.out).await })?;
    println!("{}", path.display());
    Ok(())
}

fn run_vote(config: &AdaopsConfig, args: VoteArgs) -> Result<(), Box<dyn std::error::Error>> {
    let decision: VoteDecision = args.decision.parse()?;
    let vote = GovernanceVote {
        action_tx_id: args.action_tx_id,
        action_index: args.action_index,
        decision,
        cold_vkey: args.cold_vkey,
        out_file: args.out,
    };
    let rt = tokio::runtime::Runtime::new()?;
    if args.dry_run {
        let cli = CardanoCli::with_runner(config, ScriptedRunner::dry_run());
        for line in rt.block_on(dry_run_vote(&cli, &vote))? {
            println!("{line}");
        }
        return Ok(());
    }
    let cli = CardanoCli::new(config)?;
    let (path, view) = rt.block_on(async {
        let path = cli.vote_create(&vote, None).await?;
        let view = cli.vote_view(&path, None).await?;
        Ok::<_, CliError>((path, view))
    })?;
    info!(path = ?path, %decision, "vote created");
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Command lines `vote create` would run, without running them.
async fn dry_run_vote(
    cli: &CardanoCli<ScriptedRunner>,
    vote: &GovernanceVote,
) -> Result<Vec<String>, CliError> {
    cli.vote_create(vote, None).await?;
    Ok(cli
        .runner()
        .invocations()
        .iter()
        .map(Invocation::command_line)
        .collect())
}

fn run_submit(config: &AdaopsConfig, args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cli = CardanoCli::new(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let tx_id = rt.block_on(async { cli.submit(&args.tx_file, None).await })?;
    println!("{tx_id}");
    Ok(())
}

fn run_node() -> Result<(), Box<dyn std::error::Error>> {
    let process = find_node_process(NODE_PROCESS_NAME)?;
    println!("pid: {}", process.pid);
    for (flag, value) in &process.args {
        println!("--{flag} {}", value.as_deref().unwrap_or(""));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_dry_run_lists_command() {
        let cli = CardanoCli::with_runner(&AdaopsConfig::default(), ScriptedRunner::dry_run());
        let vote = GovernanceVote {
            action_tx_id: "ab".repeat(32),
            action_index: 1,
            decision: VoteDecision::Yes,
            cold_vkey: PathBuf::from("cold.vkey"),
            out_file: PathBuf::from("vote.vote"),
        };
        let rt = tokio::runtime::Runtime::new().unwrap();
        let lines = rt.block_on(dry_run_vote(&cli, &vote)).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("cardano-cli conway governance vote create --yes"));
        assert!(lines[0].contains("--governance-action-index 1"));
        assert!(lines[0].ends_with("--out-file vote.vote"));
    }
}
