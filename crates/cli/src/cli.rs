//! CLI argument definitions using clap.

use std::path::PathBuf;

use alloy_primitives::U256;
use clap::{Args, Parser, Subcommand, ValueEnum};
use morpho_rs_sim::{MarketId, DEFAULT_MAX_CALLBACK_DEPTH};

/// Morpho simulator - preview operations against a state snapshot
#[derive(Parser, Debug)]
#[command(name = "morpho-sim")]
#[command(about = "Preview Morpho Blue and MetaMorpho operations offline", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply an operation file to a snapshot
    Simulate(SimulateArgs),
    /// Plan public reallocations relieving a market's liquidity shortfall
    Reallocate(ReallocateArgs),
    /// Accrue interest on every market up to a timestamp
    Accrue(AccrueArgs),
    /// Show a market of the snapshot
    Market(MarketArgs),
}

#[derive(Args, Debug)]
pub struct SnapshotArg {
    /// Snapshot file (JSON)
    #[arg(long, env = "MORPHO_SIM_SNAPSHOT")]
    pub snapshot: PathBuf,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArg,

    /// Operation file (JSON array of operations)
    #[arg(long)]
    pub operations: PathBuf,

    /// Print a summary of every intermediate state
    #[arg(long)]
    pub steps: bool,

    /// Maximum callback nesting depth
    #[arg(long, env = "MORPHO_SIM_MAX_DEPTH", default_value_t = DEFAULT_MAX_CALLBACK_DEPTH)]
    pub max_callback_depth: usize,

    /// Skip the solvency check after each operation
    #[arg(long)]
    pub no_solvency_check: bool,
}

#[derive(Args, Debug)]
pub struct ReallocateArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArg,

    /// Market lacking liquidity
    #[arg(long)]
    pub market: MarketId,

    #[command(flatten)]
    pub demand: Demand,

    /// Default utilization target of source markets (WAD-scaled)
    #[arg(long)]
    pub max_utilization: Option<U256>,

    /// Utilization target of one market, as ID=WAD (repeatable)
    #[arg(long = "market-utilization", value_parser = parse_market_utilization)]
    pub market_utilization: Vec<(MarketId, U256)>,
}

/// Either the missing liquidity, or a borrow to make room for.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Demand {
    /// Liquidity to bring into the market (raw units)
    #[arg(long)]
    pub shortfall: Option<U256>,

    /// Borrow the market must absorb under its utilization target (raw units)
    #[arg(long)]
    pub borrow: Option<U256>,
}

#[derive(Args, Debug)]
pub struct AccrueArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArg,

    /// Timestamp to accrue to (seconds)
    #[arg(long)]
    pub timestamp: u64,
}

#[derive(Args, Debug)]
pub struct MarketArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArg,

    /// Market id
    pub id: MarketId,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

fn parse_market_utilization(s: &str) -> Result<(MarketId, U256), String> {
    let (id, utilization) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected ID=WAD, got: {}", s))?;
    let id = id
        .parse::<MarketId>()
        .map_err(|e| format!("Invalid market id {}: {}", id, e))?;
    let utilization = utilization
        .parse::<U256>()
        .map_err(|e| format!("Invalid utilization {}: {}", utilization, e))?;
    Ok((id, utilization))
}
