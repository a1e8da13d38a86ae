//! Morpho simulator CLI - preview operations against a state snapshot.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{run_accrue, run_market, run_reallocate, run_simulate};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Simulate(args) => run_simulate(args, cli.format)?,
        Commands::Reallocate(args) => run_reallocate(args, cli.format)?,
        Commands::Accrue(args) => run_accrue(args, cli.format)?,
        Commands::Market(args) => run_market(args, cli.format)?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
