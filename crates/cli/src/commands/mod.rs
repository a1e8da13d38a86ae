//! Command implementations.

pub mod accrue;
pub mod market;
pub mod reallocate;
pub mod simulate;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use morpho_rs_sim::{Operation, SimulationState, Snapshot};
use serde::Serialize;
use tracing::debug;

pub use accrue::run_accrue;
pub use market::run_market;
pub use reallocate::run_reallocate;
pub use simulate::run_simulate;

/// Reads a snapshot file into a simulation state.
pub(crate) fn load_state(path: &Path) -> Result<SimulationState> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
    let state = SimulationState::from_snapshot(snapshot)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;

    debug!(
        block = state.block_number,
        timestamp = state.timestamp,
        markets = state.markets.len(),
        vaults = state.vaults.len(),
        "loaded snapshot"
    );
    Ok(state)
}

pub(crate) fn load_operations(path: &Path) -> Result<Vec<Operation>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read operations {}", path.display()))?;
    let operations: Vec<Operation> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse operations {}", path.display()))?;

    debug!(count = operations.len(), "loaded operations");
    Ok(operations)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
