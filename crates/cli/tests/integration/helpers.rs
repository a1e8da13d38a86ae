//! Test helper utilities for CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecation

use alloy_primitives::U256;
use assert_cmd::Command;
use morpho_rs_sim::{MarketId, Snapshot, WAD};
use serde_json::Value;

/// Block timestamp of the snapshot fixture.
pub const SNAPSHOT_TIMESTAMP: u64 = 1_700_000_000;

/// Create a CLI command with no snapshot taken from the environment.
pub fn morpho_sim_cmd() -> Command {
    let mut cmd = Command::cargo_bin("morpho-sim").unwrap();
    cmd.env_remove("MORPHO_SIM_SNAPSHOT")
        .env_remove("MORPHO_SIM_MAX_DEPTH")
        .env_remove("RUST_LOG");
    cmd
}

/// Absolute path of a fixture file.
pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}.json", env!("CARGO_MANIFEST_DIR"), name)
}

/// Load a fixture file as a string.
pub fn load_fixture(name: &str) -> String {
    let path = fixture_path(name);
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to load fixture: {}", path))
}

/// Ids of the two snapshot markets: X is fully borrowed, Y is 52% utilized.
pub fn market_ids() -> (MarketId, MarketId) {
    let snapshot: Snapshot = serde_json::from_str(&load_fixture("snapshot")).unwrap();
    (snapshot.markets[0].id(), snapshot.markets[1].id())
}

/// Run a command expected to succeed and parse its stdout as JSON.
pub fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

pub fn u256(value: &Value) -> U256 {
    serde_json::from_value(value.clone()).unwrap()
}

pub fn market_id(value: &Value) -> MarketId {
    serde_json::from_value(value.clone()).unwrap()
}

pub fn wad(value: u64) -> U256 {
    U256::from(value) * WAD
}
