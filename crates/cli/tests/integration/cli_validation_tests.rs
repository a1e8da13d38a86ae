//! CLI argument validation tests.
//!
//! These tests verify that the CLI properly validates arguments and provides
//! helpful error messages without reading any snapshot.

use predicates::prelude::*;

use super::helpers::{fixture_path, morpho_sim_cmd};

#[test]
fn test_help_output() {
    morpho_sim_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("morpho-sim"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("reallocate"))
        .stdout(predicate::str::contains("accrue"))
        .stdout(predicate::str::contains("market"));
}

#[test]
fn test_simulate_help_output() {
    morpho_sim_cmd()
        .args(["simulate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--operations"))
        .stdout(predicate::str::contains("--steps"))
        .stdout(predicate::str::contains("--max-callback-depth"))
        .stdout(predicate::str::contains("MORPHO_SIM_SNAPSHOT"));
}

#[test]
fn test_reallocate_help_output() {
    morpho_sim_cmd()
        .args(["reallocate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--shortfall"))
        .stdout(predicate::str::contains("--borrow"))
        .stdout(predicate::str::contains("--market-utilization"));
}

#[test]
fn test_invalid_command() {
    morpho_sim_cmd()
        .arg("invalid_command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_simulate_missing_operations() {
    morpho_sim_cmd()
        .args(["simulate", "--snapshot", &fixture_path("snapshot")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_simulate_missing_snapshot() {
    morpho_sim_cmd()
        .args(["simulate", "--operations", &fixture_path("operations")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--snapshot"));
}

#[test]
fn test_market_missing_id() {
    morpho_sim_cmd()
        .args(["market", "--snapshot", &fixture_path("snapshot")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_invalid_market_utilization() {
    morpho_sim_cmd()
        .args([
            "reallocate",
            "--snapshot",
            &fixture_path("snapshot"),
            "--market",
            &format!("0x{}", "ab".repeat(32)),
            "--shortfall",
            "1",
            "--market-utilization",
            "no-separator",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Expected ID=WAD"));
}

#[test]
fn test_invalid_shortfall() {
    morpho_sim_cmd()
        .args([
            "reallocate",
            "--snapshot",
            &fixture_path("snapshot"),
            "--market",
            &format!("0x{}", "ab".repeat(32)),
            "--shortfall",
            "lots",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_invalid_output_format() {
    morpho_sim_cmd()
        .args(["accrue", "--format", "invalid_format"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
