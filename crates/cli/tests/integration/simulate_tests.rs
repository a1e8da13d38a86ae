//! Simulate command integration tests.

use alloy_primitives::U256;
use predicates::prelude::*;

use super::helpers::{fixture_path, json_output, market_id, market_ids, morpho_sim_cmd, u256, wad};

fn simulate(operations: &str) -> assert_cmd::Command {
    let mut cmd = morpho_sim_cmd();
    cmd.args([
        "simulate",
        "--snapshot",
        &fixture_path("snapshot"),
        "--operations",
        &fixture_path(operations),
    ]);
    cmd
}

#[test]
fn test_simulate_json_reports_deltas() {
    let (x, y) = market_ids();
    let report = json_output(simulate("operations").args(["--format", "json"]));

    let markets = report["markets"].as_array().unwrap();
    assert_eq!(markets.len(), 2);

    assert_eq!(markets[0]["index"], 0);
    assert_eq!(markets[0]["operation"], "Blue.Supply");
    assert_eq!(market_id(&markets[0]["market_id"]), y);
    assert_eq!(u256(&markets[0]["supply_before"]), wad(1_000));
    assert_eq!(u256(&markets[0]["supply_after"]), wad(1_100));

    assert_eq!(markets[1]["operation"], "Blue.Repay");
    assert_eq!(market_id(&markets[1]["market_id"]), x);
    assert_eq!(u256(&markets[1]["borrow_before"]), wad(1_000));
    assert_eq!(u256(&markets[1]["borrow_after"]), wad(800));

    let positions = report["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 2);
    assert_eq!(u256(&positions[0]["supply_shares_before"]), U256::ZERO);
    assert_eq!(u256(&positions[0]["supply_shares_after"]), wad(100));
    assert_eq!(u256(&positions[1]["borrow_shares_after"]), wad(800));
}

#[test]
fn test_simulate_table_output() {
    simulate("operations")
        .assert()
        .success()
        .stdout(predicate::str::contains("Markets"))
        .stdout(predicate::str::contains("Positions"))
        .stdout(predicate::str::contains("Blue.Supply"))
        .stdout(predicate::str::contains("Blue.Repay"));
}

#[test]
fn test_simulate_steps() {
    let steps = json_output(simulate("operations").args(["--steps", "--format", "json"]));
    let steps = steps.as_array().unwrap();

    // Initial state, then one state per operation
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0]["operation"], "Initial");
    assert_eq!(steps[2]["operation"], "Blue.Repay");

    // X sorts first; the repay frees 200 of its liquidity
    assert_eq!(u256(&steps[0]["markets"][0]["liquidity"]), U256::ZERO);
    assert_eq!(u256(&steps[1]["markets"][0]["liquidity"]), U256::ZERO);
    assert_eq!(u256(&steps[2]["markets"][0]["liquidity"]), wad(200));
}

#[test]
fn test_simulate_nested_callback() {
    let report = json_output(simulate("nested_operations").args(["--format", "json"]));

    // Both market changes belong to the single top-level supply
    let markets = report["markets"].as_array().unwrap();
    assert_eq!(markets.len(), 2);
    assert!(markets.iter().all(|m| m["index"] == 0));
    assert!(markets.iter().all(|m| m["operation"] == "Blue.Supply"));
}

#[test]
fn test_simulate_callback_depth_limit() {
    simulate("nested_operations")
        .args(["--max-callback-depth", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("maximum depth of 0"));
}

#[test]
fn test_simulate_callback_depth_from_env() {
    simulate("nested_operations")
        .env("MORPHO_SIM_MAX_DEPTH", "0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("maximum depth of 0"));
}

#[test]
fn test_simulate_failure_exits_nonzero() {
    simulate("failing_operations")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Simulation failed"))
        .stderr(predicate::str::contains("Blue.Supply"))
        .stderr(predicate::str::contains("Insufficient balance"));
}

#[test]
fn test_simulate_failure_json() {
    let output = simulate("failing_operations")
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["path"], serde_json::json!([1]));
    assert_eq!(report["operations"], serde_json::json!(["Blue.Supply"]));
    assert!(report["error"]
        .as_str()
        .unwrap()
        .contains("Insufficient balance"));
}

#[test]
fn test_snapshot_from_env() {
    morpho_sim_cmd()
        .env("MORPHO_SIM_SNAPSHOT", fixture_path("snapshot"))
        .args(["simulate", "--operations", &fixture_path("operations")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Blue.Supply"));
}

#[test]
fn test_missing_snapshot_file() {
    morpho_sim_cmd()
        .args([
            "simulate",
            "--snapshot",
            "does-not-exist.json",
            "--operations",
            &fixture_path("operations"),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read snapshot"));
}

#[test]
fn test_operations_file_is_not_a_snapshot() {
    morpho_sim_cmd()
        .args([
            "simulate",
            "--snapshot",
            &fixture_path("operations"),
            "--operations",
            &fixture_path("operations"),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse snapshot"));
}

#[test]
fn test_verbose_logs_to_stderr() {
    let output = simulate("operations")
        .args(["-v", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loaded snapshot"));
    // Logs stay off stdout
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["markets"].is_array());
}
