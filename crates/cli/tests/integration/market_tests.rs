//! Market and accrue command integration tests.

use alloy_primitives::U256;
use morpho_rs_sim::{MarketId, WAD};
use predicates::prelude::*;

use super::helpers::{
    fixture_path, json_output, market_id, market_ids, morpho_sim_cmd, u256, wad,
    SNAPSHOT_TIMESTAMP,
};

const ONE_YEAR: u64 = 31_536_000;

#[test]
fn test_market_detail_table() {
    let (x, _) = market_ids();
    morpho_sim_cmd()
        .args(["market", "--snapshot", &fixture_path("snapshot"), &x.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Parameters"))
        .stdout(predicate::str::contains("Utilization:   100.00%"))
        .stdout(predicate::str::contains("86.00%"))
        .stdout(predicate::str::contains("Vault Allocations"));
}

#[test]
fn test_market_detail_json() {
    let (x, _) = market_ids();
    let detail = json_output(morpho_sim_cmd().args([
        "market",
        "--snapshot",
        &fixture_path("snapshot"),
        &x.to_string(),
        "--format",
        "json",
    ]));

    assert_eq!(market_id(&detail["market_id"]), x);
    assert_eq!(u256(&detail["liquidity"]), U256::ZERO);
    assert_eq!(u256(&detail["utilization"]), WAD);
    // Vault, Bob and the borrower hold non-empty positions
    assert_eq!(detail["positions"], 3);

    let vaults = detail["vaults"].as_array().unwrap();
    assert_eq!(vaults.len(), 1);
    assert_eq!(u256(&vaults[0]["supply_assets"]), wad(500));
    assert_eq!(u256(&vaults[0]["max_out"]), wad(300));
}

#[test]
fn test_market_unknown_id() {
    morpho_sim_cmd()
        .args([
            "market",
            "--snapshot",
            &fixture_path("snapshot"),
            &format!("0x{}", "cd".repeat(32)),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown market"));
}

#[test]
fn test_market_invalid_id() {
    morpho_sim_cmd()
        .args(["market", "--snapshot", &fixture_path("snapshot"), "not-an-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_accrue_json() {
    let (x, y) = market_ids();
    let timestamp = (SNAPSHOT_TIMESTAMP + ONE_YEAR).to_string();
    let report = json_output(morpho_sim_cmd().args([
        "accrue",
        "--snapshot",
        &fixture_path("snapshot"),
        "--timestamp",
        &timestamp,
        "--format",
        "json",
    ]));

    let accruals = report.as_array().unwrap();
    assert_eq!(accruals.len(), 2);
    let find = |id: MarketId| {
        accruals
            .iter()
            .find(|a| market_id(&a["market_id"]) == id)
            .unwrap()
    };

    // X has no interest rate model
    let x = find(x);
    assert_eq!(u256(&x["interest"]), U256::ZERO);
    assert_eq!(u256(&x["supply_after"]), wad(1_000));

    // Y accrues interest on both sides
    let y = find(y);
    let interest = u256(&y["interest"]);
    assert!(interest > U256::ZERO);
    assert_eq!(u256(&y["borrow_after"]), wad(520) + interest);
    assert_eq!(u256(&y["supply_after"]), wad(1_000) + interest);
}

#[test]
fn test_accrue_table() {
    let timestamp = (SNAPSHOT_TIMESTAMP + ONE_YEAR).to_string();
    morpho_sim_cmd()
        .args([
            "accrue",
            "--snapshot",
            &fixture_path("snapshot"),
            "--timestamp",
            &timestamp,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Borrow APY"));
}

#[test]
fn test_accrue_before_last_update() {
    morpho_sim_cmd()
        .args([
            "accrue",
            "--snapshot",
            &fixture_path("snapshot"),
            "--timestamp",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid interest accrual"));
}
