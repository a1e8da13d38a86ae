//! Reallocate command integration tests.

use alloy_primitives::U256;
use predicates::prelude::*;

use super::helpers::{fixture_path, json_output, market_id, market_ids, morpho_sim_cmd, u256, wad};

fn reallocate(extra: &[&str]) -> assert_cmd::Command {
    let (x, _) = market_ids();
    let mut cmd = morpho_sim_cmd();
    cmd.args([
        "reallocate",
        "--snapshot",
        &fixture_path("snapshot"),
        "--market",
        &x.to_string(),
    ]);
    cmd.args(extra);
    cmd
}

#[test]
fn test_reallocate_shortfall_json() {
    let (x, y) = market_ids();
    let plan = json_output(&mut reallocate(&[
        "--shortfall",
        "250000000000000000000",
        "--format",
        "json",
    ]));

    assert_eq!(market_id(&plan["market_id"]), x);
    assert_eq!(u256(&plan["reallocated"]), wad(250));
    assert_eq!(u256(&plan["unfilled"]), U256::ZERO);

    let withdrawals = plan["withdrawals"].as_array().unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(market_id(&withdrawals[0]["market_id"]), y);
    assert_eq!(u256(&withdrawals[0]["assets"]), wad(250));

    let operations = plan["operations"].as_array().unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0]["action"]["op"]["type"], "PublicReallocate");

    assert_eq!(u256(&plan["target"]["liquidity"]), wad(250));
}

#[test]
fn test_reallocate_reports_unfilled_shortfall() {
    // Y can only release 300 through its outflow cap
    let plan = json_output(&mut reallocate(&[
        "--shortfall",
        "500000000000000000000",
        "--format",
        "json",
    ]));

    assert_eq!(u256(&plan["reallocated"]), wad(300));
    assert_eq!(u256(&plan["unfilled"]), wad(200));
}

#[test]
fn test_reallocate_market_utilization_override() {
    let (_, y) = market_ids();
    // At 60%, Y has only 80 to spare above its 520 of debt
    let plan = json_output(&mut reallocate(&[
        "--shortfall",
        "250000000000000000000",
        "--market-utilization",
        &format!("{}=600000000000000000", y),
        "--format",
        "json",
    ]));

    assert_eq!(u256(&plan["reallocated"]), wad(80));
    assert_eq!(u256(&plan["unfilled"]), wad(170));
}

#[test]
fn test_reallocate_default_utilization_flag() {
    let plan = json_output(&mut reallocate(&[
        "--shortfall",
        "250000000000000000000",
        "--max-utilization",
        "600000000000000000",
        "--format",
        "json",
    ]));

    assert_eq!(u256(&plan["reallocated"]), wad(80));
}

#[test]
fn test_reallocate_for_borrow() {
    let plan = json_output(&mut reallocate(&[
        "--borrow",
        "100000000000000000000",
        "--format",
        "json",
    ]));

    // 1100 borrowed at 92% needs ceil(1100 / 0.92) supplied
    let shortfall = U256::from(195_652_173_913_043_478_261u128);
    assert_eq!(u256(&plan["shortfall"]), shortfall);
    assert_eq!(u256(&plan["reallocated"]), shortfall);
    assert_eq!(u256(&plan["unfilled"]), U256::ZERO);
}

#[test]
fn test_reallocate_table_output() {
    reallocate(&["--shortfall", "250000000000000000000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reallocation Plan"))
        .stdout(predicate::str::contains("250000000000000000000"));
}

#[test]
fn test_reallocate_requires_demand() {
    reallocate(&[])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_reallocate_shortfall_and_borrow_conflict() {
    reallocate(&["--shortfall", "1", "--borrow", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_reallocate_unknown_market() {
    morpho_sim_cmd()
        .args([
            "reallocate",
            "--snapshot",
            &fixture_path("snapshot"),
            "--market",
            &format!("0x{}", "ab".repeat(32)),
            "--shortfall",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown market"));
}
