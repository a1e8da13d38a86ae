//! Table formatting for simulation results.

use alloy_primitives::U256;
use colored::Colorize;
use morpho_rs_sim::WAD;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use super::report::{FailureReport, MarketAccrual, PlanReport, SimulationReport, StepSummary};

#[derive(Tabled)]
struct MarketDeltaRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Supply")]
    supply: String,
    #[tabled(rename = "Borrow")]
    borrow: String,
}

#[derive(Tabled)]
struct PositionDeltaRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Supply Shares")]
    supply_shares: String,
    #[tabled(rename = "Borrow Shares")]
    borrow_shares: String,
    #[tabled(rename = "Collateral")]
    collateral: String,
}

#[derive(Tabled)]
struct MarketRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Supply")]
    supply: String,
    #[tabled(rename = "Borrow")]
    borrow: String,
    #[tabled(rename = "Liquidity")]
    liquidity: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
}

#[derive(Tabled)]
struct WithdrawalRow {
    #[tabled(rename = "Vault")]
    vault: String,
    #[tabled(rename = "Source Market")]
    market: String,
    #[tabled(rename = "Assets")]
    assets: String,
}

#[derive(Tabled)]
struct AccrualRow {
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Supply")]
    supply: String,
    #[tabled(rename = "Borrow")]
    borrow: String,
    #[tabled(rename = "Interest")]
    interest: String,
    #[tabled(rename = "Borrow APY")]
    borrow_apy: String,
}

pub(crate) fn truncate_address(addr: &str) -> String {
    if addr.len() > 10 {
        format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
    } else {
        addr.to_string()
    }
}

/// Formats a WAD-scaled ratio as a percentage with two decimals.
pub(crate) fn format_wad_percent(value: U256) -> String {
    let basis_points = (value.saturating_mul(U256::from(10_000)) / WAD).saturating_to::<u64>();
    format!("{}.{:02}%", basis_points / 100, basis_points % 100)
}

pub(crate) fn format_apy(apy: f64) -> String {
    format!("{:.2}%", apy * 100.0)
}

fn format_change(before: U256, after: U256) -> String {
    if before == after {
        after.to_string()
    } else {
        format!("{} -> {}", before, after)
    }
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::left()));
    table.to_string()
}

pub fn format_deltas_table(report: &SimulationReport) -> String {
    if report.markets.is_empty() && report.positions.is_empty() {
        return "No changes.".to_string();
    }

    let markets: Vec<MarketDeltaRow> = report
        .markets
        .iter()
        .map(|d| MarketDeltaRow {
            index: d.index,
            operation: d.operation.to_string(),
            market: truncate_address(&d.market_id.to_string()),
            supply: format_change(d.supply_before, d.supply_after),
            borrow: format_change(d.borrow_before, d.borrow_after),
        })
        .collect();

    let positions: Vec<PositionDeltaRow> = report
        .positions
        .iter()
        .map(|d| PositionDeltaRow {
            index: d.index,
            user: truncate_address(&d.user.to_string()),
            market: truncate_address(&d.market_id.to_string()),
            supply_shares: format_change(d.supply_shares_before, d.supply_shares_after),
            borrow_shares: format_change(d.borrow_shares_before, d.borrow_shares_after),
            collateral: format_change(d.collateral_before, d.collateral_after),
        })
        .collect();

    format!(
        "{}\n{}\n\n{}\n{}",
        "Markets".cyan().bold(),
        render(markets),
        "Positions".cyan().bold(),
        render(positions)
    )
}

pub fn format_steps_table(steps: &[StepSummary]) -> String {
    let rows: Vec<MarketRow> = steps
        .iter()
        .flat_map(|step| {
            step.markets.iter().map(move |m| MarketRow {
                step: format!("{} {}", step.index, step.operation),
                market: truncate_address(&m.market_id.to_string()),
                supply: m.total_supply_assets.to_string(),
                borrow: m.total_borrow_assets.to_string(),
                liquidity: m.liquidity.to_string(),
                utilization: format_wad_percent(m.utilization),
            })
        })
        .collect();

    if rows.is_empty() {
        return "No markets in snapshot.".to_string();
    }
    render(rows)
}

pub fn format_plan_table(report: &PlanReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", "Reallocation Plan".cyan().bold()));
    output.push_str(&format!("  Market:      {}\n", report.market_id));
    output.push_str(&format!("  Shortfall:   {}\n", report.shortfall));
    output.push_str(&format!("  Reallocated: {}\n", report.reallocated));
    if report.unfilled.is_zero() {
        output.push_str(&format!("  Unfilled:    {}\n", report.unfilled));
    } else {
        output.push_str(&format!(
            "  Unfilled:    {}\n",
            report.unfilled.to_string().yellow()
        ));
    }
    if let Some(target) = &report.target {
        output.push_str(&format!("  Liquidity:   {}\n", target.liquidity));
    }
    output.push('\n');

    if report.withdrawals.is_empty() {
        output.push_str("No withdrawals found.");
        return output;
    }

    let rows: Vec<WithdrawalRow> = report
        .withdrawals
        .iter()
        .map(|w| WithdrawalRow {
            vault: truncate_address(&w.vault.to_string()),
            market: truncate_address(&w.market_id.to_string()),
            assets: w.assets.to_string(),
        })
        .collect();
    output.push_str(&render(rows));
    output
}

pub fn format_accrual_table(accruals: &[MarketAccrual]) -> String {
    if accruals.is_empty() {
        return "No markets in snapshot.".to_string();
    }

    let rows: Vec<AccrualRow> = accruals
        .iter()
        .map(|a| AccrualRow {
            market: truncate_address(&a.market_id.to_string()),
            supply: format_change(a.supply_before, a.supply_after),
            borrow: format_change(a.borrow_before, a.borrow_after),
            interest: a.interest.to_string(),
            borrow_apy: format_apy(a.borrow_apy),
        })
        .collect();
    render(rows)
}

pub fn format_failure(report: &FailureReport) -> String {
    let path: Vec<String> = report.path.iter().map(usize::to_string).collect();
    format!(
        "{}\n  Path:      {}\n  Operation: {}\n  Cause:     {}",
        "Simulation failed".red().bold(),
        path.join(" > "),
        report.operations.join(" > "),
        report.error
    )
}
