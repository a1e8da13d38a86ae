//! Detailed output formatting for a single market.

use colored::Colorize;

use super::report::MarketDetail;
use super::table::{format_apy, format_wad_percent};

fn format_optional(value: Option<impl std::fmt::Display>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_market_detail(detail: &MarketDetail) -> String {
    let mut output = String::new();
    let summary = &detail.summary;

    // Header
    output.push_str(&format!("{}\n", "=".repeat(70)));
    output.push_str(&format!("{}\n", summary.market_id.to_string().bold()));
    output.push_str(&format!("{}\n\n", "=".repeat(70)));

    // Parameters
    output.push_str(&format!("{}\n", "Parameters".cyan().bold()));
    output.push_str(&format!("  Loan Token:       {}\n", detail.params.loan_token));
    output.push_str(&format!("  Collateral Token: {}\n", detail.params.collateral_token));
    output.push_str(&format!("  Oracle:           {}\n", detail.params.oracle));
    output.push_str(&format!("  IRM:              {}\n", detail.params.irm));
    output.push_str(&format!("  LLTV:             {}\n\n", format_wad_percent(detail.params.lltv)));

    // Totals
    output.push_str(&format!("{}\n", "State".cyan().bold()));
    output.push_str(&format!("  Supply Assets: {}\n", summary.total_supply_assets));
    output.push_str(&format!("  Supply Shares: {}\n", detail.total_supply_shares));
    output.push_str(&format!("  Borrow Assets: {}\n", summary.total_borrow_assets));
    output.push_str(&format!("  Borrow Shares: {}\n", detail.total_borrow_shares));
    output.push_str(&format!("  Liquidity:     {}\n", summary.liquidity));
    output.push_str(&format!("  Utilization:   {}\n", format_wad_percent(summary.utilization)));
    output.push_str(&format!("  Fee:           {}\n", format_wad_percent(detail.fee)));
    output.push_str(&format!("  Last Update:   {}\n", detail.last_update));
    output.push_str(&format!("  Price:         {}\n", format_optional(detail.price)));
    output.push_str(&format!("  Positions:     {}\n\n", detail.positions));

    // Rates
    output.push_str(&format!("{}\n", "Rates".cyan().bold()));
    output.push_str(&format!(
        "  Rate at Target: {}\n",
        format_optional(detail.rate_at_target)
    ));
    output.push_str(&format!("  Borrow APY:     {}\n", format_apy(detail.borrow_apy)));
    output.push_str(&format!("  Supply APY:     {}\n", format_apy(detail.supply_apy)));

    // Vaults
    if !detail.vaults.is_empty() {
        output.push_str(&format!("\n{}\n", "Vault Allocations".cyan().bold()));
        for allocation in &detail.vaults {
            output.push_str(&format!(
                "  {} - supply {} / cap {} (in {}, out {})\n",
                allocation.vault,
                allocation.supply_assets,
                allocation.cap,
                format_optional(allocation.max_in),
                format_optional(allocation.max_out),
            ));
        }
    }

    output
}
