//! Output formatting for CLI results.

pub mod detail;
pub mod report;
pub mod table;

pub use detail::format_market_detail;
pub use report::{
    accrual_report, simulation_report, step_summaries, FailureReport, MarketDetail, PlanReport,
};
pub use table::{
    format_accrual_table, format_deltas_table, format_failure, format_plan_table,
    format_steps_table,
};
