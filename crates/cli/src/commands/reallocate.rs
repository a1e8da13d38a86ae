//! Reallocate command implementation.

use anyhow::{bail, Result};
use morpho_rs_sim::{PlannerConfig, ReallocationPlanner, ReallocationRequest};

use crate::cli::{OutputFormat, ReallocateArgs};
use crate::commands::{load_state, print_json};
use crate::output::{format_plan_table, PlanReport};

pub fn run_reallocate(args: &ReallocateArgs, format: OutputFormat) -> Result<()> {
    let state = load_state(&args.snapshot.snapshot)?;

    let mut config = PlannerConfig::default();
    if let Some(utilization) = args.max_utilization {
        config.default_max_utilization = utilization;
    }
    config
        .max_utilization
        .extend(args.market_utilization.iter().copied());

    let request = match (args.demand.shortfall, args.demand.borrow) {
        (Some(shortfall), _) => ReallocationRequest::new(args.market, shortfall),
        (None, Some(borrow)) => ReallocationRequest::for_borrow(&state, args.market, borrow, &config)?,
        (None, None) => bail!("Either --shortfall or --borrow is required"),
    };

    let plan = ReallocationPlanner::new(config).plan(&state, &request)?;
    let report = PlanReport::new(&request, &plan);

    match format {
        OutputFormat::Table => println!("{}", format_plan_table(&report)),
        OutputFormat::Json => print_json(&report)?,
    }

    Ok(())
}
