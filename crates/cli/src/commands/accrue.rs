//! Accrue command implementation.

use anyhow::Result;

use crate::cli::{AccrueArgs, OutputFormat};
use crate::commands::{load_state, print_json};
use crate::output::{accrual_report, format_accrual_table};

pub fn run_accrue(args: &AccrueArgs, format: OutputFormat) -> Result<()> {
    let state = load_state(&args.snapshot.snapshot)?;
    let accrued = state.accrue_all(args.timestamp)?;
    let report = accrual_report(&state, &accrued, args.timestamp)?;

    match format {
        OutputFormat::Table => println!("{}", format_accrual_table(&report)),
        OutputFormat::Json => print_json(&report)?,
    }

    Ok(())
}
