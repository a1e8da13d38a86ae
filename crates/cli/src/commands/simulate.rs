//! Simulate command implementation.

use anyhow::{bail, Result};
use morpho_rs_sim::{Sequencer, SequencerConfig};

use crate::cli::{OutputFormat, SimulateArgs};
use crate::commands::{load_operations, load_state, print_json};
use crate::output::{
    format_deltas_table, format_failure, format_steps_table, simulation_report, step_summaries,
    FailureReport,
};

pub fn run_simulate(args: &SimulateArgs, format: OutputFormat) -> Result<()> {
    let state = load_state(&args.snapshot.snapshot)?;
    let operations = load_operations(&args.operations)?;

    let sequencer = Sequencer::new(SequencerConfig {
        max_callback_depth: args.max_callback_depth,
        check_solvency: !args.no_solvency_check,
    });

    let steps = match sequencer.run_steps(&state, &operations) {
        Ok(steps) => steps,
        Err(error) => {
            let report = FailureReport::new(&error);
            match format {
                OutputFormat::Table => bail!(format_failure(&report)),
                OutputFormat::Json => {
                    print_json(&report)?;
                    bail!("Simulation failed at operation {:?}", report.path);
                }
            }
        }
    };

    if args.steps {
        let summaries = step_summaries(&state, &steps, &operations);
        match format {
            OutputFormat::Table => println!("{}", format_steps_table(&summaries)),
            OutputFormat::Json => print_json(&summaries)?,
        }
    } else {
        let report = simulation_report(&state, &steps, &operations);
        match format {
            OutputFormat::Table => println!("{}", format_deltas_table(&report)),
            OutputFormat::Json => print_json(&report)?,
        }
    }

    Ok(())
}
