//! Market command implementation.

use anyhow::Result;

use crate::cli::{MarketArgs, OutputFormat};
use crate::commands::{load_state, print_json};
use crate::output::{format_market_detail, MarketDetail};

pub fn run_market(args: &MarketArgs, format: OutputFormat) -> Result<()> {
    let state = load_state(&args.snapshot.snapshot)?;
    let detail = MarketDetail::new(&state, args.id)?;

    match format {
        OutputFormat::Table => println!("{}", format_market_detail(&detail)),
        OutputFormat::Json => print_json(&detail)?,
    }

    Ok(())
}
