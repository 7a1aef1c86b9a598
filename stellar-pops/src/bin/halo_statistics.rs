//! Mean and scatter of the halo stellar populations
//!
//! Prints, for log age, [Z/H], [alpha/Fe] and [Fe/H], the number of halo
//! spectra, the mean and the standard deviation for the whole halo, the NE
//! quadrant and the remaining position angles.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stellar_pops::catalog::Catalog;
use stellar_pops::halo::halo_statistics;
use stellar_pops::shared_args::SharedAnalysisArgs;

#[derive(Parser, Debug)]
#[command(
    name = "halo_statistics",
    about = "Population statistics of spectra beyond one effective radius",
    long_about = None
)]
struct Args {
    /// Combined results table
    #[arg(long, default_value = "results_masked.tab")]
    table: PathBuf,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let catalog = Catalog::read(&args.table, &config.columns)
        .with_context(|| format!("reading {}", args.table.display()))?;
    let stats = halo_statistics(&catalog, config.effective_radius);
    print!("{stats}");
    Ok(())
}
