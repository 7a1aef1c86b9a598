//! Posterior sampling of SSP parameters for every observed spectrum
//!
//! Reads the corrected Lick index table and its Monte Carlo uncertainties,
//! samples age, [Z/H] and [alpha/Fe] for each spectrum against the SSP model
//! grid, stores the chains and writes the summary table `ages_Z_alpha.tsv`.
//! Spectra whose chains already exist are summarised without re-sampling.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stellar_pops::inversion::{Inversion, SpectrumOutcome};
use stellar_pops::mcmc::ChainStore;
use stellar_pops::observations::read_observations;
use stellar_pops::shared_args::{progress_bar, SharedAnalysisArgs};
use stellar_pops::ssp::ModelGrid;
use stellar_pops::summary::write_results_table;

#[derive(Parser, Debug)]
#[command(
    name = "ssp_mcmc",
    about = "Infers age, [Z/H] and [alpha/Fe] from Lick indices by MCMC",
    long_about = None
)]
struct Args {
    /// Table of corrected Lick indices, one spectrum per row
    #[arg(long, default_value = "lick_corr.tsv")]
    lick: PathBuf,

    /// Table of Lick index uncertainties
    #[arg(long, default_value = "mc_lick.txt")]
    errors: PathBuf,

    /// Directory holding the per-spectrum chain folders
    #[arg(long, default_value = ".")]
    db_dir: PathBuf,

    /// Output summary table
    #[arg(long, default_value = "ages_Z_alpha.tsv")]
    output: PathBuf,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let grid = ModelGrid::load(&config.model_table)
        .with_context(|| format!("loading SSP models {}", config.model_table.display()))?;
    let observations = read_observations(&args.lick, &args.errors)
        .with_context(|| format!("reading {} and {}", args.lick.display(), args.errors.display()))?;
    log::info!("{} spectra to analyse", observations.len());

    std::fs::create_dir_all(&args.db_dir)
        .with_context(|| format!("creating {}", args.db_dir.display()))?;
    let inversion = Inversion::new(&grid, config)?.with_store(ChainStore::new(&args.db_dir));

    let pb = progress_bar(observations.len(), "Sampling spectra");
    let outcomes = inversion.run_all(&observations, &pb);
    pb.finish_with_message("Sampling complete");

    let mut results = Vec::new();
    let mut skipped = 0;
    for outcome in outcomes {
        match outcome {
            SpectrumOutcome::Done(result) => results.push(result),
            SpectrumOutcome::Skipped(_) => skipped += 1,
            SpectrumOutcome::Failed(name, e) => log::error!("{name}: {e}"),
        }
    }

    write_results_table(&args.output, &results)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "Wrote {} spectra to {} ({} skipped without usable indices)",
        results.len(),
        args.output.display(),
        skipped
    );
    Ok(())
}
