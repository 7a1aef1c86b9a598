//! Diagnostics and log-age summary of stored MCMC chains
//!
//! For every chain folder under the database directory this writes marginal
//! histograms and pairwise density grids, and prints age as log10(Gyr) with
//! asymmetric errors next to [Z/H] and [alpha/Fe].

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stellar_pops::mcmc::ChainStore;
use stellar_pops::shared_args::{progress_bar, SharedAnalysisArgs};
use stellar_pops::summary::{
    AsymmetricValue, ChainDiagnostics, PopulationResult, DIAGNOSTIC_LIMITS,
};

#[derive(Parser, Debug)]
#[command(
    name = "mcmc_summary",
    about = "Writes chain diagnostics and a log-age population summary",
    long_about = None
)]
struct Args {
    /// Directory holding the per-spectrum chain folders
    #[arg(long, default_value = ".")]
    db_dir: PathBuf,

    /// Directory for the diagnostic files
    #[arg(long, default_value = "mcmc_diagnostics")]
    output_dir: PathBuf,

    /// Summary table with log-age errors
    #[arg(long, default_value = "populations_log_age.txt")]
    summary: PathBuf,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let store = ChainStore::new(&args.db_dir);
    let spectra = store
        .spectra()
        .with_context(|| format!("listing chains in {}", args.db_dir.display()))?;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    // Linear age in Gyr for the summary, log age for the plots
    let summary_limits = [
        (10f64.powf(DIAGNOSTIC_LIMITS[0].0), 10f64.powf(DIAGNOSTIC_LIMITS[0].1)),
        DIAGNOSTIC_LIMITS[1],
        DIAGNOSTIC_LIMITS[2],
    ];

    let mut table = String::from("# Spectra\tlog Age(Gyr)\t[Z/H]\t[alpha/Fe]\n");
    let pb = progress_bar(spectra.len(), "Summarising chains");
    for (position, spectrum) in spectra.iter().enumerate() {
        let chain = store
            .load(spectrum)
            .with_context(|| format!("loading chain of {spectrum}"))?;
        let ess = chain.effective_sample_sizes();
        log::info!(
            "{spectrum}: {} samples, ESS {:.0}/{:.0}/{:.0}",
            chain.len(),
            ess[0],
            ess[1],
            ess[2]
        );

        let mut rng = ChaCha8Rng::seed_from_u64(config.mcmc.seed.wrapping_add(position as u64));
        let stem = spectrum.strip_suffix(".fits").unwrap_or(spectrum);
        match ChainDiagnostics::compute(&chain, &DIAGNOSTIC_LIMITS, config.mcmc.kde_points, &mut rng) {
            Ok(diag) => {
                diag.write(&args.output_dir, stem)?;
            }
            Err(e) => log::warn!("{spectrum}: no diagnostics, {e}"),
        }

        let result = PopulationResult::from_chain(
            spectrum,
            &chain,
            &summary_limits,
            config.mcmc.hpd_mass,
            config.mcmc.kde_points,
        );
        match result {
            Ok(r) => {
                let age = AsymmetricValue::log_age(&r.estimates[0]);
                let metal = AsymmetricValue::from_estimate(&r.estimates[1]);
                let alpha = AsymmetricValue::from_estimate(&r.estimates[2]);
                let _ = writeln!(table, "{spectrum}\t{age}\t{metal}\t{alpha}");
            }
            Err(e) => log::warn!("{spectrum}: no summary, {e}"),
        }
        pb.inc(1);
    }
    pb.finish_with_message("Chains summarised");

    std::fs::write(&args.summary, &table)
        .with_context(|| format!("writing {}", args.summary.display()))?;
    print!("{table}");
    Ok(())
}
