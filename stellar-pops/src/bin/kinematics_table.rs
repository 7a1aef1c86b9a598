//! Summary table of kinematic fits
//!
//! Collects the fits of all FORS2 spectra found in the data directory and
//! writes V, sigma, h3 and h4 with errors, reduced chi-square and S/N.
//! Errors include the scatter of Monte Carlo re-fits stored with a fit.
//! Optionally writes noisy realisations of each best fit for those re-fits.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stellar_pops::kinematics::{
    read_fits, signal_to_noise, spectrum_list, write_kinematics_table, write_mc_realisations,
    KinematicsRow,
};
use stellar_pops::shared_args::SharedAnalysisArgs;

#[derive(Parser, Debug)]
#[command(
    name = "kinematics_table",
    about = "Tabulates kinematic fits with robust S/N",
    long_about = None
)]
struct Args {
    /// Directory with the spectra
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Directory with the JSON fits; defaults to the data directory
    #[arg(long)]
    fit_dir: Option<PathBuf>,

    /// Measure S/N in the configured wavelength window instead of over all pixels
    #[arg(long)]
    window: bool,

    /// Noisy realisations of each best fit to write for Monte Carlo re-fitting
    #[arg(long, default_value_t = 0)]
    mc_realisations: usize,

    /// Directory for the Monte Carlo realisations
    #[arg(long, default_value = "mc_spectra")]
    mc_dir: PathBuf,

    /// Output table
    #[arg(long, default_value = "ppxf_results.dat")]
    output: PathBuf,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let spectra = spectrum_list(&args.data_dir);
    log::info!("{} spectra in {}", spectra.len(), args.data_dir.display());
    let fit_dir = args.fit_dir.as_ref().unwrap_or(&args.data_dir);
    let fits = read_fits(fit_dir, &spectra)?;

    let window = args.window.then_some(config.spectral.sn_window);
    let mut rows = Vec::with_capacity(fits.len());
    for fit in &fits {
        let sn = signal_to_noise(fit, window).with_context(|| format!("S/N of {}", fit.spectrum))?;
        rows.push(KinematicsRow {
            sn: sn.sn,
            ..KinematicsRow::from_fit(fit)?
        });
    }

    if args.mc_realisations > 0 {
        std::fs::create_dir_all(&args.mc_dir)
            .with_context(|| format!("creating {}", args.mc_dir.display()))?;
        for (position, fit) in fits.iter().enumerate() {
            let noise = signal_to_noise(fit, None)?.noise;
            let mut rng = ChaCha8Rng::seed_from_u64(config.mcmc.seed.wrapping_add(position as u64));
            write_mc_realisations(fit, noise, args.mc_realisations, &args.mc_dir, &mut rng)
                .with_context(|| format!("Monte Carlo spectra of {}", fit.spectrum))?;
        }
        log::info!(
            "Wrote {} realisations per fit to {}",
            args.mc_realisations,
            args.mc_dir.display()
        );
    }

    write_kinematics_table(&args.output, &rows)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("Wrote {} fits to {}", rows.len(), args.output.display());
    Ok(())
}
