//! Prepares a linearly sampled spectrum for kinematic fitting
//!
//! The spectrum is degraded to the template resolution, rebinned to constant
//! velocity steps and written with its initial noise and good-pixel list.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stellar_pops::shared_args::SharedAnalysisArgs;
use stellar_pops::spectrum::{prepare, velocity_offset, LinearSpectrum, SetupFile};
use stellar_pops::table::write_columns;

#[derive(Parser, Debug)]
#[command(
    name = "prepare_spectrum",
    about = "Convolves, log-rebins and masks a spectrum for kinematic fitting",
    long_about = None
)]
struct Args {
    /// Two-column (wavelength, flux) spectrum
    spectrum: PathBuf,

    /// Setup file with start guess and fit regions; defaults to <spectrum>.setup
    #[arg(long)]
    setup: Option<PathBuf>,

    /// Fit only the regions listed in the setup file
    #[arg(long)]
    mask_emission: bool,

    /// ln(lambda) of the first template pixel, to report the velocity offset
    #[arg(long)]
    template_ln_lam0: Option<f64>,

    /// Directory for the prepared files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let spectrum = LinearSpectrum::read(&args.spectrum)
        .with_context(|| format!("reading {}", args.spectrum.display()))?;
    let setup_path = args
        .setup
        .clone()
        .unwrap_or_else(|| SetupFile::path_for(&args.spectrum));
    let setup = SetupFile::read(&setup_path)?;

    let prepared = prepare(&spectrum, &setup, &config.spectral, args.mask_emission)?;

    let stem = args
        .spectrum
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("spectrum");
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let rows: Vec<Vec<f64>> = prepared
        .rebinned
        .ln_lambda
        .iter()
        .zip(&prepared.rebinned.flux)
        .map(|(&l, &f)| vec![l, f, prepared.noise])
        .collect();
    let log_path = args.output_dir.join(format!("{stem}_log.txt"));
    write_columns(
        &log_path,
        Some(&format!("ln_lambda flux noise (velscale {} km/s)", prepared.rebinned.velscale)),
        &rows,
    )?;

    let good: Vec<Vec<f64>> = prepared.good_pixels.iter().map(|&i| vec![i as f64]).collect();
    let good_path = args.output_dir.join(format!("{stem}_goodpixels.txt"));
    write_columns(&good_path, Some("good pixel index"), &good)?;

    println!("Spectrum:      {}", args.spectrum.display());
    println!("Log pixels:    {}", rows.len());
    println!("Good pixels:   {}", good.len());
    println!("Initial noise: {:.4e}", prepared.noise);
    println!("Start guess:   {:?}", prepared.start);
    if let (Some(t0), Some(&g0)) = (args.template_ln_lam0, prepared.rebinned.ln_lambda.first()) {
        println!("Velocity offset: {:.3} km/s", velocity_offset(t0, g0));
    }
    log::info!("Wrote {} and {}", log_path.display(), good_path.display());
    Ok(())
}
