//! Lick index sensitivity to 1% sky-subtraction errors
//!
//! Compares the nominal results table with tables measured after scaling the
//! sky by +1% and -1%, and writes the rolling rms of the differences against
//! radius for every Lick index.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stellar_pops::shared_args::SharedAnalysisArgs;
use stellar_pops::sky::{read_masked, sky_sensitivity, write_curves, DEFAULT_WINDOW};

#[derive(Parser, Debug)]
#[command(
    name = "sky_sensitivity",
    about = "Rolling rms of Lick index changes under +-1% sky scaling",
    long_about = None
)]
struct Args {
    /// Nominal results table
    #[arg(long)]
    nominal: PathBuf,

    /// Results with the sky scaled by +1%
    #[arg(long)]
    plus: PathBuf,

    /// Results with the sky scaled by -1%
    #[arg(long)]
    minus: PathBuf,

    /// Points per rolling window
    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    window: usize,

    /// Directory for the rms_1pc_lick_<i>.txt files
    #[arg(long, default_value = "tables")]
    output_dir: PathBuf,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let read = |path: &PathBuf| {
        read_masked(path, &config.columns, &config.masked_slits)
            .with_context(|| format!("reading {}", path.display()))
    };
    let nominal = read(&args.nominal)?;
    let plus = read(&args.plus)?;
    let minus = read(&args.minus)?;

    let curves = sky_sensitivity(&nominal, &plus, &minus, config.effective_radius, args.window)?;

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let written = write_curves(&args.output_dir, &curves)?;

    println!("{:<8} {:>8} {:>12} {:>12}", "Index", "Windows", "Max rms", "rms at Re");
    println!("{:-<43}", "");
    for (i, curve) in curves.iter().enumerate() {
        let max = curve.rms.iter().copied().fold(0.0, f64::max);
        let at_re = curve.rms_at(0.0)?;
        println!("{:<8} {:>8} {:>12.4} {:>12.4}", i, curve.rms.len(), max, at_re);
    }
    log::info!("Wrote {} files to {}", written.len(), args.output_dir.display());
    Ok(())
}
