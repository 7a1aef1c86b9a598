//! Radial and surface-brightness gradients of the stellar populations

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stellar_pops::catalog::Catalog;
use stellar_pops::gradients::{population_gradients, GradientSettings, LiteraturePoints};
use stellar_pops::shared_args::SharedAnalysisArgs;

#[derive(Parser, Debug)]
#[command(
    name = "ssp_gradients",
    about = "Fits inner and outer gradients of the population parameters",
    long_about = None
)]
struct Args {
    /// Combined results table
    #[arg(long, default_value = "results_masked.tab")]
    table: PathBuf,

    /// Transition radius in log10(R/Re)
    #[arg(long, default_value_t = 0.0)]
    r_transition: f64,

    /// Surface brightness at the transition radius (mag arcsec^-2)
    #[arg(long, default_value_t = 22.2)]
    mu_transition: f64,

    /// Literature profile (Loubser et al. 2012) to include in the fits
    #[arg(long)]
    literature: Option<PathBuf>,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config().context("loading configuration")?;

    let catalog = Catalog::read(&args.table, &config.columns)
        .with_context(|| format!("reading {}", args.table.display()))?;
    let settings = GradientSettings {
        r_transition: args.r_transition,
        mu_transition: args.mu_transition,
        ..GradientSettings::default()
    };

    let literature = args
        .literature
        .as_deref()
        .map(|path| LiteraturePoints::read(path, config.effective_radius))
        .transpose()?;

    let gradients = population_gradients(
        &catalog,
        config.effective_radius,
        &settings,
        literature.as_ref(),
    )?;

    println!(
        "Transition at log R/Re = {:.2} (mu = {:.1} mag arcsec^-2)",
        settings.r_transition, settings.mu_transition
    );
    println!(
        "{:<12}{:<20}{:>4}{:>18}{:>18}",
        "Parameter", "Region", "N", "Gradient", "Zero point"
    );
    println!("{:-<72}", "");
    for g in &gradients {
        print!("{g}");
    }
    Ok(())
}
