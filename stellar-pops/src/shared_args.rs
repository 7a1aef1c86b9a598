//! Command line arguments shared by the analysis binaries

use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{AnalysisConfig, ConfigError};
use crate::ssp::Interpolation;

/// Configuration file plus the overrides every tool accepts
#[derive(Parser, Debug, Clone)]
pub struct SharedAnalysisArgs {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base random seed, overriding the configuration
    #[arg(long)]
    pub seed: Option<u64>,

    /// SSP model table, overriding the configuration
    #[arg(long)]
    pub model_table: Option<PathBuf>,

    /// Interpolation between model grid nodes, overriding the configuration
    #[arg(long, value_enum)]
    pub interpolation: Option<Interpolation>,

    /// Effective radius, overriding the configuration
    #[arg(long)]
    pub effective_radius: Option<f64>,
}

impl SharedAnalysisArgs {
    /// Load the configuration and apply command line overrides
    pub fn load_config(&self) -> Result<AnalysisConfig, ConfigError> {
        let mut config = AnalysisConfig::load_or_default(self.config.as_deref())?;
        if let Some(seed) = self.seed {
            config.mcmc.seed = seed;
        }
        if let Some(path) = &self.model_table {
            config.model_table = path.clone();
        }
        if let Some(kind) = self.interpolation {
            config.interpolation = kind;
        }
        if let Some(re) = self.effective_radius {
            config.effective_radius = re;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Progress bar for a batch of `len` items
pub fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})") {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    pb.set_message(message);
    pb
}
