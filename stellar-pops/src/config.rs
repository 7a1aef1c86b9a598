//! Analysis configuration.
//!
//! All tunables of the pipeline live in one JSON document. Every section is
//! optional; missing fields fall back to the values used for the NGC 3311
//! long-slit analysis.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ssp::Interpolation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McmcConfig {
    /// Total iterations including burn-in
    pub iterations: usize,
    /// Iterations discarded at the start of the chain
    pub burn: usize,
    /// Keep every `thin`-th state after burn-in
    pub thin: usize,
    /// Iterations between proposal scale updates during burn-in
    pub tune_interval: usize,
    /// Probability mass of the reported credible interval
    pub hpd_mass: f64,
    /// Number of grid points for the KDE mode search
    pub kde_points: usize,
    pub seed: u64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            iterations: 20_000,
            burn: 1_000,
            thin: 4,
            tune_interval: 1_000,
            // 1 - 0.3173105, the 1-sigma Gaussian mass
            hpd_mass: 0.6826895,
            kde_points: 1_000,
            seed: 42,
        }
    }
}

/// Which observed index columns enter the likelihood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSelection {
    /// Lowest index column used
    pub min_index: usize,
    /// Columns never used (Mg1 and Mg2 by default)
    pub excluded: Vec<usize>,
}

impl Default for IndexSelection {
    fn default() -> Self {
        Self {
            min_index: 12,
            excluded: vec![14, 15],
        }
    }
}

impl IndexSelection {
    pub fn accepts(&self, column: usize) -> bool {
        column >= self.min_index && !self.excluded.contains(&column)
    }
}

/// Column positions in the combined results table (name is column 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultColumns {
    pub radius: usize,
    pub position_angle: usize,
    pub signal_to_noise: usize,
    pub surface_brightness: usize,
    /// Age value; the lower and upper HPD bounds follow in the next two columns
    pub age: usize,
    pub metal: usize,
    pub alpha: usize,
    pub iron: usize,
    /// Lick index values; each uncertainty sits in the following column
    pub lick: Vec<usize>,
}

impl Default for ResultColumns {
    fn default() -> Self {
        Self {
            radius: 3,
            position_angle: 4,
            signal_to_noise: 14,
            surface_brightness: 82,
            age: 69,
            metal: 72,
            alpha: 75,
            iron: 84,
            lick: vec![39, 41, 47, 49, 51, 53, 55],
        }
    }
}

/// Spectral resolution and masking used when preparing pPXF inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Template resolution FWHM in Angstrom
    pub fwhm_template: f64,
    /// Observed spectra resolution FWHM in Angstrom
    pub fwhm_spectrum: f64,
    /// Velocity scale of the logarithmic rebinning in km/s
    pub velscale: f64,
    /// Residual sky emission line masked in the fit
    pub sky_line: f64,
    pub sky_line_half_width: f64,
    /// Wavelength window for signal-to-noise estimates
    pub sn_window: (f64, f64),
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fwhm_template: 2.51,
            fwhm_spectrum: 2.1,
            velscale: 30.0,
            sky_line: 5577.0,
            sky_line_half_width: 15.0,
            sn_window: (5200.0, 5500.0),
        }
    }
}

/// Top-level analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Effective radius, same units as the radius column
    pub effective_radius: f64,
    pub model_table: PathBuf,
    pub interpolation: Interpolation,
    /// Fraction of each model index span added on both sides when clipping data
    pub model_limit_factor: f64,
    pub mcmc: McmcConfig,
    pub index_selection: IndexSelection,
    pub columns: ResultColumns,
    /// Slits excluded from the sky-residual analysis
    pub masked_slits: Vec<String>,
    pub spectral: SpectralConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let masked = [
            "inn1_s22", "inn1_s25", "inn1_s27", "out1_s19", "out1_s20", "out1_s21", "out1_s22",
            "out1_s23", "out1_s24", "out1_s25", "out1_s26", "inn2_s39", "cen1_s14", "cen2_s15",
        ];
        Self {
            effective_radius: 8.4,
            model_table: PathBuf::from("tables/models_thomas_2010_metal_extrapolated.dat"),
            interpolation: Interpolation::Linear,
            model_limit_factor: 0.5,
            mcmc: McmcConfig::default(),
            index_selection: IndexSelection::default(),
            columns: ResultColumns::default(),
            masked_slits: masked
                .iter()
                .map(|s| format!("fin1_n3311{s}.fits"))
                .collect(),
            spectral: SpectralConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Check internal consistency of the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.effective_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "effective_radius must be positive, got {}",
                self.effective_radius
            )));
        }
        let m = &self.mcmc;
        if m.thin == 0 || m.tune_interval == 0 {
            return Err(ConfigError::Invalid(
                "mcmc.thin and mcmc.tune_interval must be at least 1".to_string(),
            ));
        }
        if m.burn >= m.iterations {
            return Err(ConfigError::Invalid(format!(
                "mcmc.burn ({}) must be smaller than mcmc.iterations ({})",
                m.burn, m.iterations
            )));
        }
        if !(m.hpd_mass > 0.0 && m.hpd_mass < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "mcmc.hpd_mass must lie in (0, 1), got {}",
                m.hpd_mass
            )));
        }
        if self.spectral.fwhm_spectrum > self.spectral.fwhm_template {
            return Err(ConfigError::Invalid(
                "spectral.fwhm_spectrum exceeds the template resolution".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mcmc.iterations, 20_000);
        assert_eq!(config.masked_slits.len(), 14);
        assert_eq!(config.masked_slits[0], "fin1_n3311inn1_s22.fits");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"effective_radius": 52.0, "mcmc": {{"iterations": 500, "burn": 100}}, "interpolation": "nearest"}}"#
        )
        .unwrap();

        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.effective_radius, 52.0);
        assert_eq!(config.mcmc.iterations, 500);
        assert_eq!(config.mcmc.thin, 4);
        assert_eq!(config.interpolation, Interpolation::Nearest);
        assert_eq!(config.columns.age, 69);
    }

    #[test]
    fn test_rejects_burn_beyond_iterations() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"mcmc": {{"iterations": 10, "burn": 10}}}}"#).unwrap();
        assert!(matches!(
            AnalysisConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_index_selection() {
        let selection = IndexSelection::default();
        assert!(!selection.accepts(11));
        assert!(selection.accepts(12));
        assert!(!selection.accepts(14));
        assert!(!selection.accepts(15));
        assert!(selection.accepts(16));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AnalysisConfig::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
