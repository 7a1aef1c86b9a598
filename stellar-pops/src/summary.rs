//! Posterior summaries of MCMC chains
//!
//! Each parameter is reported as the mode of a kernel density estimate of
//! its samples together with the highest posterior density interval.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use pop_math::kde::linspace;
use pop_math::{hpd_interval, median, GaussianKde, GaussianKde2, HpdError, KdeError};
use rand::Rng;
use thiserror::Error;

use crate::mcmc::Chain;
use crate::table::{NamedTable, TableError};

/// Plot ranges for log age (Gyr), [Z/H] and [alpha/Fe] used by chain diagnostics
pub const DIAGNOSTIC_LIMITS: [(f64, f64); 3] = [(0.0, 1.176_091_259_055_681_3), (-2.25, 0.67), (-0.3, 0.5)];

/// Percentiles of resampled KDE densities bounding the 68, 95 and 99.7% regions
pub const CONTOUR_PERCENTILES: [f64; 3] = [32.0, 5.0, 0.3];

const HISTOGRAM_BINS: usize = 50;
const PAIR_GRID: usize = 20;
const CONTOUR_RESAMPLE: usize = 1_000;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error(transparent)]
    Kde(#[from] KdeError),

    #[error(transparent)]
    Hpd(#[from] HpdError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Results table row {0} has {1} values, expected 9")]
    ShortRow(String, usize),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Point estimate with a credible interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Summary statistics of one parameter's posterior samples
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub median: f64,
    /// Maximum of the KDE over the search range
    pub map: f64,
    pub hpd: (f64, f64),
}

impl ParameterSummary {
    /// Summarise `samples`, searching the KDE mode over `lims` with `kde_points` points
    pub fn from_samples(
        samples: &[f64],
        lims: (f64, f64),
        hpd_mass: f64,
        kde_points: usize,
    ) -> Result<Self, SummaryError> {
        let kde = GaussianKde::new(samples)?;
        let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        Ok(Self {
            median: median(&finite).unwrap_or(f64::NAN),
            map: kde.mode_on_grid(lims.0, lims.1, kde_points)?,
            hpd: hpd_interval(samples, hpd_mass)?,
        })
    }

    pub fn estimate(&self) -> Estimate {
        Estimate {
            value: self.map,
            lower: self.hpd.0,
            upper: self.hpd.1,
        }
    }
}

/// Summaries of age, [Z/H] and [alpha/Fe] for one spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationResult {
    pub spectrum: String,
    pub estimates: [Estimate; 3],
}

impl PopulationResult {
    /// Summarise a chain whose parameters are ordered as age, [Z/H], [alpha/Fe]
    pub fn from_chain(
        spectrum: &str,
        chain: &Chain,
        lims: &[(f64, f64); 3],
        hpd_mass: f64,
        kde_points: usize,
    ) -> Result<Self, SummaryError> {
        let mut estimates = [Estimate {
            value: f64::NAN,
            lower: f64::NAN,
            upper: f64::NAN,
        }; 3];
        for (i, est) in estimates.iter_mut().enumerate() {
            *est = ParameterSummary::from_samples(&chain.column(i), lims[i], hpd_mass, kde_points)?
                .estimate();
        }
        Ok(Self {
            spectrum: spectrum.to_string(),
            estimates,
        })
    }
}

fn round5(v: f64) -> f64 {
    (v * 1e5).round() / 1e5
}

/// Write the population table, one spectrum per row
pub fn write_results_table(path: &Path, results: &[PopulationResult]) -> Result<(), SummaryError> {
    let mut out = String::from(
        "# Spectra\tAge(Gyr)\tAge-\tAge+\t[Z/H]\t[Z/H]-\t[Z/H]+\t[alpha/Fe]\t[alpha/Fe]-\t[alpha/Fe]+\n",
    );
    for r in results {
        let values: Vec<String> = r
            .estimates
            .iter()
            .flat_map(|e| [e.value, e.lower, e.upper])
            .map(|v| round5(v).to_string())
            .collect();
        let _ = writeln!(out, "{}\t{}", r.spectrum, values.join("\t"));
    }
    std::fs::write(path, out).map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a table written by [`write_results_table`]
pub fn read_results_table(path: &Path) -> Result<Vec<PopulationResult>, SummaryError> {
    let table = NamedTable::read(path)?;
    table
        .names
        .into_iter()
        .zip(table.rows)
        .map(|(spectrum, row)| {
            if row.len() < 9 {
                return Err(SummaryError::ShortRow(spectrum, row.len()));
            }
            let estimates = std::array::from_fn(|i| Estimate {
                value: row[3 * i],
                lower: row[3 * i + 1],
                upper: row[3 * i + 2],
            });
            Ok(PopulationResult {
                spectrum,
                estimates,
            })
        })
        .collect()
}

/// A value with asymmetric uncertainties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsymmetricValue {
    pub value: f64,
    pub minus: f64,
    pub plus: f64,
}

impl AsymmetricValue {
    pub fn from_estimate(e: &Estimate) -> Self {
        Self {
            value: e.value,
            minus: e.value - e.lower,
            plus: e.upper - e.value,
        }
    }

    /// Age in Gyr with its interval, propagated to log10 age
    pub fn log_age(e: &Estimate) -> Self {
        let lin = Self::from_estimate(e);
        let scale = std::f64::consts::LOG10_E / e.value;
        Self {
            value: e.value.log10(),
            minus: lin.minus * scale,
            plus: lin.plus * scale,
        }
    }
}

impl fmt::Display for AsymmetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} +{:.2} -{:.2}", self.value, self.plus, self.minus)
    }
}

/// Normalised histogram: each sample contributes 1/N to its bin
pub fn histogram(data: &[f64], range: (f64, f64), bins: usize) -> Vec<(f64, f64)> {
    let width = (range.1 - range.0) / bins as f64;
    let mut counts = vec![0.0; bins];
    let weight = 1.0 / data.len().max(1) as f64;
    for &v in data {
        if !(v >= range.0 && v <= range.1) {
            continue;
        }
        let bin = (((v - range.0) / width) as usize).min(bins - 1);
        counts[bin] += weight;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (range.0 + width * i as f64, c))
        .collect()
}

/// Joint density of two parameters on a regular grid
#[derive(Debug, Clone)]
pub struct PairDensity {
    pub params: (usize, usize),
    pub density: Array2<f64>,
    pub levels: Vec<f64>,
}

/// Marginal histograms and pairwise densities of one chain
#[derive(Debug, Clone)]
pub struct ChainDiagnostics {
    pub lims: [(f64, f64); 3],
    pub modes: [f64; 3],
    pub histograms: Vec<Vec<(f64, f64)>>,
    pub pairs: Vec<PairDensity>,
}

impl ChainDiagnostics {
    /// Compute diagnostics with the age axis in log10(Gyr)
    pub fn compute<R: Rng>(
        chain: &Chain,
        lims: &[(f64, f64); 3],
        kde_points: usize,
        rng: &mut R,
    ) -> Result<Self, SummaryError> {
        let columns: Vec<Vec<f64>> = (0..3)
            .map(|i| {
                let c = chain.column(i);
                if i == 0 {
                    c.into_iter().map(f64::log10).collect()
                } else {
                    c
                }
            })
            .collect();

        let mut modes = [f64::NAN; 3];
        for (i, mode) in modes.iter_mut().enumerate() {
            *mode = GaussianKde::new(&columns[i])?.mode_on_grid(lims[i].0, lims[i].1, kde_points)?;
        }

        let histograms = (0..3)
            .map(|i| histogram(&columns[i], lims[i], HISTOGRAM_BINS))
            .collect();

        let mut pairs = Vec::with_capacity(3);
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let kde = GaussianKde2::new(&columns[a], &columns[b])?;
            pairs.push(PairDensity {
                params: (a, b),
                density: kde.density_grid(lims[a], lims[b], PAIR_GRID, PAIR_GRID)?,
                levels: kde.contour_levels(&CONTOUR_PERCENTILES, CONTOUR_RESAMPLE, rng),
            });
        }

        Ok(Self {
            lims: *lims,
            modes,
            histograms,
            pairs,
        })
    }

    /// Write `<stem>_hist.txt` and one `<stem>_pair_<a><b>.txt` per pair into `dir`
    pub fn write(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>, SummaryError> {
        let mut written = Vec::new();

        let mut text = format!(
            "# modes: {} {} {}\n# bin_start log_age weight bin_start metal weight bin_start alpha weight\n",
            self.modes[0], self.modes[1], self.modes[2]
        );
        for k in 0..HISTOGRAM_BINS {
            let row: Vec<String> = self
                .histograms
                .iter()
                .flat_map(|h| [h[k].0.to_string(), h[k].1.to_string()])
                .collect();
            let _ = writeln!(text, "{}", row.join(" "));
        }
        let path = dir.join(format!("{stem}_hist.txt"));
        write_file(&path, &text)?;
        written.push(path);

        for pair in &self.pairs {
            let (a, b) = pair.params;
            let xs = linspace(self.lims[a].0, self.lims[a].1, PAIR_GRID);
            let ys = linspace(self.lims[b].0, self.lims[b].1, PAIR_GRID);
            let mut text = format!(
                "# contour levels (68/95/99.7%): {}\n# x y density\n",
                pair.levels
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
            for (i, x) in xs.iter().enumerate() {
                for (j, y) in ys.iter().enumerate() {
                    let _ = writeln!(text, "{x} {y} {}", pair.density[(i, j)]);
                }
            }
            let path = dir.join(format!("{stem}_pair_{a}{b}.txt"));
            write_file(&path, &text)?;
            written.push(path);
        }

        Ok(written)
    }
}

fn write_file(path: &Path, text: &str) -> Result<(), SummaryError> {
    std::fs::write(path, text).map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssp::PARAMETER_NAMES;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};
    use tempfile::TempDir;

    fn gaussian_chain(n: usize, seed: u64) -> Chain {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let age = Normal::new(10.0, 1.0).unwrap();
        let metal = Normal::new(-0.3, 0.1).unwrap();
        let alpha = Normal::new(0.25, 0.05).unwrap();
        Chain {
            names: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            samples: (0..n)
                .map(|_| {
                    [
                        age.sample(&mut rng),
                        metal.sample(&mut rng),
                        alpha.sample(&mut rng),
                    ]
                })
                .collect(),
            acceptance: [0.3; 3],
        }
    }

    #[test]
    fn test_parameter_summary_gaussian() {
        let chain = gaussian_chain(4000, 1);
        let s = ParameterSummary::from_samples(&chain.column(1), (-2.25, 0.67), 0.6826895, 1000).unwrap();
        assert!((s.map + 0.3).abs() < 0.03, "map = {}", s.map);
        assert!((s.median + 0.3).abs() < 0.01);
        // 68% HPD of a Gaussian spans about +-1 sigma
        assert!((s.hpd.1 - s.hpd.0 - 0.2).abs() < 0.02, "hpd = {:?}", s.hpd);
    }

    #[test]
    fn test_results_table_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ages_Z_alpha.tsv");
        let result = PopulationResult {
            spectrum: "fin1_n3311cen1_s1.fits".into(),
            estimates: [
                Estimate { value: 10.123456, lower: 8.0, upper: 12.5 },
                Estimate { value: -0.1, lower: -0.2, upper: 0.05 },
                Estimate { value: 0.3, lower: 0.21, upper: 0.4 },
            ],
        };
        write_results_table(&path, &[result.clone()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Spectra\tAge(Gyr)"));
        assert!(text.contains("10.12346"));

        let read = read_results_table(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].spectrum, result.spectrum);
        assert_relative_eq!(read[0].estimates[0].value, 10.12346);
        assert_eq!(read[0].estimates[2], result.estimates[2]);
    }

    #[test]
    fn test_log_age_errors() {
        let e = Estimate { value: 10.0, lower: 8.0, upper: 13.0 };
        let v = AsymmetricValue::log_age(&e);
        assert_relative_eq!(v.value, 1.0);
        assert_relative_eq!(v.minus, 2.0 / 10.0 * std::f64::consts::LOG10_E);
        assert_relative_eq!(v.plus, 3.0 / 10.0 * std::f64::consts::LOG10_E);
        assert_eq!(format!("{v}"), "1.00 +0.13 -0.09");
    }

    #[test]
    fn test_histogram_weights() {
        let h = histogram(&[0.05, 0.15, 0.15, 2.0], (0.0, 1.0), 10);
        assert_eq!(h.len(), 10);
        assert_relative_eq!(h[0].1, 0.25);
        assert_relative_eq!(h[1].1, 0.5);
        assert_relative_eq!(h.iter().map(|b| b.1).sum::<f64>(), 0.75);
    }

    #[test]
    fn test_diagnostics_written() {
        let chain = gaussian_chain(600, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let diag = ChainDiagnostics::compute(&chain, &DIAGNOSTIC_LIMITS, 200, &mut rng).unwrap();
        assert!((diag.modes[0] - 1.0).abs() < 0.05);
        assert_eq!(diag.pairs.len(), 3);
        assert_eq!(diag.pairs[0].density.dim(), (20, 20));

        let dir = TempDir::new().unwrap();
        let files = diag.write(dir.path(), "mcmc_cen1_s1").unwrap();
        assert_eq!(files.len(), 4);
        let hist = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(hist.lines().filter(|l| !l.starts_with('#')).count(), 50);
    }
}
