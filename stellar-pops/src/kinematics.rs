//! Tabulation of stellar kinematics from full-spectrum fits
//!
//! Fits produced by the external kinematic fitter are stored as one JSON
//! document per spectrum. This module reads them, computes a robust S/N,
//! folds in Monte Carlo error estimates and writes the summary table.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use pop_math::mad;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::{write_columns, TableError};

/// Slit masks of the FORS2 data set, in observing order
pub const MASKS: [&str; 6] = ["cen1", "cen2", "inn1", "inn2", "out1", "out2"];

/// Slit numbers probed on each mask stay below this
const MAX_SLIT: usize = 60;

#[derive(Debug, Error)]
pub enum KinematicsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse fit {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Fit of {0} has no pixels in the S/N window")]
    EmptyWindow(String),

    #[error("Invalid noise level {0}")]
    InvalidNoise(f64),

    #[error("Fit of {spectrum} is inconsistent: {reason}")]
    Inconsistent { spectrum: String, reason: String },
}

/// Result of one kinematic fit: V, sigma, h3, h4 with the fitted spectra
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicFit {
    pub spectrum: String,
    pub sol: [f64; 4],
    pub error: [f64; 4],
    /// Reduced chi-square
    pub chi2: f64,
    pub galaxy: Vec<f64>,
    pub bestfit: Vec<f64>,
    pub goodpixels: Vec<usize>,
    /// Wavelength of each pixel in Angstrom
    #[serde(default)]
    pub wavelength: Vec<f64>,
    /// Solutions of Monte Carlo re-fits of noisy realisations
    #[serde(default)]
    pub mc_sol: Vec<[f64; 4]>,
}

impl KinematicFit {
    pub fn read(path: &Path) -> Result<Self, KinematicsError> {
        let text = std::fs::read_to_string(path).map_err(|source| KinematicsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let fit: Self = serde_json::from_str(&text).map_err(|source| KinematicsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fit.validate()?;
        Ok(fit)
    }

    /// Check that the pixel arrays agree and good pixels index into them
    pub fn validate(&self) -> Result<(), KinematicsError> {
        let inconsistent = |reason: String| KinematicsError::Inconsistent {
            spectrum: self.spectrum.clone(),
            reason,
        };
        let n = self.galaxy.len();
        if self.bestfit.len() != n {
            return Err(inconsistent(format!(
                "{n} galaxy pixels but {} best-fit pixels",
                self.bestfit.len()
            )));
        }
        if !self.wavelength.is_empty() && self.wavelength.len() != n {
            return Err(inconsistent(format!(
                "{n} galaxy pixels but {} wavelengths",
                self.wavelength.len()
            )));
        }
        if let Some(&bad) = self.goodpixels.iter().find(|&&i| i >= n) {
            return Err(inconsistent(format!("good pixel {bad} beyond {n} pixels")));
        }
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<(), KinematicsError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| KinematicsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| KinematicsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn residuals(&self, pixels: impl Iterator<Item = usize>) -> Vec<f64> {
        pixels.map(|i| self.galaxy[i] - self.bestfit[i]).collect()
    }
}

/// Fit file of a spectrum: `.fits` replaced by `.json`
pub fn fit_path(dir: &Path, spectrum: &str) -> PathBuf {
    let stem = spectrum.strip_suffix(".fits").unwrap_or(spectrum);
    dir.join(format!("{stem}.json"))
}

/// Signal, robust noise and their ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalToNoise {
    pub signal: f64,
    pub noise: f64,
    pub sn: f64,
}

/// S/N per pixel of a fit.
///
/// The noise is the scaled MAD of the fit residuals. Without a window the
/// residuals of all pixels are used and the signal is the mean over the good
/// pixels; with a wavelength window both come from the pixels inside it.
pub fn signal_to_noise(fit: &KinematicFit, window: Option<(f64, f64)>) -> Result<SignalToNoise, KinematicsError> {
    fit.validate()?;
    let (residuals, signal_pixels): (Vec<f64>, Vec<usize>) = match window {
        None => (fit.residuals(0..fit.galaxy.len()), fit.goodpixels.clone()),
        Some((w1, w2)) => {
            let idx: Vec<usize> = fit
                .wavelength
                .iter()
                .enumerate()
                .filter(|(_, w)| (w1..=w2).contains(*w))
                .map(|(i, _)| i)
                .collect();
            (fit.residuals(idx.iter().copied()), idx)
        }
    };
    if signal_pixels.is_empty() {
        return Err(KinematicsError::EmptyWindow(fit.spectrum.clone()));
    }
    let noise = mad(&residuals).unwrap_or(f64::NAN);
    let signal = signal_pixels.iter().map(|&i| fit.galaxy[i]).sum::<f64>() / signal_pixels.len() as f64;
    Ok(SignalToNoise {
        signal,
        noise,
        sn: signal / noise,
    })
}

/// Noisy realisation of the best fit for a Monte Carlo re-fit
pub fn perturbed_spectrum<R: Rng>(bestfit: &[f64], noise: f64, rng: &mut R) -> Result<Vec<f64>, KinematicsError> {
    if !(noise.is_finite() && noise >= 0.0) {
        return Err(KinematicsError::InvalidNoise(noise));
    }
    let dist = Normal::new(0.0, noise).map_err(|_| KinematicsError::InvalidNoise(noise))?;
    Ok(bestfit.iter().map(|b| b + dist.sample(rng)).collect())
}

/// Write `count` noisy realisations of the best fit of `fit` into `dir`.
///
/// Files are named `<stem>_mc<k>.txt` and hold wavelength (pixel number when
/// the fit has no wavelengths) and flux, ready to be re-fitted.
pub fn write_mc_realisations<R: Rng>(
    fit: &KinematicFit,
    noise: f64,
    count: usize,
    dir: &Path,
    rng: &mut R,
) -> Result<Vec<PathBuf>, KinematicsError> {
    fit.validate()?;
    let stem = fit.spectrum.strip_suffix(".fits").unwrap_or(&fit.spectrum);
    let abscissa: Vec<f64> = if fit.wavelength.is_empty() {
        (0..fit.bestfit.len()).map(|i| i as f64).collect()
    } else {
        fit.wavelength.clone()
    };
    (0..count)
        .map(|k| {
            let flux = perturbed_spectrum(&fit.bestfit, noise, rng)?;
            let rows: Vec<Vec<f64>> = abscissa.iter().zip(&flux).map(|(&x, &f)| vec![x, f]).collect();
            let path = dir.join(format!("{stem}_mc{k}.txt"));
            write_columns(&path, None, &rows)?;
            Ok(path)
        })
        .collect()
}

/// Element-wise maximum of the Monte Carlo scatter and the formal errors
pub fn combine_mc_errors(simulated: &[[f64; 4]], formal: [f64; 4]) -> [f64; 4] {
    std::array::from_fn(|j| {
        let column: Vec<f64> = simulated.iter().map(|s| s[j]).collect();
        match mad(&column) {
            Some(scatter) if scatter > formal[j] => scatter,
            _ => formal[j],
        }
    })
}

/// Row of the kinematics table
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicsRow {
    pub spectrum: String,
    pub sol: [f64; 4],
    pub error: [f64; 4],
    pub chi2: f64,
    pub sn: f64,
}

impl KinematicsRow {
    /// Row of a fit; errors include the Monte Carlo scatter when re-fits are present
    pub fn from_fit(fit: &KinematicFit) -> Result<Self, KinematicsError> {
        let error = if fit.mc_sol.is_empty() {
            fit.error
        } else {
            combine_mc_errors(&fit.mc_sol, fit.error)
        };
        Ok(Self {
            spectrum: fit.spectrum.clone(),
            sol: fit.sol,
            error,
            chi2: fit.chi2,
            sn: signal_to_noise(fit, None)?.sn,
        })
    }
}

/// Write the kinematics summary table
pub fn write_kinematics_table(path: &Path, rows: &[KinematicsRow]) -> Result<(), KinematicsError> {
    let header = [
        "# FILE", "V", "dV", "S", "dS", "h3", "dh3", "h4", "dh4", "chi/DOF", "S/N (/ pixel)",
    ];
    let mut out = format!("{:<30}", header[0]);
    for h in &header[1..] {
        let _ = write!(out, "{h:<14}");
    }
    out.push('\n');
    for row in rows {
        let _ = write!(out, "{:<30}", row.spectrum);
        for j in 0..4 {
            let _ = write!(out, "{:<14}{:<14}", row.sol[j], row.error[j]);
        }
        let _ = writeln!(out, "{:<14}{}", row.chi2, row.sn);
    }
    std::fs::write(path, out).map_err(|source| KinematicsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Spectra present in `dir`, sorted by mask and slit number.
///
/// Science spectra `fin1_n3311<mask>_s<N>[a|b].fits` come first; the HCC 007
/// spectra `s_n3311<mask>_s<N>.fits` follow at the end.
pub fn spectrum_list(dir: &Path) -> Vec<String> {
    let mut spectra = Vec::new();
    let mut companions = Vec::new();
    for mask in MASKS {
        for slit in 0..MAX_SLIT {
            for suffix in ["", "a", "b"] {
                let name = format!("fin1_n3311{mask}_s{slit}{suffix}.fits");
                if dir.join(&name).exists() {
                    spectra.push(name);
                }
            }
            let name = format!("s_n3311{mask}_s{slit}.fits");
            if dir.join(&name).exists() {
                companions.push(name);
            }
        }
    }
    spectra.extend(companions);
    spectra
}

/// Load the fits of `spectra` stored in `dir`, skipping spectra without one
pub fn read_fits(dir: &Path, spectra: &[String]) -> Result<Vec<KinematicFit>, KinematicsError> {
    let mut fits = Vec::new();
    for spectrum in spectra {
        let path = fit_path(dir, spectrum);
        if !path.exists() {
            log::warn!("{spectrum}: no fit at {}", path.display());
            continue;
        }
        fits.push(KinematicFit::read(&path)?);
    }
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn fit() -> KinematicFit {
        let n = 40;
        let bestfit = vec![100.0; n];
        let galaxy: Vec<f64> = (0..n).map(|i| 100.0 + if i % 2 == 0 { 2.0 } else { -2.0 }).collect();
        KinematicFit {
            spectrum: "fin1_n3311cen1_s3.fits".into(),
            sol: [3800.0, 250.0, 0.01, 0.02],
            error: [5.0, 6.0, 0.01, 0.01],
            chi2: 1.1,
            galaxy,
            bestfit,
            goodpixels: (5..35).collect(),
            wavelength: (0..n).map(|i| 5100.0 + 10.0 * i as f64).collect(),
            mc_sol: Vec::new(),
        }
    }

    #[test]
    fn test_inconsistent_fits_rejected() {
        let mut short = fit();
        short.bestfit.truncate(32);
        assert!(matches!(
            signal_to_noise(&short, None),
            Err(KinematicsError::Inconsistent { .. })
        ));

        let mut beyond = fit();
        beyond.goodpixels = vec![3, 40];
        assert!(matches!(
            KinematicsRow::from_fit(&beyond),
            Err(KinematicsError::Inconsistent { .. })
        ));

        let mut waves = fit();
        waves.wavelength.pop();
        assert!(matches!(waves.validate(), Err(KinematicsError::Inconsistent { .. })));

        let mut no_waves = fit();
        no_waves.wavelength.clear();
        assert!(no_waves.validate().is_ok());
    }

    #[test]
    fn test_read_rejects_inconsistent_fit() {
        let dir = TempDir::new().unwrap();
        let mut f = fit();
        f.bestfit.truncate(10);
        let path = fit_path(dir.path(), &f.spectrum);
        f.write(&path).unwrap();
        assert!(matches!(
            KinematicFit::read(&path),
            Err(KinematicsError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_row_uses_monte_carlo_errors() {
        let mut f = fit();
        f.mc_sol = (0..21)
            .map(|i| {
                let d = i as f64 - 10.0;
                [3800.0 + d, 250.0, 0.01, 0.02]
            })
            .collect();
        let row = KinematicsRow::from_fit(&f).unwrap();
        assert_relative_eq!(row.error[0], 5.0 * 1.4826, epsilon = 1e-9);
        assert_eq!(&row.error[1..], &f.error[1..]);

        let plain = KinematicsRow::from_fit(&fit()).unwrap();
        assert_eq!(plain.error, fit().error);
    }

    #[test]
    fn test_mc_realisations_written() {
        let dir = TempDir::new().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let paths = write_mc_realisations(&fit(), 0.5, 3, dir.path(), &mut rng).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[2].ends_with("fin1_n3311cen1_s3_mc2.txt"));
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(text.lines().count(), 40);
        let first: Vec<f64> = text
            .lines()
            .next()
            .unwrap()
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(first[0], 5100.0);
        assert!((first[1] - 100.0).abs() < 5.0);
    }

    #[test]
    fn test_signal_to_noise() {
        let sn = signal_to_noise(&fit(), None).unwrap();
        // Residuals are +-2: median 0, MAD 2
        assert_relative_eq!(sn.noise, 2.0 * 1.4826);
        assert_relative_eq!(sn.signal, 100.0);
        assert_relative_eq!(sn.sn, 100.0 / (2.0 * 1.4826));

        let windowed = signal_to_noise(&fit(), Some((5200.0, 5500.0))).unwrap();
        assert_relative_eq!(windowed.sn, sn.sn);
        assert!(matches!(
            signal_to_noise(&fit(), Some((7000.0, 8000.0))),
            Err(KinematicsError::EmptyWindow(_))
        ));
    }

    #[test]
    fn test_combine_mc_errors() {
        let sims: Vec<[f64; 4]> = (0..21)
            .map(|i| {
                let d = i as f64 - 10.0;
                [3800.0 + d, 250.0 + 0.1 * d, 0.0, 0.0]
            })
            .collect();
        let combined = combine_mc_errors(&sims, [5.0, 6.0, 0.01, 0.0]);
        // MAD of -10..10 is 5 -> 7.413
        assert_relative_eq!(combined[0], 5.0 * 1.4826, epsilon = 1e-9);
        assert_eq!(combined[1], 6.0);
        assert_eq!(combined[2], 0.01);
    }

    #[test]
    fn test_perturbed_spectrum() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let noisy = perturbed_spectrum(&[1.0; 5000], 0.1, &mut rng).unwrap();
        let mean = noisy.iter().sum::<f64>() / noisy.len() as f64;
        assert!((mean - 1.0).abs() < 0.01);
        assert!(matches!(
            perturbed_spectrum(&[1.0], -1.0, &mut rng),
            Err(KinematicsError::InvalidNoise(_))
        ));
        assert!(perturbed_spectrum(&[1.0], f64::NAN, &mut rng).is_err());
        assert_eq!(perturbed_spectrum(&[1.0, 2.0], 0.0, &mut rng).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_fit_json_and_table() {
        let dir = TempDir::new().unwrap();
        let f = fit();
        f.write(&fit_path(dir.path(), &f.spectrum)).unwrap();
        assert!(dir.path().join("fin1_n3311cen1_s3.json").exists());

        let spectra = vec![f.spectrum.clone(), "fin1_n3311cen1_s4.fits".to_string()];
        let fits = read_fits(dir.path(), &spectra).unwrap();
        assert_eq!(fits, vec![f]);

        let rows: Vec<KinematicsRow> = fits.iter().map(|f| KinematicsRow::from_fit(f).unwrap()).collect();
        let path = dir.path().join("ppxf_results.dat");
        write_kinematics_table(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("# FILE"));
        let tokens: Vec<&str> = lines.next().unwrap().split_whitespace().collect();
        assert_eq!(tokens.len(), 11);
        assert_eq!(tokens[1], "3800");
    }

    #[test]
    fn test_spectrum_list_order() {
        let dir = TempDir::new().unwrap();
        for name in [
            "fin1_n3311inn1_s2.fits",
            "s_n3311cen1_s1.fits",
            "fin1_n3311cen1_s10.fits",
            "fin1_n3311cen1_s2b.fits",
            "fin1_n3311cen1_s2.fits",
            "other.fits",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(
            spectrum_list(dir.path()),
            vec![
                "fin1_n3311cen1_s2.fits",
                "fin1_n3311cen1_s2b.fits",
                "fin1_n3311cen1_s10.fits",
                "fin1_n3311inn1_s2.fits",
                "s_n3311cen1_s1.fits",
            ]
        );
    }
}
