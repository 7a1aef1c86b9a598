//! Preparation of long-slit spectra for full-spectrum kinematic fitting
//!
//! Spectra arrive sampled linearly in wavelength at a resolution finer than
//! the stellar templates. They are convolved to the template resolution,
//! rebinned to constant velocity steps, and given a first noise estimate and
//! a good-pixel mask read from a per-spectrum setup file.

use std::path::{Path, PathBuf};

use pop_math::median;
use thiserror::Error;

use crate::config::SpectralConfig;
use crate::table::{parse_value, read_matrix, TableError};

/// Speed of light in km/s
pub const SPEED_OF_LIGHT: f64 = 299_792.458;

/// FWHM to Gaussian sigma
const FWHM_TO_SIGMA: f64 = 2.355;

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Spectrum needs at least 2 pixels, got {0}")]
    TooShort(usize),

    #[error("Wavelengths are not linearly sampled at pixel {0}")]
    NotLinear(usize),

    #[error("Spectrum FWHM {spectrum} is coarser than the template FWHM {template}")]
    ResolutionTooCoarse { template: f64, spectrum: f64 },

    #[error("Velocity scale {0} km/s gives no output pixel")]
    InvalidVelscale(f64),

    #[error("Setup file {path}: {reason}")]
    Setup { path: PathBuf, reason: String },
}

/// Linear wavelength solution of a spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWavelength {
    /// Wavelength of the first pixel
    pub crval1: f64,
    /// Pixel width
    pub cdelt1: f64,
    pub naxis1: usize,
}

impl LinearWavelength {
    pub fn wavelengths(&self) -> Vec<f64> {
        (0..self.naxis1)
            .map(|i| self.crval1 + self.cdelt1 * i as f64)
            .collect()
    }

    /// Central wavelengths of the first and last pixel
    pub fn range(&self) -> (f64, f64) {
        let n = self.naxis1.saturating_sub(1) as f64;
        (self.crval1, self.crval1 + self.cdelt1 * n)
    }
}

/// A linearly sampled spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSpectrum {
    pub wavelength: LinearWavelength,
    pub flux: Vec<f64>,
}

impl LinearSpectrum {
    /// Read a two-column (wavelength, flux) text spectrum
    pub fn read(path: &Path) -> Result<Self, SpectrumError> {
        let rows = read_matrix(path)?;
        let lam: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let flux: Vec<f64> = rows.iter().map(|r| r.get(1).copied().unwrap_or(f64::NAN)).collect();
        let wavelength = linear_solution(&lam)?;
        log::debug!(
            "{}: {} pixels from {:.2} in steps of {:.4}",
            path.display(),
            wavelength.naxis1,
            wavelength.crval1,
            wavelength.cdelt1
        );
        Ok(Self { wavelength, flux })
    }
}

/// Wavelength solution of linearly spaced `lam`
pub fn linear_solution(lam: &[f64]) -> Result<LinearWavelength, SpectrumError> {
    let n = lam.len();
    if n < 2 {
        return Err(SpectrumError::TooShort(n));
    }
    let cdelt1 = (lam[n - 1] - lam[0]) / (n - 1) as f64;
    let tol = 1e-3 * cdelt1.abs();
    for (i, &l) in lam.iter().enumerate() {
        if (l - (lam[0] + cdelt1 * i as f64)).abs() > tol {
            return Err(SpectrumError::NotLinear(i));
        }
    }
    Ok(LinearWavelength {
        crval1: lam[0],
        cdelt1,
        naxis1: n,
    })
}

/// Gaussian sigma in pixels that degrades `fwhm_spectrum` to `fwhm_template`
pub fn resolution_sigma(fwhm_template: f64, fwhm_spectrum: f64, delta: f64) -> Result<f64, SpectrumError> {
    if fwhm_spectrum > fwhm_template {
        return Err(SpectrumError::ResolutionTooCoarse {
            template: fwhm_template,
            spectrum: fwhm_spectrum,
        });
    }
    let fwhm_diff = (fwhm_template.powi(2) - fwhm_spectrum.powi(2)).sqrt();
    Ok(fwhm_diff / FWHM_TO_SIGMA / delta)
}

fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut j = i.rem_euclid(period);
    if j >= n {
        j = period - 1 - j;
    }
    j as usize
}

/// Gaussian smoothing with mirrored edges, kernel truncated at 4 sigma
pub fn gaussian_filter1d(data: &[f64], sigma: f64) -> Vec<f64> {
    if !(sigma > 0.0) || data.is_empty() {
        return data.to_vec();
    }
    let radius = (4.0 * sigma + 0.5) as isize;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= total);

    let n = data.len();
    (0..n as isize)
        .map(|i| {
            weights
                .iter()
                .zip(-radius..=radius)
                .map(|(w, x)| w * data[reflect(i + x, n)])
                .sum()
        })
        .collect()
}

/// Spectrum rebinned to constant steps in ln(lambda)
#[derive(Debug, Clone, PartialEq)]
pub struct LogRebinned {
    pub flux: Vec<f64>,
    /// ln(lambda) of each output pixel
    pub ln_lambda: Vec<f64>,
    pub velscale: f64,
}

/// Flux-conserving rebinning onto a logarithmic wavelength grid.
///
/// `lam_range` holds the central wavelengths of the first and last pixel.
/// Output pixels are `velscale` km/s wide; the grid starts at the lower edge
/// of the first input pixel and keeps as many whole pixels as fit.
pub fn log_rebin(lam_range: (f64, f64), spec: &[f64], velscale: f64) -> Result<LogRebinned, SpectrumError> {
    let n = spec.len();
    if n < 2 {
        return Err(SpectrumError::TooShort(n));
    }
    let d_lam = (lam_range.1 - lam_range.0) / (n - 1) as f64;
    // In units of d_lam
    let lim = (lam_range.0 / d_lam - 0.5, lam_range.1 / d_lam + 0.5);
    let border = |i: usize| lim.0 + (lim.1 - lim.0) * i as f64 / n as f64;

    let log_scale = velscale / SPEED_OF_LIGHT;
    let log_lim0 = lim.0.ln();
    let m = ((lim.1.ln() - log_lim0) / log_scale) as usize;
    if !(velscale > 0.0) || m == 0 {
        return Err(SpectrumError::InvalidVelscale(velscale));
    }
    let log_lim1 = log_lim0 + m as f64 * log_scale;
    let new_borders: Vec<f64> = (0..=m)
        .map(|i| (log_lim0 + (log_lim1 - log_lim0) * i as f64 / m as f64).exp())
        .collect();
    let k: Vec<usize> = new_borders
        .iter()
        .map(|b| (b - lim.0).clamp(0.0, (n - 1) as f64) as usize)
        .collect();

    let partial = |i: usize| (new_borders[i] - border(k[i])) * spec[k[i]];
    let flux = (0..m)
        .map(|i| {
            let whole: f64 = if k[i + 1] > k[i] {
                spec[k[i]..k[i + 1]].iter().sum()
            } else {
                0.0
            };
            (whole + partial(i + 1) - partial(i)) / (new_borders[i + 1] - new_borders[i])
        })
        .collect();
    let ln_lambda = (0..m)
        .map(|i| ((new_borders[i + 1] * new_borders[i]).sqrt() * d_lam).ln())
        .collect();

    Ok(LogRebinned {
        flux,
        ln_lambda,
        velscale,
    })
}

/// Running median of odd length `kernel`, padding with zeros at the edges
pub fn median_filter(data: &[f64], kernel: usize) -> Vec<f64> {
    let half = (kernel / 2) as isize;
    let n = data.len() as isize;
    let mut window = Vec::with_capacity(kernel);
    (0..n)
        .map(|i| {
            window.clear();
            window.extend((i - half..=i + half).map(|j| {
                if (0..n).contains(&j) {
                    data[j as usize]
                } else {
                    0.0
                }
            }));
            median(&window).unwrap_or(f64::NAN)
        })
        .collect()
}

/// First noise estimate: scatter of the spectrum around its 5-pixel running median
pub fn initial_noise(galaxy: &[f64]) -> f64 {
    let smooth = median_filter(galaxy, 5);
    let residual: Vec<f64> = galaxy.iter().zip(&smooth).map(|(g, s)| g - s).collect();
    pop_math::SampleStats::new(&residual)
        .std_dev()
        .unwrap_or(f64::NAN)
}

/// Velocity shift between template and galaxy grids starting at different wavelengths
pub fn velocity_offset(ln_lam_template0: f64, ln_lam_galaxy0: f64) -> f64 {
    (ln_lam_template0 - ln_lam_galaxy0) * SPEED_OF_LIGHT
}

/// Per-spectrum fit setup: starting guess and wavelength regions to fit
#[derive(Debug, Clone, PartialEq)]
pub struct SetupFile {
    /// Starting (V, sigma) in km/s
    pub start: Vec<f64>,
    /// Wavelength intervals, in Angstrom
    pub ranges: Vec<(f64, f64)>,
}

impl SetupFile {
    /// Line 2 holds the start guess; pairs of boundaries follow from line 6
    pub fn read(path: &Path) -> Result<Self, SpectrumError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpectrumError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let setup_err = |reason: String| SpectrumError::Setup {
            path: path.to_path_buf(),
            reason,
        };
        let mut lines = text.lines();
        let start_line = lines
            .nth(1)
            .ok_or_else(|| setup_err("missing start guess line".to_string()))?;
        let start = start_line
            .split_whitespace()
            .map(|t| parse_value(t).ok_or_else(|| setup_err(format!("bad start value {t:?}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut bounds = Vec::new();
        for token in text.lines().skip(5).flat_map(str::split_whitespace) {
            bounds.push(parse_value(token).ok_or_else(|| setup_err(format!("bad boundary {token:?}")))?);
        }
        if bounds.len() % 2 != 0 {
            return Err(setup_err(format!("odd number of boundaries ({})", bounds.len())));
        }
        let ranges = bounds.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        Ok(Self { start, ranges })
    }

    /// Setup file belonging to a spectrum, `<spectrum>.setup` next to it
    pub fn path_for(spectrum: &Path) -> PathBuf {
        let mut name = spectrum.as_os_str().to_owned();
        name.push(".setup");
        PathBuf::from(name)
    }

    /// Indices of pixels to fit.
    ///
    /// With `mask_emission` the pixels strictly inside any listed region are
    /// used. Otherwise everything between the outermost boundaries is used
    /// except the residual sky line.
    pub fn good_pixels(&self, ln_lambda: &[f64], mask_emission: bool, spectral: &SpectralConfig) -> Vec<usize> {
        let regions: Vec<(f64, f64)> = if mask_emission {
            self.ranges.clone()
        } else {
            let lo = self.ranges.iter().flat_map(|r| [r.0, r.1]).fold(f64::INFINITY, f64::min);
            let hi = self.ranges.iter().flat_map(|r| [r.0, r.1]).fold(f64::NEG_INFINITY, f64::max);
            let sky = spectral.sky_line;
            let hw = spectral.sky_line_half_width;
            vec![(lo, sky - hw), (sky + hw, hi)]
        };

        let mut good: Vec<usize> = ln_lambda
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                let w = l.exp();
                regions.iter().any(|&(w1, w2)| w1 < w2 && w > w1 && w < w2)
            })
            .map(|(i, _)| i)
            .collect();
        good.sort_unstable();
        good
    }
}

/// A spectrum ready for kinematic fitting
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSpectrum {
    pub rebinned: LogRebinned,
    pub noise: f64,
    pub good_pixels: Vec<usize>,
    pub start: Vec<f64>,
}

/// Degrade, rebin and mask one spectrum
pub fn prepare(
    spectrum: &LinearSpectrum,
    setup: &SetupFile,
    spectral: &SpectralConfig,
    mask_emission: bool,
) -> Result<PreparedSpectrum, SpectrumError> {
    let delta = spectrum.wavelength.cdelt1;
    let sigma = resolution_sigma(spectral.fwhm_template, spectral.fwhm_spectrum, delta)?;
    let smoothed = gaussian_filter1d(&spectrum.flux, sigma);
    let rebinned = log_rebin(spectrum.wavelength.range(), &smoothed, spectral.velscale)?;
    let noise = initial_noise(&rebinned.flux);
    let good_pixels = setup.good_pixels(&rebinned.ln_lambda, mask_emission, spectral);
    log::info!(
        "{} log pixels, {} to fit, initial noise {:.4e}",
        rebinned.flux.len(),
        good_pixels.len(),
        noise
    );
    Ok(PreparedSpectrum {
        rebinned,
        noise,
        good_pixels,
        start: setup.start.clone(),
    })
}
