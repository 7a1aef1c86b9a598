//! Gaussian kernel density estimation
//!
//! Posterior point estimates are taken at the maximum of a kernel density
//! estimate of the MCMC samples, and two-parameter credible regions are drawn
//! from a 2D estimate. Bandwidths follow Scott's rule.

use std::f64::consts::PI;

use nalgebra::{Matrix2, Vector2};
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

use crate::robust::percentile;

#[derive(Error, Debug, PartialEq)]
pub enum KdeError {
    #[error("Need at least 2 finite samples, got {0}")]
    TooFewSamples(usize),

    #[error("Samples have zero variance")]
    ZeroVariance,

    #[error("Sample covariance is singular")]
    SingularCovariance,

    #[error("Evaluation grid needs at least 2 points")]
    EmptyGrid,
}

/// Evenly spaced values over `[lo, hi]`, both ends included
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// One-dimensional Gaussian KDE
#[derive(Debug, Clone)]
pub struct GaussianKde {
    data: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Build an estimator from samples, ignoring non-finite values
    pub fn new(samples: &[f64]) -> Result<Self, KdeError> {
        let data: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        let n = data.len();
        if n < 2 {
            return Err(KdeError::TooFewSamples(n));
        }

        let mean = data.iter().sum::<f64>() / n as f64;
        let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        if var <= 0.0 {
            return Err(KdeError::ZeroVariance);
        }

        let scott = (n as f64).powf(-1.0 / 5.0);
        Ok(Self {
            data,
            bandwidth: var.sqrt() * scott,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Probability density at `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let norm = 1.0 / (self.data.len() as f64 * h * (2.0 * PI).sqrt());
        let sum: f64 = self
            .data
            .iter()
            .map(|xi| {
                let u = (x - xi) / h;
                (-0.5 * u * u).exp()
            })
            .sum();
        norm * sum
    }

    /// Location of the density maximum among `n` evenly spaced points in `[lo, hi]`
    pub fn mode_on_grid(&self, lo: f64, hi: f64, n: usize) -> Result<f64, KdeError> {
        if n < 2 {
            return Err(KdeError::EmptyGrid);
        }
        let (best, _) = linspace(lo, hi, n)
            .into_iter()
            .map(|x| (x, self.evaluate(x)))
            .fold((lo, f64::NEG_INFINITY), |(bx, bd), (x, d)| {
                if d > bd {
                    (x, d)
                } else {
                    (bx, bd)
                }
            });
        Ok(best)
    }
}

/// Two-dimensional Gaussian KDE with a full bandwidth matrix
#[derive(Debug, Clone)]
pub struct GaussianKde2 {
    data: Vec<Vector2<f64>>,
    covariance: Matrix2<f64>,
    inv_covariance: Matrix2<f64>,
    norm: f64,
}

impl GaussianKde2 {
    /// Build an estimator from paired samples; pairs with a non-finite member are dropped
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self, KdeError> {
        let data: Vec<Vector2<f64>> = xs
            .iter()
            .zip(ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| Vector2::new(x, y))
            .collect();
        let n = data.len();
        if n < 3 {
            return Err(KdeError::TooFewSamples(n));
        }

        let mean = data.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n as f64;
        let sample_cov = data
            .iter()
            .map(|p| {
                let d = p - mean;
                d * d.transpose()
            })
            .fold(Matrix2::zeros(), |acc, m| acc + m)
            / (n - 1) as f64;

        let factor = (n as f64).powf(-1.0 / 6.0);
        let covariance = sample_cov * factor * factor;
        let det = covariance.determinant();
        let scale = covariance[(0, 0)] * covariance[(1, 1)];
        if !det.is_finite() || det <= 1e-12 * scale {
            return Err(KdeError::SingularCovariance);
        }
        let inv_covariance = covariance
            .try_inverse()
            .ok_or(KdeError::SingularCovariance)?;
        let norm = 1.0 / (2.0 * PI * det.sqrt() * n as f64);

        Ok(Self {
            data,
            covariance,
            inv_covariance,
            norm,
        })
    }

    /// Probability density at `(x, y)`
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let p = Vector2::new(x, y);
        let sum: f64 = self
            .data
            .iter()
            .map(|xi| {
                let d = p - xi;
                let q = (d.transpose() * self.inv_covariance * d)[(0, 0)];
                (-0.5 * q).exp()
            })
            .sum();
        self.norm * sum
    }

    /// Draw `n` points from the estimated density
    pub fn resample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<(f64, f64)> {
        // The bandwidth matrix is positive definite, checked at construction.
        let l = self
            .covariance
            .cholesky()
            .map(|c| c.l())
            .unwrap_or_else(Matrix2::zeros);
        (0..n)
            .map(|_| {
                let centre = self.data[rng.random_range(0..self.data.len())];
                let z: Vector2<f64> =
                    Vector2::new(rng.sample(StandardNormal), rng.sample(StandardNormal));
                let p = centre + l * z;
                (p.x, p.y)
            })
            .collect()
    }

    /// Density evaluated on an `nx` x `ny` grid spanning `xlim` and `ylim`.
    ///
    /// Element `[i, j]` holds the density at the i-th x and j-th y value.
    pub fn density_grid(
        &self,
        xlim: (f64, f64),
        ylim: (f64, f64),
        nx: usize,
        ny: usize,
    ) -> Result<Array2<f64>, KdeError> {
        if nx < 2 || ny < 2 {
            return Err(KdeError::EmptyGrid);
        }
        let xs = linspace(xlim.0, xlim.1, nx);
        let ys = linspace(ylim.0, ylim.1, ny);
        Ok(Array2::from_shape_fn((nx, ny), |(i, j)| {
            self.evaluate(xs[i], ys[j])
        }))
    }

    /// Density thresholds enclosing credible regions.
    ///
    /// Each level is the given percentile of the density evaluated at points
    /// drawn from the estimate itself; percentile 32 bounds roughly 68% of
    /// the probability mass.
    pub fn contour_levels<R: Rng>(
        &self,
        percentiles: &[f64],
        n_resample: usize,
        rng: &mut R,
    ) -> Vec<f64> {
        let densities: Vec<f64> = self
            .resample(n_resample, rng)
            .into_iter()
            .map(|(x, y)| self.evaluate(x, y))
            .collect();
        percentiles
            .iter()
            .map(|&q| percentile(&densities, q).unwrap_or(f64::NAN))
            .collect()
    }
}
