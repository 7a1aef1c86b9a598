//! Weighted straight-line least squares
//!
//! Radial gradients of population parameters are straight-line fits of a
//! parameter against log radius or surface brightness.

use nalgebra::Matrix2;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FitError {
    #[error("Need at least 3 points for a line fit with error estimate, got {0}")]
    TooFewPoints(usize),

    #[error("Input lengths differ: x has {x}, y has {y}")]
    MismatchedLengths { x: usize, y: usize },

    #[error("Uncertainty at index {0} is not positive and finite")]
    InvalidSigma(usize),

    #[error("All x values are identical")]
    DegenerateX,
}

/// Result of fitting `y = intercept + slope * x`
#[derive(Debug, Clone, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    /// Covariance of (intercept, slope)
    pub cov: Matrix2<f64>,
    pub chi2: f64,
    pub n: usize,
}

impl LineFit {
    /// Parameter uncertainties with a systematic floor added in quadrature
    pub fn errors_with_floor(&self, floor: f64) -> (f64, f64) {
        let f2 = floor * floor;
        (
            (self.cov[(0, 0)] + f2).sqrt(),
            (self.cov[(1, 1)] + f2).sqrt(),
        )
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit a straight line by weighted least squares.
///
/// `sigma` gives relative uncertainties: the returned covariance is scaled by
/// the reduced chi-square of the fit, so multiplying all sigmas by a constant
/// leaves it unchanged. Without `sigma` every point has unit weight.
pub fn weighted_line_fit(x: &[f64], y: &[f64], sigma: Option<&[f64]>) -> Result<LineFit, FitError> {
    if x.len() != y.len() {
        return Err(FitError::MismatchedLengths {
            x: x.len(),
            y: y.len(),
        });
    }
    if let Some(s) = sigma {
        if s.len() != x.len() {
            return Err(FitError::MismatchedLengths {
                x: x.len(),
                y: s.len(),
            });
        }
        if let Some(i) = s.iter().position(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(FitError::InvalidSigma(i));
        }
    }
    let n = x.len();
    if n < 3 {
        return Err(FitError::TooFewPoints(n));
    }

    let weight = |i: usize| sigma.map_or(1.0, |s| 1.0 / (s[i] * s[i]));

    let (mut s, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for i in 0..n {
        let w = weight(i);
        s += w;
        sx += w * x[i];
        sy += w * y[i];
        sxx += w * x[i] * x[i];
        sxy += w * x[i] * y[i];
    }

    let delta = s * sxx - sx * sx;
    if delta.abs() <= f64::EPSILON * s * sxx.abs().max(1.0) {
        return Err(FitError::DegenerateX);
    }

    let intercept = (sxx * sy - sx * sxy) / delta;
    let slope = (s * sxy - sx * sy) / delta;

    let chi2: f64 = (0..n)
        .map(|i| weight(i) * (y[i] - intercept - slope * x[i]).powi(2))
        .sum();
    let scale = chi2 / (n - 2) as f64;

    let cov = Matrix2::new(sxx, -sx, -sx, s) * (scale / delta);

    Ok(LineFit {
        intercept,
        slope,
        cov,
        chi2,
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = weighted_line_fit(&x, &y, None).unwrap();
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.chi2, 0.0, epsilon = 1e-20);
        let (e0, e1) = fit.errors_with_floor(0.01);
        assert_relative_eq!(e0, 0.01, epsilon = 1e-9);
        assert_relative_eq!(e1, 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_covariance_matches_ordinary_least_squares() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [0.1, 0.9, 2.2, 2.8, 4.1];
        let fit = weighted_line_fit(&x, &y, None).unwrap();

        let residual_var = fit.chi2 / 3.0;
        let sxx_centered = 10.0; // sum (x - 2)^2
        assert_relative_eq!(fit.cov[(1, 1)], residual_var / sxx_centered, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_sigma_scale_invariance() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [0.1, 0.9, 2.2, 2.8, 4.1];
        let s1 = [0.1, 0.2, 0.1, 0.3, 0.1];
        let s2: Vec<f64> = s1.iter().map(|v| v * 7.0).collect();
        let f1 = weighted_line_fit(&x, &y, Some(&s1)).unwrap();
        let f2 = weighted_line_fit(&x, &y, Some(&s2)).unwrap();
        assert_relative_eq!(f1.slope, f2.slope, epsilon = 1e-12);
        assert_relative_eq!(f1.cov[(1, 1)], f2.cov[(1, 1)], epsilon = 1e-10);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            weighted_line_fit(&[1.0, 2.0], &[1.0, 2.0], None),
            Err(FitError::TooFewPoints(2))
        );
        assert_eq!(
            weighted_line_fit(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], None),
            Err(FitError::DegenerateX)
        );
        assert_eq!(
            weighted_line_fit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], Some(&[1.0, 0.0, 1.0])),
            Err(FitError::InvalidSigma(1))
        );
    }
}
