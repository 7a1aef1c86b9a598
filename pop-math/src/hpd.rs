//! Highest posterior density intervals

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum HpdError {
    #[error("No finite samples")]
    NoSamples,

    #[error("Credible mass must lie in (0, 1), got {0}")]
    InvalidMass(f64),
}

/// Shortest interval containing `mass` of the samples.
///
/// The sorted samples are scanned for the narrowest span of
/// `floor(mass * n)` steps. Non-finite samples are ignored.
///
/// ```rust
/// use pop_math::hpd_interval;
///
/// let samples = [0.0, 1.0, 1.1, 1.2, 1.3, 5.0];
/// let (lo, hi) = hpd_interval(&samples, 0.5).unwrap();
/// assert_eq!((lo, hi), (1.0, 1.3));
/// ```
pub fn hpd_interval(samples: &[f64], mass: f64) -> Result<(f64, f64), HpdError> {
    if !(mass > 0.0 && mass < 1.0) {
        return Err(HpdError::InvalidMass(mass));
    }

    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Err(HpdError::NoSamples);
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let span = (mass * n as f64).floor() as usize;
    let n_intervals = n - span;

    let (best, _) = (0..n_intervals)
        .map(|i| (i, sorted[i + span] - sorted[i]))
        .fold((0usize, f64::INFINITY), |(bi, bw), (i, w)| {
            if w < bw {
                (i, w)
            } else {
                (bi, bw)
            }
        });

    Ok((sorted[best], sorted[best + span]))
}
