//! Sample statistics over partially valid data
//!
//! Population tables carry NaN for parameters that could not be measured.
//! [`SampleStats`] scans a column once, skipping non-finite values and
//! remembering how many were dropped, then reports count, mean and standard
//! deviation of what remains.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("No finite values among {0} samples")]
    NoData(usize),
}

/// Count, mean and population standard deviation of the finite values of a sample
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    count: usize,
    rejected: usize,
    sum: f64,
    sum_sq_dev: f64,
}

impl SampleStats {
    /// Scan `data`, ignoring NaN and infinite entries
    pub fn new(data: &[f64]) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        for &value in data.iter().filter(|v| v.is_finite()) {
            sum += value;
            count += 1;
        }

        // Second pass over the finite values for a stable variance
        let mean = if count > 0 { sum / count as f64 } else { 0.0 };
        let sum_sq_dev = data
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| (v - mean).powi(2))
            .sum();

        Self {
            count,
            rejected: data.len() - count,
            sum,
            sum_sq_dev,
        }
    }

    /// Number of finite values
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of values skipped because they were NaN or infinite
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn mean(&self) -> Result<f64, StatsError> {
        if self.count == 0 {
            return Err(StatsError::NoData(self.rejected));
        }
        Ok(self.sum / self.count as f64)
    }

    /// Standard deviation with divisor N
    pub fn std_dev(&self) -> Result<f64, StatsError> {
        if self.count == 0 {
            return Err(StatsError::NoData(self.rejected));
        }
        Ok((self.sum_sq_dev / self.count as f64).sqrt())
    }
}

/// Lag-`k` autocorrelation of a chain around its mean
fn autocorrelation(chain: &[f64], mean: f64, variance: f64, k: usize) -> f64 {
    let n = chain.len();
    let cov: f64 = (0..n - k)
        .map(|i| (chain[i] - mean) * (chain[i + k] - mean))
        .sum::<f64>()
        / n as f64;
    cov / variance
}

/// Effective number of independent samples in an MCMC chain.
///
/// Uses Geyer's initial positive sequence: autocorrelations are summed in
/// adjacent pairs until a pair sum turns non-positive.
pub fn effective_sample_size(chain: &[f64]) -> f64 {
    let n = chain.len();
    if n < 4 {
        return n as f64;
    }
    let mean = chain.iter().sum::<f64>() / n as f64;
    let variance = chain.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    if variance <= 0.0 {
        return n as f64;
    }

    let mut tau = -1.0;
    let mut m = 0;
    while 2 * m + 1 < n / 2 {
        let pair = autocorrelation(chain, mean, variance, 2 * m)
            + autocorrelation(chain, mean, variance, 2 * m + 1);
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        m += 1;
    }

    if tau <= 0.0 {
        n as f64
    } else {
        n as f64 / tau
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_basic_stats() {
        let stats = SampleStats::new(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.count(), 4);
        assert_eq!(stats.rejected(), 0);
        assert_relative_eq!(stats.mean().unwrap(), 2.5);
        assert_relative_eq!(stats.std_dev().unwrap(), 1.25f64.sqrt());
    }

    #[test]
    fn test_skips_non_finite() {
        let stats = SampleStats::new(&[f64::NAN, 2.0, f64::INFINITY, 4.0]);
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.rejected(), 2);
        assert_relative_eq!(stats.mean().unwrap(), 3.0);
        assert_relative_eq!(stats.std_dev().unwrap(), 1.0);
    }

    #[test]
    fn test_empty() {
        let stats = SampleStats::new(&[f64::NAN]);
        assert_eq!(stats.mean(), Err(StatsError::NoData(1)));
    }

    #[test]
    fn test_ess_independent_vs_correlated() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let white: Vec<f64> = (0..2000).map(|_| rng.random::<f64>()).collect();

        // AR(1) with strong correlation
        let mut ar = Vec::with_capacity(2000);
        let mut x = 0.0;
        for _ in 0..2000 {
            x = 0.95 * x + rng.random::<f64>() - 0.5;
            ar.push(x);
        }

        let ess_white = effective_sample_size(&white);
        let ess_ar = effective_sample_size(&ar);
        assert!(ess_white > 1000.0, "white ESS = {ess_white}");
        assert!(ess_ar < 300.0, "AR ESS = {ess_ar}");
    }
}
