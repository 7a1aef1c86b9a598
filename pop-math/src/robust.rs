//! Robust statistics: medians, scaled median absolute deviation and percentiles

/// Factor converting a median absolute deviation into a Gaussian sigma
pub const MAD_TO_SIGMA: f64 = 1.4826;

fn sorted(data: &[f64]) -> Vec<f64> {
    let mut v = data.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Median of `data`, `None` when empty
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let v = sorted(data);
    let n = v.len();
    if n % 2 == 1 {
        Some(v[n / 2])
    } else {
        Some(0.5 * (v[n / 2 - 1] + v[n / 2]))
    }
}

/// Median absolute deviation scaled to a Gaussian sigma
pub fn mad(data: &[f64]) -> Option<f64> {
    let m = median(data)?;
    let deviations: Vec<f64> = data.iter().map(|v| (v - m).abs()).collect();
    median(&deviations).map(|d| MAD_TO_SIGMA * d)
}

/// Percentile `q` (0 to 100) with linear interpolation between closest ranks
pub fn percentile(data: &[f64], q: f64) -> Option<f64> {
    if data.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let v = sorted(data);
    let pos = q / 100.0 * (v.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(v[lower] + frac * (v[upper] - v[lower]))
}

/// Minimum of every window of length `window`
pub fn rolling_min(data: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return Vec::new();
    }
    data.windows(window)
        .map(|w| w.iter().copied().fold(f64::INFINITY, f64::min))
        .collect()
}

/// Scaled median absolute deviation of every window of length `window`
pub fn rolling_mad(data: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return Vec::new();
    }
    data.windows(window)
        .map(|w| mad(w).unwrap_or(f64::NAN))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mad_scaled() {
        // Deviations from median 3: 2, 1, 0, 1, 2 -> median 1
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(mad(&data).unwrap(), MAD_TO_SIGMA);
    }

    #[test]
    fn test_mad_ignores_outlier() {
        let data = [1.0, 2.0, 3.0, 4.0, 1000.0];
        assert_relative_eq!(mad(&data).unwrap(), MAD_TO_SIGMA);
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&data, 50.0).unwrap(), 3.0);
        assert_relative_eq!(percentile(&data, 10.0).unwrap(), 1.4);
        assert_relative_eq!(percentile(&data, 100.0).unwrap(), 5.0);
        assert_eq!(percentile(&data, 101.0), None);
    }

    #[test]
    fn test_rolling_helpers() {
        let data = [5.0, 4.0, 3.0, 6.0, 7.0];
        assert_eq!(rolling_min(&data, 3), vec![3.0, 3.0, 3.0]);
        assert_eq!(rolling_mad(&data, 3).len(), 3);
        assert!(rolling_min(&data, 6).is_empty());
    }
}
