//! One-dimensional linear interpolation.
//!
//! Used to evaluate tabulated curves such as the sky-residual RMS profiles
//! as a function of radius.

use thiserror::Error;

/// Errors that can occur during interpolation operations.
#[derive(Error, Debug, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
}

fn validate(xs: &[f64], ys: &[f64]) -> Result<(), InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }

    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    if xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(InterpError::UnsortedData);
    }

    Ok(())
}

/// Performs linear interpolation on 1D data using binary search.
///
/// # Arguments
///
/// * `x` - The x-coordinate at which to interpolate
/// * `xs` - Array of x-coordinates (must be sorted in ascending order)
/// * `ys` - Array of corresponding y-values (must match length of xs)
///
/// # Examples
///
/// ```rust
/// use pop_math::interp;
///
/// let xs = vec![0.0, 1.0, 2.0, 3.0];
/// let ys = vec![0.0, 1.0, 4.0, 9.0];
/// assert_eq!(interp(1.5, &xs, &ys).unwrap(), 2.5);
/// ```
///
/// # Errors
///
/// * `InterpError::OutOfBounds` - x is outside the range \\[xs\\[0\\], xs\\[n-1\\]\\]
/// * `InterpError::InsufficientData` - Less than 2 data points provided
/// * `InterpError::MismatchedLengths` - xs and ys have different lengths
/// * `InterpError::UnsortedData` - xs array is not sorted in ascending order
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    validate(xs, ys)?;

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];

    if !(min_x..=max_x).contains(&x) {
        return Err(InterpError::OutOfBounds(x, min_x, max_x));
    }

    Ok(interp_unchecked(x, xs, ys))
}

/// Linear interpolation returning `fill` for abscissae outside the tabulated range.
///
/// Input validation errors are still reported.
pub fn interp_or(x: f64, xs: &[f64], ys: &[f64], fill: f64) -> Result<f64, InterpError> {
    validate(xs, ys)?;

    if x.is_nan() || x < xs[0] || x > xs[xs.len() - 1] {
        return Ok(fill);
    }

    Ok(interp_unchecked(x, xs, ys))
}

fn interp_unchecked(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let idx = match xs.binary_search_by(|probe| probe.total_cmp(&x)) {
        Ok(exact_idx) => return ys[exact_idx],
        Err(insert_idx) => insert_idx,
    };

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);

    let t = (x - x1) / (x2 - x1);
    y1 + t * (y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_match() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(interp(2.0, &xs, &ys).unwrap(), 20.0);
    }

    #[test]
    fn test_linear_interpolation() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0, 30.0];
        assert_eq!(interp(1.5, &xs, &ys).unwrap(), 15.0);
        assert_eq!(interp(2.5, &xs, &ys).unwrap(), 25.0);
    }

    #[test]
    fn test_out_of_bounds() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0, 30.0];
        assert!(matches!(
            interp(0.5, &xs, &ys),
            Err(InterpError::OutOfBounds(_, _, _))
        ));
        assert!(matches!(
            interp(3.5, &xs, &ys),
            Err(InterpError::OutOfBounds(_, _, _))
        ));
    }

    #[test]
    fn test_fill_outside_range() {
        let xs = vec![-1.0, 0.0, 1.0];
        let ys = vec![0.3, 0.2, 0.1];
        assert_eq!(interp_or(-2.0, &xs, &ys, 0.0).unwrap(), 0.0);
        assert_eq!(interp_or(5.0, &xs, &ys, 0.0).unwrap(), 0.0);
        assert_relative_eq!(interp_or(0.5, &xs, &ys, 0.0).unwrap(), 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_mismatched_lengths() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0];
        assert_eq!(interp(1.5, &xs, &ys), Err(InterpError::MismatchedLengths));
    }

    #[test]
    fn test_insufficient_data() {
        assert_eq!(
            interp(1.0, &[1.0], &[10.0]),
            Err(InterpError::InsufficientData)
        );
    }

    #[test]
    fn test_unsorted_data() {
        let xs = vec![2.0, 1.0, 3.0];
        let ys = vec![20.0, 10.0, 30.0];
        assert_eq!(interp(1.5, &xs, &ys), Err(InterpError::UnsortedData));
    }
}
