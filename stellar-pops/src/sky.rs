//! Sensitivity of Lick indices to sky-subtraction errors
//!
//! The indices are re-measured after scaling the subtracted sky by +1% and
//! -1%. The spread of the resulting differences, taken in rolling windows
//! along radius, gives the systematic uncertainty attributed to the sky.

use std::path::{Path, PathBuf};

use pop_math::robust::{rolling_mad, rolling_min};
use pop_math::{interp_or, InterpError};
use thiserror::Error;

use crate::config::ResultColumns;
use crate::table::{align, common_names, write_columns, NamedTable, TableError};

/// Number of points per rolling window
pub const DEFAULT_WINDOW: usize = 50;

#[derive(Debug, Error)]
pub enum SkyError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Index {index} has {points} usable differences, fewer than the window of {window}")]
    TooFewPoints {
        index: usize,
        points: usize,
        window: usize,
    },

    #[error("Effective radius must be positive, got {0}")]
    InvalidRadius(f64),

    #[error(transparent)]
    Interp(#[from] InterpError),

    #[error("Sensitivity curve has no points")]
    EmptyCurve,
}

/// Rolling-window rms of the sky-induced differences of one index
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityCurve {
    /// log10(R / Re) at the start of each window, then the largest radius
    pub log_radius: Vec<f64>,
    pub rms: Vec<f64>,
}

impl SensitivityCurve {
    /// RMS at `log_radius`, linearly interpolated; zero outside the curve's range.
    ///
    /// Windows sharing a start radius keep the last rms.
    pub fn rms_at(&self, log_radius: f64) -> Result<f64, SkyError> {
        let mut xs: Vec<f64> = Vec::with_capacity(self.log_radius.len());
        let mut ys: Vec<f64> = Vec::with_capacity(self.rms.len());
        for (&x, &y) in self.log_radius.iter().zip(&self.rms) {
            match xs.last() {
                Some(&last) if x <= last => {
                    if let Some(prev) = ys.last_mut() {
                        *prev = y;
                    }
                }
                _ => {
                    xs.push(x);
                    ys.push(y);
                }
            }
        }
        let Some(&first) = xs.first() else {
            return Err(SkyError::EmptyCurve);
        };
        if xs.len() == 1 {
            return Ok(if log_radius == first { ys[0] } else { 0.0 });
        }
        Ok(interp_or(log_radius, &xs, &ys, 0.0)?)
    }
}

/// Read radius and Lick columns of a results table, dropping masked slits
pub fn read_masked(path: &Path, columns: &ResultColumns, masked: &[String]) -> Result<NamedTable, SkyError> {
    let mut wanted = vec![columns.radius];
    wanted.extend(&columns.lick);
    Ok(NamedTable::read_columns(path, &wanted)?.without(masked))
}

/// Sensitivity curve of one index.
///
/// Differences of the +1% and -1% measurements against the nominal one are
/// taken on points finite in all three, pooled, and sorted by radius.
pub fn index_sensitivity(
    index: usize,
    log_radius: &[f64],
    nominal: &[f64],
    plus: &[f64],
    minus: &[f64],
    window: usize,
) -> Result<SensitivityCurve, SkyError> {
    let mut points: Vec<(f64, f64)> = Vec::with_capacity(2 * nominal.len());
    let finite: Vec<usize> = (0..nominal.len())
        .filter(|&k| nominal[k].is_finite() && plus[k].is_finite() && minus[k].is_finite())
        .collect();
    for &k in &finite {
        points.push((log_radius[k], plus[k] - nominal[k]));
    }
    for &k in &finite {
        points.push((log_radius[k], minus[k] - nominal[k]));
    }
    if window == 0 || points.len() < window {
        return Err(SkyError::TooFewPoints {
            index,
            points: points.len(),
            window,
        });
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let radius: Vec<f64> = points.iter().map(|p| p.0).collect();
    let diff: Vec<f64> = points.iter().map(|p| p.1).collect();
    let mut log_radius = rolling_min(&radius, window);
    let mut rms = rolling_mad(&diff, window);
    if let (Some(&r_last), Some(&rms_last)) = (radius.last(), rms.last()) {
        log_radius.push(r_last);
        rms.push(rms_last);
    }
    Ok(SensitivityCurve { log_radius, rms })
}

/// Curves of every Lick index from nominal, +1% and -1% tables.
///
/// Each table holds the radius as its first numeric column followed by the
/// Lick indices. Only spectra present in all three are used.
pub fn sky_sensitivity(
    nominal: &NamedTable,
    plus: &NamedTable,
    minus: &NamedTable,
    effective_radius: f64,
    window: usize,
) -> Result<Vec<SensitivityCurve>, SkyError> {
    if !(effective_radius > 0.0) {
        return Err(SkyError::InvalidRadius(effective_radius));
    }
    let names = common_names(&[nominal, plus, minus]);
    log::info!("{} spectra common to the three sky tables", names.len());
    let [nominal, plus, minus] = [nominal, plus, minus].map(|t| align(t, &names));

    let log_radius: Vec<f64> = nominal
        .column(0)
        .into_iter()
        .map(|r| (r / effective_radius).log10())
        .collect();
    let n_indices = nominal.rows.first().map_or(0, |r| r.len().saturating_sub(1));

    (0..n_indices)
        .map(|i| {
            index_sensitivity(
                i,
                &log_radius,
                &nominal.column(i + 1),
                &plus.column(i + 1),
                &minus.column(i + 1),
                window,
            )
        })
        .collect()
}

/// Write `rms_1pc_lick_<i>.txt` for each curve into `dir`
pub fn write_curves(dir: &Path, curves: &[SensitivityCurve]) -> Result<Vec<PathBuf>, SkyError> {
    curves
        .iter()
        .enumerate()
        .map(|(i, curve)| {
            let path = dir.join(format!("rms_1pc_lick_{i}.txt"));
            let rows: Vec<Vec<f64>> = curve
                .log_radius
                .iter()
                .zip(&curve.rms)
                .map(|(&r, &s)| vec![r, s])
                .collect();
            write_columns(&path, None, &rows)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pop_math::MAD_TO_SIGMA;
    use tempfile::TempDir;

    #[test]
    fn test_constant_offsets() {
        // +1% adds 0.1, -1% subtracts 0.1: pooled differences are +-0.1
        let n = 30;
        let log_r: Vec<f64> = (0..n).map(|k| -1.0 + 0.05 * k as f64).collect();
        let nominal = vec![2.0; n];
        let plus = vec![2.1; n];
        let minus = vec![1.9; n];
        let curve = index_sensitivity(0, &log_r, &nominal, &plus, &minus, 10).unwrap();

        // 60 pooled points, 51 windows plus the appended end point
        assert_eq!(curve.log_radius.len(), 52);
        assert_eq!(curve.rms.len(), 52);
        assert_relative_eq!(curve.log_radius[0], -1.0);
        assert_relative_eq!(*curve.log_radius.last().unwrap(), log_r[n - 1]);
        assert_eq!(curve.rms[51], curve.rms[50]);
        for &s in &curve.rms {
            assert!(s >= 0.0 && s <= 0.1 * 1.4826 + 1e-9);
        }
    }

    #[test]
    fn test_rms_at_interpolates_inside_range() {
        let curve = SensitivityCurve {
            log_radius: vec![-1.0, -1.0, 0.0, 1.0, 1.0],
            rms: vec![0.5, 0.1, 0.3, 0.2, 0.4],
        };
        assert_relative_eq!(curve.rms_at(-0.5).unwrap(), 0.2);
        assert_relative_eq!(curve.rms_at(0.5).unwrap(), 0.35);
        assert_relative_eq!(curve.rms_at(-1.0).unwrap(), 0.1);
        assert_relative_eq!(curve.rms_at(1.0).unwrap(), 0.4);
        assert_eq!(curve.rms_at(-3.0).unwrap(), 0.0);
        assert_eq!(curve.rms_at(2.0).unwrap(), 0.0);

        let empty = SensitivityCurve {
            log_radius: Vec::new(),
            rms: Vec::new(),
        };
        assert!(matches!(empty.rms_at(0.0), Err(SkyError::EmptyCurve)));
    }

    #[test]
    fn test_pooled_differences_sorted_before_windowing() {
        // Spectra given out of radius order; differences of +1% are
        // 0.1, 0.7, 0.2 and of -1% are -0.4, -0.2, -0.1
        let log_r = [0.0, 0.2, 0.1];
        let nominal = [0.0; 3];
        let plus = [0.1, 0.7, 0.2];
        let minus = [-0.4, -0.2, -0.1];
        let curve = index_sensitivity(0, &log_r, &nominal, &plus, &minus, 4).unwrap();

        // Sorted by radius: 0.1, -0.4 | 0.2, -0.1 | 0.7, -0.2
        // Window MADs: 0.15, 0.3, 0.2; the last one is repeated at the end
        assert_eq!(curve.log_radius, vec![0.0, 0.0, 0.1, 0.2]);
        let expected = [0.15, 0.3, 0.2, 0.2].map(|m| m * MAD_TO_SIGMA);
        assert_eq!(curve.rms.len(), expected.len());
        for (got, want) in curve.rms.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_non_finite_points_dropped() {
        let log_r = vec![0.0, 0.1, 0.2, 0.3];
        let nominal = vec![1.0, f64::NAN, 1.0, 1.0];
        let plus = vec![1.1, 1.1, f64::INFINITY, 1.1];
        let minus = vec![0.9; 4];
        let err = index_sensitivity(3, &log_r, &nominal, &plus, &minus, 5).unwrap_err();
        assert!(matches!(
            err,
            SkyError::TooFewPoints {
                index: 3,
                points: 4,
                window: 5
            }
        ));
    }

    #[test]
    fn test_tables_masked_and_written() {
        let dir = TempDir::new().unwrap();
        let columns = ResultColumns {
            radius: 1,
            lick: vec![2, 3],
            ..ResultColumns::default()
        };
        let mut nominal = String::new();
        let mut plus = String::new();
        let mut minus = String::new();
        for k in 0..8 {
            let r = 8.4 * (1.0 + k as f64);
            nominal += &format!("s{k}.fits {r} 1.0 2.0\n");
            plus += &format!("s{k}.fits {r} 1.2 2.0\n");
            minus += &format!("s{k}.fits {r} 0.8 2.0\n");
        }
        nominal += "masked.fits 10.0 1.0 2.0\n";
        let paths: Vec<PathBuf> = [("nominal", nominal), ("plus", plus), ("minus", minus)]
            .into_iter()
            .map(|(name, text)| {
                let p = dir.path().join(format!("{name}.tab"));
                std::fs::write(&p, text).unwrap();
                p
            })
            .collect();

        let masked = vec!["masked.fits".to_string(), "s7.fits".to_string()];
        let tables: Vec<NamedTable> = paths
            .iter()
            .map(|p| read_masked(p, &columns, &masked).unwrap())
            .collect();
        assert_eq!(tables[0].len(), 7);

        let curves = sky_sensitivity(&tables[0], &tables[1], &tables[2], 8.4, 4).unwrap();
        assert_eq!(curves.len(), 2);
        assert_relative_eq!(curves[0].log_radius[0], 0.0);
        // Second index never changes
        assert!(curves[1].rms.iter().all(|&s| s == 0.0));

        let written = write_curves(dir.path(), &curves).unwrap();
        assert!(written[1].ends_with("rms_1pc_lick_1.txt"));
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text.lines().count(), curves[0].rms.len());
    }
}
