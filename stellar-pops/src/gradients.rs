//! Radial and surface-brightness gradients of the population parameters
//!
//! Straight lines are fitted separately inside and outside a transition
//! radius, both against log10(R/Re) and against V-band surface brightness.
//! Published measurements of the galaxy centre can be added to the fits.

use std::fmt;
use std::path::Path;

use pop_math::{weighted_line_fit, FitError, LineFit};
use thiserror::Error;

use crate::catalog::{Catalog, IntervalColumn, POPULATION_LABELS};
use crate::table::{read_matrix, TableError};

/// Effective radius (arcsec) used by the Loubser et al. (2012) profiles
pub const LITERATURE_EFFECTIVE_RADIUS: f64 = 26.6;

/// Iron follows [Fe/H] = [Z/H] - 0.94 [alpha/Fe]
const IRON_ALPHA_COEFFICIENT: f64 = 0.94;

#[derive(Debug, Error)]
pub enum GradientError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Literature table row {row} has {found} columns, expected 11")]
    ShortLiteratureRow { row: usize, found: usize },

    #[error("{parameter} {region}: {source}")]
    Fit {
        parameter: &'static str,
        region: &'static str,
        source: FitError,
    },
}

/// Selection and fitting settings
#[derive(Debug, Clone, PartialEq)]
pub struct GradientSettings {
    /// Largest mean interval half-width accepted for each parameter
    pub error_cut: [f64; 4],
    /// log10(R/Re) separating the inner and outer fits
    pub r_transition: f64,
    /// Surface brightness (mag arcsec^-2) corresponding to the transition
    pub mu_transition: f64,
    /// Added in quadrature to the fitted parameter errors
    pub error_floor: f64,
}

impl Default for GradientSettings {
    fn default() -> Self {
        Self {
            error_cut: [0.2, 0.7, 0.22, 0.8],
            r_transition: 0.0,
            mu_transition: 22.2,
            error_floor: 0.01,
        }
    }
}

/// A line fit reduced to slope and intercept with floored uncertainties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gradient {
    pub slope: f64,
    pub slope_err: f64,
    pub intercept: f64,
    pub intercept_err: f64,
    pub n: usize,
}

impl Gradient {
    fn from_fit(fit: &LineFit, floor: f64) -> Self {
        let (intercept_err, slope_err) = fit.errors_with_floor(floor);
        Self {
            slope: fit.slope,
            slope_err,
            intercept: fit.intercept,
            intercept_err,
            n: fit.n,
        }
    }
}

/// The four fits of one parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGradients {
    pub parameter: &'static str,
    pub inner_radius: Gradient,
    pub outer_radius: Gradient,
    pub inner_brightness: Gradient,
    pub outer_brightness: Gradient,
}

/// Literature population profile added to the gradient fits.
///
/// Rows hold log10(R/Re_lit), then value, lower and upper bound of log age
/// (Gyr), [Z/H] and [alpha/Fe], and the surface brightness. These points are
/// not subject to the error cut.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteraturePoints {
    pub log_r: Vec<f64>,
    pub mu: Vec<f64>,
    /// log age (yr), [Z/H], [alpha/Fe] and [Fe/H], in catalog order
    pub parameters: [IntervalColumn; 4],
}

impl LiteraturePoints {
    /// Read a profile and rescale its radii to `effective_radius`
    pub fn read(path: &Path, effective_radius: f64) -> Result<Self, GradientError> {
        let rows = read_matrix(path)?;
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() < 11) {
            return Err(GradientError::ShortLiteratureRow {
                row,
                found: r.len(),
            });
        }
        let col = |j: usize, offset: f64| rows.iter().map(|r| r[j] + offset).collect::<Vec<_>>();
        let shift = (LITERATURE_EFFECTIVE_RADIUS / effective_radius).log10();
        let interval = |c: usize, offset: f64| IntervalColumn {
            value: col(c, offset),
            lower: col(c + 1, offset),
            upper: col(c + 2, offset),
        };
        let age = interval(1, 9.0);
        let metal = interval(4, 0.0);
        let alpha = interval(7, 0.0);
        let iron_of = |z: &[f64], a: &[f64]| {
            z.iter()
                .zip(a)
                .map(|(z, a)| z - IRON_ALPHA_COEFFICIENT * a)
                .collect::<Vec<_>>()
        };
        let iron = IntervalColumn {
            value: iron_of(&metal.value, &alpha.value),
            lower: iron_of(&metal.lower, &alpha.lower),
            upper: iron_of(&metal.upper, &alpha.upper),
        };
        log::info!("Read {} literature points from {}", rows.len(), path.display());
        Ok(Self {
            log_r: col(0, shift),
            mu: col(10, 0.0),
            parameters: [age, metal, alpha, iron],
        })
    }

    fn extend(&self, sample: &mut Sample, parameter: usize) {
        let column = &self.parameters[parameter];
        for (k, (m, p)) in column.minus().into_iter().zip(column.plus()).enumerate() {
            sample.log_r.push(self.log_r[k]);
            sample.mu.push(self.mu[k]);
            sample.y.push(column.value[k]);
            sample.sigma.push((m + p).abs());
        }
    }
}

struct Sample {
    log_r: Vec<f64>,
    mu: Vec<f64>,
    y: Vec<f64>,
    sigma: Vec<f64>,
}

impl Sample {
    fn subset(&self, keep: impl Fn(f64) -> bool) -> Self {
        let idx: Vec<usize> = (0..self.y.len()).filter(|&k| keep(self.log_r[k])).collect();
        let pick = |v: &[f64]| idx.iter().map(|&k| v[k]).collect::<Vec<_>>();
        Self {
            log_r: pick(&self.log_r),
            mu: pick(&self.mu),
            y: pick(&self.y),
            sigma: pick(&self.sigma),
        }
    }
}

fn select(catalog: &Catalog, log_r: &[f64], parameter: usize, cut: f64) -> Sample {
    let column = &catalog.parameters[parameter];
    let minus = column.minus();
    let plus = column.plus();
    let mut sample = Sample {
        log_r: Vec::new(),
        mu: Vec::new(),
        y: Vec::new(),
        sigma: Vec::new(),
    };
    for k in 0..catalog.len() {
        let (y, m, p) = (column.value[k], minus[k], plus[k]);
        if !(y.is_finite() && m.is_finite() && p.is_finite()) || 0.5 * (m + p) >= cut {
            continue;
        }
        sample.log_r.push(log_r[k]);
        sample.mu.push(catalog.surface_brightness[k]);
        sample.y.push(y);
        sample.sigma.push((m + p).abs());
    }
    sample
}

fn fit(
    parameter: &'static str,
    region: &'static str,
    x: &[f64],
    s: &Sample,
    floor: f64,
) -> Result<Gradient, GradientError> {
    weighted_line_fit(x, &s.y, Some(&s.sigma))
        .map(|f| Gradient::from_fit(&f, floor))
        .map_err(|source| GradientError::Fit {
            parameter,
            region,
            source,
        })
}

/// Fit gradients of log age, [Z/H], [alpha/Fe] and [Fe/H]
pub fn population_gradients(
    catalog: &Catalog,
    effective_radius: f64,
    settings: &GradientSettings,
    literature: Option<&LiteraturePoints>,
) -> Result<Vec<ParameterGradients>, GradientError> {
    let log_r = catalog.log_radius(effective_radius);
    let r_tran = settings.r_transition;
    let floor = settings.error_floor;

    POPULATION_LABELS
        .iter()
        .enumerate()
        .map(|(i, &parameter)| {
            let mut sample = select(catalog, &log_r, i, settings.error_cut[i]);
            log::info!("{parameter}: {} points pass the error cut", sample.y.len());
            if let Some(points) = literature {
                points.extend(&mut sample, i);
            }
            let inner = sample.subset(|r| r <= r_tran);
            let outer = sample.subset(|r| r > r_tran);
            Ok(ParameterGradients {
                parameter,
                inner_radius: fit(parameter, "inner radius", &inner.log_r, &inner, floor)?,
                outer_radius: fit(parameter, "outer radius", &outer.log_r, &outer, floor)?,
                inner_brightness: fit(parameter, "inner brightness", &inner.mu, &inner, floor)?,
                outer_brightness: fit(parameter, "outer brightness", &outer.mu, &outer, floor)?,
            })
        })
        .collect()
}

impl fmt::Display for ParameterGradients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("R <= Rt (dex/dex)", &self.inner_radius),
            ("R > Rt (dex/dex)", &self.outer_radius),
            ("R <= Rt (dex/mag)", &self.inner_brightness),
            ("R > Rt (dex/mag)", &self.outer_brightness),
        ];
        for (region, g) in rows {
            writeln!(
                f,
                "{:<12}{:<20}{:>4}{:>8.2} +- {:<6.2}{:>8.2} +- {:<6.2}",
                self.parameter, region, g.n, g.slope, g.slope_err, g.intercept, g.intercept_err
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{compact_columns, row};
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    // Inner slope -0.3 in log R, outer slope +0.1; brightness tracks log R
    fn catalog() -> Catalog {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_masked.tab");
        let mut text = String::new();
        for k in 0..12 {
            let log_r = -0.55 + 0.1 * k as f64;
            let r = 8.4 * 10f64.powf(log_r);
            let mu = 20.0 + 2.5 * log_r;
            let slope = if log_r <= 0.0 { -0.3 } else { 0.1 };
            let y = 1.0 + slope * log_r;
            text += &row(&format!("s{k}.fits"), r, 10.0, 30.0, mu, [y, y, y, y], 0.05);
        }
        // Rejected by the age and [alpha/Fe] cuts, kept for [Z/H] and [Fe/H]
        text += &row("noisy.fits", 20.0, 10.0, 30.0, 21.0, [5.0, 5.0, 5.0, 5.0], 0.5);
        std::fs::write(&path, text).unwrap();
        Catalog::read(&path, &compact_columns()).unwrap()
    }

    #[test]
    fn test_piecewise_gradients() {
        let gradients = population_gradients(&catalog(), 8.4, &GradientSettings::default(), None).unwrap();
        assert_eq!(gradients.len(), 4);

        let age = &gradients[0];
        assert_relative_eq!(age.inner_radius.slope, -0.3, epsilon = 1e-6);
        assert_relative_eq!(age.outer_radius.slope, 0.1, epsilon = 1e-6);
        assert_relative_eq!(age.inner_brightness.slope, -0.3 / 2.5, epsilon = 1e-6);
        // Exact fits leave only the error floor
        assert_relative_eq!(age.inner_radius.slope_err, 0.01, epsilon = 1e-6);
        assert_eq!(age.inner_radius.n + age.outer_radius.n, 12);

        // The noisy point passes the 0.8 cut on [Fe/H] and bends its outer fit
        let iron = &gradients[3];
        assert_eq!(iron.inner_radius.n + iron.outer_radius.n, 13);
        assert!(iron.outer_radius.slope_err > 0.01);
    }

    #[test]
    fn test_literature_points_join_the_fits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loubser12_populations.txt");
        let shift = (LITERATURE_EFFECTIVE_RADIUS / 8.4).log10();
        let mut text = String::from("# logR age - + Z - + alpha - + mu\n");
        for log_r in [0.35, 0.45] {
            let y = 1.0 + 0.1 * log_r;
            let mu = 20.0 + 2.5 * log_r;
            text += &format!(
                "{} 1.0 0.9 1.1 {y} {} {} {y} {} {} {mu}\n",
                log_r - shift,
                y - 0.05,
                y + 0.05,
                y - 0.05,
                y + 0.05
            );
        }
        std::fs::write(&path, text).unwrap();

        let points = LiteraturePoints::read(&path, 8.4).unwrap();
        assert_relative_eq!(points.log_r[0], 0.35, epsilon = 1e-12);
        assert_relative_eq!(points.parameters[0].value[0], 10.0);
        let y = 1.0 + 0.1 * 0.35;
        assert_relative_eq!(points.parameters[3].value[0], y - 0.94 * y, epsilon = 1e-12);

        let without = population_gradients(&catalog(), 8.4, &GradientSettings::default(), None).unwrap();
        let with = population_gradients(&catalog(), 8.4, &GradientSettings::default(), Some(&points)).unwrap();
        let alpha = &with[2];
        assert_eq!(alpha.outer_radius.n, without[2].outer_radius.n + 2);
        assert_eq!(alpha.inner_radius.n, without[2].inner_radius.n);
        assert_relative_eq!(alpha.outer_radius.slope, 0.1, epsilon = 1e-6);
        assert_relative_eq!(alpha.outer_brightness.slope, 0.1 / 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_short_literature_row_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lit.txt");
        std::fs::write(&path, "0.1 1 2 3\n").unwrap();
        assert!(matches!(
            LiteraturePoints::read(&path, 8.4),
            Err(GradientError::ShortLiteratureRow { row: 0, found: 4 })
        ));
    }

    #[test]
    fn test_display_rows() {
        let gradients = population_gradients(&catalog(), 8.4, &GradientSettings::default(), None).unwrap();
        let text = gradients[1].to_string();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("[Z/H]"));
    }
}
