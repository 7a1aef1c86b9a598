//! Simple stellar population model grids
//!
//! A model table lists, for each node of (age in Gyr, [Z/H], [alpha/Fe]),
//! the predicted value of every Lick index. Columns 0..3 are the parameters,
//! the remaining columns the indices in the same order as the observed
//! measurement tables.

use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use pop_math::{GridError, Interpolator3, NearestInterpolator, RectilinearGrid3, ScatteredTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::{read_matrix, TableError};

/// Names of the fitted parameters, in model-table order
pub const PARAMETER_NAMES: [&str; 3] = ["age_dist", "metal_dist", "alpha_dist"];

#[derive(Debug, Error)]
pub enum SspError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Model table needs 3 parameter columns and at least one index, found {0} columns")]
    TooFewColumns(usize),

    #[error("Index column {column} requested but the model has {available}")]
    UnknownIndex { column: usize, available: usize },
}

/// How model indices are evaluated between grid nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Value of the closest node
    Nearest,
    /// Trilinear interpolation on the rectilinear grid
    Linear,
}

/// Admissible ranges derived from a model grid
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLimits {
    /// Per-index (low, high) bounds, widened beyond the model range
    pub index: Vec<(f64, f64)>,
    /// (min, max) of age, [Z/H] and [alpha/Fe] spanned by the grid
    pub params: [(f64, f64); 3],
}

impl ModelLimits {
    /// Whether `value` of index `column` lies in `(low, high]`
    pub fn accepts(&self, column: usize, value: f64) -> bool {
        match self.index.get(column) {
            Some(&(lo, hi)) => value > lo && value <= hi,
            None => false,
        }
    }
}

/// A loaded SSP model table
#[derive(Debug, Clone)]
pub struct ModelGrid {
    table: ScatteredTable,
}

impl ModelGrid {
    /// Read a model table from disk
    pub fn load(path: &Path) -> Result<Self, SspError> {
        let rows = read_matrix(path)?;
        let grid = Self::from_rows(rows)?;
        log::info!(
            "Loaded SSP model {} with {} nodes and {} indices",
            path.display(),
            grid.table.points().len(),
            grid.n_indices()
        );
        Ok(grid)
    }

    /// Build a grid from rows of `[age, metal, alpha, index...]`
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, SspError> {
        let width = rows.first().map_or(0, Vec::len);
        if width < 4 {
            return Err(SspError::TooFewColumns(width));
        }
        if let Some(short) = rows.iter().find(|r| r.len() != width) {
            return Err(SspError::TooFewColumns(short.len()));
        }
        let n_indices = width - 3;
        let points: Vec<[f64; 3]> = rows.iter().map(|r| [r[0], r[1], r[2]]).collect();
        let values: Vec<f64> = rows.iter().flat_map(|r| r[3..].iter().copied()).collect();
        let values = Array2::from_shape_vec((rows.len(), n_indices), values)
            .map_err(|_| SspError::TooFewColumns(width))?;
        Ok(Self {
            table: ScatteredTable::new(points, values)?,
        })
    }

    pub fn n_indices(&self) -> usize {
        self.table.n_outputs()
    }

    pub fn table(&self) -> &ScatteredTable {
        &self.table
    }

    /// Parameter ranges of the grid and index ranges widened by `factor` times their span
    pub fn limits(&self, factor: f64) -> ModelLimits {
        let index = (0..self.n_indices())
            .map(|j| {
                let (lo, hi) = self.table.output_range(j);
                let excess = factor * (hi - lo).abs();
                (lo - excess, hi + excess)
            })
            .collect();
        ModelLimits {
            index,
            params: self.table.bounds(),
        }
    }

    /// Build the interpolant used by the forward model
    pub fn interpolator(&self, kind: Interpolation) -> Result<Arc<dyn Interpolator3>, SspError> {
        Ok(match kind {
            Interpolation::Nearest => Arc::new(NearestInterpolator::new(self.table.clone())),
            Interpolation::Linear => Arc::new(RectilinearGrid3::from_table(&self.table)?),
        })
    }
}

/// Forward model predicting a subset of indices from (age, [Z/H], [alpha/Fe])
#[derive(Clone)]
pub struct SspModel {
    interpolator: Arc<dyn Interpolator3>,
    columns: Vec<usize>,
}

impl std::fmt::Debug for SspModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SspModel")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl SspModel {
    pub fn new(interpolator: Arc<dyn Interpolator3>, columns: Vec<usize>) -> Result<Self, SspError> {
        let available = interpolator.n_outputs();
        if let Some(&column) = columns.iter().find(|&&c| c >= available) {
            return Err(SspError::UnknownIndex { column, available });
        }
        Ok(Self {
            interpolator,
            columns,
        })
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Predicted indices at `params`, written into `out`; NaN outside the grid
    pub fn predict_into(&self, params: [f64; 3], out: &mut Vec<f64>) {
        self.interpolator.eval_columns(params, &self.columns, out);
    }

    pub fn predict(&self, params: [f64; 3]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.columns.len());
        self.predict_into(params, &mut out);
        out
    }
}
