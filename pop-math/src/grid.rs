//! Interpolation over three-parameter model grids.
//!
//! SSP model tables tabulate a vector of line indices at nodes of
//! (age, metallicity, alpha/Fe). Two interpolants are provided:
//!
//! - [`NearestInterpolator`]: value of the Euclidean-nearest node, works on
//!   any scattered set of nodes.
//! - [`RectilinearGrid3`]: trilinear interpolation, requires that the nodes
//!   form a complete Cartesian product of per-axis values.

use ndarray::{Array2, ArrayView1};
use thiserror::Error;

/// Errors raised while building an interpolant from a model table
#[derive(Error, Debug, PartialEq)]
pub enum GridError {
    #[error("Model table is empty")]
    Empty,

    #[error("Model table has {points} nodes but {rows} value rows")]
    MismatchedRows { points: usize, rows: usize },

    #[error("Non-finite coordinate at node {0}")]
    NonFiniteNode(usize),

    #[error("Axis {axis} needs at least 2 distinct values, found {found}")]
    DegenerateAxis { axis: usize, found: usize },

    #[error("Nodes do not form a rectilinear grid: {0}")]
    NotRectilinear(String),
}

/// Model nodes in three-dimensional parameter space, each with a vector of values
#[derive(Debug, Clone)]
pub struct ScatteredTable {
    points: Vec<[f64; 3]>,
    values: Array2<f64>,
}

impl ScatteredTable {
    /// Build a table from node coordinates and a (nodes x outputs) value array
    pub fn new(points: Vec<[f64; 3]>, values: Array2<f64>) -> Result<Self, GridError> {
        if points.is_empty() {
            return Err(GridError::Empty);
        }
        if points.len() != values.nrows() {
            return Err(GridError::MismatchedRows {
                points: points.len(),
                rows: values.nrows(),
            });
        }
        if let Some(i) = points
            .iter()
            .position(|p| p.iter().any(|c| !c.is_finite()))
        {
            return Err(GridError::NonFiniteNode(i));
        }
        Ok(Self { points, values })
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_outputs(&self) -> usize {
        self.values.ncols()
    }

    /// Minimum and maximum of each coordinate axis
    pub fn bounds(&self) -> [(f64, f64); 3] {
        let mut bounds = [(f64::INFINITY, f64::NEG_INFINITY); 3];
        for p in &self.points {
            for (axis, &c) in p.iter().enumerate() {
                bounds[axis].0 = bounds[axis].0.min(c);
                bounds[axis].1 = bounds[axis].1.max(c);
            }
        }
        bounds
    }

    /// Minimum and maximum of one output column over all nodes, ignoring NaN
    pub fn output_range(&self, column: usize) -> (f64, f64) {
        self.values
            .column(column)
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// An interpolant mapping a point in parameter space to model outputs
pub trait Interpolator3: Send + Sync {
    /// Number of output values per node
    fn n_outputs(&self) -> usize;

    /// Evaluate the selected output columns at `p`, writing them into `out`.
    ///
    /// Points outside the interpolant's domain produce NaN.
    fn eval_columns(&self, p: [f64; 3], columns: &[usize], out: &mut Vec<f64>);

    /// Evaluate every output column at `p`
    fn eval(&self, p: [f64; 3]) -> Vec<f64> {
        let columns: Vec<usize> = (0..self.n_outputs()).collect();
        let mut out = Vec::with_capacity(columns.len());
        self.eval_columns(p, &columns, &mut out);
        out
    }
}

/// Nearest-node lookup using squared Euclidean distance in raw coordinates
#[derive(Debug, Clone)]
pub struct NearestInterpolator {
    table: ScatteredTable,
}

impl NearestInterpolator {
    pub fn new(table: ScatteredTable) -> Self {
        Self { table }
    }

    fn nearest_row(&self, p: [f64; 3]) -> Option<ArrayView1<'_, f64>> {
        if p.iter().any(|c| c.is_nan()) {
            return None;
        }
        let (best, _) = self.table.points.iter().enumerate().fold(
            (0usize, f64::INFINITY),
            |(best, best_d2), (i, node)| {
                let d2: f64 = node.iter().zip(&p).map(|(a, b)| (a - b).powi(2)).sum();
                if d2 < best_d2 {
                    (i, d2)
                } else {
                    (best, best_d2)
                }
            },
        );
        Some(self.table.values.row(best))
    }
}

impl Interpolator3 for NearestInterpolator {
    fn n_outputs(&self) -> usize {
        self.table.n_outputs()
    }

    fn eval_columns(&self, p: [f64; 3], columns: &[usize], out: &mut Vec<f64>) {
        out.clear();
        match self.nearest_row(p) {
            Some(row) => out.extend(columns.iter().map(|&c| row[c])),
            None => out.extend(columns.iter().map(|_| f64::NAN)),
        }
    }
}

/// Trilinear interpolant over a complete Cartesian grid of nodes
#[derive(Debug, Clone)]
pub struct RectilinearGrid3 {
    axes: [Vec<f64>; 3],
    n_outputs: usize,
    // Row-major over (i, j, k) with outputs innermost
    values: Vec<f64>,
}

fn unique_sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values
}

impl RectilinearGrid3 {
    /// Arrange a scattered table into a rectilinear grid.
    ///
    /// # Errors
    /// * `GridError::DegenerateAxis` - An axis has a single distinct value
    /// * `GridError::NotRectilinear` - Nodes are missing or duplicated
    pub fn from_table(table: &ScatteredTable) -> Result<Self, GridError> {
        let axes: [Vec<f64>; 3] = std::array::from_fn(|axis| {
            unique_sorted(table.points.iter().map(|p| p[axis]).collect())
        });

        for (axis, values) in axes.iter().enumerate() {
            if values.len() < 2 {
                return Err(GridError::DegenerateAxis {
                    axis,
                    found: values.len(),
                });
            }
        }

        let shape = [axes[0].len(), axes[1].len(), axes[2].len()];
        let n_nodes = shape.iter().product::<usize>();
        if n_nodes != table.points.len() {
            return Err(GridError::NotRectilinear(format!(
                "expected {} nodes for axes of length {:?}, found {}",
                n_nodes,
                shape,
                table.points.len()
            )));
        }

        let n_outputs = table.n_outputs();
        let mut values = vec![f64::NAN; n_nodes * n_outputs];
        let mut filled = vec![false; n_nodes];

        for (row, p) in table.points.iter().enumerate() {
            let mut idx = [0usize; 3];
            for axis in 0..3 {
                idx[axis] = axes[axis]
                    .binary_search_by(|v| v.total_cmp(&p[axis]))
                    .map_err(|_| {
                        GridError::NotRectilinear(format!("node {row} is off the axis values"))
                    })?;
            }
            let flat = (idx[0] * shape[1] + idx[1]) * shape[2] + idx[2];
            if filled[flat] {
                return Err(GridError::NotRectilinear(format!(
                    "duplicate node at {:?}",
                    p
                )));
            }
            filled[flat] = true;
            let start = flat * n_outputs;
            for (dst, src) in values[start..start + n_outputs]
                .iter_mut()
                .zip(table.values.row(row).iter())
            {
                *dst = *src;
            }
        }

        Ok(Self {
            axes,
            n_outputs,
            values,
        })
    }

    pub fn axes(&self) -> &[Vec<f64>; 3] {
        &self.axes
    }

    fn node_value(&self, i: usize, j: usize, k: usize, column: usize) -> f64 {
        let flat = (i * self.axes[1].len() + j) * self.axes[2].len() + k;
        self.values[flat * self.n_outputs + column]
    }

    /// Lower cell index and fractional position along one axis
    fn locate(axis: &[f64], x: f64) -> Option<(usize, f64)> {
        let first = axis[0];
        let last = axis[axis.len() - 1];
        if x.is_nan() || x < first || x > last {
            return None;
        }
        let upper = axis.partition_point(|&v| v <= x);
        let i = upper.saturating_sub(1).min(axis.len() - 2);
        let t = (x - axis[i]) / (axis[i + 1] - axis[i]);
        Some((i, t))
    }
}

impl Interpolator3 for RectilinearGrid3 {
    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn eval_columns(&self, p: [f64; 3], columns: &[usize], out: &mut Vec<f64>) {
        out.clear();
        let cell = (
            Self::locate(&self.axes[0], p[0]),
            Self::locate(&self.axes[1], p[1]),
            Self::locate(&self.axes[2], p[2]),
        );
        let ((i, tx), (j, ty), (k, tz)) = match cell {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                out.extend(columns.iter().map(|_| f64::NAN));
                return;
            }
        };

        for &column in columns {
            let mut acc = 0.0;
            for (di, wx) in [(0, 1.0 - tx), (1, tx)] {
                for (dj, wy) in [(0, 1.0 - ty), (1, ty)] {
                    for (dk, wz) in [(0, 1.0 - tz), (1, tz)] {
                        let w = wx * wy * wz;
                        if w != 0.0 {
                            acc += w * self.node_value(i + di, j + dj, k + dk, column);
                        }
                    }
                }
            }
            out.push(acc);
        }
    }
}
