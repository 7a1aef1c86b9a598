//! The combined per-spectrum results table
//!
//! One wide table collects, for every spectrum, its position in the galaxy,
//! data quality, measured indices and fitted population parameters. Only the
//! columns named in [`ResultColumns`] are read.

use std::path::Path;

use crate::config::ResultColumns;
use crate::table::{NamedTable, TableError};

/// Labels of the population parameters in catalog order
pub const POPULATION_LABELS: [&str; 4] = ["log Age", "[Z/H]", "[alpha/Fe]", "[Fe/H]"];

/// A parameter with the lower and upper bounds of its interval
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalColumn {
    pub value: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl IntervalColumn {
    /// Distance from the value to the lower bound
    pub fn minus(&self) -> Vec<f64> {
        self.value.iter().zip(&self.lower).map(|(v, l)| v - l).collect()
    }

    /// Distance from the value to the upper bound
    pub fn plus(&self) -> Vec<f64> {
        self.upper.iter().zip(&self.value).map(|(u, v)| u - v).collect()
    }
}

/// Columns of the combined results table needed by the halo analyses
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub names: Vec<String>,
    pub radius: Vec<f64>,
    pub position_angle: Vec<f64>,
    pub signal_to_noise: Vec<f64>,
    pub surface_brightness: Vec<f64>,
    /// log age, [Z/H], [alpha/Fe] and [Fe/H]
    pub parameters: [IntervalColumn; 4],
}

impl Catalog {
    pub fn read(path: &Path, columns: &ResultColumns) -> Result<Self, TableError> {
        let mut wanted = vec![
            columns.radius,
            columns.position_angle,
            columns.signal_to_noise,
            columns.surface_brightness,
        ];
        let params = [columns.age, columns.metal, columns.alpha, columns.iron];
        for &c in &params {
            wanted.extend([c, c + 1, c + 2]);
        }
        let table = NamedTable::read_columns(path, &wanted)?;
        log::info!("Read {} spectra from {}", table.len(), path.display());

        let parameters = std::array::from_fn(|i| IntervalColumn {
            value: table.column(4 + 3 * i),
            lower: table.column(5 + 3 * i),
            upper: table.column(6 + 3 * i),
        });
        Ok(Self {
            radius: table.column(0),
            position_angle: table.column(1),
            signal_to_noise: table.column(2),
            surface_brightness: table.column(3),
            names: table.names,
            parameters,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// log10(R / Re) of every spectrum
    pub fn log_radius(&self, effective_radius: f64) -> Vec<f64> {
        self.radius
            .iter()
            .map(|r| (r / effective_radius).log10())
            .collect()
    }
}
