//! Observed Lick index measurements and their uncertainties

use std::path::Path;

use crate::config::IndexSelection;
use crate::ssp::ModelLimits;
use crate::table::{align, common_names, NamedTable, TableError};

/// Index measurements of one spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

/// Measurements restricted to the indices entering the likelihood
#[derive(Debug, Clone, PartialEq)]
pub struct UsableIndices {
    /// Index columns, matching model columns
    pub columns: Vec<usize>,
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

impl UsableIndices {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Observation {
    /// Indices usable for inference.
    ///
    /// An index is kept when its value is finite and inside the model
    /// limits, its column passes `selection`, and its uncertainty is finite
    /// and positive.
    pub fn usable_indices(&self, limits: &ModelLimits, selection: &IndexSelection) -> UsableIndices {
        let mut usable = UsableIndices {
            columns: Vec::new(),
            values: Vec::new(),
            errors: Vec::new(),
        };
        for (column, &value) in self.values.iter().enumerate() {
            if !value.is_finite() || !selection.accepts(column) {
                continue;
            }
            if !limits.accepts(column, value) {
                log::debug!(
                    "{}: index {} = {} outside model limits, clipped",
                    self.name,
                    column,
                    value
                );
                continue;
            }
            let error = self.errors.get(column).copied().unwrap_or(f64::NAN);
            if !(error.is_finite() && error > 0.0) {
                continue;
            }
            usable.columns.push(column);
            usable.values.push(value);
            usable.errors.push(error);
        }
        usable
    }
}

/// Pair index measurements with their uncertainties.
///
/// Spectra present in both tables are returned sorted by name. Each
/// observation takes all numeric columns of `lick_table` and the same number
/// of leading numeric columns of `error_table`.
pub fn read_observations(lick_table: &Path, error_table: &Path) -> Result<Vec<Observation>, TableError> {
    let values = NamedTable::read(lick_table)?;
    let errors = NamedTable::read(error_table)?;
    Ok(pair_tables(&values, &errors))
}

/// Combine already loaded value and error tables
pub fn pair_tables(values: &NamedTable, errors: &NamedTable) -> Vec<Observation> {
    let names = common_names(&[values, errors]);
    let dropped = values.len().saturating_sub(names.len());
    if dropped > 0 {
        log::warn!("{dropped} spectra have no uncertainty entry and are skipped");
    }
    let values = align(values, &names);
    let errors = align(errors, &names);

    names
        .into_iter()
        .zip(values.rows)
        .zip(errors.rows)
        .map(|((name, v), e)| {
            let errors = (0..v.len())
                .map(|j| e.get(j).copied().unwrap_or(f64::NAN))
                .collect();
            Observation {
                name,
                values: v,
                errors,
            }
        })
        .collect()
}
