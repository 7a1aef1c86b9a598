//! Whitespace-separated ASCII tables.
//!
//! Measurement tables have a spectrum name in the first column followed by
//! numeric columns. Lines starting with `#` and blank lines are skipped.
//! Missing measurements appear as `nan`, `inf` or `--`, all read as NaN.
//! Column numbers used throughout refer to the file layout, so column 0 is
//! the name and numeric column `j` of a row is file column `j + 1`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}:{line}: cannot parse '{token}' as a number")]
    Parse {
        path: PathBuf,
        line: usize,
        token: String,
    },

    #[error("{path}:{line}: expected at least {expected} columns, found {found}")]
    ShortRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Column {0} is not a numeric column")]
    BadColumn(usize),
}

/// Parse one numeric token, treating the usual missing-value markers as NaN
pub fn parse_value(token: &str) -> Option<f64> {
    match token.to_ascii_lowercase().as_str() {
        "nan" | "-nan" | "--" | "inf" | "+inf" | "-inf" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

fn data_lines(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            None
        } else {
            Some((i + 1, trimmed.split_whitespace().collect()))
        }
    })
}

fn read_text(path: &Path) -> Result<String, TableError> {
    std::fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a purely numeric table into rows; all rows must have the same width
pub fn read_matrix(path: &Path) -> Result<Vec<Vec<f64>>, TableError> {
    let text = read_text(path)?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line, tokens) in data_lines(&text) {
        let mut values = Vec::with_capacity(tokens.len());
        for token in &tokens {
            values.push(parse_value(token).ok_or_else(|| TableError::Parse {
                path: path.to_path_buf(),
                line,
                token: token.to_string(),
            })?);
        }
        if let Some(first) = rows.first() {
            if values.len() != first.len() {
                return Err(TableError::ShortRow {
                    path: path.to_path_buf(),
                    line,
                    expected: first.len(),
                    found: values.len(),
                });
            }
        }
        rows.push(values);
    }
    Ok(rows)
}

/// A table whose rows are labelled by a name in the first column
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    pub names: Vec<String>,
    /// Numeric columns of each row; rows may have different lengths
    pub rows: Vec<Vec<f64>>,
}

impl NamedTable {
    /// Read every row, parsing all columns after the first as numbers
    pub fn read(path: &Path) -> Result<Self, TableError> {
        let text = read_text(path)?;
        let mut names = Vec::new();
        let mut rows = Vec::new();
        for (line, tokens) in data_lines(&text) {
            let mut values = Vec::with_capacity(tokens.len().saturating_sub(1));
            for token in &tokens[1..] {
                let v = parse_value(token).ok_or_else(|| TableError::Parse {
                    path: path.to_path_buf(),
                    line,
                    token: token.to_string(),
                })?;
                values.push(v);
            }
            names.push(tokens[0].to_string());
            rows.push(values);
        }
        Ok(Self { names, rows })
    }

    /// Read only the given file columns (1-based numeric columns, 0 is the name).
    ///
    /// Only the selected tokens are parsed, so unrelated text columns in wide
    /// tables do not cause errors.
    pub fn read_columns(path: &Path, columns: &[usize]) -> Result<Self, TableError> {
        if let Some(&c) = columns.iter().find(|&&c| c == 0) {
            return Err(TableError::BadColumn(c));
        }
        let text = read_text(path)?;
        let needed = columns.iter().copied().max().unwrap_or(0) + 1;
        let mut names = Vec::new();
        let mut rows = Vec::new();
        for (line, tokens) in data_lines(&text) {
            if tokens.len() < needed {
                return Err(TableError::ShortRow {
                    path: path.to_path_buf(),
                    line,
                    expected: needed,
                    found: tokens.len(),
                });
            }
            let mut values = Vec::with_capacity(columns.len());
            for &c in columns {
                let v = parse_value(tokens[c]).ok_or_else(|| TableError::Parse {
                    path: path.to_path_buf(),
                    line,
                    token: tokens[c].to_string(),
                })?;
                values.push(v);
            }
            names.push(tokens[0].to_string());
            rows.push(values);
        }
        Ok(Self { names, rows })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Row index of `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of numeric column `j` (0-based among numeric columns), NaN where a row is short
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| r.get(j).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Keep the rows at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            names: indices.iter().map(|&i| self.names[i].clone()).collect(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Drop rows whose name is in `excluded`
    pub fn without(&self, excluded: &[String]) -> Self {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| !excluded.contains(&self.names[i]))
            .collect();
        self.subset(&keep)
    }
}

/// Sorted names present in every table
pub fn common_names(tables: &[&NamedTable]) -> Vec<String> {
    let Some((first, rest)) = tables.split_first() else {
        return Vec::new();
    };
    let mut names: Vec<String> = first
        .names
        .iter()
        .filter(|n| rest.iter().all(|t| t.position(n).is_some()))
        .cloned()
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Reorder `table` to follow `names`; every name must be present
pub fn align(table: &NamedTable, names: &[String]) -> NamedTable {
    let indices: Vec<usize> = names.iter().filter_map(|n| table.position(n)).collect();
    table.subset(&indices)
}

/// Write rows of numbers as whitespace-separated columns
pub fn write_columns(path: &Path, header: Option<&str>, rows: &[Vec<f64>]) -> Result<(), TableError> {
    let mut out = String::new();
    if let Some(h) = header {
        let _ = writeln!(out, "# {h}");
    }
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.18e}")).collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    std::fs::write(path, out).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LICK: &str = "\
# name  a  b  c
s2.fits 1.0 nan 3.0
s1.fits 4.0 5.0 --

s3.fits 7.0 8.0 9.0
";

    fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_read_skips_comments_and_parses_nan() {
        let dir = TempDir::new().unwrap();
        let table = NamedTable::read(&write(&dir, "lick.tsv", LICK)).unwrap();
        assert_eq!(table.names, vec!["s2.fits", "s1.fits", "s3.fits"]);
        assert!(table.rows[0][1].is_nan());
        assert!(table.rows[1][2].is_nan());
        assert_eq!(table.column(0), vec![1.0, 4.0, 7.0]);
    }

    #[test]
    fn test_read_selected_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "wide.tab", "x.fits label 2.5 3.5\ny.fits other 4.5 5.5\n");
        let table = NamedTable::read_columns(&path, &[3, 2]).unwrap();
        assert_eq!(table.rows, vec![vec![3.5, 2.5], vec![5.5, 4.5]]);
        assert!(matches!(
            NamedTable::read_columns(&path, &[4]),
            Err(TableError::ShortRow { .. })
        ));
        assert!(matches!(
            NamedTable::read(&path),
            Err(TableError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_common_names_and_align() {
        let a = NamedTable {
            names: vec!["b".into(), "a".into(), "c".into()],
            rows: vec![vec![2.0], vec![1.0], vec![3.0]],
        };
        let b = NamedTable {
            names: vec!["c".into(), "a".into()],
            rows: vec![vec![30.0], vec![10.0]],
        };
        let names = common_names(&[&a, &b]);
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(align(&a, &names).rows, vec![vec![1.0], vec![3.0]]);
        assert_eq!(align(&b, &names).rows, vec![vec![10.0], vec![30.0]]);
    }

    #[test]
    fn test_read_matrix() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "model.dat", "# age Z alpha idx\n1 0 0 2.5\n2 0 0 nan\n");
        let rows = read_matrix(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![1.0, 0.0, 0.0, 2.5]);
        assert!(rows[1][3].is_nan());

        let ragged = write(&dir, "ragged.dat", "1 2 3\n4 5\n");
        assert!(matches!(
            read_matrix(&ragged),
            Err(TableError::ShortRow { line: 2, .. })
        ));
    }

    #[test]
    fn test_without() {
        let a = NamedTable {
            names: vec!["x".into(), "y".into()],
            rows: vec![vec![1.0], vec![2.0]],
        };
        let kept = a.without(&["x".to_string()]);
        assert_eq!(kept.names, vec!["y"]);
    }

    #[test]
    fn test_write_columns_roundtrip_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        write_columns(&path, Some("r rms"), &[vec![0.5, 0.25], vec![-1.0, 2.0]]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<Vec<f64>> = text
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| l.split_whitespace().map(|t| t.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows, vec![vec![0.5, 0.25], vec![-1.0, 2.0]]);
    }
}
