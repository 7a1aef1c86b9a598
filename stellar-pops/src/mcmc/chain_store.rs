//! On-disk storage of posterior chains.
//!
//! Each spectrum gets a database folder named after the spectrum with its
//! `.fits` extension replaced by `_db`. Inside, `Chain_0/` holds one text file
//! per parameter with one sample per line, and `spectrum.txt` records the
//! spectrum name. A folder that already exists is treated as a finished run,
//! which lets interrupted batches resume.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Chain;
use crate::ssp::PARAMETER_NAMES;
use crate::table::{parse_value, TableError};

/// File in the database folder holding the spectrum name
const NAME_FILE: &str = "spectrum.txt";

#[derive(Debug, Error)]
pub enum ChainStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Chain files in {0} have different lengths")]
    RaggedChain(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ChainStoreError + '_ {
    move |source| ChainStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Folder name holding the chains of `spectrum`
pub fn db_name(spectrum: &str) -> String {
    match spectrum.strip_suffix(".fits") {
        Some(stem) => format!("{stem}_db"),
        None => format!("{spectrum}_db"),
    }
}

/// Root directory under which per-spectrum chain folders live
#[derive(Debug, Clone)]
pub struct ChainStore {
    root: PathBuf,
}

impl ChainStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database folder of `spectrum`
    pub fn folder(&self, spectrum: &str) -> PathBuf {
        self.root.join(db_name(spectrum))
    }

    fn chain_dir(&self, spectrum: &str) -> PathBuf {
        self.folder(spectrum).join("Chain_0")
    }

    /// Whether a finished chain is stored for `spectrum`
    pub fn contains(&self, spectrum: &str) -> bool {
        let dir = self.chain_dir(spectrum);
        PARAMETER_NAMES
            .iter()
            .all(|name| dir.join(format!("{name}.txt")).exists())
    }

    /// Spectra with a finished chain under the root, sorted by name
    pub fn spectra(&self) -> Result<Vec<String>, ChainStoreError> {
        let entries = std::fs::read_dir(&self.root).map_err(io_err(&self.root))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.root))?;
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix("_db")) else {
                continue;
            };
            // Folders written before the name file existed hold `.fits` spectra
            let spectrum = match std::fs::read_to_string(entry.path().join(NAME_FILE)) {
                Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => format!("{stem}.fits"),
            };
            if self.contains(&spectrum) {
                names.push(spectrum);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write `chain` for `spectrum`, replacing any previous files
    pub fn save(&self, spectrum: &str, chain: &Chain) -> Result<PathBuf, ChainStoreError> {
        let dir = self.chain_dir(spectrum);
        std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        for (i, name) in chain.names.iter().enumerate() {
            let mut text = format!("# Variable: {name}\n# Sample shape: ({},)\n", chain.len());
            for s in &chain.samples {
                let _ = writeln!(text, "{}", s[i]);
            }
            let path = dir.join(format!("{name}.txt"));
            std::fs::write(&path, text).map_err(io_err(&path))?;
        }
        let name_path = self.folder(spectrum).join(NAME_FILE);
        std::fs::write(&name_path, format!("{spectrum}\n")).map_err(io_err(&name_path))?;
        Ok(self.folder(spectrum))
    }

    /// Read the stored chain of `spectrum`
    pub fn load(&self, spectrum: &str) -> Result<Chain, ChainStoreError> {
        let dir = self.chain_dir(spectrum);
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(PARAMETER_NAMES.len());
        for name in PARAMETER_NAMES {
            let path = dir.join(format!("{name}.txt"));
            let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            let mut values = Vec::new();
            for (line_no, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let v = parse_value(line).ok_or_else(|| TableError::Parse {
                    path: path.clone(),
                    line: line_no + 1,
                    token: line.to_string(),
                })?;
                values.push(v);
            }
            columns.push(values);
        }

        let n = columns[0].len();
        if columns.iter().any(|c| c.len() != n) {
            return Err(ChainStoreError::RaggedChain(dir));
        }
        let samples = (0..n)
            .map(|k| [columns[0][k], columns[1][k], columns[2][k]])
            .collect();
        Ok(Chain {
            names: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            samples,
            acceptance: [f64::NAN; 3],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chain() -> Chain {
        Chain {
            names: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            samples: vec![[10.5, -0.25, 0.3], [11.0, -0.2, 0.1 + 0.2]],
            acceptance: [0.3, 0.4, 0.5],
        }
    }

    #[test]
    fn test_db_name() {
        assert_eq!(db_name("fin1_n3311cen1_s14.fits"), "fin1_n3311cen1_s14_db");
        assert_eq!(db_name("s1"), "s1_db");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ChainStore::new(dir.path());
        assert!(!store.contains("a.fits"));

        let folder = store.save("a.fits", &chain()).unwrap();
        assert_eq!(folder, dir.path().join("a_db"));
        assert!(store.contains("a.fits"));
        assert!(dir.path().join("a_db/Chain_0/age_dist.txt").exists());

        let loaded = store.load("a.fits").unwrap();
        assert_eq!(loaded.samples, chain().samples);
        assert!(loaded.acceptance[0].is_nan());

        store.save("0.fits", &chain()).unwrap();
        std::fs::create_dir_all(dir.path().join("empty_db")).unwrap();
        assert_eq!(store.spectra().unwrap(), vec!["0.fits", "a.fits"]);
    }

    #[test]
    fn test_spectra_keep_saved_names() {
        let dir = TempDir::new().unwrap();
        let store = ChainStore::new(dir.path());
        store.save("s1", &chain()).unwrap();
        store.save("b.fits", &chain()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("s1_db/spectrum.txt")).unwrap(),
            "s1\n"
        );

        // A folder without a name file is read as a `.fits` spectrum
        store.save("c.fits", &chain()).unwrap();
        std::fs::remove_file(dir.path().join("c_db/spectrum.txt")).unwrap();

        assert_eq!(store.spectra().unwrap(), vec!["b.fits", "c.fits", "s1"]);
        assert_eq!(store.load("s1").unwrap().samples, chain().samples);
    }

    #[test]
    fn test_ragged_chain_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ChainStore::new(dir.path());
        store.save("a.fits", &chain()).unwrap();
        let age = dir.path().join("a_db/Chain_0/age_dist.txt");
        std::fs::write(&age, "1.0\n").unwrap();
        assert!(matches!(
            store.load("a.fits"),
            Err(ChainStoreError::RaggedChain(_))
        ));
    }
}
