//! Per-column continuum checkpoints.
//!
//! Continuum fitting is slow, so every cube column is written to its own file
//! as soon as it is done. A crashed run loses at most one column, and a fit can
//! be split into several runs over column ranges.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The fitted spectra of one cube column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFit {
    /// Column index (FITS axis 1, 0-based).
    pub column: usize,
    pub method: String,
    /// One fitted spectrum per row, each of the cube's spectral length.
    ///
    /// NaN does not exist in JSON, so missing values are stored as `null`.
    pub spectra: Vec<Vec<Option<f64>>>,
}

impl ColumnFit {
    pub fn new(column: usize, method: &str, spectra: Vec<Vec<f64>>) -> Self {
        let spectra = spectra
            .into_iter()
            .map(|s| s.into_iter().map(|v| v.is_finite().then_some(v)).collect())
            .collect();
        Self {
            column,
            method: method.to_string(),
            spectra,
        }
    }

    /// Spectra with `null` mapped back to NaN.
    pub fn spectra_f64(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        self.spectra
            .iter()
            .map(|s| s.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// `<suffix>_<target>_<method>_row_`: the stem recorded in the registry.
pub fn checkpoint_stem(suffix: &str, target: &str, method: &str) -> String {
    format!("{suffix}_{target}_{method}_row_")
}

/// `<dir>/<stem><column:04>.json`.
pub fn checkpoint_path(dir: &Path, stem: &str, column: usize) -> PathBuf {
    dir.join(format!("{stem}{column:04}.json"))
}

pub fn write_checkpoint(path: &Path, fit: &ColumnFit) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::process(format!("Failed to create checkpoint '{}': {e}", path.display()))
    })?;
    let write_err = |e: &dyn std::fmt::Display| {
        AppError::process(format!("Failed to write checkpoint '{}': {e}", path.display()))
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, fit).map_err(|e| write_err(&e))?;
    writer.flush().map_err(|e| write_err(&e))
}

/// Read a checkpoint; `Ok(None)` when the column was never fitted.
pub fn read_checkpoint(path: &Path) -> Result<Option<ColumnFit>, AppError> {
    if !path.is_file() {
        return Ok(None);
    }
    let file = File::open(path)
        .map_err(|e| AppError::data(format!("Failed to open checkpoint '{}': {e}", path.display())))?;
    let fit = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::data(format!("Invalid checkpoint '{}': {e}", path.display())))?;
    Ok(Some(fit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_survives_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let stem = checkpoint_stem("06", "NGC", "lowess");
        let path = checkpoint_path(dir.path(), &stem, 7);
        assert!(path.ends_with("06_NGC_lowess_row_0007.json"));

        let fit = ColumnFit::new(7, "lowess", vec![vec![1.0, f64::NAN, 3.0]]);
        write_checkpoint(&path, &fit).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("null"));

        let back = read_checkpoint(&path).unwrap().unwrap();
        let spectra: Vec<Vec<f64>> = back.spectra_f64().collect();
        assert_eq!(spectra[0][0], 1.0);
        assert!(spectra[0][1].is_nan());
        assert_eq!(back.column, 7);
    }

    #[test]
    fn full_length_column_reads_back_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint_path(dir.path(), &checkpoint_stem("06", "NGC", "lowess"), 0);
        let spectra: Vec<Vec<f64>> = (0..40)
            .map(|row| (0..3681).map(|k| row as f64 + 0.001 * k as f64).collect())
            .collect();
        write_checkpoint(&path, &ColumnFit::new(0, "lowess", spectra.clone())).unwrap();

        let back: Vec<Vec<f64>> = read_checkpoint(&path).unwrap().unwrap().spectra_f64().collect();
        assert_eq!(back.len(), 40);
        for (got, want) in back.iter().zip(&spectra) {
            assert_eq!(got.len(), want.len());
            assert!(got.iter().zip(want).all(|(a, b)| (a - b).abs() < 1e-12));
        }
    }

    #[test]
    fn absent_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint_path(dir.path(), "x_", 0);
        assert!(read_checkpoint(&path).unwrap().is_none());
    }
}
