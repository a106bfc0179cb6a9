//! The filename registry shared between processing steps.
//!
//! Every step reads the registry, looks up its inputs by name (e.g. `raw_cube`,
//! `skysub_cube`) and records the products it writes. The registry is stored
//! as pretty JSON next to the products so a recipe can be resumed step by step.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Registry key of the input datacube.
pub const RAW_CUBE: &str = "raw_cube";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FnList {
    entries: BTreeMap<String, PathBuf>,
}

impl FnList {
    /// Registry of a fresh run: only the raw cube is known.
    pub fn fresh(raw_cube: PathBuf) -> Self {
        let mut list = Self::default();
        list.insert(RAW_CUBE, raw_cube);
        list
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::config(format!("Failed to open filename registry '{}': {e}", path.display()))
        })?;
        serde_json::from_reader(file).map_err(|e| {
            AppError::config(format!("Invalid filename registry '{}': {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::process(format!("Failed to create filename registry '{}': {e}", path.display()))
        })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| AppError::process(format!("Failed to write filename registry: {e}")))
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    /// Look up an entry a step depends on.
    pub fn require(&self, name: &str) -> Result<&Path, AppError> {
        self.get(name).ok_or_else(|| {
            AppError::config(format!(
                "No file registered under '{name}'. Did the step producing it run? Known: {}.",
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.insert(name.into(), path.into());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
