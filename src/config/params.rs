//! The scientific parameter file (`params.yaml`).
//!
//! The key space mirrors the historical parameter files, so existing files
//! load unchanged. Keys the crate does not know about are reported with a
//! warning and otherwise ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ExtinctionCurve, Instrument, Parallelism, SkyRegion, SnrRange, validate_name_tag};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Use TeX-like (serif) typesetting for figure labels.
    #[serde(default)]
    pub systemtex: bool,

    pub target: String,
    #[serde(default)]
    pub z_target: Option<f64>,
    #[serde(default = "default_inst")]
    pub inst: Instrument,

    #[serde(default = "default_multiprocessing")]
    pub multiprocessing: Parallelism,
    #[serde(default = "default_true")]
    pub verbose: bool,

    pub data_loc: PathBuf,
    pub data_fn: String,

    #[serde(default)]
    pub snr_ranges: Vec<SnrRange>,
    #[serde(default)]
    pub sky_regions: Vec<SkyRegion>,

    #[serde(default = "default_gal_curve")]
    pub gal_curve: ExtinctionCurve,
    #[serde(default)]
    pub gal_rv: Option<f64>,
    #[serde(default, rename = "Ab")]
    pub ab: Option<f64>,
    #[serde(default, rename = "Av")]
    pub av: Option<f64>,

    #[serde(default = "default_lowess_it")]
    pub lowess_it: usize,
    #[serde(default)]
    pub lowess_frac: Option<f64>,

    /// Where FITS products and the filename registry go.
    #[serde(default = "default_prod_loc")]
    pub prod_loc: PathBuf,
    /// Where figures go.
    #[serde(default = "default_plot_loc")]
    pub plot_loc: PathBuf,
    /// Where continuum-fit checkpoints go.
    #[serde(default = "default_tmp_loc")]
    pub tmp_loc: PathBuf,

    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

fn default_inst() -> Instrument {
    Instrument::Muse
}

fn default_multiprocessing() -> Parallelism {
    Parallelism::Sequential
}

fn default_true() -> bool {
    true
}

fn default_gal_curve() -> ExtinctionCurve {
    ExtinctionCurve::F99
}

fn default_lowess_it() -> usize {
    5
}

fn default_prod_loc() -> PathBuf {
    PathBuf::from("products")
}

fn default_plot_loc() -> PathBuf {
    PathBuf::from("plots")
}

fn default_tmp_loc() -> PathBuf {
    PathBuf::from("tmp")
}

impl Params {
    /// Load and validate a parameter file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.is_file() {
            return Err(AppError::config(format!(
                "Failed to load the parameter file {}.",
                path.display()
            )));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read parameter file '{}': {e}", path.display()))
        })?;
        let params = Self::from_yaml(&text)
            .map_err(|e| AppError::config(format!("{} ({})", e.message(), path.display())))?;

        for key in params.unknown.keys() {
            warn!(key = %key, "ignoring unknown parameter");
        }
        Ok(params)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        let params: Params = serde_yaml::from_str(text)
            .map_err(|e| AppError::config(format!("Invalid parameter file: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// Schema checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name_tag("target", &self.target)?;
        if self.data_fn.trim().is_empty() {
            return Err(AppError::config("`data_fn` must not be empty."));
        }

        if let Some(z) = self.z_target {
            if !(z.is_finite() && z > -1.0) {
                return Err(AppError::config(format!("`z_target` must be > -1, got {z}.")));
            }
        }

        for (idx, r) in self.snr_ranges.iter().enumerate() {
            if !(r.lam_min < r.lam_max) {
                return Err(AppError::config(format!(
                    "`snr_ranges[{idx}]` must satisfy lam_min < lam_max."
                )));
            }
        }

        if let Some(frac) = self.lowess_frac {
            if !(frac.is_finite() && frac > 0.0 && frac <= 1.0) {
                return Err(AppError::config(format!(
                    "`lowess_frac` must be in (0, 1], got {frac}."
                )));
            }
        }

        if let Some(rv) = self.gal_rv {
            if !(rv.is_finite() && rv > 0.0) {
                return Err(AppError::config(format!("`gal_rv` must be > 0, got {rv}.")));
            }
        }
        for (key, value) in [("Ab", self.ab), ("Av", self.av)] {
            if let Some(v) = value {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(AppError::config(format!("`{key}` must be >= 0, got {v}.")));
                }
            }
        }

        Ok(())
    }

    pub fn raw_cube_path(&self) -> PathBuf {
        self.data_loc.join(&self.data_fn)
    }

    /// `prod_loc/<target>_fn_list.json`.
    pub fn fn_list_path(&self) -> PathBuf {
        self.prod_loc.join(format!("{}_fn_list.json", self.target))
    }

    /// `prod_loc/<suffix>_<target>_<tag>.fits`.
    pub fn product_path(&self, suffix: &str, tag: &str) -> PathBuf {
        self.prod_loc.join(format!("{suffix}_{}_{tag}.fits", self.target))
    }

    /// `plot_loc/<suffix>_<target>_<tag>.svg`.
    pub fn plot_path(&self, suffix: &str, tag: &str) -> PathBuf {
        self.plot_loc.join(format!("{suffix}_{}_{tag}.svg", self.target))
    }

    pub fn require_redshift(&self) -> Result<f64, AppError> {
        self.z_target
            .ok_or_else(|| AppError::config("`z_target` must be set to correct wavelengths for redshift."))
    }

    pub fn require_lowess_frac(&self) -> Result<f64, AppError> {
        self.lowess_frac
            .ok_or_else(|| AppError::config("`lowess_frac` must be set for LOWESS continuum fitting."))
    }
}
