//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - read from the YAML parameter/recipe files
//! - written back into templates and product headers
//! - passed through the processing steps without conversion

use std::num::NonZeroUsize;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Supported integral field spectrographs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Instrument {
    #[serde(rename = "MUSE")]
    #[value(name = "MUSE")]
    Muse,
}

impl Instrument {
    pub fn display_name(self) -> &'static str {
        match self {
            Instrument::Muse => "MUSE",
        }
    }
}

/// How the signal of an S/N window is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnrKind {
    /// Median over the window.
    #[serde(rename = "c")]
    Continuum,
    /// Maximum over the window.
    #[serde(rename = "e")]
    Emission,
}

impl SnrKind {
    pub fn code(self) -> &'static str {
        match self {
            SnrKind::Continuum => "c",
            SnrKind::Emission => "e",
        }
    }
}

/// A wavelength window `[lam_min, lam_max]` (Å) used for S/N maps.
///
/// Written in YAML as `[4500., 5000., 'c']`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64, SnrKind)", into = "(f64, f64, SnrKind)")]
pub struct SnrRange {
    pub lam_min: f64,
    pub lam_max: f64,
    pub kind: SnrKind,
}

impl TryFrom<(f64, f64, SnrKind)> for SnrRange {
    type Error = String;

    fn try_from((lam_min, lam_max, kind): (f64, f64, SnrKind)) -> Result<Self, Self::Error> {
        if !(lam_min.is_finite() && lam_max.is_finite() && lam_min < lam_max) {
            return Err(format!(
                "snr range must satisfy lam_min < lam_max, got [{lam_min}, {lam_max}]"
            ));
        }
        Ok(Self { lam_min, lam_max, kind })
    }
}

impl From<SnrRange> for (f64, f64, SnrKind) {
    fn from(r: SnrRange) -> Self {
        (r.lam_min, r.lam_max, r.kind)
    }
}

impl SnrRange {
    /// `"%.1f-%.1f"` label used in headers and file names.
    pub fn label(&self) -> String {
        format!("{:.1}-{:.1}", self.lam_min, self.lam_max)
    }
}

/// A region of sky spaxels, in 0-based pixel coordinates.
///
/// Written in YAML as `[x, y, radius]` (circle) or `[x, y, dx, dy]` (box).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub enum SkyRegion {
    Circle { x: f64, y: f64, radius: f64 },
    /// Covers rows `y..=y+dy` and columns `x..=x+dx`.
    Box { x: f64, y: f64, dx: f64, dy: f64 },
}

impl TryFrom<Vec<f64>> for SkyRegion {
    type Error = String;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        if v.iter().any(|c| !c.is_finite()) {
            return Err(format!("sky region values must be finite, got {v:?}"));
        }
        match v.as_slice() {
            &[x, y, radius] => {
                if radius <= 0.0 {
                    return Err(format!("sky circle radius must be > 0, got {radius}"));
                }
                Ok(SkyRegion::Circle { x, y, radius })
            }
            &[x, y, dx, dy] => {
                if dx < 0.0 || dy < 0.0 {
                    return Err(format!("sky box extents must be >= 0, got [{dx}, {dy}]"));
                }
                Ok(SkyRegion::Box { x, y, dx, dy })
            }
            _ => Err(format!(
                "sky region must have 3 (circle) or 4 (box) elements, got {}",
                v.len()
            )),
        }
    }
}

impl From<SkyRegion> for Vec<f64> {
    fn from(r: SkyRegion) -> Self {
        match r {
            SkyRegion::Circle { x, y, radius } => vec![x, y, radius],
            SkyRegion::Box { x, y, dx, dy } => vec![x, y, dx, dy],
        }
    }
}

impl SkyRegion {
    /// Whether spaxel `(col, row)` lies inside the region.
    pub fn contains(&self, col: usize, row: usize) -> bool {
        let (cx, cy) = (col as f64, row as f64);
        match *self {
            SkyRegion::Circle { x, y, radius } => ((cx - x).powi(2) + (cy - y).powi(2)).sqrt() <= radius,
            SkyRegion::Box { x, y, dx, dy } => {
                let (x0, y0) = (x.round(), y.round());
                cx >= x0 && cx <= x0 + dx.round() && cy >= y0 && cy <= y0 + dy.round()
            }
        }
    }
}

/// Concurrency budget for the continuum fitting.
///
/// YAML accepts `false` (sequential), `true` (all cores) or a thread count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ParallelismRaw", into = "ParallelismRaw")]
pub enum Parallelism {
    Sequential,
    AllCores,
    Threads(NonZeroUsize),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParallelismRaw {
    Flag(bool),
    Count(i64),
}

impl TryFrom<ParallelismRaw> for Parallelism {
    type Error = String;

    fn try_from(raw: ParallelismRaw) -> Result<Self, Self::Error> {
        match raw {
            ParallelismRaw::Flag(false) => Ok(Parallelism::Sequential),
            ParallelismRaw::Flag(true) => Ok(Parallelism::AllCores),
            ParallelismRaw::Count(n) => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Parallelism::Threads)
                .ok_or_else(|| format!("multiprocessing must be a boolean or a positive integer, got {n}")),
        }
    }
}

impl From<Parallelism> for ParallelismRaw {
    fn from(p: Parallelism) -> Self {
        match p {
            Parallelism::Sequential => ParallelismRaw::Flag(false),
            Parallelism::AllCores => ParallelismRaw::Flag(true),
            Parallelism::Threads(n) => ParallelismRaw::Count(n.get() as i64),
        }
    }
}

impl Parallelism {
    /// Worker threads to use; `None` means "let rayon pick" (all cores).
    pub fn threads(self) -> Option<usize> {
        match self {
            Parallelism::Sequential => Some(1),
            Parallelism::AllCores => None,
            Parallelism::Threads(n) => Some(n.get()),
        }
    }

    pub fn describe(self) -> String {
        match self {
            Parallelism::Sequential => "one at a time".to_string(),
            Parallelism::AllCores => "on all cores".to_string(),
            Parallelism::Threads(n) => format!("{n} at a time"),
        }
    }
}

/// Galactic extinction curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtinctionCurve {
    /// Fitzpatrick (1999).
    F99,
    /// Cardelli, Clayton & Mathis (1989).
    Cd89,
    /// O'Donnell (1994).
    Od94,
}

impl ExtinctionCurve {
    pub fn display_name(self) -> &'static str {
        match self {
            ExtinctionCurve::F99 => "Fitzpatrick (1999)",
            ExtinctionCurve::Cd89 => "Cardelli et al. (1989)",
            ExtinctionCurve::Od94 => "O'Donnell (1994)",
        }
    }
}

/// Continuum fitting technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContinuumMethod {
    #[default]
    Lowess,
}

impl ContinuumMethod {
    pub fn tag(self) -> &'static str {
        match self {
            ContinuumMethod::Lowess => "lowess",
        }
    }
}

/// Validate a string used inside product file names.
pub fn validate_name_tag(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::config(format!("`{field}` must not be empty.")));
    }
    if value.contains(['/', '\\']) {
        return Err(AppError::config(format!(
            "`{field}` is used in file names and must not contain path separators: '{value}'."
        )));
    }
    Ok(())
}
