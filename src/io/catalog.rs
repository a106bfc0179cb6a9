//! Astrometric reference catalogs (CSV).
//!
//! Expected columns (header required, order free, extra columns ignored):
//!
//! | column | unit | required |
//! |---|---|---|
//! | `ra`, `dec` | degrees | yes |
//! | `pmra` (includes cos δ), `pmdec` | mas/yr | no |
//! | `ref_epoch` | decimal year | no (defaults to 2015.5) |
//!
//! This matches a Gaia DR2/DR3 export.

use std::fs::File;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;

use crate::error::AppError;

/// Gaia DR2/DR3 reference epoch.
pub const DEFAULT_REF_EPOCH: f64 = 2015.5;

const MAS_PER_DEG: f64 = 3.6e6;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CatalogStar {
    pub ra: f64,
    pub dec: f64,
    #[serde(default)]
    pub pmra: Option<f64>,
    #[serde(default)]
    pub pmdec: Option<f64>,
    #[serde(default)]
    pub ref_epoch: Option<f64>,
}

impl CatalogStar {
    /// Position at `epoch` (decimal year), linear proper-motion propagation.
    pub fn position_at(&self, epoch: f64) -> (f64, f64) {
        let dt = epoch - self.ref_epoch.unwrap_or(DEFAULT_REF_EPOCH);
        let pmdec = self.pmdec.unwrap_or(0.0);
        let pmra = self.pmra.unwrap_or(0.0);

        let dec = self.dec + pmdec * dt / MAS_PER_DEG;
        let cos_dec = self.dec.to_radians().cos();
        let ra = if cos_dec.abs() > 1e-12 {
            self.ra + pmra * dt / (MAS_PER_DEG * cos_dec)
        } else {
            self.ra
        };
        (ra, dec)
    }
}

/// Load every valid row of a reference catalog.
pub fn read_catalog(path: &Path) -> Result<Vec<CatalogStar>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::config(format!("Failed to open reference catalog '{}': {e}", path.display()))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut stars = Vec::new();
    for (idx, row) in reader.deserialize::<CatalogStar>().enumerate() {
        let star = row.map_err(|e| {
            AppError::config(format!(
                "Invalid reference catalog row {} in '{}': {e}",
                idx + 1,
                path.display()
            ))
        })?;
        if star.ra.is_finite() && star.dec.is_finite() {
            stars.push(star);
        }
    }

    if stars.is_empty() {
        return Err(AppError::data(format!(
            "Reference catalog '{}' contains no usable stars.",
            path.display()
        )));
    }
    Ok(stars)
}

/// Convert a FITS `DATE-OBS` value to a decimal year.
///
/// Accepts `YYYY-MM-DDThh:mm:ss[.fff]` and plain `YYYY-MM-DD`.
pub fn decimal_year(date_obs: &str) -> Result<f64, AppError> {
    let text = date_obs.trim();
    let dt = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|d| d.and_time(Default::default())))
        .map_err(|e| AppError::data(format!("Cannot parse DATE-OBS '{text}': {e}")))?;

    let year = dt.year();
    let days_in_year = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() { 366.0 } else { 365.0 };
    let seconds = dt.num_seconds_from_midnight() as f64 + dt.nanosecond() as f64 * 1e-9;
    let day = dt.ordinal0() as f64 + seconds / 86_400.0;
    Ok(year as f64 + day / days_in_year)
}
