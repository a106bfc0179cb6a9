//! Instrument-specific metadata.

use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::domain::Instrument;
use crate::error::AppError;
use crate::math::{Polynomial, polyfit};

/// MUSE resolving power, fitted in February 2016 (λ in Å, highest degree first).
const MUSE_RESOLUTION: [f64; 4] = [-8.27037043e-09, 1.40175196e-04, -2.83940026e-01, 7.13549344e+02];

impl Instrument {
    /// Axis label for flux densities.
    pub fn funit(self) -> &'static str {
        match self {
            Instrument::Muse => "F_λ [10⁻²⁰ erg s⁻¹ cm⁻² Å⁻¹]",
        }
    }

    /// Spectral resolving power `R(λ)`, λ in Å.
    pub fn resolution(self) -> Polynomial {
        match self {
            Instrument::Muse => Polynomial::new(MUSE_RESOLUTION.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ResolutionRow {
    lam_nm: f64,
    r: f64,
}

/// Refit a degree-3 resolution curve from a reference table.
///
/// The table is a CSV with columns `lam_nm,r` (wavelength in nm, resolving
/// power). The returned polynomial takes Å.
pub fn fit_resolution(path: &Path) -> Result<Polynomial, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::config(format!("Failed to open resolution table '{}': {e}", path.display()))
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut lams = Vec::new();
    let mut rs = Vec::new();
    for row in reader.deserialize::<ResolutionRow>() {
        let row = row.map_err(|e| AppError::config(format!("Invalid resolution table row: {e}")))?;
        lams.push(row.lam_nm * 10.0);
        rs.push(row.r);
    }
    resolution_from_samples(&lams, &rs)
}

/// Degree-3 least-squares fit of `R` against λ (Å).
pub fn resolution_from_samples(lams: &[f64], rs: &[f64]) -> Result<Polynomial, AppError> {
    if lams.len() < 4 {
        return Err(AppError::data(format!(
            "A cubic resolution fit needs at least 4 samples, got {}.",
            lams.len()
        )));
    }
    polyfit(lams, rs, 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn muse_resolution_is_in_the_expected_range() {
        let r = Instrument::Muse.resolution();
        let blue = r.eval(4800.0);
        let red = r.eval(9300.0);
        assert!(blue > 1500.0 && blue < 2200.0, "R(4800) = {blue}");
        assert!(red > 3000.0 && red < 4000.0, "R(9300) = {red}");
        assert!(red > blue);
    }

    #[test]
    fn refit_recovers_tabulated_curve() {
        let truth = Instrument::Muse.resolution();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lam_nm,r").unwrap();
        for i in 0..20 {
            let nm = 465.0 + 25.0 * i as f64;
            writeln!(file, "{nm},{}", truth.eval(nm * 10.0)).unwrap();
        }
        let fitted = fit_resolution(file.path()).unwrap();
        for lam in [5000.0, 7000.0, 9000.0] {
            assert!((fitted.eval(lam) - truth.eval(lam)).abs() < 1e-3);
        }
    }

    #[test]
    fn too_few_samples() {
        assert!(resolution_from_samples(&[5000.0, 6000.0], &[2000.0, 2500.0]).is_err());
    }
}
