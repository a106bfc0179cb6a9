//! Synthetic MUSE-like datacubes.
//!
//! A seeded generator for demos and tests: an exponential-disk galaxy with a
//! sloped continuum and nebular emission lines at the chosen redshift, a few
//! stars, a night-sky spectrum on every spaxel, Gaussian noise and a NaN
//! border where the detector saw nothing.

use std::path::Path;

use ndarray::Array3;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::cube;
use crate::error::AppError;
use crate::fits::Header;

/// Rest-frame nebular lines (Å) and their strength relative to Hα.
const NEBULAR_LINES: [(f64, f64); 6] = [
    (4861.333, 0.35),
    (4958.911, 0.25),
    (5006.843, 0.75),
    (6548.050, 0.12),
    (6562.819, 1.0),
    (6583.450, 0.36),
];

/// Night-sky emission lines (Å, air) and their relative strength.
const SKY_LINES: [(f64, f64); 6] = [
    (5577.338, 1.0),
    (5889.950, 0.3),
    (6300.304, 0.45),
    (6363.780, 0.15),
    (7316.282, 0.2),
    (8344.602, 0.35),
];

/// Shape and content of a synthetic cube.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub seed: u64,
    pub nx: usize,
    pub ny: usize,
    pub nlam: usize,
    /// Wavelength of the first plane (Å).
    pub lam0: f64,
    /// Plane spacing (Å).
    pub dlam: f64,
    pub z: f64,
    pub n_stars: usize,
    /// Standard deviation of the per-voxel noise.
    pub noise: f64,
    /// Width of the NaN frame, in spaxels.
    pub border: usize,
    pub target: String,
    pub date_obs: String,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            nx: 40,
            ny: 40,
            nlam: 3681,
            lam0: 4750.0,
            dlam: 1.25,
            z: 0.0045,
            n_stars: 3,
            noise: 0.5,
            border: 2,
            target: "SYNTH".to_string(),
            date_obs: "2019-03-04T05:06:07.000".to_string(),
        }
    }
}

/// A generated cube with its headers.
#[derive(Debug, Clone)]
pub struct SynthCube {
    pub lams: Vec<f64>,
    pub data: Array3<f64>,
    pub variance: Array3<f64>,
    pub header0: Header,
    pub header_data: Header,
    pub stars: Vec<(f64, f64)>,
}

fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    (-0.5 * ((x - mu) / sigma).powi(2)).exp()
}

/// Night-sky spectrum: a faint continuum plus narrow lines.
pub fn sky_spectrum(lams: &[f64]) -> Vec<f64> {
    lams.iter()
        .map(|&l| 2.0 + SKY_LINES.iter().map(|&(c, a)| 60.0 * a * gaussian(l, c, 1.2)).sum::<f64>())
        .collect()
}

fn headers(cfg: &SynthConfig) -> (Header, Header) {
    let mut header0 = Header::new();
    header0.set("OBJECT", cfg.target.as_str(), Some("Name of the target"));
    header0.set("INSTRUME", "MUSE", Some("Instrument used"));
    header0.set("DATE-OBS", cfg.date_obs.as_str(), Some("Observing date"));

    let mut h = Header::new();
    h.set("EXTNAME", "DATA", Some("This extension contains data values"));
    h.set("BUNIT", "10**(-20)*erg/s/cm**2/Angstrom", None);
    h.set("CRPIX1", (cfg.nx / 2) as f64 + 1.0, Some("Pixel coordinate of reference point"));
    h.set("CRPIX2", (cfg.ny / 2) as f64 + 1.0, Some("Pixel coordinate of reference point"));
    h.set("CD1_1", -5.55555555555556e-05, Some("Coordinate transformation matrix element"));
    h.set("CD1_2", 0.0, Some("Coordinate transformation matrix element"));
    h.set("CD2_1", 0.0, Some("Coordinate transformation matrix element"));
    h.set("CD2_2", 5.55555555555556e-05, Some("Coordinate transformation matrix element"));
    h.set("CUNIT1", "deg", Some("Units of coordinate increment and value"));
    h.set("CUNIT2", "deg", Some("Units of coordinate increment and value"));
    h.set("CTYPE1", "RA---TAN", Some("Gnomonic projection"));
    h.set("CTYPE2", "DEC--TAN", Some("Gnomonic projection"));
    h.set("CRVAL1", 150.0, None);
    h.set("CRVAL2", 2.0, None);
    h.set("CTYPE3", "AWAV", None);
    h.set("CUNIT3", "Angstrom", None);
    h.set("CD3_3", cfg.dlam, None);
    h.set("CRPIX3", 1.0, None);
    h.set("CRVAL3", cfg.lam0, None);
    (header0, h)
}

pub fn generate_cube(cfg: &SynthConfig) -> Result<SynthCube, AppError> {
    if cfg.nx == 0 || cfg.ny == 0 || cfg.nlam == 0 {
        return Err(AppError::config("Synthetic cube dimensions must be > 0."));
    }
    if 2 * cfg.border >= cfg.nx.min(cfg.ny) {
        return Err(AppError::config("The NaN border leaves no valid spaxel."));
    }
    if !(cfg.noise.is_finite() && cfg.noise >= 0.0) {
        return Err(AppError::config(format!("Noise level must be >= 0, got {}.", cfg.noise)));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let normal = Normal::new(0.0, cfg.noise).map_err(|e| AppError::process(format!("Noise distribution error: {e}")))?;

    let lams: Vec<f64> = (0..cfg.nlam).map(|k| cfg.lam0 + k as f64 * cfg.dlam).collect();
    let sky = sky_spectrum(&lams);
    let (cx, cy) = ((cfg.nx as f64 - 1.0) / 2.0, (cfg.ny as f64 - 1.0) / 2.0);
    let scale = cfg.nx.min(cfg.ny) as f64 / 6.0;

    // Continuum with a gentle red slope, and the redshifted nebular lines.
    let continuum: Vec<f64> = lams.iter().map(|l| 10.0 * (1.0 + 0.2 * (l - cfg.lam0) / 1000.0)).collect();
    let lines: Vec<f64> = lams
        .iter()
        .map(|&l| {
            NEBULAR_LINES
                .iter()
                .map(|&(rest, a)| 80.0 * a * gaussian(l, rest * (1.0 + cfg.z), 2.5))
                .sum()
        })
        .collect();

    let stars: Vec<(f64, f64, f64)> = (0..cfg.n_stars)
        .map(|_| {
            let margin = cfg.border as f64 + 2.0;
            (
                rng.gen_range(margin..=(cfg.nx as f64 - 1.0 - margin).max(margin)),
                rng.gen_range(margin..=(cfg.ny as f64 - 1.0 - margin).max(margin)),
                rng.gen_range(30.0..=80.0),
            )
        })
        .collect();

    let mut data = Array3::zeros((cfg.nlam, cfg.ny, cfg.nx));
    for y in 0..cfg.ny {
        for x in 0..cfg.nx {
            let r = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            let disk = (-r / scale).exp();
            let psf: f64 = stars
                .iter()
                .map(|&(sx, sy, amp)| amp * gaussian(x as f64, sx, 1.3) * gaussian(y as f64, sy, 1.3))
                .sum();
            for k in 0..cfg.nlam {
                data[[k, y, x]] = disk * (continuum[k] + lines[k]) + psf + sky[k] + normal.sample(&mut rng);
            }
        }
    }

    let mut variance = Array3::from_elem(data.dim(), cfg.noise * cfg.noise);
    for ((_, y, x), v) in data.indexed_iter_mut() {
        let edge = x < cfg.border || y < cfg.border || x >= cfg.nx - cfg.border || y >= cfg.ny - cfg.border;
        if edge {
            *v = f64::NAN;
        }
    }
    variance.zip_mut_with(&data, |var, d| {
        if d.is_nan() {
            *var = f64::NAN;
        }
    });

    let (header0, header_data) = headers(cfg);
    Ok(SynthCube {
        lams,
        data,
        variance,
        header0,
        header_data,
        stars: stars.iter().map(|&(x, y, _)| (x, y)).collect(),
    })
}

/// Generate a cube and write it in the MUSE three-HDU layout.
pub fn write_synth_cube(path: &Path, cfg: &SynthConfig) -> Result<SynthCube, AppError> {
    let synth = generate_cube(cfg)?;
    let mut header_error = synth.header_data.clone();
    header_error.set("EXTNAME", "STAT", Some("This extension contains data variance"));
    cube::write_cube(
        path,
        &synth.header0,
        synth.data.clone(),
        synth.variance.clone(),
        synth.header_data.clone(),
        header_error,
    )?;
    Ok(synth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::extract_cube;
    use crate::domain::Instrument;

    fn small() -> SynthConfig {
        SynthConfig {
            nx: 16,
            ny: 12,
            nlam: 200,
            lam0: 6500.0,
            n_stars: 1,
            ..SynthConfig::default()
        }
    }

    #[test]
    fn generation_is_reproducible() {
        let a = generate_cube(&small()).unwrap();
        let b = generate_cube(&small()).unwrap();
        assert_eq!(a.data.dim(), (200, 12, 16));
        assert_eq!(a.stars, b.stars);
        assert_eq!(a.data[[50, 6, 8]], b.data[[50, 6, 8]]);

        let other = generate_cube(&SynthConfig { seed: 7, ..small() }).unwrap();
        assert_ne!(a.data[[50, 6, 8]], other.data[[50, 6, 8]]);
    }

    #[test]
    fn border_is_nan_and_halpha_is_redshifted() {
        let cfg = SynthConfig { noise: 0.0, n_stars: 0, ..small() };
        let cube = generate_cube(&cfg).unwrap();
        assert!(cube.data[[0, 0, 5]].is_nan());
        assert!(cube.variance[[0, 11, 5]].is_nan());
        assert!(cube.data[[0, 2, 2]].is_finite());

        let (cy, cx) = (6, 8);
        let peak = (0..cfg.nlam)
            .filter(|&k| (cube.lams[k] - 6600.0).abs() < 20.0)
            .max_by(|&a, &b| cube.data[[a, cy, cx]].total_cmp(&cube.data[[b, cy, cx]]))
            .unwrap();
        assert!((cube.lams[peak] - 6562.819 * (1.0 + cfg.z)).abs() < cfg.dlam);
    }

    #[test]
    fn written_cube_reads_back_as_muse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.fits");
        let cfg = small();
        write_synth_cube(&path, &cfg).unwrap();

        let cube = extract_cube(&path, Instrument::Muse).unwrap();
        assert_eq!(cube.dims(), (200, 12, 16));
        assert!((cube.lams[1] - 6501.25).abs() < 1e-9);
        assert_eq!(cube.header0.get_str("DATE-OBS"), Some(cfg.date_obs.as_str()));
        assert_eq!(cube.header_error.get_str("EXTNAME"), Some("STAT"));
        assert!((cube.error[[0, 5, 5]] - 0.25).abs() < 1e-6);
    }
}
