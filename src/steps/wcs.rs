//! Astrometric adjustment of the cube WCS against a reference star catalog.
//!
//! Point sources are found in the white-light image, the catalog is
//! propagated to the observing epoch and projected through the cube's
//! gnomonic (TAN) WCS, and the median pixel offset between matched pairs is
//! folded into `CRPIX1`/`CRPIX2`.

use std::path::PathBuf;

use nalgebra::{Matrix2, Vector2};
use ndarray::Array2;
use serde::Deserialize;
use tracing::{debug, info};

use super::StepContext;
use crate::cube::{self, add_stamp, extract_cube, image_header, white_light};
use crate::error::AppError;
use crate::fits::Header;
use crate::io::{CatalogStar, FnList, decimal_year, read_catalog};
use crate::math::{mad_sigma, nan_median};

/// Registry key of the white-light image.
pub const WHITE_LIGHT: &str = "white_light";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustWcsArgs {
    pub name_in: String,
    pub name_out: String,
    /// CSV catalog of reference stars (`ra,dec[,pmra,pmdec,ref_epoch]`).
    pub ref_catalog: PathBuf,
    /// Largest detection-to-catalog distance accepted as a match, in pixels.
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,
    /// Expected stellar FWHM in pixels; sets the centroiding box.
    #[serde(default = "default_fwhm")]
    pub fwhm: f64,
    /// Detection threshold above the background, in robust sigmas.
    #[serde(default = "default_nsigma")]
    pub nsigma: f64,
}

fn default_search_radius() -> f64 {
    5.0
}

fn default_fwhm() -> f64 {
    3.0
}

fn default_nsigma() -> f64 {
    5.0
}

impl AdjustWcsArgs {
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [("search_radius", self.search_radius), ("fwhm", self.fwhm), ("nsigma", self.nsigma)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(format!("{name} must be > 0, got {v}"));
            }
        }
        Ok(())
    }
}

/// Celestial part of a FITS WCS with a TAN projection and a CD matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TanWcs {
    pub crpix: [f64; 2],
    pub crval: [f64; 2],
    pub cd: Matrix2<f64>,
}

impl TanWcs {
    /// Read `CRPIX*`, `CRVAL*` and `CD*_*` (or `CDELT*`) from a header.
    pub fn from_header(header: &Header) -> Result<Self, AppError> {
        let cd = |i: usize, j: usize| {
            header.get_f64(&format!("CD{i}_{j}")).unwrap_or_else(|| {
                if i == j {
                    header.get_f64(&format!("CDELT{i}")).unwrap_or(0.0)
                } else {
                    0.0
                }
            })
        };
        let cd = Matrix2::new(cd(1, 1), cd(1, 2), cd(2, 1), cd(2, 2));
        if cd.determinant() == 0.0 {
            return Err(AppError::data("The cube WCS has a singular CD matrix."));
        }
        Ok(Self {
            crpix: [header.require_f64("CRPIX1")?, header.require_f64("CRPIX2")?],
            crval: [header.require_f64("CRVAL1")?, header.require_f64("CRVAL2")?],
            cd,
        })
    }

    /// 0-based pixel `(x, y)` of a sky position in degrees; `None` behind the tangent plane.
    pub fn world_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (a0, d0) = (self.crval[0].to_radians(), self.crval[1].to_radians());
        let (a, d) = (ra.to_radians(), dec.to_radians());
        let da = a - a0;
        let cos_c = d.sin() * d0.sin() + d.cos() * d0.cos() * da.cos();
        if cos_c <= 0.0 {
            return None;
        }
        let xi = (d.cos() * da.sin() / cos_c).to_degrees();
        let eta = ((d.sin() * d0.cos() - d.cos() * d0.sin() * da.cos()) / cos_c).to_degrees();
        let offset = self.cd.try_inverse()? * Vector2::new(xi, eta);
        Some((offset[0] + self.crpix[0] - 1.0, offset[1] + self.crpix[1] - 1.0))
    }
}

/// Point sources in `image`: local maxima above `median + nsigma · σ_MAD`,
/// centroided over a box of half-size `ceil(fwhm / 2)`. Returns 0-based `(x, y)`.
pub fn find_sources(image: &Array2<f64>, fwhm: f64, nsigma: f64) -> Vec<(f64, f64)> {
    let values: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    let background = nan_median(&values);
    let threshold = background + nsigma * mad_sigma(&values);
    if !threshold.is_finite() {
        return Vec::new();
    }

    let (ny, nx) = image.dim();
    let half = ((fwhm / 2.0).ceil() as isize).max(1);
    let at = |y: isize, x: isize| -> Option<f64> {
        if y < 0 || x < 0 || y >= ny as isize || x >= nx as isize {
            return None;
        }
        let v = image[[y as usize, x as usize]];
        v.is_finite().then_some(v)
    };

    let mut sources = Vec::new();
    for y in 0..ny as isize {
        for x in 0..nx as isize {
            let Some(v) = at(y, x) else { continue };
            if v <= threshold {
                continue;
            }
            let is_peak = (-1..=1)
                .flat_map(|dy| (-1..=1).map(move |dx| (dy, dx)))
                .filter(|&(dy, dx)| (dy, dx) != (0, 0))
                .all(|(dy, dx)| at(y + dy, x + dx).is_none_or(|n| v >= n));
            if !is_peak {
                continue;
            }

            let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
            for dy in -half..=half {
                for dx in -half..=half {
                    if let Some(n) = at(y + dy, x + dx) {
                        let w = (n - background).max(0.0);
                        sw += w;
                        sx += w * (x + dx) as f64;
                        sy += w * (y + dy) as f64;
                    }
                }
            }
            if sw > 0.0 {
                sources.push((sx / sw, sy / sw));
            }
        }
    }
    sources
}

/// Median `(catalog − detection)` offset over nearest-neighbour pairs closer than `radius`.
pub fn match_offset(detections: &[(f64, f64)], catalog: &[(f64, f64)], radius: f64) -> Option<(f64, f64, usize)> {
    let mut dxs = Vec::new();
    let mut dys = Vec::new();
    for &(x, y) in detections {
        let nearest = catalog
            .iter()
            .map(|&(cx, cy)| (cx - x, cy - y))
            .min_by(|a, b| a.0.hypot(a.1).total_cmp(&b.0.hypot(b.1)));
        if let Some((dx, dy)) = nearest.filter(|(dx, dy)| dx.hypot(*dy) <= radius) {
            dxs.push(dx);
            dys.push(dy);
        }
    }
    if dxs.is_empty() {
        return None;
    }
    Some((nan_median(&dxs), nan_median(&dys), dxs.len()))
}

fn shift_reference_pixel(header: &Header, suffix: &str, dx: f64, dy: f64) -> Result<Header, AppError> {
    let mut header = header.clone();
    let crpix1 = header.require_f64("CRPIX1")?;
    let crpix2 = header.require_f64("CRPIX2")?;
    header.set("CRPIX1", crpix1 - dx, None);
    header.set("CRPIX2", crpix2 - dy, None);
    add_stamp(&mut header, suffix);
    Ok(header)
}

pub fn run_adjust_wcs(mut fn_list: FnList, ctx: &StepContext<'_>, args: &AdjustWcsArgs) -> Result<FnList, AppError> {
    let params = ctx.params;
    info!(catalog = %args.ref_catalog.display(), "adjusting the cube WCS");

    let cube = extract_cube(fn_list.require(&args.name_in)?, params.inst)?;
    let wl = white_light(&cube.data);
    let wl_path = ctx.product_path("white_light");
    cube::write_image(&wl_path, wl.clone(), image_header(&cube.header_data, ctx.suffix))?;
    fn_list.insert(WHITE_LIGHT, wl_path);

    let wcs = TanWcs::from_header(&cube.header_data)?;
    let date_obs = cube
        .header0
        .get_str("DATE-OBS")
        .or_else(|| cube.header_data.get_str("DATE-OBS"))
        .ok_or_else(|| AppError::data("The cube has no DATE-OBS to propagate proper motions to."))?;
    let epoch = decimal_year(date_obs)?;

    let stars: Vec<CatalogStar> = read_catalog(&args.ref_catalog)?;
    let projected: Vec<(f64, f64)> = stars
        .iter()
        .filter_map(|s| {
            let (ra, dec) = s.position_at(epoch);
            wcs.world_to_pixel(ra, dec)
        })
        .collect();

    let detections = find_sources(&wl, args.fwhm, args.nsigma);
    debug!(sources = detections.len(), stars = projected.len(), epoch, "cross-matching");

    let (dx, dy, matches) = match_offset(&detections, &projected, args.search_radius).ok_or_else(|| {
        AppError::data(format!(
            "No reference star within {} px of the {} detected sources; cannot adjust the WCS.",
            args.search_radius,
            detections.len()
        ))
    })?;
    info!(dx, dy, matches, "WCS offset measured");

    let header_data = shift_reference_pixel(&cube.header_data, ctx.suffix, dx, dy)?;
    let header_error = shift_reference_pixel(&cube.header_error, ctx.suffix, dx, dy)?;
    let path = ctx.product_path("wcs-corr");
    cube::write_cube(&path, &cube.header0, cube.data, cube.error, header_data, header_error)?;
    fn_list.insert(args.name_out.clone(), path);
    Ok(fn_list)
}
