//! Manual sky subtraction from user-selected sky spaxels.

use ndarray::{Array2, Array3, Axis};
use serde::Deserialize;
use tracing::{info, warn};

use super::StepContext;
use crate::cube::{self, cube_header, extract_cube, image_header, white_light};
use crate::domain::SkyRegion;
use crate::error::AppError;
use crate::io::FnList;
use crate::math::nan_median;
use crate::plot::{ChannelOptions, MapOptions, Stretch, plot_map, plot_spectrum};

/// Registry key of the white-light image written alongside the sky regions.
pub const WL_IM: &str = "wl_im";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkySubArgs {
    pub name_in: String,
    pub name_out: String,
}

/// Spaxels covered by any of `regions`, clipped to the `(ny, nx)` footprint.
pub fn sky_mask(regions: &[SkyRegion], (ny, nx): (usize, usize)) -> Array2<bool> {
    Array2::from_shape_fn((ny, nx), |(y, x)| regions.iter().any(|r| r.contains(x, y)))
}

/// Median spectrum of the masked spaxels.
pub fn sky_spectrum(data: &Array3<f64>, mask: &Array2<bool>) -> Vec<f64> {
    let mut buf = Vec::new();
    data.axis_iter(Axis(0))
        .map(|plane| {
            buf.clear();
            buf.extend(plane.iter().zip(mask.iter()).filter(|(_, m)| **m).map(|(v, _)| *v));
            nan_median(&buf)
        })
        .collect()
}

pub fn run_sky_sub(mut fn_list: FnList, ctx: &StepContext<'_>, args: &SkySubArgs) -> Result<FnList, AppError> {
    let params = ctx.params;
    if params.sky_regions.is_empty() {
        return Err(AppError::config("`sky_regions` is empty: nothing to measure the sky from."));
    }
    info!(regions = params.sky_regions.len(), "subtracting the sky");

    let cube = extract_cube(fn_list.require(&args.name_in)?, params.inst)?;
    let (_, ny, nx) = cube.dims();
    let mask = sky_mask(&params.sky_regions, (ny, nx));
    let n_sky = mask.iter().filter(|m| **m).count();
    info!(spaxels = n_sky, "sky mask built");
    if n_sky == 0 {
        return Err(AppError::data("The sky regions do not cover any spaxel of the cube."));
    }
    let sky = sky_spectrum(&cube.data, &mask);
    if sky.iter().all(|v| v.is_nan()) {
        warn!("the sky spaxels hold no finite value; the cube will become NaN");
    }

    plot_spectrum(
        &ctx.plot_path("skyspec"),
        &cube.lams,
        &sky,
        params.inst.funit(),
        true,
        ctx.style,
    )?;

    let wl = white_light(&cube.data);
    let wl_path = ctx.product_path("wl-im");
    cube::write_images(&wl_path, &cube.header0, vec![(wl.clone(), image_header(&cube.header_data, ctx.suffix))])?;
    fn_list.insert(WL_IM, wl_path);

    let opts = MapOptions {
        scale: ChannelOptions {
            stretch: Stretch::Linear,
            plims: [5.0, 90.0],
            ..ChannelOptions::default()
        },
        ..MapOptions::default()
    };
    plot_map(&ctx.plot_path("sky-regions"), &wl, &opts, Some(&mask), ctx.style)?;

    let mut data = cube.data;
    for (mut plane, s) in data.axis_iter_mut(Axis(0)).zip(sky.iter()) {
        plane -= *s;
    }

    let header = cube_header(&cube.header_data, ctx.suffix);
    let path = ctx.product_path("skysub-cube");
    cube::write_cube(&path, &cube.header0, data, cube.error, header.clone(), header)?;
    fn_list.insert(args.name_out.clone(), path);
    Ok(fn_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testutil::{params_in, registry_with_cube};

    #[test]
    fn box_and_circle_masks() {
        let regions = [
            SkyRegion::Box { x: 0.0, y: 0.0, dx: 1.0, dy: 0.0 },
            SkyRegion::Circle { x: 5.0, y: 5.0, radius: 1.0 },
        ];
        let mask = sky_mask(&regions, (6, 6));
        assert!(mask[[0, 0]] && mask[[0, 1]]);
        assert!(!mask[[1, 0]] && !mask[[0, 2]]);
        assert!(mask[[5, 5]] && mask[[4, 5]] && mask[[5, 4]]);
        assert!(!mask[[4, 4]]);
        assert_eq!(mask.iter().filter(|m| **m).count(), 5);
    }

    #[test]
    fn subtracts_median_sky_spectrum() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "sky_regions: [[0, 0, 1, 1]]");
        // Sky level k per plane, plus a source in the far corner.
        let mut data = Array3::from_shape_fn((10, 4, 4), |(k, _, _)| k as f64);
        data[[3, 3, 3]] += 100.0;
        data[[4, 0, 0]] = f64::NAN;
        let fn_list = registry_with_cube(&params, data);

        let args = SkySubArgs {
            name_in: "raw_cube".to_string(),
            name_out: "skysub_cube".to_string(),
        };
        let fn_list = run_sky_sub(fn_list, &StepContext::new(&params, "04"), &args).unwrap();

        let out = crate::cube::extract_cube(fn_list.require("skysub_cube").unwrap(), params.inst).unwrap();
        assert_eq!(out.data[[7, 2, 2]], 0.0);
        assert_eq!(out.data[[3, 3, 3]], 100.0);
        assert_eq!(out.error[[3, 3, 3]], 0.25);
        assert_eq!(out.header_data.get_str("B_STEP"), Some("04"));
        assert!(fn_list.get(WL_IM).is_some());
        assert!(params.plot_path("04", "skyspec").is_file());
        assert!(params.plot_path("04", "sky-regions").is_file());
    }

    #[test]
    fn empty_sky_regions_fail() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "");
        let fn_list = registry_with_cube(&params, Array3::zeros((2, 2, 2)));
        let args = SkySubArgs {
            name_in: "raw_cube".to_string(),
            name_out: "out".to_string(),
        };
        assert!(run_sky_sub(fn_list, &StepContext::new(&params, "04"), &args).is_err());
    }
}
