//! Correction for Galactic foreground extinction.

use ndarray::{Array3, Axis};
use serde::Deserialize;
use tracing::info;

use super::StepContext;
use crate::cube::{self, cube_header, extract_cube};
use crate::error::AppError;
use crate::extinction::Foreground;
use crate::fits::Header;
use crate::io::FnList;
use crate::plot::plot_extinction;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GalDeredArgs {
    pub name_in: String,
    pub name_out: String,
}

/// Scale every plane by its factor: `data · f` and `error · f²`.
pub fn deredden(data: &mut Array3<f64>, error: &mut Array3<f64>, factor: &[f64]) {
    for (mut plane, f) in data.axis_iter_mut(Axis(0)).zip(factor) {
        plane *= *f;
    }
    for (mut plane, f) in error.axis_iter_mut(Axis(0)).zip(factor) {
        plane *= f * f;
    }
}

fn stamp_extinction(header: &mut Header, fg: &Foreground) {
    header.set("BR_AB", fg.ab, Some("Foreground Galactic extinction in B"));
    header.set("BR_AV", fg.av, Some("Foreground Galactic extinction in V"));
}

pub fn run_gal_dered(mut fn_list: FnList, ctx: &StepContext<'_>, args: &GalDeredArgs) -> Result<FnList, AppError> {
    let params = ctx.params;
    let fg = Foreground::new(params.ab, params.av, params.gal_curve, params.gal_rv)?;
    info!(curve = fg.curve.display_name(), ab = fg.ab, av = fg.av, rv = fg.rv, "correcting for Galactic extinction");

    let cube = extract_cube(fn_list.require(&args.name_in)?, params.inst)?;
    let alam = fg.alam(&cube.lams)?;
    let factor: Vec<f64> = alam.iter().map(|a| 10f64.powf(0.4 * a)).collect();

    let title = format!("{}: Ab = {}, Av = {}, R_V = {:.2}", fg.curve.display_name(), fg.ab, fg.av, fg.rv);
    plot_extinction(&ctx.plot_path("gal_Alambda_corr"), &cube.lams, &alam, &factor, &title, ctx.style)?;

    let (mut data, mut error) = (cube.data, cube.error);
    deredden(&mut data, &mut error, &factor);

    let mut header_data = cube_header(&cube.header_data, ctx.suffix);
    let mut header_error = cube_header(&cube.header_error, ctx.suffix);
    stamp_extinction(&mut header_data, &fg);
    stamp_extinction(&mut header_error, &fg);

    let path = ctx.product_path("gal-dered_cube");
    cube::write_cube(&path, &cube.header0, data, error, header_data, header_error)?;
    fn_list.insert(args.name_out.clone(), path);
    Ok(fn_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extinction::galactic_red;
    use crate::steps::testutil::{params_in, registry_with_cube};

    #[test]
    fn scales_data_linearly_and_variance_quadratically() {
        let mut data = Array3::from_elem((2, 1, 2), 2.0);
        let mut error = Array3::from_elem((2, 1, 2), 3.0);
        deredden(&mut data, &mut error, &[1.5, 2.0]);
        assert_eq!(data[[0, 0, 1]], 3.0);
        assert_eq!(data[[1, 0, 0]], 4.0);
        assert_eq!(error[[0, 0, 0]], 6.75);
        assert_eq!(error[[1, 0, 1]], 12.0);
    }

    #[test]
    fn writes_dereddened_cube() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "Ab: 0.1\nAv: 0.075\ngal_curve: 'cd89'");
        let fn_list = registry_with_cube(&params, Array3::from_elem((8, 2, 3), 1.0));
        let args = GalDeredArgs {
            name_in: "raw_cube".to_string(),
            name_out: "galdered_cube".to_string(),
        };
        let fn_list = run_gal_dered(fn_list, &StepContext::new(&params, "05"), &args).unwrap();

        let path = fn_list.require("galdered_cube").unwrap();
        assert!(path.ends_with("05_T_gal-dered_cube.fits"));
        let out = extract_cube(path, params.inst).unwrap();
        let expected = galactic_red(&out.lams, Some(0.1), Some(0.075), params.gal_curve, None).unwrap();
        for (k, f) in expected.iter().enumerate() {
            assert!(*f > 1.0);
            assert!((out.data[[k, 1, 2]] - f).abs() < 1e-6);
            assert!((out.error[[k, 0, 0]] - 0.25 * f * f).abs() < 1e-6);
        }
        assert_eq!(out.header_data.get_f64("BR_AB"), Some(0.1));
        assert_eq!(out.header_error.get_f64("BR_AV"), Some(0.075));
        assert!(params.plot_path("05", "gal_Alambda_corr").is_file());
    }

    #[test]
    fn missing_extinction_values_are_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "Ab: 0.1");
        let fn_list = registry_with_cube(&params, Array3::zeros((2, 2, 2)));
        let args = GalDeredArgs {
            name_in: "raw_cube".to_string(),
            name_out: "out".to_string(),
        };
        let err = run_gal_dered(fn_list, &StepContext::new(&params, "05"), &args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
