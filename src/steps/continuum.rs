//! Continuum fitting, continuum cube assembly and subtraction.
//!
//! Fitting runs one cube column at a time and checkpoints every column, so a
//! long fit can be spread over several runs with `start_row`/`end_row`. The
//! assembly step then picks up whatever columns exist on disk.

use std::path::PathBuf;

use ndarray::{Array1, Array3, s};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use super::StepContext;
use crate::cube::{self, cube_header, extract_cube};
use crate::domain::{ContinuumMethod, Parallelism};
use crate::error::AppError;
use crate::io::{ColumnFit, FnList, RAW_CUBE, checkpoint_path, checkpoint_stem, read_checkpoint, write_checkpoint};
use crate::math::Lowess;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitContinuumArgs {
    pub name_in: String,
    /// First column to fit (0-based, inclusive).
    #[serde(default)]
    pub start_row: Option<usize>,
    /// Last column to fit (inclusive).
    #[serde(default)]
    pub end_row: Option<usize>,
    #[serde(default)]
    pub method: ContinuumMethod,
}

impl FitContinuumArgs {
    pub fn validate(&self) -> Result<(), String> {
        match (self.start_row, self.end_row) {
            (Some(start), Some(end)) if start > end => Err(format!("start_row ({start}) is after end_row ({end})")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MakeContinuumArgs {
    #[serde(default)]
    pub method: ContinuumMethod,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtractContinuumArgs {
    pub name_in: String,
    pub name_out: String,
    #[serde(default)]
    pub method: ContinuumMethod,
}

/// Registry key of the checkpoint stem written by a fit.
pub fn checkpoints_key(method: ContinuumMethod) -> String {
    format!("{}_pickle", method.tag())
}

/// Registry key of the assembled continuum cube.
pub fn continuum_cube_key(method: ContinuumMethod) -> String {
    format!("{}_cube", method.tag())
}

fn worker_pool(parallelism: Parallelism) -> Result<rayon::ThreadPool, AppError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = parallelism.threads() {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| AppError::process(format!("Failed to start the fitting threads: {e}")))
}

fn column_range(args: &FitContinuumArgs, ncols: usize) -> Result<(usize, usize), AppError> {
    if ncols == 0 {
        return Err(AppError::data("The cube has no columns to fit."));
    }
    let start = args.start_row.unwrap_or(0);
    let end = args.end_row.unwrap_or(ncols - 1);
    if start > end || end >= ncols {
        return Err(AppError::data(format!(
            "Column range {start}-{end} is outside the cube (columns 0-{}).",
            ncols - 1
        )));
    }
    Ok((start, end))
}

/// Fit every spectrum of column `col`.
fn fit_column(pool: &rayon::ThreadPool, lowess: &Lowess, lams: &[f64], data: &Array3<f64>, col: usize) -> Vec<Vec<f64>> {
    let specs: Vec<Vec<f64>> = (0..data.dim().1).map(|y| data.slice(s![.., y, col]).to_vec()).collect();
    pool.install(|| specs.par_iter().map(|spec| lowess.smooth(lams, spec)).collect())
}

pub fn run_fit_continuum(mut fn_list: FnList, ctx: &StepContext<'_>, args: &FitContinuumArgs) -> Result<FnList, AppError> {
    let params = ctx.params;
    let method = args.method;
    let lowess = match method {
        ContinuumMethod::Lowess => Lowess::new(params.require_lowess_frac()?, params.lowess_it)?,
    };
    info!(method = method.tag(), frac = lowess.frac, it = lowess.it, "starting the continuum fitting");

    let cube = extract_cube(fn_list.require(&args.name_in)?, params.inst)?;
    let (start, end) = column_range(args, cube.dims().2)?;
    let pool = worker_pool(params.multiprocessing)?;

    if !params.tmp_loc.is_dir() {
        warn!(path = %params.tmp_loc.display(), "checkpoint location does not exist, creating it");
        std::fs::create_dir_all(&params.tmp_loc).map_err(|e| {
            AppError::process(format!("Failed to create '{}': {e}", params.tmp_loc.display()))
        })?;
    }

    let stem = checkpoint_stem(ctx.suffix, &params.target, method.tag());
    for col in start..=end {
        info!("Fitting spectra in row {col}, {}", params.multiprocessing.describe());
        let fits = fit_column(&pool, &lowess, &cube.lams, &cube.data, col);
        write_checkpoint(
            &checkpoint_path(&params.tmp_loc, &stem, col),
            &ColumnFit::new(col, method.tag(), fits),
        )?;
    }
    info!(columns = end - start + 1, "fitting completed");

    fn_list.insert(checkpoints_key(method), PathBuf::from(stem));
    Ok(fn_list)
}

pub fn run_make_continuum_cube(mut fn_list: FnList, ctx: &StepContext<'_>, args: &MakeContinuumArgs) -> Result<FnList, AppError> {
    let params = ctx.params;
    let method = args.method;
    info!(method = method.tag(), "constructing the continuum cube");

    let stem = fn_list.require(&checkpoints_key(method))?.to_string_lossy().into_owned();
    let raw = extract_cube(fn_list.require(RAW_CUBE)?, params.inst)?;
    let (nk, ny, nx) = raw.dims();

    let mut cont = Array3::from_elem((nk, ny, nx), f64::NAN);
    let mut filled = 0usize;
    for col in 0..nx {
        let path = checkpoint_path(&params.tmp_loc, &stem, col);
        let Some(fit) = read_checkpoint(&path)? else {
            continue;
        };
        if fit.spectra.len() != ny {
            return Err(AppError::data(format!(
                "Checkpoint '{}' holds {} spectra, the cube has {ny} rows.",
                path.display(),
                fit.spectra.len()
            )));
        }
        for (y, spec) in fit.spectra_f64().enumerate() {
            if spec.len() != nk {
                return Err(AppError::data(format!(
                    "Checkpoint '{}' spectrum {y} has {} planes, the cube has {nk}.",
                    path.display(),
                    spec.len()
                )));
            }
            cont.slice_mut(s![.., y, col]).assign(&Array1::from(spec));
        }
        filled += 1;
    }
    if filled == 0 {
        warn!(stem = %stem, "no continuum checkpoint found; the cube is all NaN");
    } else {
        info!(columns = filled, of = nx, "continuum columns assembled");
    }

    let error = Array3::zeros(cont.dim());
    let header = cube_header(&raw.header_data, ctx.suffix);
    let path = ctx.product_path(method.tag());
    cube::write_cube(&path, &raw.header0, cont, error, header.clone(), header)?;
    fn_list.insert(continuum_cube_key(method), path);
    Ok(fn_list)
}

pub fn run_subtract_continuum(
    mut fn_list: FnList,
    ctx: &StepContext<'_>,
    args: &SubtractContinuumArgs,
) -> Result<FnList, AppError> {
    let params = ctx.params;
    let method = args.method;
    info!(method = method.tag(), "subtracting the continuum");

    let cube = extract_cube(fn_list.require(&args.name_in)?, params.inst)?;
    let cont = extract_cube(fn_list.require(&continuum_cube_key(method))?, params.inst)?;
    if cube.dims() != cont.dims() {
        return Err(AppError::data(format!(
            "Continuum cube shape {:?} does not match '{}' shape {:?}.",
            cont.dims(),
            args.name_in,
            cube.dims()
        )));
    }

    let data = cube.data - &cont.data;
    let path = ctx.product_path(&format!("{}-contsub-cube", method.tag()));
    cube::write_cube(
        &path,
        &cube.header0,
        data,
        cube.error,
        cube_header(&cube.header_data, ctx.suffix),
        cube_header(&cube.header_error, ctx.suffix),
    )?;
    fn_list.insert(args.name_out.clone(), path);
    Ok(fn_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testutil::{params_in, registry_with_cube};

    /// Straight-line spectra; row 2 of column 0 is empty.
    fn linear_cube() -> Array3<f64> {
        let mut data = Array3::from_shape_fn((30, 3, 4), |(k, y, x)| 2.0 + 0.1 * k as f64 + (x + y) as f64);
        for k in 0..30 {
            data[[k, 2, 0]] = f64::NAN;
        }
        data
    }

    fn fit_args(start_row: Option<usize>, end_row: Option<usize>) -> FitContinuumArgs {
        FitContinuumArgs {
            name_in: "raw_cube".to_string(),
            start_row,
            end_row,
            method: ContinuumMethod::Lowess,
        }
    }

    #[test]
    fn args_parse_with_defaults() {
        let args: FitContinuumArgs = serde_yaml::from_str("name_in: skysub_cube\nend_row: 3").unwrap();
        assert_eq!(args.start_row, None);
        assert_eq!(args.end_row, Some(3));
        assert_eq!(args.method, ContinuumMethod::Lowess);
        assert!(fit_args(Some(4), Some(2)).validate().is_err());
        assert!(serde_yaml::from_str::<MakeContinuumArgs>("method: spline").is_err());
    }

    #[test]
    fn column_ranges_default_to_the_whole_cube() {
        assert_eq!(column_range(&fit_args(None, None), 4).unwrap(), (0, 3));
        assert_eq!(column_range(&fit_args(Some(2), None), 4).unwrap(), (2, 3));
        assert_eq!(column_range(&fit_args(None, Some(4)), 4).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn fit_assemble_and_subtract() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "lowess_frac: 0.4\nlowess_it: 2\nmultiprocessing: 2");
        let fn_list = registry_with_cube(&params, linear_cube());

        let fn_list = run_fit_continuum(fn_list, &StepContext::new(&params, "06"), &fit_args(Some(0), Some(2))).unwrap();
        assert_eq!(fn_list.get("lowess_pickle"), Some(std::path::Path::new("06_T_lowess_row_")));
        assert!(params.tmp_loc.join("06_T_lowess_row_0002.json").is_file());
        assert!(!params.tmp_loc.join("06_T_lowess_row_0003.json").exists());

        let fn_list =
            run_make_continuum_cube(fn_list, &StepContext::new(&params, "07"), &MakeContinuumArgs::default()).unwrap();
        let cont_path = fn_list.require("lowess_cube").unwrap().to_path_buf();
        assert!(cont_path.ends_with("07_T_lowess.fits"));
        let cont = extract_cube(&cont_path, params.inst).unwrap();
        assert!((cont.data[[10, 1, 1]] - 5.0).abs() < 1e-4);
        assert!(cont.data[[10, 2, 0]].is_nan());
        assert!(cont.data[[0, 0, 3]].is_nan());
        assert_eq!(cont.error[[0, 0, 0]], 0.0);
        assert_eq!(cont.header_data.get_str("B_STEP"), Some("07"));

        let args = SubtractContinuumArgs {
            name_in: "raw_cube".to_string(),
            name_out: "contsub_cube".to_string(),
            method: ContinuumMethod::Lowess,
        };
        let fn_list = run_subtract_continuum(fn_list, &StepContext::new(&params, "08"), &args).unwrap();
        let path = fn_list.require("contsub_cube").unwrap();
        assert!(path.ends_with("08_T_lowess-contsub-cube.fits"));
        let out = extract_cube(path, params.inst).unwrap();
        assert!(out.data[[20, 0, 2]].abs() < 1e-4);
        assert!(out.data[[20, 0, 3]].is_nan());
        assert_eq!(out.error[[20, 0, 3]], 0.25);
    }

    #[test]
    fn fitting_requires_lowess_frac() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "");
        let fn_list = registry_with_cube(&params, linear_cube());
        let err = run_fit_continuum(fn_list, &StepContext::new(&params, "06"), &fit_args(None, None)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn assembly_requires_a_prior_fit() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "");
        let fn_list = registry_with_cube(&params, linear_cube());
        let err = run_make_continuum_cube(fn_list, &StepContext::new(&params, "07"), &MakeContinuumArgs::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
