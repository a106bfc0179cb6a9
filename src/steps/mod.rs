//! Processing steps.
//!
//! Every step receives the filename registry, the run parameters, its suffix
//! (the tag stamped on everything it writes) and its own arguments, and hands
//! back the registry with its products recorded.

use std::path::PathBuf;

use crate::config::{Params, Step, StepArgs};
use crate::error::AppError;
use crate::io::FnList;
use crate::plot::PlotStyle;

pub mod continuum;
pub mod dered;
pub mod images;
pub mod sky;
pub mod snr;
pub mod wcs;

/// What every step needs besides its own arguments.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub params: &'a Params,
    pub suffix: &'a str,
    pub style: PlotStyle,
}

impl<'a> StepContext<'a> {
    pub fn new(params: &'a Params, suffix: &'a str) -> Self {
        Self {
            params,
            suffix,
            style: PlotStyle::from_systemtex(params.systemtex),
        }
    }

    pub fn product_path(&self, tag: &str) -> PathBuf {
        self.params.product_path(self.suffix, tag)
    }

    pub fn plot_path(&self, tag: &str) -> PathBuf {
        self.params.plot_path(self.suffix, tag)
    }
}

/// Run one recipe step.
pub fn run_step(step: &Step, fn_list: FnList, params: &Params) -> Result<FnList, AppError> {
    let ctx = StepContext::new(params, &step.suffix);
    match &step.args {
        StepArgs::AdjustWcs(args) => wcs::run_adjust_wcs(fn_list, &ctx, args),
        StepArgs::CrudeSnrMaps(args) => snr::run_crude_snr_maps(fn_list, &ctx, args),
        StepArgs::PlotBw(args) => images::run_plot_bw(fn_list, &ctx, args),
        StepArgs::PlotRgb(args) => images::run_plot_rgb(fn_list, &ctx, args),
        StepArgs::SkySub(args) => sky::run_sky_sub(fn_list, &ctx, args),
        StepArgs::GalDered(args) => dered::run_gal_dered(fn_list, &ctx, args),
        StepArgs::FitContinuum(args) => continuum::run_fit_continuum(fn_list, &ctx, args),
        StepArgs::MakeContinuumCube(args) => continuum::run_make_continuum_cube(fn_list, &ctx, args),
        StepArgs::SubtractContinuum(args) => continuum::run_subtract_continuum(fn_list, &ctx, args),
    }
}

/// Element `i` of a per-band option list, cycling when the list is shorter.
pub(crate) fn cycled<T: Copy>(items: &[T], i: usize) -> T {
    items[i % items.len()]
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;

    use ndarray::Array3;

    use crate::config::Params;
    use crate::cube::{self, tests::reference_header};
    use crate::fits::Header;
    use crate::io::FnList;

    /// Parameters writing into `dir`.
    pub(crate) fn params_in(dir: &Path, extra: &str) -> Params {
        let text = format!(
            "target: 'T'\ndata_loc: '{d}'\ndata_fn: 'raw.fits'\nprod_loc: '{d}/prod'\nplot_loc: '{d}/plots'\ntmp_loc: '{d}/tmp'\n{extra}\n",
            d = dir.display()
        );
        let params = Params::from_yaml(&text).unwrap();
        std::fs::create_dir_all(&params.prod_loc).unwrap();
        std::fs::create_dir_all(&params.plot_loc).unwrap();
        params
    }

    /// Write `data` (with a constant error) as the raw cube and register it.
    pub(crate) fn registry_with_cube(params: &Params, data: Array3<f64>) -> FnList {
        let path = params.raw_cube_path();
        let error = Array3::from_elem(data.dim(), 0.25);
        let mut header0 = Header::new();
        header0.set("DATE-OBS", "2019-03-04T05:06:07.000", None);
        header0.set("OBJECT", "T", None);
        let h = reference_header();
        cube::write_cube(&path, &header0, data, error, h.clone(), h).unwrap();
        FnList::fresh(path)
    }
}
