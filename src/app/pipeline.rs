//! The recipe executor.
//!
//! Steps communicate only through the filename registry stored next to the
//! products: every step loads it, adds what it wrote and saves it back. A run
//! can therefore be split over several invocations, each enabling a different
//! subset of the recipe.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{Params, Recipe};
use crate::error::AppError;
use crate::io::FnList;
use crate::steps::run_step;

/// What a pipeline run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps_run: Vec<String>,
    pub elapsed: Duration,
}

fn ensure_dir(path: &Path) -> Result<(), AppError> {
    if path.is_dir() {
        return Ok(());
    }
    info!(path = %path.display(), "creating output directory");
    fs::create_dir_all(path).map_err(|e| AppError::process(format!("Failed to create '{}': {e}", path.display())))
}

/// Make sure the registry exists, creating it on a fresh run.
pub fn prepare_registry(params: &Params) -> Result<(), AppError> {
    let path = params.fn_list_path();
    if path.is_file() {
        return Ok(());
    }
    info!(path = %path.display(), "fresh run, creating the filename registry");
    let raw = params.raw_cube_path();
    if !raw.is_file() {
        return Err(AppError::config(format!("Raw file not found: {}", raw.display())));
    }
    FnList::fresh(raw).save(&path)
}

/// Run every enabled step of `recipe`, in order.
pub fn execute(params: &Params, recipe: &Recipe) -> Result<RunSummary, AppError> {
    let start = Instant::now();
    ensure_dir(&params.prod_loc)?;
    ensure_dir(&params.plot_loc)?;
    prepare_registry(params)?;

    let registry = params.fn_list_path();
    let mut steps_run = Vec::new();
    for step in &recipe.steps {
        if !step.run {
            debug!(step = step.name(), suffix = %step.suffix, "skipping disabled step");
            continue;
        }
        info!(step = step.name(), suffix = %step.suffix, "running step");
        let fn_list = FnList::load(&registry)?;
        let fn_list = run_step(step, fn_list, params)?;
        fn_list.save(&registry)?;
        steps_run.push(step.name().to_string());
    }

    Ok(RunSummary {
        steps_run,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synth::{SynthConfig, write_synth_cube};

    fn setup(dir: &Path) -> Params {
        let text = format!(
            "target: 'S'\ndata_loc: '{d}'\ndata_fn: 'synth.fits'\nprod_loc: '{d}/products'\nplot_loc: '{d}/plots'\n\
             tmp_loc: '{d}/tmp'\nsnr_ranges: [[4800., 4850., 'c']]\nsky_regions: [[3, 3, 1]]\nAb: 0.1\nAv: 0.075\n",
            d = dir.display()
        );
        Params::from_yaml(&text).unwrap()
    }

    const RECIPE: &str = r#"
- {step: 'crude_snr_maps', run: True, suffix: '01', args: {name_in: 'raw_cube'}}
- {step: 'plot_BW', run: False, suffix: '02', args: {name_in: 'raw_cube'}}
- {step: 'sky_sub', run: True, suffix: '04', args: {name_in: 'raw_cube', name_out: 'skysub_cube'}}
- {step: 'gal_dered', run: True, suffix: '05', args: {name_in: 'skysub_cube', name_out: 'galdered_cube'}}
"#;

    #[test]
    fn runs_enabled_steps_and_keeps_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        let params = setup(dir.path());
        let cfg = SynthConfig {
            nx: 12,
            ny: 10,
            nlam: 80,
            n_stars: 0,
            border: 1,
            ..SynthConfig::default()
        };
        write_synth_cube(&params.raw_cube_path(), &cfg).unwrap();

        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let summary = execute(&params, &recipe).unwrap();
        assert_eq!(summary.steps_run, vec!["crude_snr_maps", "sky_sub", "gal_dered"]);

        let fn_list = FnList::load(&params.fn_list_path()).unwrap();
        assert!(fn_list.require("galdered_cube").unwrap().ends_with("05_S_gal-dered_cube.fits"));
        assert!(fn_list.get("snr_maps").is_some());
        assert!(!params.product_path("02", "raw_cube_BW_7500-9300").exists());

        // A second run only adds to the existing registry.
        let later = Recipe::from_yaml(
            "- {step: 'plot_BW', run: True, suffix: '02', args: {name_in: 'galdered_cube', bands: [[4760., 4800.]]}}",
        )
        .unwrap();
        execute(&params, &later).unwrap();
        let fn_list = FnList::load(&params.fn_list_path()).unwrap();
        assert!(fn_list.get("skysub_cube").is_some());
        assert!(params.product_path("02", "galdered_cube_BW_4760-4800").is_file());
    }

    #[test]
    fn fresh_run_needs_the_raw_cube() {
        let dir = tempfile::tempdir().unwrap();
        let params = setup(dir.path());
        let err = execute(&params, &Recipe::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("Raw file not found"));
    }

    #[test]
    fn step_failures_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let params = setup(dir.path());
        write_synth_cube(
            &params.raw_cube_path(),
            &SynthConfig {
                nx: 8,
                ny: 8,
                nlam: 20,
                n_stars: 0,
                border: 1,
                ..SynthConfig::default()
            },
        )
        .unwrap();
        let recipe = Recipe::from_yaml(
            "- {step: 'sky_sub', run: True, suffix: '04', args: {name_in: 'nothing_here', name_out: 'x'}}",
        )
        .unwrap();
        assert_eq!(execute(&params, &recipe).unwrap_err().exit_code(), 2);
    }
}
