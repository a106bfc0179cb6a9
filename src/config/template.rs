//! Starter parameter and procsteps files, written by `brutifus init`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const PARAMS_FILE: &str = "params.yaml";
pub const PROCSTEPS_FILE: &str = "procsteps.yaml";

pub const PARAMS_TEMPLATE: &str = r#"# brutifus parameter file

# Serif (TeX-like) fonts in the figures
systemtex: False

target: 'NGC1234'
# Redshift of the target; only needed to de-redshift wavelengths
z_target: null
inst: 'MUSE'

# False: one spectrum at a time; True: all cores; n: n threads
multiprocessing: True
verbose: True

data_loc: './data'
data_fn: 'DATACUBE_FINAL.fits'

prod_loc: './products'
plot_loc: './plots'
tmp_loc: './tmp'

# [lam_min, lam_max, 'c'ontinuum or 'e'mission], in Angstroem
snr_ranges: [[7400., 8500., 'c'],
             [6560., 6570., 'e']]

# [x, y, radius] or [x, y, dx, dy], 0-based pixels
sky_regions: [[5, 5, 3],
              [280, 10, 10, 10]]

# Galactic extinction: f99, cd89 or od94
gal_curve: 'f99'
gal_rv: 3.1
Ab: 0.094
Av: 0.071

# LOWESS continuum fitting
lowess_it: 5
lowess_frac: 0.05
"#;

pub const PROCSTEPS_TEMPLATE: &str = r#"# brutifus processing steps, run top to bottom

- step: 'adjust_WCS'
  run: False
  suffix: '00'
  args:
    name_in: 'raw_cube'
    name_out: 'wcs_cube'
    ref_catalog: './data/gaia_stars.csv'

- step: 'crude_snr_maps'
  run: True
  suffix: '01'
  args:
    name_in: 'raw_cube'
    zcorr_lams: False

- step: 'plot_BW'
  run: True
  suffix: '02'
  args:
    name_in: 'raw_cube'
    bands: [[7500., 9300.], [6560., 6570.]]
    conts: [[null, null], [6520., 6530.]]
    stretches: ['arcsinh', 'linear']
    plims: [[10., 99.5]]
    vlims: [[null, null]]
    gauss_blurs: [null, 1.0]

- step: 'plot_RGB'
  run: True
  suffix: '03'
  args:
    name_in: 'raw_cube'
    bands: [[7500., 9300., 6000., 7000., 4900., 5500.]]
    conts: [[null, null, null]]
    stretches: [['arcsinh', 'arcsinh', 'arcsinh']]
    plims: [[10., 99.5, 10., 99.5, 10., 99.5]]
    vlims: [[null, null, null, null, null, null]]
    gauss_blurs: [[null, null, null]]

- step: 'sky_sub'
  run: True
  suffix: '04'
  args:
    name_in: 'raw_cube'
    name_out: 'skysub_cube'

- step: 'gal_dered'
  run: True
  suffix: '05'
  args:
    name_in: 'skysub_cube'
    name_out: 'galdered_cube'

- step: 'fit_continuum'
  run: True
  suffix: '06'
  args:
    name_in: 'galdered_cube'
    start_row: null
    end_row: null
    method: 'lowess'

- step: 'make_continuum_cube'
  run: True
  suffix: '07'
  args:
    method: 'lowess'

- step: 'subtract_continuum'
  run: True
  suffix: '08'
  args:
    name_in: 'galdered_cube'
    name_out: 'contsub_cube'
    method: 'lowess'
"#;

/// Write both templates into `dir`, refusing to overwrite unless `force`.
pub fn write_templates(dir: &Path, force: bool) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::process(format!("Failed to create '{}': {e}", dir.display())))?;

    let files = [(PARAMS_FILE, PARAMS_TEMPLATE), (PROCSTEPS_FILE, PROCSTEPS_TEMPLATE)];
    let paths: Vec<PathBuf> = files.iter().map(|(name, _)| dir.join(name)).collect();
    if !force {
        if let Some(existing) = paths.iter().find(|p| p.exists()) {
            return Err(AppError::config(format!(
                "'{}' already exists; use --force to overwrite.",
                existing.display()
            )));
        }
    }

    for (path, (_, text)) in paths.iter().zip(files) {
        fs::write(path, text)
            .map_err(|e| AppError::process(format!("Failed to write '{}': {e}", path.display())))?;
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Params, Recipe};

    #[test]
    fn templates_are_valid() {
        let params = Params::from_yaml(PARAMS_TEMPLATE).unwrap();
        assert_eq!(params.target, "NGC1234");
        assert!(params.unknown.is_empty());

        let recipe = Recipe::from_yaml(PROCSTEPS_TEMPLATE).unwrap();
        assert_eq!(recipe.steps.len(), crate::config::recipe::STEP_NAMES.len());
        let names: Vec<&str> = recipe.steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, crate::config::recipe::STEP_NAMES);
        assert!(!recipe.steps[0].run);
    }

    #[test]
    fn init_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_templates(dir.path(), false).unwrap();
        assert_eq!(written.len(), 2);
        assert!(Params::load(&written[0]).is_ok());
        assert!(Recipe::load(&written[1]).is_ok());

        assert_eq!(write_templates(dir.path(), false).unwrap_err().exit_code(), 2);
        assert!(write_templates(dir.path(), true).is_ok());
    }
}
