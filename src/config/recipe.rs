//! The processing-steps file ("recipe").
//!
//! A YAML sequence of steps, each naming the processing function, whether to
//! run it, the suffix it stamps on its products and its arguments:
//!
//! ```yaml
//! - step: 'sky_sub'
//!   run: True
//!   suffix: '04'
//!   args:
//!     name_in: 'raw_cube'
//!     name_out: 'skysub_cube'
//! ```
//!
//! The whole file is checked before anything runs, disabled steps included.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::validate_name_tag;
use crate::error::AppError;
use crate::steps::continuum::{FitContinuumArgs, MakeContinuumArgs, SubtractContinuumArgs};
use crate::steps::dered::GalDeredArgs;
use crate::steps::images::{PlotBwArgs, PlotRgbArgs};
use crate::steps::sky::SkySubArgs;
use crate::steps::snr::SnrMapsArgs;
use crate::steps::wcs::AdjustWcsArgs;

/// Step names, in their usual processing order.
pub const STEP_NAMES: [&str; 9] = [
    "adjust_WCS",
    "crude_snr_maps",
    "plot_BW",
    "plot_RGB",
    "sky_sub",
    "gal_dered",
    "fit_continuum",
    "make_continuum_cube",
    "subtract_continuum",
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    step: String,
    run: bool,
    suffix: String,
    #[serde(default)]
    args: serde_yaml::Value,
}

/// Typed arguments of every step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepArgs {
    AdjustWcs(AdjustWcsArgs),
    CrudeSnrMaps(SnrMapsArgs),
    PlotBw(PlotBwArgs),
    PlotRgb(PlotRgbArgs),
    SkySub(SkySubArgs),
    GalDered(GalDeredArgs),
    FitContinuum(FitContinuumArgs),
    MakeContinuumCube(MakeContinuumArgs),
    SubtractContinuum(SubtractContinuumArgs),
}

impl StepArgs {
    pub fn name(&self) -> &'static str {
        match self {
            StepArgs::AdjustWcs(_) => "adjust_WCS",
            StepArgs::CrudeSnrMaps(_) => "crude_snr_maps",
            StepArgs::PlotBw(_) => "plot_BW",
            StepArgs::PlotRgb(_) => "plot_RGB",
            StepArgs::SkySub(_) => "sky_sub",
            StepArgs::GalDered(_) => "gal_dered",
            StepArgs::FitContinuum(_) => "fit_continuum",
            StepArgs::MakeContinuumCube(_) => "make_continuum_cube",
            StepArgs::SubtractContinuum(_) => "subtract_continuum",
        }
    }

    fn parse(name: &str, args: serde_yaml::Value) -> Result<Self, String> {
        let parsed = match name {
            "adjust_WCS" => {
                let a: AdjustWcsArgs = typed(args)?;
                a.validate()?;
                StepArgs::AdjustWcs(a)
            }
            "crude_snr_maps" => StepArgs::CrudeSnrMaps(typed(args)?),
            "plot_BW" => {
                let a: PlotBwArgs = typed(args)?;
                a.validate()?;
                StepArgs::PlotBw(a)
            }
            "plot_RGB" => {
                let a: PlotRgbArgs = typed(args)?;
                a.validate()?;
                StepArgs::PlotRgb(a)
            }
            "sky_sub" => StepArgs::SkySub(typed(args)?),
            "gal_dered" => StepArgs::GalDered(typed(args)?),
            "fit_continuum" => {
                let a: FitContinuumArgs = typed(args)?;
                a.validate()?;
                StepArgs::FitContinuum(a)
            }
            "make_continuum_cube" => StepArgs::MakeContinuumCube(typed(args)?),
            "subtract_continuum" => StepArgs::SubtractContinuum(typed(args)?),
            other => {
                return Err(format!(
                    "unknown step '{other}' (expected one of: {})",
                    STEP_NAMES.join(", ")
                ));
            }
        };
        Ok(parsed)
    }
}

fn typed<T: DeserializeOwned>(args: serde_yaml::Value) -> Result<T, String> {
    // `args:` left empty means "all defaults".
    let args = match args {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
        other => other,
    };
    serde_yaml::from_value(args).map_err(|e| e.to_string())
}

/// One validated recipe entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub run: bool,
    pub suffix: String,
    pub args: StepArgs,
}

impl Step {
    pub fn name(&self) -> &'static str {
        self.args.name()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recipe {
    pub steps: Vec<Step>,
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.is_file() {
            return Err(AppError::config(format!(
                "Failed to load the procsteps file {}.",
                path.display()
            )));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read procsteps file '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&text).map_err(|e| AppError::config(format!("{} ({})", e.message(), path.display())))
    }

    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: Option<Vec<RawStep>> = serde_yaml::from_str(text)
            .map_err(|e| AppError::config(format!("Invalid procsteps file: {e}")))?;

        let mut steps = Vec::new();
        for (idx, raw) in raw.unwrap_or_default().into_iter().enumerate() {
            validate_name_tag("suffix", &raw.suffix)
                .map_err(|e| AppError::config(format!("Step {} ('{}'): {}", idx + 1, raw.step, e.message())))?;
            let args = StepArgs::parse(&raw.step, raw.args)
                .map_err(|e| AppError::config(format!("Step {} ('{}'): {e}", idx + 1, raw.step)))?;
            steps.push(Step {
                run: raw.run,
                suffix: raw.suffix,
                args,
            });
        }
        Ok(Self { steps })
    }

    /// Steps with `run: true`, in file order.
    pub fn enabled(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContinuumMethod;

    const RECIPE: &str = r#"
- step: 'crude_snr_maps'
  run: True
  suffix: '01'
  args:
    name_in: 'raw_cube'
- step: 'plot_BW'
  run: False
  suffix: '02'
  args:
    name_in: 'raw_cube'
    bands: [[4750., 4760.]]
- step: 'make_continuum_cube'
  run: True
  suffix: '07'
  args:
"#;

    #[test]
    fn parses_steps_with_typed_args() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        assert_eq!(recipe.steps.len(), 3);
        assert_eq!(recipe.steps[0].name(), "crude_snr_maps");
        assert!(matches!(&recipe.steps[0].args, StepArgs::CrudeSnrMaps(a) if !a.zcorr_lams));
        assert_eq!(
            recipe.steps[2].args,
            StepArgs::MakeContinuumCube(MakeContinuumArgs {
                method: ContinuumMethod::Lowess
            })
        );
        let enabled: Vec<&str> = recipe.enabled().map(|s| s.suffix.as_str()).collect();
        assert_eq!(enabled, vec!["01", "07"]);
    }

    #[test]
    fn every_known_step_name_is_accepted() {
        for name in STEP_NAMES {
            let err = StepArgs::parse(name, serde_yaml::Value::Null);
            // Steps with required arguments complain about them, never about the name.
            if let Err(msg) = err {
                assert!(!msg.contains("unknown step"), "{name}: {msg}");
            }
        }
    }

    #[test]
    fn rejects_bad_steps_before_running_anything() {
        for text in [
            "- {step: 'make_coffee', run: True, suffix: '01', args: {}}",
            "- {step: 'sky_sub', run: False, suffix: '01', args: {name_in: 'a'}}",
            "- {step: 'sky_sub', run: True, suffix: '01', args: {name_in: 'a', name_out: 'b', extra: 1}}",
            "- {step: 'fit_continuum', run: True, suffix: '06', args: {name_in: 'a', start_row: 5, end_row: 2}}",
            "- {step: 'sky_sub', run: True, suffix: 'a/b', args: {name_in: 'a', name_out: 'b'}}",
            "- {step: 'sky_sub', run: 'maybe', suffix: '01', args: {name_in: 'a', name_out: 'b'}}",
        ] {
            let err = Recipe::from_yaml(text).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{text}");
        }
    }

    #[test]
    fn empty_file_is_an_empty_recipe() {
        assert!(Recipe::from_yaml("").unwrap().steps.is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Recipe::load(Path::new("/no/such/procsteps.yaml")).unwrap_err();
        assert!(err.message().contains("Failed to load the procsteps file"));
    }
}
