//! User-facing configuration: the parameter file and the processing steps.

pub mod params;
pub mod recipe;
pub mod template;

pub use params::Params;
pub use recipe::{Recipe, Step, StepArgs};
