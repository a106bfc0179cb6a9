//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parameter enums (`Instrument`, `ExtinctionCurve`, `Parallelism`, `ContinuumMethod`)
//! - spectral windows and spatial regions (`SnrRange`, `SkyRegion`)

pub mod types;

pub use types::*;
