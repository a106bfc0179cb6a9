//! SVG figures (plotters).
//!
//! - 2-D maps with stretch, limits, blur and mask outlines (`map`)
//! - RGB composites (`map`)
//! - spectra and extinction curves (`spectrum`)
//! - pixel preparation shared by the above (`raster`)

use std::path::Path;

use crate::error::AppError;

pub mod map;
pub mod raster;
pub mod spectrum;

pub use map::{ChannelOptions, Colormap, MapOptions, plot_map, plot_rgb};
pub use raster::{Stretch, display_limits, gaussian_blur, mask_outline, normalize};
pub use spectrum::{plot_extinction, plot_spectrum};

/// Typography shared by every figure of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotStyle {
    pub font_family: &'static str,
}

impl PlotStyle {
    /// `systemtex = true` selects a TeX-like serif face.
    pub fn from_systemtex(systemtex: bool) -> Self {
        Self {
            font_family: if systemtex { "serif" } else { "sans-serif" },
        }
    }
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self::from_systemtex(false)
    }
}

type DrawResult = Result<(), Box<dyn std::error::Error>>;

fn draw_error(path: &Path, e: Box<dyn std::error::Error>) -> AppError {
    AppError::process(format!("Failed to draw '{}': {e}", path.display()))
}
