//! Pixel-level preparation of 2-D maps before drawing.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::math::nan_percentile;

/// Intensity stretch applied after clipping to the display limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stretch {
    Linear,
    Log,
    Sqrt,
    #[default]
    Arcsinh,
}

impl Stretch {
    const LOG_A: f64 = 1000.0;
    const ASINH_A: f64 = 0.1;

    /// Map `t` in `[0, 1]` onto `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Stretch::Linear => t,
            Stretch::Sqrt => t.sqrt(),
            Stretch::Log => (Self::LOG_A * t + 1.0).log10() / (Self::LOG_A + 1.0).log10(),
            Stretch::Arcsinh => (t / Self::ASINH_A).asinh() / (1.0 / Self::ASINH_A).asinh(),
        }
    }
}

/// Display limits. Explicit values win over percentiles, bound by bound.
pub fn display_limits(image: &Array2<f64>, plims: [f64; 2], vlims: [Option<f64>; 2]) -> Option<(f64, f64)> {
    let values: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    let lo = vlims[0].unwrap_or_else(|| nan_percentile(&values, plims[0]));
    let hi = vlims[1].unwrap_or_else(|| nan_percentile(&values, plims[1]));
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    if hi > lo {
        Some((lo, hi))
    } else {
        // Flat image: open a unit window so everything maps to the bottom.
        Some((lo, lo + 1.0))
    }
}

/// Clip to `[lo, hi]`, rescale to `[0, 1]` and stretch. NaN stays NaN.
pub fn normalize(image: &Array2<f64>, (lo, hi): (f64, f64), stretch: Stretch) -> Array2<f64> {
    image.mapv(|v| {
        if v.is_nan() {
            f64::NAN
        } else {
            stretch.apply((v - lo) / (hi - lo))
        }
    })
}

/// Gaussian smoothing with standard deviation `sigma` (pixels).
///
/// NaN pixels do not contribute to their neighbours and stay NaN.
pub fn gaussian_blur(image: &Array2<f64>, sigma: f64) -> Array2<f64> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return image.clone();
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();

    let rows = convolve_axis(image, &kernel, radius, true);
    let blurred = convolve_axis(&rows, &kernel, radius, false);
    let mut out = blurred;
    for (o, v) in out.iter_mut().zip(image.iter()) {
        if v.is_nan() {
            *o = f64::NAN;
        }
    }
    out
}

fn convolve_axis(image: &Array2<f64>, kernel: &[f64], radius: isize, along_x: bool) -> Array2<f64> {
    let (ny, nx) = image.dim();
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        let mut acc = 0.0;
        let mut norm = 0.0;
        for (j, w) in kernel.iter().enumerate() {
            let offset = j as isize - radius;
            let (yy, xx) = if along_x {
                (y as isize, x as isize + offset)
            } else {
                (y as isize + offset, x as isize)
            };
            if yy < 0 || xx < 0 || yy >= ny as isize || xx >= nx as isize {
                continue;
            }
            let v = image[[yy as usize, xx as usize]];
            if v.is_finite() {
                acc += w * v;
                norm += w;
            }
        }
        if norm > 0.0 { acc / norm } else { f64::NAN }
    })
}

/// Pixel-edge segments outlining the `true` region of a mask.
///
/// Segments are in pixel coordinates, pixel `(y, x)` spanning `[x, x+1] × [y, y+1]`.
pub fn mask_outline(mask: &Array2<bool>) -> Vec<((f64, f64), (f64, f64))> {
    let (ny, nx) = mask.dim();
    let inside = |y: isize, x: isize| -> bool {
        y >= 0 && x >= 0 && (y as usize) < ny && (x as usize) < nx && mask[[y as usize, x as usize]]
    };

    let mut segments = Vec::new();
    for ((y, x), &m) in mask.indexed_iter() {
        if !m {
            continue;
        }
        let (yi, xi) = (y as isize, x as isize);
        let (xf, yf) = (x as f64, y as f64);
        if !inside(yi - 1, xi) {
            segments.push(((xf, yf), (xf + 1.0, yf)));
        }
        if !inside(yi + 1, xi) {
            segments.push(((xf, yf + 1.0), (xf + 1.0, yf + 1.0)));
        }
        if !inside(yi, xi - 1) {
            segments.push(((xf, yf), (xf, yf + 1.0)));
        }
        if !inside(yi, xi + 1) {
            segments.push(((xf + 1.0, yf), (xf + 1.0, yf + 1.0)));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn stretches_fix_endpoints() {
        for s in [Stretch::Linear, Stretch::Log, Stretch::Sqrt, Stretch::Arcsinh] {
            assert!(s.apply(0.0).abs() < 1e-12);
            assert!((s.apply(1.0) - 1.0).abs() < 1e-12);
            assert!(s.apply(0.25) <= s.apply(0.5));
        }
        // Non-linear stretches lift the faint end.
        assert!(Stretch::Arcsinh.apply(0.1) > 0.1);
        assert!(Stretch::Log.apply(0.1) > 0.1);
    }

    #[test]
    fn explicit_limits_override_percentiles() {
        let img = array![[0.0, 1.0], [2.0, f64::NAN]];
        assert_eq!(display_limits(&img, [0.0, 100.0], [None, None]), Some((0.0, 2.0)));
        assert_eq!(display_limits(&img, [0.0, 100.0], [Some(-1.0), None]), Some((-1.0, 2.0)));
        assert_eq!(display_limits(&img, [0.0, 100.0], [None, Some(5.0)]), Some((0.0, 5.0)));

        let nan = array![[f64::NAN]];
        assert_eq!(display_limits(&nan, [10.0, 99.5], [None, None]), None);
    }

    #[test]
    fn normalize_keeps_nan() {
        let img = array![[0.0, 10.0], [f64::NAN, 20.0]];
        let n = normalize(&img, (0.0, 10.0), Stretch::Linear);
        assert_eq!(n[[0, 1]], 1.0);
        assert_eq!(n[[1, 1]], 1.0);
        assert!(n[[1, 0]].is_nan());
    }

    #[test]
    fn blur_preserves_flux_level_and_nan() {
        let mut img = Array2::from_elem((9, 9), 1.0);
        img[[4, 4]] = f64::NAN;
        let b = gaussian_blur(&img, 1.5);
        assert!(b[[4, 4]].is_nan());
        assert!((b[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((b[[4, 5]] - 1.0).abs() < 1e-12);

        let mut spike = Array2::zeros((9, 9));
        spike[[4, 4]] = 1.0;
        let b = gaussian_blur(&spike, 1.0);
        assert!(b[[4, 4]] < 1.0);
        assert!(b[[4, 5]] > 0.0);
        assert!((b[[4, 5]] - b[[5, 4]]).abs() < 1e-12);
    }

    #[test]
    fn outline_of_single_pixel_is_a_square() {
        let mut mask = Array2::from_elem((3, 3), false);
        mask[[1, 1]] = true;
        assert_eq!(mask_outline(&mask).len(), 4);
        mask[[1, 2]] = true;
        assert_eq!(mask_outline(&mask).len(), 6);
    }
}
