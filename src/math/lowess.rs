//! LOWESS (locally weighted scatterplot smoothing).
//!
//! Follows Cleveland (1979) as implemented by statsmodels with `delta = 0`:
//!
//! - for every abscissa, take the `floor(frac · n)` nearest neighbours
//! - weight them with the tricube kernel scaled by the farthest neighbour
//! - fit a weighted straight line and evaluate it at the abscissa, or keep the
//!   sample itself when fewer than two weights are nonzero
//! - repeat `it` times with bisquare robustness weights computed from the
//!   residuals, scaled by `6 · median(|residual|)`; a zero median keeps only
//!   the exactly fitted points
//!
//! NaN samples are dropped from the fit and come back as NaN in the output,
//! so the result always has the same length as the input.

use crate::error::AppError;
use crate::math::stats::median_mut;

/// LOWESS settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lowess {
    /// Fraction of the data used for each local fit, in `(0, 1]`.
    pub frac: f64,
    /// Number of robustifying iterations.
    pub it: usize,
}

impl Lowess {
    pub fn new(frac: f64, it: usize) -> Result<Self, AppError> {
        if !(frac.is_finite() && frac > 0.0 && frac <= 1.0) {
            return Err(AppError::config(format!("LOWESS fraction must be in (0, 1], got {frac}.")));
        }
        Ok(Self { frac, it })
    }

    /// Smooth `y(x)`. `x` must be sorted in increasing order.
    pub fn smooth(&self, x: &[f64], y: &[f64]) -> Vec<f64> {
        let n = x.len().min(y.len());
        let keep: Vec<usize> = (0..n).filter(|&i| x[i].is_finite() && y[i].is_finite()).collect();
        let mut out = vec![f64::NAN; n];
        if keep.is_empty() {
            return out;
        }

        let xs: Vec<f64> = keep.iter().map(|&i| x[i]).collect();
        let ys: Vec<f64> = keep.iter().map(|&i| y[i]).collect();
        let fitted = self.smooth_finite(&xs, &ys);
        for (slot, value) in keep.iter().zip(fitted) {
            out[*slot] = value;
        }
        out
    }

    fn smooth_finite(&self, x: &[f64], y: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n == 1 {
            return y.to_vec();
        }
        let k = ((self.frac * n as f64 + 1e-10).floor() as usize).clamp(2, n);

        let mut robust = vec![1.0; n];
        let mut fitted = local_pass(x, y, &robust, k);
        for _ in 0..self.it {
            robust = residual_weights(y, &fitted);
            fitted = local_pass(x, y, &robust, k);
        }
        fitted
    }
}

/// Bisquare robustness weights of the residuals `y - fitted`.
fn residual_weights(y: &[f64], fitted: &[f64]) -> Vec<f64> {
    let abs: Vec<f64> = y.iter().zip(fitted).map(|(a, b)| (a - b).abs()).collect();
    let median = median_mut(&mut abs.clone()).unwrap_or(0.0);
    abs.iter()
        .map(|&r| {
            if median == 0.0 {
                if r > 0.0 { 0.0 } else { 1.0 }
            } else {
                bisquare(r / (6.0 * median))
            }
        })
        .collect()
}

fn local_pass(x: &[f64], y: &[f64], robust: &[f64], k: usize) -> Vec<f64> {
    let n = x.len();
    let mut out = Vec::with_capacity(n);
    let mut left = 0usize;
    let mut right = k - 1;

    for i in 0..n {
        // Slide the k-wide window until x[i] sits at or left of its centre.
        while right + 1 < n && x[i] > (x[left] + x[right + 1]) / 2.0 {
            left += 1;
            right += 1;
        }
        let radius = (x[i] - x[left]).max(x[right] - x[i]);
        out.push(local_fit(x, y, robust, left, right, i, radius));
    }
    out
}

fn local_fit(x: &[f64], y: &[f64], robust: &[f64], left: usize, right: usize, i: usize, radius: f64) -> f64 {
    let xi = x[i];
    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut nonzero = 0usize;
    let mut weights = Vec::with_capacity(right - left + 1);

    for j in left..=right {
        let w = if radius > 0.0 {
            tricube((x[j] - xi).abs() / radius)
        } else {
            1.0
        } * robust[j];
        if w > 1e-12 {
            nonzero += 1;
        }
        weights.push(w);
        sw += w;
        swx += w * x[j];
        swy += w * y[j];
    }

    if nonzero < 2 {
        return y[i];
    }

    let x_bar = swx / sw;
    let y_bar = swy / sw;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (offset, w) in weights.iter().enumerate() {
        let j = left + offset;
        let dx = x[j] - x_bar;
        sxx += w * dx * dx;
        sxy += w * dx * (y[j] - y_bar);
    }

    // Degenerate spread in x: fall back to the local weighted mean.
    let spread = (x[right] - x[left]).abs();
    if sxx <= 1e-12 * sw * spread * spread || sxx == 0.0 {
        return y_bar;
    }
    y_bar + (sxy / sxx) * (xi - x_bar)
}

fn tricube(u: f64) -> f64 {
    if u >= 1.0 {
        0.0
    } else {
        let t = 1.0 - u * u * u;
        t * t * t
    }
}

fn bisquare(u: f64) -> f64 {
    if u.abs() >= 1.0 {
        0.0
    } else {
        let t = 1.0 - u * u;
        t * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| 4750.0 + 1.25 * i as f64).collect()
    }

    #[test]
    fn rejects_invalid_fraction() {
        assert!(Lowess::new(0.0, 3).is_err());
        assert!(Lowess::new(1.5, 3).is_err());
        assert!(Lowess::new(f64::NAN, 3).is_err());
        assert!(Lowess::new(1.0, 0).is_ok());
    }

    #[test]
    fn straight_line_is_preserved() {
        let x = grid(50);
        let y: Vec<f64> = x.iter().map(|v| 0.01 * v + 3.0).collect();
        let fit = Lowess::new(0.3, 3).unwrap().smooth(&x, &y);
        for (a, b) in fit.iter().zip(&y) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn robust_iterations_reject_emission_spikes() {
        let x = grid(200);
        // Deterministic jitter so the residual scale is not zero.
        let mut y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 100.0 + 0.002 * (v - 4750.0) + 0.5 * (1.7 * i as f64).sin())
            .collect();
        for idx in [40, 41, 42, 120, 121] {
            y[idx] += 500.0;
        }
        let fit = Lowess::new(0.2, 5).unwrap().smooth(&x, &y);
        for idx in [41, 120] {
            let truth = 100.0 + 0.002 * (x[idx] - 4750.0);
            assert!((fit[idx] - truth).abs() < 3.0, "continuum at {idx} pulled to {}", fit[idx]);
        }
    }

    #[test]
    fn window_size_rounds_down() {
        // frac · n = 5.5 keeps five neighbours.
        let x: Vec<f64> = (0..100).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let fit = Lowess::new(0.055, 0).unwrap().smooth(&x, &y);
        assert!((fit[50] - 2500.572_621_035_058_5).abs() < 1e-6, "fit[50] = {}", fit[50]);
        assert!((fit[0] + 0.620_273_117_459_594).abs() < 1e-6, "fit[0] = {}", fit[0]);
        assert!((fit[99] - 9800.379_726_882_475).abs() < 1e-6, "fit[99] = {}", fit[99]);
    }

    #[test]
    fn zero_median_residual_keeps_only_exact_points() {
        let x: Vec<f64> = (0..40).map(f64::from).collect();
        let mut y = vec![0.0; 40];
        y[20] = 100.0;

        // One pass spreads the spike over its neighbours.
        let plain = Lowess::new(0.2, 0).unwrap().smooth(&x, &y);
        assert!(plain[19] > 1.0 && plain[21] > 1.0);

        // The median residual is zero, so every point the spike touched drops
        // out. Its neighbours come back clean and the spike, left without
        // support, keeps its own value.
        let fit = Lowess::new(0.2, 3).unwrap().smooth(&x, &y);
        for (i, v) in fit.iter().enumerate() {
            let expected = if i == 20 { 100.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-12, "fit[{i}] = {v}");
        }

        // An even count reweights from a perfect fit, which restores the spread.
        let even = Lowess::new(0.2, 2).unwrap().smooth(&x, &y);
        assert!((even[20] - 21.58).abs() < 0.01, "even[20] = {}", even[20]);
        assert!((even[19] - 20.584).abs() < 0.01, "even[19] = {}", even[19]);
    }

    #[test]
    fn nan_positions_stay_nan() {
        let x = grid(20);
        let mut y = vec![5.0; 20];
        y[3] = f64::NAN;
        let fit = Lowess::new(0.5, 2).unwrap().smooth(&x, &y);
        assert_eq!(fit.len(), 20);
        assert!(fit[3].is_nan());
        assert!((fit[4] - 5.0).abs() < 1e-12);

        let empty = Lowess::new(0.5, 2).unwrap().smooth(&x, &[f64::NAN; 20]);
        assert!(empty.iter().all(|v| v.is_nan()));
    }
}
