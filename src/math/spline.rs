//! Natural cubic spline interpolation.

use crate::error::AppError;

/// Natural cubic spline (zero second derivative at both ends).
///
/// Outside the knot range the end segments are extended.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn natural(x: &[f64], y: &[f64]) -> Result<Self, AppError> {
        let n = x.len();
        if n != y.len() {
            return Err(AppError::data("spline: knot arrays differ in length."));
        }
        if n < 2 {
            return Err(AppError::data("spline: need at least two knots."));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(AppError::data("spline: knots must be strictly increasing."));
        }

        // Tridiagonal system for the interior second derivatives (Thomas algorithm).
        let mut m = vec![0.0; n];
        if n > 2 {
            let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
            let k = n - 2;
            let mut diag = vec![0.0; k];
            let mut upper = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for i in 0..k {
                diag[i] = 2.0 * (h[i] + h[i + 1]);
                upper[i] = h[i + 1];
                rhs[i] = 6.0 * ((y[i + 2] - y[i + 1]) / h[i + 1] - (y[i + 1] - y[i]) / h[i]);
            }
            for i in 1..k {
                let factor = h[i] / diag[i - 1];
                diag[i] -= factor * upper[i - 1];
                rhs[i] -= factor * rhs[i - 1];
            }
            m[k] = rhs[k - 1] / diag[k - 1];
            for i in (0..k - 1).rev() {
                m[i + 1] = (rhs[i] - upper[i] * m[i + 2]) / diag[i];
            }
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    pub fn eval(&self, xv: f64) -> f64 {
        let n = self.x.len();
        let i = match self.x.partition_point(|&k| k <= xv) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let a = (x1 - xv) / h;
        let b = (xv - x0) / h;
        a * y0 + b * y1 + ((a * a * a - a) * m0 + (b * b * b - b) * m1) * h * h / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_knots() {
        let x = [0.0, 1.0, 2.5, 4.0];
        let y = [1.0, -2.0, 0.5, 3.0];
        let s = CubicSpline::natural(&x, &y).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert!((s.eval(*xi) - yi).abs() < 1e-12);
        }
    }

    #[test]
    fn reproduces_straight_lines() {
        let x = [0.0, 1.0, 3.0, 4.0, 7.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v - 1.0).collect();
        let s = CubicSpline::natural(&x, &y).unwrap();
        for v in [0.5, 2.0, 5.5, 8.0] {
            assert!((s.eval(v) - (2.0 * v - 1.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_unsorted_knots() {
        assert!(CubicSpline::natural(&[0.0, 2.0, 1.0], &[0.0, 1.0, 2.0]).is_err());
    }
}
