//! Polynomials and least-squares polynomial fitting.
//!
//! Coefficients are stored highest degree first, so `[a, b, c]` is
//! `a·x² + b·x + c`.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Horner evaluation.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Least-squares polynomial of degree `deg` through `(x, y)`.
///
/// Non-finite pairs are ignored. The abscissa is centred and scaled before
/// building the Vandermonde matrix ; the coefficients are mapped back to the raw
/// abscissa afterwards.
pub fn polyfit(x: &[f64], y: &[f64], deg: usize) -> Result<Polynomial, AppError> {
    polyfit_weighted(x, y, &vec![1.0; x.len()], deg)
}

/// Weighted least-squares polynomial: minimises `Σ w_i (y_i - p(x_i))²`.
///
/// Rows are scaled by `sqrt(w_i)`; samples with a non-positive or non-finite
/// weight are dropped.
pub fn polyfit_weighted(x: &[f64], y: &[f64], w: &[f64], deg: usize) -> Result<Polynomial, AppError> {
    if x.len() != y.len() || x.len() != w.len() {
        return Err(AppError::data("polyfit: x, y and weight lengths differ."));
    }
    let pairs: Vec<(f64, f64, f64)> = x
        .iter()
        .zip(y)
        .zip(w)
        .filter(|((a, b), c)| a.is_finite() && b.is_finite() && c.is_finite() && **c > 0.0)
        .map(|((&a, &b), &c)| (a, b, c.sqrt()))
        .collect();
    if pairs.len() <= deg {
        return Err(AppError::data(format!(
            "polyfit: need more than {deg} finite points, got {}.",
            pairs.len()
        )));
    }

    let n = pairs.len() as f64;
    let mean = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let spread = pairs.iter().map(|p| (p.0 - mean).abs()).fold(0.0, f64::max);
    let scale = if spread > 0.0 { spread } else { 1.0 };

    let cols = deg + 1;
    let mut design = DMatrix::<f64>::zeros(pairs.len(), cols);
    let mut rhs = DVector::<f64>::zeros(pairs.len());
    for (i, &(xi, yi, sw)) in pairs.iter().enumerate() {
        let u = (xi - mean) / scale;
        for j in 0..cols {
            // Column j holds u^(deg - j), highest degree first.
            design[(i, j)] = sw * u.powi((deg - j) as i32);
        }
        rhs[i] = sw * yi;
    }

    let beta = solve_svd(&design, &rhs)
        .ok_or_else(|| AppError::data("polyfit: least-squares system is singular."))?;

    // p(x) = q((x - mean) / scale); expand q back into powers of x.
    let mut out = vec![0.0; cols];
    for (j, &b) in beta.iter().enumerate() {
        let power = deg - j;
        let term = binomial_shift(power, mean, scale);
        for (k, t) in term.iter().enumerate() {
            out[cols - term.len() + k] += b * t;
        }
    }
    Ok(Polynomial::new(out))
}

/// Coefficients (highest first) of `((x - mean) / scale)^power`.
fn binomial_shift(power: usize, mean: f64, scale: f64) -> Vec<f64> {
    let mut coeffs = vec![1.0];
    for _ in 0..power {
        // Multiply by (x - mean) / scale.
        let mut next = vec![0.0; coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += c / scale;
            next[i + 1] -= c * mean / scale;
        }
        coeffs = next;
    }
    coeffs
}

/// SVD least squares with a tolerance ladder; `None` if every attempt fails.
fn solve_svd(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    [1e-12, 1e-10, 1e-8]
        .iter()
        .filter_map(|&tol| svd.solve(y, tol).ok())
        .find(|beta| beta.iter().all(|v| v.is_finite()))
}
