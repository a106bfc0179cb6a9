//! NaN-aware reductions.
//!
//! Datacubes carry NaN for unobserved spaxels and masked pixels, so every
//! reduction here ignores NaN. Conventions:
//! - `nan_sum` of an all-NaN (or empty) input is `0.0`
//! - every other reduction of an all-NaN input is `NaN`

use std::cmp::Ordering;

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

pub fn nan_sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

pub fn nan_mean(values: &[f64]) -> f64 {
    let mut n = 0usize;
    let mut sum = 0.0;
    for &v in values.iter().filter(|v| !v.is_nan()) {
        n += 1;
        sum += v;
    }
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

pub fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// Population standard deviation (`ddof = 0`).
pub fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (n, ss) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0usize, 0.0), |(n, ss), v| (n + 1, ss + (v - mean) * (v - mean)));
    (ss / n as f64).sqrt()
}

pub fn nan_median(values: &[f64]) -> f64 {
    let mut buf = finite(values);
    median_mut(&mut buf).unwrap_or(f64::NAN)
}

/// Median of a mutable buffer (sorted in place). `None` when empty.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Percentile `q` in `[0, 100]` with linear interpolation between ranks.
pub fn nan_percentile(values: &[f64], q: f64) -> f64 {
    let mut buf = finite(values);
    if buf.is_empty() || !q.is_finite() {
        return f64::NAN;
    }
    buf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let q = q.clamp(0.0, 100.0) / 100.0;
    let pos = q * (buf.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    buf[lo] + (buf[hi] - buf[lo]) * frac
}

/// Robust sigma estimate: `1.4826 · MAD`.
pub fn mad_sigma(values: &[f64]) -> f64 {
    let med = nan_median(values);
    if med.is_nan() {
        return f64::NAN;
    }
    let dev: Vec<f64> = values.iter().filter(|v| !v.is_nan()).map(|v| (v - med).abs()).collect();
    1.4826 * nan_median(&dev)
}
