//! Galactic extinction curves.
//!
//! All curves take wavelengths in Å and return `A_λ` in magnitudes. The
//! reddening comes from the B and V extinctions of the target, `E(B-V) = Ab - Av`.
//!
//! References:
//! - Cardelli, Clayton & Mathis (1989), ApJ 345, 245
//! - O'Donnell (1994), ApJ 422, 158
//! - Fitzpatrick (1999), PASP 111, 63

use crate::domain::ExtinctionCurve;
use crate::error::AppError;
use crate::math::CubicSpline;

/// Validity range of the curves, in inverse microns.
const X_MIN: f64 = 0.3;
const X_MAX: f64 = 10.0;

/// Resolved Galactic foreground extinction of a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Foreground {
    pub curve: ExtinctionCurve,
    pub ab: f64,
    pub av: f64,
    pub ebv: f64,
    pub rv: f64,
}

impl Foreground {
    /// `R_V` is `rv` when given, `Av / E(B-V)` otherwise.
    pub fn new(ab: Option<f64>, av: Option<f64>, curve: ExtinctionCurve, rv: Option<f64>) -> Result<Self, AppError> {
        let (ab, av) = match (ab, av) {
            (Some(ab), Some(av)) => (ab, av),
            _ => {
                return Err(AppError::config(
                    "Galactic extinction needs both `Ab` and `Av` in the parameter file.",
                ));
            }
        };
        let ebv = ab - av;
        let rv = match rv {
            Some(rv) => rv,
            None if ebv > 0.0 => av / ebv,
            None => {
                return Err(AppError::config(format!(
                    "E(B-V) = Ab - Av = {ebv} is not positive; set `gal_rv` explicitly."
                )));
            }
        };
        if !(rv.is_finite() && rv > 0.0) {
            return Err(AppError::config(format!("R_V must be positive, got {rv}.")));
        }
        Ok(Self { curve, ab, av, ebv, rv })
    }

    /// `A_λ` for every wavelength.
    pub fn alam(&self, lams: &[f64]) -> Result<Vec<f64>, AppError> {
        let xs = inverse_microns(lams)?;
        match self.curve {
            ExtinctionCurve::Cd89 => Ok(xs.iter().map(|&x| self.av * ccm_like(x, self.rv, ccm_optical)).collect()),
            ExtinctionCurve::Od94 => Ok(xs.iter().map(|&x| self.av * ccm_like(x, self.rv, odonnell_optical)).collect()),
            ExtinctionCurve::F99 => {
                let k = Fitzpatrick99::new(self.rv)?;
                Ok(xs.iter().map(|&x| self.ebv * k.k(x)).collect())
            }
        }
    }

    /// Flux correction factor `10^(0.4 A_λ)`.
    pub fn correction(&self, lams: &[f64]) -> Result<Vec<f64>, AppError> {
        Ok(self.alam(lams)?.into_iter().map(|a| 10f64.powf(0.4 * a)).collect())
    }
}

/// `A_λ` for the given B and V extinctions.
pub fn alam(
    lams: &[f64],
    ab: Option<f64>,
    av: Option<f64>,
    curve: ExtinctionCurve,
    rv: Option<f64>,
) -> Result<Vec<f64>, AppError> {
    Foreground::new(ab, av, curve, rv)?.alam(lams)
}

/// Multiplicative de-reddening factor `10^(0.4 A_λ)`.
pub fn galactic_red(
    lams: &[f64],
    ab: Option<f64>,
    av: Option<f64>,
    curve: ExtinctionCurve,
    rv: Option<f64>,
) -> Result<Vec<f64>, AppError> {
    Foreground::new(ab, av, curve, rv)?.correction(lams)
}

fn inverse_microns(lams: &[f64]) -> Result<Vec<f64>, AppError> {
    lams.iter()
        .map(|&lam| {
            let x = 1e4 / lam;
            if x.is_finite() && (X_MIN..=X_MAX).contains(&x) {
                Ok(x)
            } else {
                Err(AppError::data(format!(
                    "Wavelength {lam} Å is outside the extinction curve range ({:.0}-{:.0} Å).",
                    1e4 / X_MAX,
                    1e4 / X_MIN
                )))
            }
        })
        .collect()
}

/// `a(x) + b(x) / R_V`, with the optical branch pluggable.
fn ccm_like(x: f64, rv: f64, optical: fn(f64) -> (f64, f64)) -> f64 {
    let (a, b) = if x < 1.1 {
        let p = x.powf(1.61);
        (0.574 * p, -0.527 * p)
    } else if x < 3.3 {
        optical(x - 1.82)
    } else if x < 8.0 {
        let (fa, fb) = if x >= 5.9 {
            let y = x - 5.9;
            (-0.04473 * y * y - 0.009779 * y.powi(3), 0.2130 * y * y + 0.1207 * y.powi(3))
        } else {
            (0.0, 0.0)
        };
        (
            1.752 - 0.316 * x - 0.104 / ((x - 4.67).powi(2) + 0.341) + fa,
            -3.090 + 1.825 * x + 1.206 / ((x - 4.62).powi(2) + 0.263) + fb,
        )
    } else {
        let y = x - 8.0;
        (
            -1.073 - 0.628 * y + 0.137 * y * y - 0.070 * y.powi(3),
            13.670 + 4.257 * y - 0.420 * y * y + 0.374 * y.powi(3),
        )
    };
    a + b / rv
}

/// Horner evaluation, lowest degree first.
fn series(coeffs: &[f64], y: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * y + c)
}

fn ccm_optical(y: f64) -> (f64, f64) {
    const A: [f64; 8] = [1.0, 0.17699, -0.50447, -0.02427, 0.72085, 0.01979, -0.77530, 0.32999];
    const B: [f64; 8] = [0.0, 1.41338, 2.28305, 1.07233, -5.38434, -0.62251, 5.30260, -2.09002];
    (series(&A, y), series(&B, y))
}

fn odonnell_optical(y: f64) -> (f64, f64) {
    const A: [f64; 9] = [1.0, 0.104, -0.609, 0.701, 1.137, -1.718, -0.827, 1.647, -0.505];
    const B: [f64; 9] = [0.0, 1.952, 2.908, -3.989, -7.985, 11.102, 5.491, -10.805, 3.347];
    (series(&A, y), series(&B, y))
}

/// Fitzpatrick & Massa UV parametrisation with the F99 bump and far-UV terms.
fn fm_uv(x: f64, c1: f64, c2: f64, rv: f64) -> f64 {
    const X0: f64 = 4.596;
    const GAMMA: f64 = 0.99;
    const C3: f64 = 3.23;
    const C4: f64 = 0.41;

    let x2 = x * x;
    let drude = x2 / ((x2 - X0 * X0).powi(2) + x2 * GAMMA * GAMMA);
    let far = if x >= 5.9 {
        let y = x - 5.9;
        0.5392 * y * y + 0.05644 * y.powi(3)
    } else {
        0.0
    };
    c1 + c2 * x + C3 * drude + C4 * far + rv
}

/// Fitzpatrick (1999) `k(λ) = A_λ / E(B-V)` for a given `R_V`.
struct Fitzpatrick99 {
    rv: f64,
    c1: f64,
    c2: f64,
    /// Optical/IR branch.
    spline: CubicSpline,
}

impl Fitzpatrick99 {
    /// Below 2700 Å the UV parametrisation applies.
    const X_UV: f64 = 1e4 / 2700.0;

    fn new(rv: f64) -> Result<Self, AppError> {
        let c2 = -0.824 + 4.717 / rv;
        let c1 = 2.030 - 3.007 * c2;

        let knots = [
            0.0,
            1e4 / 26500.0,
            1e4 / 12200.0,
            1e4 / 6000.0,
            1e4 / 5470.0,
            1e4 / 4670.0,
            1e4 / 4110.0,
            1e4 / 2700.0,
            1e4 / 2600.0,
        ];
        let values = [
            0.0,
            0.26469 * rv / 3.1,
            0.82925 * rv / 3.1,
            -0.422809 + 1.00270 * rv + 2.13572e-4 * rv * rv,
            -5.13540e-2 + 1.00216 * rv - 7.35778e-5 * rv * rv,
            0.700127 + 1.00184 * rv - 3.32598e-5 * rv * rv,
            1.19456 + 1.01707 * rv - 5.46959e-3 * rv * rv + 7.97809e-4 * rv.powi(3) - 4.45636e-5 * rv.powi(4),
            fm_uv(knots[7], c1, c2, rv),
            fm_uv(knots[8], c1, c2, rv),
        ];
        let spline = CubicSpline::natural(&knots, &values)?;
        Ok(Self { rv, c1, c2, spline })
    }

    fn k(&self, x: f64) -> f64 {
        if x >= Self::X_UV {
            fm_uv(x, self.c1, self.c2, self.rv)
        } else {
            self.spline.eval(x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B_BAND: f64 = 4400.0;
    const V_BAND: f64 = 5470.0;

    #[test]
    fn ccm_returns_av_at_v() {
        for curve in [ExtinctionCurve::Cd89, ExtinctionCurve::Od94] {
            let a = alam(&[V_BAND], Some(0.4), Some(0.3), curve, Some(3.1)).unwrap();
            assert!((a[0] / 0.3 - 1.0).abs() < 0.02, "{curve:?}: {}", a[0]);
        }
    }

    #[test]
    fn f99_reproduces_reddening() {
        let f = Foreground::new(Some(0.4), Some(0.3), ExtinctionCurve::F99, Some(3.1)).unwrap();
        let a = f.alam(&[B_BAND, V_BAND]).unwrap();
        // A_V ≈ R_V · E(B-V), and B is more extinguished than V.
        assert!((a[1] - 0.31).abs() < 0.01, "A_V = {}", a[1]);
        assert!(a[0] > a[1]);
        assert!(((a[0] - a[1]) - 0.1).abs() < 0.02, "E(B-V) = {}", a[0] - a[1]);
    }

    #[test]
    fn f99_is_continuous_at_the_uv_boundary() {
        let k = Fitzpatrick99::new(3.1).unwrap();
        let x = Fitzpatrick99::X_UV;
        assert!((k.k(x - 1e-9) - k.k(x + 1e-9)).abs() < 1e-6);
    }

    #[test]
    fn rv_defaults_to_av_over_ebv() {
        let f = Foreground::new(Some(0.4), Some(0.3), ExtinctionCurve::F99, None).unwrap();
        assert!((f.rv - 3.0).abs() < 1e-12);
        assert!((f.ebv - 0.1).abs() < 1e-12);
    }

    #[test]
    fn correction_factor_is_exponential_in_alam() {
        let lams = [5000.0, 7000.0, 9000.0];
        let a = alam(&lams, Some(0.1), Some(0.075), ExtinctionCurve::Cd89, None).unwrap();
        let f = galactic_red(&lams, Some(0.1), Some(0.075), ExtinctionCurve::Cd89, None).unwrap();
        for (ai, fi) in a.iter().zip(&f) {
            assert!((fi - 10f64.powf(0.4 * ai)).abs() < 1e-12);
            assert!(*fi > 1.0);
        }
        // Redder light suffers less.
        assert!(f[0] > f[1] && f[1] > f[2]);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(Foreground::new(None, Some(0.3), ExtinctionCurve::F99, None).is_err());
        assert!(Foreground::new(Some(0.3), Some(0.3), ExtinctionCurve::F99, None).is_err());
        assert!(Foreground::new(Some(0.3), Some(0.3), ExtinctionCurve::F99, Some(3.1)).is_ok());
        let err = alam(&[500.0], Some(0.4), Some(0.3), ExtinctionCurve::Cd89, None).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
