//! Numerical building blocks: NaN-aware reductions, least-squares polynomials,
//! splines and LOWESS smoothing.

pub mod lowess;
pub mod poly;
pub mod spline;
pub mod stats;

pub use lowess::*;
pub use poly::*;
pub use spline::*;
pub use stats::*;
