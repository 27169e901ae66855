//! Numerical utilities: least squares, B-splines, smoothing and order statistics.

pub mod ols;
pub mod smooth;
pub mod spline;
pub mod stats;

pub use ols::*;
pub use smooth::*;
pub use spline::*;
pub use stats::*;
