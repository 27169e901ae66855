//! Reporting utilities: fit residuals and formatted terminal output.

pub mod format;

pub use format::*;
