//! Spectral fitting.
//!
//! Responsibilities:
//!
//! - bounded Levenberg-Marquardt on a fallible model (`lm`)
//! - grid synthesis on observed pixels and parameter-subset fits (`model`)
//! - coarse seed scan over grid nodes, evaluated in parallel (`seed`)
//! - the per-object measurement sequence (`measure`) and element ratios (`elements`)

pub mod elements;
pub mod lm;
pub mod measure;
pub mod model;
pub mod seed;

pub use elements::*;
pub use lm::*;
pub use measure::*;
pub use model::*;
pub use seed::*;
