//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the object record (`PfsObject`) with its spectrum, photometry and outputs
//! - grid parameters (`Atmosphere`, `Param`) and reported elements (`Element`)
//! - fit configuration (`FitConfig`) and its defaults

pub mod types;

pub use types::*;
