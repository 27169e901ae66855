//! Synthetic spectral grids.
//!
//! A grid maps a node of the `(teff, logg, feh, alphafe)` lattice to a
//! continuum-normalized spectrum; `interp` fills the space between nodes and
//! `library` stitches the blue and red grids together.

pub mod analytic;
pub mod axes;
pub mod interp;
pub mod library;
pub mod store;

pub use analytic::AnalyticGrid;
pub use axes::{Bracket, GridAxes, NodeIndex, bracket, linspace_nodes};
pub use interp::interpolate;
pub use library::{BLUE_BAND, RED_BAND, SynthLibrary};
pub use store::{DirectoryGrid, GridManifest, GridSource, MemoryGrid, write_grid_directory};
