//! `pfs-abund` library crate.
//!
//! Stellar parameters (`Teff`, `log g`, `[Fe/H]`, `[alpha/Fe]`) and individual
//! element ratios from PFS one-dimensional spectra, by chi-squared fitting
//! against a grid of synthetic spectra.
//!
//! The binary (`pfsabund`) is a thin wrapper around this library so the
//! pipeline is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod continuum;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod grid;
pub mod instrument;
pub mod io;
pub mod mask;
pub mod math;
pub mod phot;
pub mod plot;
pub mod report;
