//! Command-line parsing for the PFS 1D abundance pipeline.
//!
//! Argument parsing and command dispatch stay separate from the fitting code;
//! `app` turns these structs into a `FitConfig` and a synthetic library.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Element, ResolutionMode};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pfsabund", version, about = "Stellar parameters and abundances from PFS 1D spectra")]
pub struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one object (JSON record or spectrum CSV), write the enriched record.
    Fit(FitArgs),
    /// Fit every record in a directory (or the listed files) in parallel.
    Batch(BatchArgs),
    /// Build a mock record from the synthetic library.
    Simulate(SimulateArgs),
    /// Print the summary (and optionally a plot) of a fitted record.
    Show(ShowArgs),
    /// Write the analytic grid to a directory in the on-disk grid format.
    ExportGrid(ExportGridArgs),
}

/// Where the synthetic spectra come from.
#[derive(Debug, Args, Clone, Default)]
pub struct GridArgs {
    /// Blue-band grid directory (falls back to PFSABUND_GRID_BLUE).
    #[arg(long, value_name = "DIR")]
    pub grid_blue: Option<PathBuf>,

    /// Red-band grid directory (falls back to PFSABUND_GRID_RED).
    #[arg(long, value_name = "DIR")]
    pub grid_red: Option<PathBuf>,

    /// Use the built-in analytic line model for bands without a grid directory.
    #[arg(long)]
    pub analytic: bool,

    /// Analytic grid sampling (Angstrom).
    #[arg(long, default_value_t = 0.1)]
    pub analytic_step: f64,

    /// Line-list JSON replacing the built-in masks (falls back to PFSABUND_MASK_FILE).
    #[arg(long, value_name = "JSON")]
    pub mask_file: Option<PathBuf>,
}

/// Fitting options shared by `fit` and `batch`.
#[derive(Debug, Args, Clone)]
pub struct FitOptions {
    /// Spectrograph resolution mode.
    #[arg(long, value_enum, default_value_t = ResolutionMode::Mr)]
    pub mode: ResolutionMode,

    /// Fit log g instead of fixing it to photometry.
    #[arg(long)]
    pub fit_logg: bool,

    /// Distance modulus for photometric gravity.
    #[arg(long, default_value_t = 22.0)]
    pub dm: f64,

    /// Distance modulus uncertainty.
    #[arg(long, default_value_t = 0.1)]
    pub ddm: f64,

    /// Maximum continuum refinement passes.
    #[arg(long, default_value_t = 50)]
    pub max_iter: usize,

    /// Iteration cap of each least-squares fit.
    #[arg(long, default_value_t = 100)]
    pub lm_max_iter: usize,

    /// Skip the coarse grid scan for a starting point.
    #[arg(long)]
    pub no_seed_scan: bool,

    /// Elements to report as [X/Fe] (comma separated; default all).
    #[arg(long, value_enum, value_delimiter = ',', ignore_case = true)]
    pub elements: Vec<Element>,
}

/// Output destinations shared by `fit` and `batch`.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Directory for enriched records.
    #[arg(short, long, default_value = "out")]
    pub out: PathBuf,

    /// Append one row per fitted object to this CSV catalog.
    #[arg(long, value_name = "CSV")]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FitArgs {
    /// Record JSON, or a spectrum CSV (wvl, flux, ivar/err columns).
    pub input: PathBuf,

    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub fit: FitOptions,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub meta: RecordMeta,

    /// Print an ASCII plot of the fit.
    #[arg(long)]
    pub plot: bool,

    #[command(flatten)]
    pub plot_opts: PlotOptions,
}

/// Identifiers and photometry for records built from a spectrum CSV.
#[derive(Debug, Args, Clone)]
pub struct RecordMeta {
    #[arg(long, default_value_t = 0)]
    pub cat_id: u32,
    #[arg(long, default_value_t = 0)]
    pub tract: u32,
    #[arg(long, default_value = "0,0")]
    pub patch: String,
    #[arg(long, default_value_t = 0)]
    pub obj_id: u64,

    /// Radial velocity (km/s) of the spectrum.
    #[arg(long)]
    pub rv: Option<f64>,

    #[arg(long)]
    pub teffphot: Option<f64>,
    #[arg(long)]
    pub teffphoterr: Option<f64>,
    #[arg(long)]
    pub loggphot: Option<f64>,
    #[arg(long)]
    pub loggphoterr: Option<f64>,
    /// Apparent bolometric magnitude.
    #[arg(long)]
    pub mbol: Option<f64>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Record JSON files, or directories of them.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub fit: FitOptions,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 4500.0)]
    pub teff: f64,
    #[arg(long, default_value_t = 1.5)]
    pub logg: f64,
    #[arg(long, default_value_t = -1.5, allow_hyphen_values = true)]
    pub feh: f64,
    #[arg(long, default_value_t = 0.3, allow_hyphen_values = true)]
    pub alphafe: f64,

    /// Rest-frame wavelength range (Angstrom).
    #[arg(long, default_value_t = 8400.0)]
    pub wvl_min: f64,
    #[arg(long, default_value_t = 8800.0)]
    pub wvl_max: f64,
    #[arg(long, default_value_t = 0.4)]
    pub wvl_step: f64,

    #[arg(long, default_value_t = 100.0)]
    pub snr: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub rv: f64,
    #[arg(long, value_enum, default_value_t = ResolutionMode::Mr)]
    pub mode: ResolutionMode,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    #[arg(long, default_value_t = 1)]
    pub obj_id: u64,

    /// Output record path.
    #[arg(short, long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub grid: GridArgs,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Record JSON.
    pub record: PathBuf,

    /// Also print an ASCII plot of the fit.
    #[arg(long)]
    pub plot: bool,

    #[command(flatten)]
    pub plot_opts: PlotOptions,
}

#[derive(Debug, Args, Clone)]
pub struct PlotOptions {
    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Lower plot wavelength (Angstrom).
    #[arg(long)]
    pub plot_min: Option<f64>,

    /// Upper plot wavelength (Angstrom).
    #[arg(long)]
    pub plot_max: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ExportGridArgs {
    /// Output directory.
    pub dir: PathBuf,

    /// Which band to export.
    #[arg(long, value_enum, default_value_t = Band::Red)]
    pub band: Band,

    /// Sampling (Angstrom).
    #[arg(long, default_value_t = 0.1)]
    pub step: f64,

    /// Restrict the wavelength range inside the band (Angstrom).
    #[arg(long)]
    pub wvl_min: Option<f64>,
    #[arg(long)]
    pub wvl_max: Option<f64>,

    /// Teff nodes as `min:max:step`.
    #[arg(long, value_parser = parse_axis, allow_hyphen_values = true)]
    pub teff: Option<AxisSpec>,
    /// log g nodes as `min:max:step`.
    #[arg(long, value_parser = parse_axis, allow_hyphen_values = true)]
    pub logg: Option<AxisSpec>,
    /// [Fe/H] nodes as `min:max:step`.
    #[arg(long, value_parser = parse_axis, allow_hyphen_values = true)]
    pub feh: Option<AxisSpec>,
    /// [alpha/Fe] nodes as `min:max:step`.
    #[arg(long, value_parser = parse_axis, allow_hyphen_values = true)]
    pub alphafe: Option<AxisSpec>,

    /// Line-list JSON replacing the built-in masks (falls back to PFSABUND_MASK_FILE).
    #[arg(long, value_name = "JSON")]
    pub mask_file: Option<PathBuf>,
}

/// Evenly spaced grid nodes `min..=max` by `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

fn parse_axis(s: &str) -> Result<AxisSpec, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [min, max, step] = parts.as_slice() else {
        return Err(format!("expected min:max:step, got '{s}'"));
    };
    let num = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid number '{v}': {e}"))
    };
    let spec = AxisSpec {
        min: num(*min)?,
        max: num(*max)?,
        step: num(*step)?,
    };
    if !(spec.step > 0.0) || !(spec.max >= spec.min) {
        return Err(format!("axis '{s}' needs max >= min and step > 0"));
    }
    Ok(spec)
}

/// Synthetic grid band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Band {
    Blue,
    Red,
}
