//! Top-level application orchestration.
//!
//! `src/main.rs` is tiny; this module is the real main that:
//! - loads `.env` and parses CLI arguments
//! - sets up logging
//! - builds the fit configuration, masks and synthetic library
//! - dispatches to the subcommands and prints reports

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::Level;

use crate::cli::{
    AxisSpec, Band, BatchArgs, Cli, Command, ExportGridArgs, FitArgs, FitOptions, GridArgs,
    PlotOptions, RecordMeta, ShowArgs, SimulateArgs,
};
use crate::data::{MockSpec, simulate};
use crate::domain::{Atmosphere, Element, FitConfig, ObjectId, Photometry, PfsObject};
use crate::error::AppError;
use crate::grid::{
    AnalyticGrid, BLUE_BAND, DirectoryGrid, GridAxes, GridSource, RED_BAND, SynthLibrary,
    linspace_nodes, write_grid_directory,
};
use crate::io::{load_spectrum_csv, read_record_json, write_record_json};
use crate::mask::MaskSet;
use crate::plot::{PlotWindow, render_spectrum_plot};
use crate::report::{format_batch_summary, format_object_summary};

pub mod pipeline;

use pipeline::{OutputSpec, RunContext};

const ENV_GRID_BLUE: &str = "PFSABUND_GRID_BLUE";
const ENV_GRID_RED: &str = "PFSABUND_GRID_RED";
const ENV_MASK_FILE: &str = "PFSABUND_MASK_FILE";

/// Entry point for the `pfsabund` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Batch(args) => handle_batch(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Show(args) => handle_show(args),
        Command::ExportGrid(args) => handle_export_grid(args),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    // Fails only if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let ctx = run_context(&args.grid, &args.fit)?;
    let object = load_object(&args.input, &args.meta)?;
    let output = OutputSpec {
        out_dir: args.output.out,
        catalog: args.output.catalog,
    };

    let outcome = pipeline::run_fit(&ctx, object, &output)?;
    println!("{}", format_object_summary(&outcome.object)?);
    if args.plot {
        println!(
            "{}",
            render_spectrum_plot(&outcome.object, &plot_window(&args.plot_opts))?
        );
    }
    println!("Record: {}", outcome.record_path.display());
    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let ctx = run_context(&args.grid, &args.fit)?;
    let output = OutputSpec {
        out_dir: args.output.out,
        catalog: args.output.catalog,
    };
    let entries = pipeline::run_batch(&ctx, &args.inputs, &output)?;
    println!("{}", format_batch_summary(&entries));

    // Exit with the first failure's code once everything has been written.
    match entries.into_iter().find_map(|e| e.outcome.err()) {
        Some(e) => Err(AppError::new(e.exit_code(), "Some objects failed; see the summary above.")),
        None => Ok(()),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let masks = load_masks(mask_path(args.grid.mask_file.clone()).as_deref())?;
    let library = load_library(&args.grid, &masks)?;

    let atm = Atmosphere::new(args.teff, args.logg, args.feh, args.alphafe);
    let spec = MockSpec {
        wvl_step: args.wvl_step,
        snr: args.snr,
        rv_kms: args.rv,
        mode: args.mode,
        seed: args.seed,
        ..MockSpec::new(atm, args.wvl_min, args.wvl_max)
    };
    let id = ObjectId {
        cat_id: 0,
        tract: 0,
        patch: "0,0".to_string(),
        obj_id: args.obj_id,
        visits: vec![],
    };
    let object = simulate(&library, &spec, id)?;
    write_record_json(&args.out, &object)?;
    tracing::info!(path = %args.out.display(), atm = %atm, npix = object.spectrum.len(), "wrote mock record");
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let object = read_record_json(&args.record)?;
    println!("{}", format_object_summary(&object)?);
    if args.plot {
        println!("{}", render_spectrum_plot(&object, &plot_window(&args.plot_opts))?);
    }
    Ok(())
}

fn handle_export_grid(args: ExportGridArgs) -> Result<(), AppError> {
    let masks = load_masks(mask_path(args.mask_file.clone()).as_deref())?;
    let defaults = AnalyticGrid::default_axes();
    let axis = |spec: Option<AxisSpec>, default: Vec<f64>| match spec {
        Some(s) => linspace_nodes(s.min, s.max, s.step),
        None => default,
    };
    let axes = GridAxes {
        teff: axis(args.teff, defaults.teff),
        logg: axis(args.logg, defaults.logg),
        feh: axis(args.feh, defaults.feh),
        alphafe: axis(args.alphafe, defaults.alphafe),
    };

    let (name, band) = match args.band {
        Band::Blue => ("blue", BLUE_BAND),
        Band::Red => ("red", RED_BAND),
    };
    let lo = args.wvl_min.map_or(band.0, |w| w.max(band.0));
    let hi = args.wvl_max.map_or(band.1, |w| w.min(band.1));
    let grid = AnalyticGrid::new(name, axes, band_wavelengths((lo, hi), args.step)?, &masks)?;

    let manifest = write_grid_directory(&args.dir, &grid)?;
    tracing::info!(
        dir = %args.dir.display(),
        nodes = manifest.axes.n_nodes(),
        npix = manifest.npix,
        "wrote grid"
    );
    Ok(())
}

/// Fit configuration from CLI flags on top of the defaults.
pub fn fit_config_from_args(args: &FitOptions, mask_file: Option<PathBuf>) -> FitConfig {
    let defaults = FitConfig::default();
    FitConfig {
        mode: args.mode,
        fit_logg: args.fit_logg,
        dm: args.dm,
        ddm: args.ddm,
        max_iter: args.max_iter,
        lm_max_iter: args.lm_max_iter,
        seed_scan: !args.no_seed_scan,
        elements: if args.elements.is_empty() {
            Element::ALL.to_vec()
        } else {
            args.elements.clone()
        },
        mask_file,
        ..defaults
    }
}

fn run_context(grid: &GridArgs, fit: &FitOptions) -> Result<RunContext, AppError> {
    let config = fit_config_from_args(fit, mask_path(grid.mask_file.clone()));
    let masks = load_masks(config.mask_file.as_deref())?;
    let library = load_library(grid, &masks)?;
    tracing::debug!(library = ?library, mode = ?config.mode, fit_logg = config.fit_logg, "run context");
    Ok(RunContext {
        library,
        masks,
        config,
    })
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn mask_path(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| env_path(ENV_MASK_FILE))
}

fn load_masks(path: Option<&Path>) -> Result<MaskSet, AppError> {
    match path {
        Some(p) => MaskSet::load_json(p),
        None => Ok(MaskSet::default()),
    }
}

/// Grid directories from flags or the environment; analytic grids fill in
/// missing bands when requested.
pub fn load_library(args: &GridArgs, masks: &MaskSet) -> Result<SynthLibrary, AppError> {
    let blue = band_grid(args, args.grid_blue.clone(), ENV_GRID_BLUE, "blue", BLUE_BAND, masks)?;
    let red = band_grid(args, args.grid_red.clone(), ENV_GRID_RED, "red", RED_BAND, masks)?;
    SynthLibrary::new(blue, red).map_err(|e| {
        AppError::new(
            e.exit_code(),
            format!(
                "{} Pass --grid-blue/--grid-red (or {ENV_GRID_BLUE}/{ENV_GRID_RED}) or --analytic.",
                e.message()
            ),
        )
    })
}

fn band_grid(
    args: &GridArgs,
    dir: Option<PathBuf>,
    env: &str,
    name: &str,
    range: (f64, f64),
    masks: &MaskSet,
) -> Result<Option<Arc<dyn GridSource>>, AppError> {
    if let Some(dir) = dir.or_else(|| env_path(env)) {
        let grid = DirectoryGrid::open(&dir)?;
        return Ok(Some(Arc::new(grid)));
    }
    if args.analytic {
        let wvl = band_wavelengths(range, args.analytic_step)?;
        let grid = AnalyticGrid::new(name, AnalyticGrid::default_axes(), wvl, masks)?;
        return Ok(Some(Arc::new(grid)));
    }
    Ok(None)
}

fn band_wavelengths(range: (f64, f64), step: f64) -> Result<Vec<f64>, AppError> {
    if !(step > 0.0) || !(range.1 > range.0) {
        return Err(AppError::new(
            2,
            "Grid wavelength range must be increasing with step > 0.",
        ));
    }
    let n = ((range.1 - range.0) / step + 1e-9).floor() as usize;
    Ok((0..n).map(|i| range.0 + step * i as f64).collect())
}

/// Read a record JSON, or build a record from a spectrum CSV and CLI metadata.
fn load_object(input: &Path, meta: &RecordMeta) -> Result<PfsObject, AppError> {
    let is_json = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let mut object = read_record_json(input)?;
        if meta.rv.is_some() {
            object.rv_kms = meta.rv;
        }
        return Ok(object);
    }

    let table = load_spectrum_csv(input)?;
    let id = ObjectId {
        cat_id: meta.cat_id,
        tract: meta.tract,
        patch: meta.patch.clone(),
        obj_id: meta.obj_id,
        visits: vec![],
    };
    let phot = Photometry {
        teffphot: meta.teffphot,
        teffphoterr: meta.teffphoterr,
        loggphot: meta.loggphot,
        loggphoterr: meta.loggphoterr,
        mbol: meta.mbol,
    };
    let mut object = PfsObject::new(id, table.spectrum, phot);
    object.rv_kms = meta.rv;
    Ok(object)
}

fn plot_window(opts: &PlotOptions) -> PlotWindow {
    let wvl_range = match (opts.plot_min, opts.plot_max) {
        (None, None) => None,
        (lo, hi) => Some((lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY))),
    };
    PlotWindow {
        width: opts.width,
        height: opts.height,
        wvl_range,
    }
}
