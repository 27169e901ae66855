//! Grid storage backends.
//!
//! A grid is a set of continuum-normalized synthetic spectra sharing one
//! wavelength array, one per node of a 4-D parameter lattice. Backends differ in
//! where node fluxes come from:
//!
//! - `MemoryGrid`: every node held in memory
//! - `DirectoryGrid`: a `grid.json` manifest plus one text file per node,
//!   loaded on first use and cached

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::domain::Atmosphere;
use crate::error::AppError;
use crate::grid::axes::{GridAxes, NodeIndex};

/// Manifest file name inside a grid directory.
pub const MANIFEST_FILE: &str = "grid.json";

/// Read access to a synthetic grid.
pub trait GridSource: Send + Sync {
    fn name(&self) -> &str;
    fn axes(&self) -> &GridAxes;
    /// Wavelengths (Angstrom) shared by every node.
    fn wavelength(&self) -> &[f64];
    fn node_flux(&self, node: NodeIndex) -> Result<Arc<Vec<f64>>, AppError>;
}

/// A grid held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryGrid {
    name: String,
    axes: GridAxes,
    wvl: Vec<f64>,
    fluxes: HashMap<NodeIndex, Arc<Vec<f64>>>,
}

impl MemoryGrid {
    pub fn new(name: impl Into<String>, axes: GridAxes, wvl: Vec<f64>) -> Result<Self, AppError> {
        axes.validate()?;
        Ok(Self {
            name: name.into(),
            axes,
            wvl,
            fluxes: HashMap::new(),
        })
    }

    /// Build every node with `f(node_atmosphere, wavelengths)`.
    pub fn from_fn(
        name: impl Into<String>,
        axes: GridAxes,
        wvl: Vec<f64>,
        f: impl Fn(&Atmosphere, &[f64]) -> Vec<f64>,
    ) -> Result<Self, AppError> {
        let mut grid = Self::new(name, axes, wvl)?;
        for idx in grid.axes.node_indices() {
            let flux = f(&grid.axes.node(idx), &grid.wvl);
            grid.insert(idx, flux)?;
        }
        Ok(grid)
    }

    pub fn insert(&mut self, node: NodeIndex, flux: Vec<f64>) -> Result<(), AppError> {
        if flux.len() != self.wvl.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Node flux has {} pixels, grid '{}' expects {}.",
                    flux.len(),
                    self.name,
                    self.wvl.len()
                ),
            ));
        }
        self.fluxes.insert(node, Arc::new(flux));
        Ok(())
    }
}

impl GridSource for MemoryGrid {
    fn name(&self) -> &str {
        &self.name
    }

    fn axes(&self) -> &GridAxes {
        &self.axes
    }

    fn wavelength(&self) -> &[f64] {
        &self.wvl
    }

    fn node_flux(&self, node: NodeIndex) -> Result<Arc<Vec<f64>>, AppError> {
        self.fluxes.get(&node).cloned().ok_or_else(|| {
            AppError::new(
                4,
                format!("Grid '{}' has no node {}.", self.name, self.axes.node(node)),
            )
        })
    }
}

/// Contents of `grid.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridManifest {
    pub name: String,
    pub wvl_start: f64,
    pub wvl_step: f64,
    pub npix: usize,
    pub axes: GridAxes,
}

impl GridManifest {
    pub fn wavelength(&self) -> Vec<f64> {
        (0..self.npix)
            .map(|i| self.wvl_start + self.wvl_step * i as f64)
            .collect()
    }
}

/// File name holding the flux of the node at `atm`.
pub fn node_file_name(atm: &Atmosphere) -> String {
    format!(
        "t{:.0}_g{:.2}_f{:+.2}_a{:+.2}.dat",
        atm.teff, atm.logg, atm.feh, atm.alphafe
    )
}

/// A grid stored as a directory of per-node text files.
pub struct DirectoryGrid {
    dir: PathBuf,
    manifest: GridManifest,
    wvl: Vec<f64>,
    cache: RwLock<HashMap<NodeIndex, Arc<Vec<f64>>>>,
}

impl DirectoryGrid {
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        let path = dir.join(MANIFEST_FILE);
        let file = File::open(&path).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to open grid manifest '{}': {e}", path.display()),
            )
        })?;
        let manifest: GridManifest = serde_json::from_reader(file).map_err(|e| {
            AppError::new(
                2,
                format!("Invalid grid manifest '{}': {e}", path.display()),
            )
        })?;
        manifest.axes.validate()?;
        if manifest.npix == 0 || !(manifest.wvl_step > 0.0) {
            return Err(AppError::new(
                2,
                format!(
                    "Grid manifest '{}' needs npix > 0 and wvl_step > 0.",
                    path.display()
                ),
            ));
        }

        tracing::debug!(
            grid = %manifest.name,
            nodes = manifest.axes.n_nodes(),
            npix = manifest.npix,
            "opened grid directory"
        );

        let wvl = manifest.wavelength();
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            wvl,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Number of nodes currently held in memory.
    pub fn cached_nodes(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn read_node(&self, node: NodeIndex) -> Result<Vec<f64>, AppError> {
        let atm = self.manifest.axes.node(node);
        let path = self.dir.join(node_file_name(&atm));
        let text = fs::read_to_string(&path).map_err(|e| {
            AppError::new(
                4,
                format!("Failed to read grid node '{}': {e}", path.display()),
            )
        })?;
        let flux = text
            .split_whitespace()
            .map(|tok| tok.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| {
                AppError::new(4, format!("Invalid flux in '{}': {e}", path.display()))
            })?;
        if flux.len() != self.manifest.npix {
            return Err(AppError::new(
                4,
                format!(
                    "Grid node '{}' has {} pixels, manifest says {}.",
                    path.display(),
                    flux.len(),
                    self.manifest.npix
                ),
            ));
        }
        Ok(flux)
    }
}

impl GridSource for DirectoryGrid {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn axes(&self) -> &GridAxes {
        &self.manifest.axes
    }

    fn wavelength(&self) -> &[f64] {
        &self.wvl
    }

    fn node_flux(&self, node: NodeIndex) -> Result<Arc<Vec<f64>>, AppError> {
        if let Some(flux) = self
            .cache
            .read()
            .map_err(|_| AppError::new(4, "Grid cache lock poisoned."))?
            .get(&node)
        {
            return Ok(Arc::clone(flux));
        }

        let flux = Arc::new(self.read_node(node)?);
        let mut cache = self
            .cache
            .write()
            .map_err(|_| AppError::new(4, "Grid cache lock poisoned."))?;
        Ok(Arc::clone(cache.entry(node).or_insert(flux)))
    }
}

/// Write any grid to `dir` in the `DirectoryGrid` layout.
///
/// The source's wavelengths must be evenly spaced.
pub fn write_grid_directory(dir: &Path, source: &dyn GridSource) -> Result<GridManifest, AppError> {
    let wvl = source.wavelength();
    if wvl.len() < 2 {
        return Err(AppError::new(2, "Grid needs at least two wavelength pixels."));
    }
    let wvl_step = (wvl[wvl.len() - 1] - wvl[0]) / (wvl.len() - 1) as f64;
    let uneven = wvl
        .windows(2)
        .any(|w| ((w[1] - w[0]) - wvl_step).abs() > 1e-6 * wvl_step.abs().max(1e-12));
    if uneven {
        return Err(AppError::new(
            2,
            "Grid wavelengths must be evenly spaced to be written as a directory.",
        ));
    }

    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(2, format!("Failed to create grid dir '{}': {e}", dir.display()))
    })?;

    let manifest = GridManifest {
        name: source.name().to_string(),
        wvl_start: wvl[0],
        wvl_step,
        npix: wvl.len(),
        axes: source.axes().clone(),
    };

    let path = dir.join(MANIFEST_FILE);
    let file = File::create(&path).map_err(|e| {
        AppError::new(2, format!("Failed to create '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, &manifest)
        .map_err(|e| AppError::new(2, format!("Failed to write grid manifest: {e}")))?;

    for idx in manifest.axes.node_indices() {
        let flux = source.node_flux(idx)?;
        let path = dir.join(node_file_name(&manifest.axes.node(idx)));
        let file = File::create(&path).map_err(|e| {
            AppError::new(2, format!("Failed to create '{}': {e}", path.display()))
        })?;
        let mut out = BufWriter::new(file);
        for v in flux.iter() {
            writeln!(out, "{v:.6}")
                .map_err(|e| AppError::new(2, format!("Failed to write grid node: {e}")))?;
        }
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_axes() -> GridAxes {
        GridAxes {
            teff: vec![4000.0, 5000.0],
            logg: vec![1.0],
            feh: vec![-2.0, -1.0],
            alphafe: vec![0.0],
        }
    }

    fn small_grid() -> MemoryGrid {
        let wvl: Vec<f64> = (0..5).map(|i| 8000.0 + i as f64).collect();
        MemoryGrid::from_fn("test", small_axes(), wvl, |atm, wvl| {
            wvl.iter().map(|_| 1.0 + atm.feh / 10.0 - atm.teff / 1e5).collect()
        })
        .unwrap()
    }

    #[test]
    fn node_file_name_is_stable() {
        let name = node_file_name(&Atmosphere::new(4500.0, 1.5, -2.0, 0.3));
        assert_eq!(name, "t4500_g1.50_f-2.00_a+0.30.dat");
    }

    #[test]
    fn memory_grid_rejects_wrong_length() {
        let mut grid = MemoryGrid::new("x", small_axes(), vec![1.0, 2.0]).unwrap();
        assert_eq!(grid.insert([0, 0, 0, 0], vec![1.0]).unwrap_err().exit_code(), 2);
        assert!(grid.node_flux([1, 0, 0, 0]).is_err());
    }

    #[test]
    fn directory_grid_round_trip_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let grid = small_grid();
        let manifest = write_grid_directory(dir.path(), &grid).unwrap();
        assert_eq!(manifest.npix, 5);

        let loaded = DirectoryGrid::open(dir.path()).unwrap();
        assert_eq!(loaded.name(), "test");
        assert_eq!(loaded.cached_nodes(), 0);
        let a = loaded.node_flux([1, 0, 1, 0]).unwrap();
        let b = grid.node_flux([1, 0, 1, 0]).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
        loaded.node_flux([1, 0, 1, 0]).unwrap();
        assert_eq!(loaded.cached_nodes(), 1);
        assert!((loaded.wavelength()[4] - 8004.0).abs() < 1e-9);
    }

    #[test]
    fn missing_manifest_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryGrid::open(dir.path()).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
