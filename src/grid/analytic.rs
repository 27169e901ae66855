//! Grid whose node spectra are computed from a simple line-formation model.
//!
//! Every line in a `MaskSet` gets a Gaussian absorption profile whose depth
//! saturates with abundance and depends on temperature and gravity. The model
//! is deterministic and smooth in all four parameters, which is enough to run
//! the full pipeline (and its tests) without a grid on disk.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::{Atmosphere, Element};
use crate::error::AppError;
use crate::grid::axes::{GridAxes, NodeIndex, linspace_nodes};
use crate::grid::store::GridSource;
use crate::mask::MaskSet;

const LINE_STRENGTH: f64 = 30.0;
const MAX_DEPTH: f64 = 0.8;
const THETA_REF: f64 = 5040.0 / 4500.0;
/// Excitation potentials (eV) cycled over each species' line list.
const EXCITATION: [f64; 5] = [0.0, 1.0, 2.2, 3.4, 4.5];

#[derive(Debug, Clone, Copy)]
struct Line {
    center: f64,
    /// `None` for iron.
    element: Option<Element>,
    excitation: f64,
}

pub struct AnalyticGrid {
    name: String,
    axes: GridAxes,
    wvl: Vec<f64>,
    lines: Vec<Line>,
    cache: RwLock<HashMap<NodeIndex, Arc<Vec<f64>>>>,
}

impl AnalyticGrid {
    pub fn new(
        name: impl Into<String>,
        axes: GridAxes,
        wvl: Vec<f64>,
        masks: &MaskSet,
    ) -> Result<Self, AppError> {
        axes.validate()?;
        if wvl.is_empty() || wvl.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::new(
                2,
                "Analytic grid wavelengths must be non-empty and increasing.",
            ));
        }

        let with_excitation = |centers: &[f64], element: Option<Element>| {
            centers
                .iter()
                .enumerate()
                .map(|(i, &center)| Line {
                    center,
                    element,
                    excitation: EXCITATION[i % EXCITATION.len()],
                })
                .collect::<Vec<_>>()
        };
        let mut lines = with_excitation(&masks.fe_lines, None);
        for (&element, centers) in &masks.element_lines {
            lines.extend(with_excitation(centers, Some(element)));
        }
        lines.sort_by(|a, b| a.center.total_cmp(&b.center));

        Ok(Self {
            name: name.into(),
            axes,
            wvl,
            lines,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Default axes spanning the fit bounds.
    pub fn default_axes() -> GridAxes {
        GridAxes {
            teff: linspace_nodes(3500.0, 8000.0, 250.0),
            logg: linspace_nodes(0.0, 5.0, 0.5),
            feh: linspace_nodes(-4.5, 0.0, 0.25),
            alphafe: linspace_nodes(-0.8, 1.2, 0.2),
        }
    }

    /// Normalized flux of the model evaluated directly at `atm`.
    pub fn spectrum_at(&self, atm: &Atmosphere) -> Vec<f64> {
        let theta = 5040.0 / atm.teff;
        let sigma = 0.2 + 0.05 * atm.microturbulence().max(0.0);
        let gravity = 10f64.powf(-0.1 * (atm.logg - 2.5));
        let reach = 5.0 * sigma;

        let mut flux = vec![1.0; self.wvl.len()];
        for line in &self.lines {
            let abundance = match line.element {
                Some(e) if e.is_alpha() => atm.feh + atm.alphafe,
                _ => atm.feh,
            };
            let kappa = LINE_STRENGTH
                * 10f64.powf(abundance)
                * 10f64.powf(-(theta - THETA_REF) * line.excitation)
                * gravity;
            let depth = MAX_DEPTH * kappa / (1.0 + kappa);

            let start = self.wvl.partition_point(|&w| w < line.center - reach);
            let end = self.wvl.partition_point(|&w| w <= line.center + reach);
            for (f, &w) in flux[start..end].iter_mut().zip(&self.wvl[start..end]) {
                let z = (w - line.center) / sigma;
                *f *= 1.0 - depth * (-0.5 * z * z).exp();
            }
        }
        flux
    }
}

impl GridSource for AnalyticGrid {
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
        if let Some(flux) = self
            .cache
            .read()
            .map_err(|_| AppError::new(4, "Grid cache lock poisoned."))?
            .get(&node)
        {
            return Ok(Arc::clone(flux));
        }

        let in_range = node.iter().zip(self.axes.shape()).all(|(&i, n)| i < n);
        if !in_range {
            return Err(AppError::new(
                4,
                format!("Grid '{}' has no node {node:?}.", self.name),
            ));
        }

        let flux = Arc::new(self.spectrum_at(&self.axes.node(node)));
        let mut cache = self
            .cache
            .write()
            .map_err(|_| AppError::new(4, "Grid cache lock poisoned."))?;
        Ok(Arc::clone(cache.entry(node).or_insert(flux)))
    }
}
