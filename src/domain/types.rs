//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - written to / read from JSON records
//! - flattened into catalog rows

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Spectrograph resolution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Low resolution (red arm LR grating).
    Lr,
    /// Medium resolution (red arm MR grating).
    Mr,
}

/// Spectrograph arm a pixel was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    Blue,
    Red,
    Nir,
}

/// A fitted atmospheric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    Teff,
    Logg,
    FeH,
    AlphaFe,
}

impl Param {
    pub const ALL: [Param; 4] = [Param::Teff, Param::Logg, Param::FeH, Param::AlphaFe];

    pub fn display_name(self) -> &'static str {
        match self {
            Param::Teff => "Teff",
            Param::Logg => "log g",
            Param::FeH => "[Fe/H]",
            Param::AlphaFe => "[alpha/Fe]",
        }
    }

    /// Forward-difference step used for Jacobian columns.
    ///
    /// Grid interpolation is piecewise linear, so the step only needs to be
    /// small compared to the node spacing.
    pub fn diff_step(self) -> f64 {
        match self {
            Param::Teff => 1.0,
            Param::Logg | Param::FeH | Param::AlphaFe => 0.005,
        }
    }
}

/// Which grid dimension carries an element's abundance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementDimension {
    /// Measured through `[alpha/Fe]` on the element's lines.
    Alpha,
    /// Measured through `[Fe/H]` on the element's lines, reported relative to iron.
    Metal,
}

/// Individual elements reported as `[X/Fe]`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
pub enum Element {
    Mg,
    Si,
    Ca,
    Ti,
    Cr,
    Mn,
    Co,
    Ni,
    Ba,
    Y,
}

impl Element {
    pub const ALL: [Element; 10] = [
        Element::Mg,
        Element::Si,
        Element::Ca,
        Element::Ti,
        Element::Cr,
        Element::Mn,
        Element::Co,
        Element::Ni,
        Element::Ba,
        Element::Y,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Element::Mg => "Mg",
            Element::Si => "Si",
            Element::Ca => "Ca",
            Element::Ti => "Ti",
            Element::Cr => "Cr",
            Element::Mn => "Mn",
            Element::Co => "Co",
            Element::Ni => "Ni",
            Element::Ba => "Ba",
            Element::Y => "Y",
        }
    }

    pub fn dimension(self) -> ElementDimension {
        match self {
            Element::Mg | Element::Si | Element::Ca | Element::Ti => ElementDimension::Alpha,
            _ => ElementDimension::Metal,
        }
    }

    pub fn is_alpha(self) -> bool {
        self.dimension() == ElementDimension::Alpha
    }
}

/// A point in the synthetic grid's parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Atmosphere {
    pub teff: f64,
    pub logg: f64,
    pub feh: f64,
    pub alphafe: f64,
}

impl Atmosphere {
    pub fn new(teff: f64, logg: f64, feh: f64, alphafe: f64) -> Self {
        Self {
            teff,
            logg,
            feh,
            alphafe,
        }
    }

    pub fn get(&self, param: Param) -> f64 {
        match param {
            Param::Teff => self.teff,
            Param::Logg => self.logg,
            Param::FeH => self.feh,
            Param::AlphaFe => self.alphafe,
        }
    }

    pub fn set(&mut self, param: Param, value: f64) {
        match param {
            Param::Teff => self.teff = value,
            Param::Logg => self.logg = value,
            Param::FeH => self.feh = value,
            Param::AlphaFe => self.alphafe = value,
        }
    }

    /// Copy of `self` with the listed parameters replaced by `values`.
    pub fn with(&self, params: &[Param], values: &[f64]) -> Self {
        let mut out = *self;
        for (&p, &v) in params.iter().zip(values) {
            out.set(p, v);
        }
        out
    }

    /// Microturbulent velocity (km/s) tied to surface gravity.
    pub fn microturbulence(&self) -> f64 {
        2.13 - 0.23 * self.logg
    }
}

impl fmt::Display for Atmosphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Teff={:.0} logg={:.2} [Fe/H]={:+.3} [alpha/Fe]={:+.3}",
            self.teff, self.logg, self.feh, self.alphafe
        )
    }
}

/// Survey identifiers of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectId {
    pub cat_id: u32,
    pub tract: u32,
    pub patch: String,
    pub obj_id: u64,
    #[serde(default)]
    pub visits: Vec<u32>,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:05}-{:05}-{}-{:016x}",
            self.cat_id, self.tract, self.patch, self.obj_id
        )
    }
}

/// One-dimensional combined spectrum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Wavelength (Angstrom), strictly increasing.
    pub wvl: Vec<f64>,
    pub flux: Vec<f64>,
    /// Inverse variance of `flux`; zero marks a bad pixel.
    pub ivar: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.wvl.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wvl.is_empty()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.wvl.is_empty() {
            return Err(AppError::new(3, "Spectrum has no pixels."));
        }
        if self.flux.len() != self.wvl.len() || self.ivar.len() != self.wvl.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Spectrum arrays differ in length: wvl={}, flux={}, ivar={}.",
                    self.wvl.len(),
                    self.flux.len(),
                    self.ivar.len()
                ),
            ));
        }
        if self.wvl.iter().any(|w| !w.is_finite()) {
            return Err(AppError::new(2, "Spectrum wavelengths must be finite."));
        }
        if self.wvl.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::new(
                2,
                "Spectrum wavelengths must be strictly increasing.",
            ));
        }
        Ok(())
    }

    /// Shift wavelengths into the rest frame for a radial velocity in km/s.
    pub fn to_rest_frame(&self, rv_kms: f64) -> Vec<f64> {
        const C_KMS: f64 = 299_792.458;
        let factor = 1.0 + rv_kms / C_KMS;
        self.wvl.iter().map(|w| w / factor).collect()
    }
}

/// Photometric inputs (already cross-matched upstream).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    pub teffphot: Option<f64>,
    pub teffphoterr: Option<f64>,
    pub loggphot: Option<f64>,
    pub loggphoterr: Option<f64>,
    /// Apparent bolometric magnitude.
    pub mbol: Option<f64>,
}

/// Continuum estimates in flux units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Continuum {
    pub initcont: Vec<f64>,
    pub refinedcont: Vec<f64>,
}

/// A value with an optional 1-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub error: Option<f64>,
}

impl Measurement {
    pub fn new(value: f64, error: Option<f64>) -> Self {
        Self { value, error }
    }
}

/// `[X/Fe]` for one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementRatio {
    pub element: Element,
    pub value: f64,
    pub error: Option<f64>,
    /// Pixels used in the element's fit.
    pub npix: usize,
}

/// Output of the abundance measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbundanceResult {
    pub teff: Measurement,
    pub logg: Measurement,
    /// Microturbulent velocity (km/s).
    pub vt: f64,
    pub feh: Measurement,
    pub alphafe: Measurement,
    #[serde(default)]
    pub elements: Vec<ElementRatio>,
    pub logg_fitted: bool,
    /// Whether the continuum refinement loop converged.
    pub converged: bool,
    pub iterations: usize,
    pub chi2: f64,
    pub reduced_chi2: f64,
    pub npix_feh: usize,
    pub npix_alpha: usize,
}

impl AbundanceResult {
    pub fn element(&self, element: Element) -> Option<&ElementRatio> {
        self.elements.iter().find(|e| e.element == element)
    }
}

/// The per-object record flowing through load -> fit -> write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PfsObject {
    pub id: ObjectId,
    /// Radial velocity (km/s) determined upstream; spectra are shifted to rest frame when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rv_kms: Option<f64>,
    pub spectrum: Spectrum,
    #[serde(default)]
    pub phot: Photometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuum: Option<Continuum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abund: Option<AbundanceResult>,
    /// Best-fit synthetic spectrum on the observed wavelengths (continuum-normalized).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synth: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl PfsObject {
    pub fn new(id: ObjectId, spectrum: Spectrum, phot: Photometry) -> Self {
        Self {
            id,
            rv_kms: None,
            spectrum,
            phot,
            continuum: None,
            abund: None,
            synth: None,
            processed_at: None,
        }
    }
}

/// Per-parameter thresholds ending the continuum refinement loop.
#[derive(Debug, Clone, Copy)]
pub struct Convergence {
    pub teff: f64,
    pub logg: f64,
    pub feh: f64,
    pub alphafe: f64,
}

impl Convergence {
    pub fn threshold(&self, param: Param) -> f64 {
        match param {
            Param::Teff => self.teff,
            Param::Logg => self.logg,
            Param::FeH => self.feh,
            Param::AlphaFe => self.alphafe,
        }
    }
}

/// Box bounds on the fitted parameters.
#[derive(Debug, Clone, Copy)]
pub struct ParamBounds {
    pub lower: Atmosphere,
    pub upper: Atmosphere,
}

impl ParamBounds {
    pub fn range(&self, param: Param) -> (f64, f64) {
        (self.lower.get(param), self.upper.get(param))
    }
}

/// Continuum estimation settings.
#[derive(Debug, Clone, Copy)]
pub struct ContinuumConfig {
    /// B-spline breakpoint spacing (Angstrom).
    pub breakpoint_spacing: f64,
    /// Residuals beyond this many sigma are rejected between passes.
    pub clip_sigma: f64,
    pub clip_iters: usize,
    /// Wavelength gaps wider than this (Angstrom) split the spectrum into independent segments.
    pub segment_gap: f64,
}

/// A full run's fitting configuration.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub mode: ResolutionMode,
    /// Treat `log g` as a free parameter instead of fixing it to photometry.
    pub fit_logg: bool,
    /// Distance modulus and its uncertainty, used for photometric gravity.
    pub dm: f64,
    pub ddm: f64,
    /// Cap on continuum refinement passes.
    pub max_iter: usize,
    pub convergence: Convergence,
    /// Weight of the photometric temperature datum, as an equivalent pixel count.
    pub flex_factor: f64,
    /// Starting point; `teff` is only used when no photometric temperature exists.
    pub start: Atmosphere,
    pub bounds: ParamBounds,
    pub continuum: ContinuumConfig,
    pub min_fit_pixels: usize,
    pub min_element_pixels: usize,
    pub elements: Vec<Element>,
    /// Scan coarse grid nodes for a starting point before the first fit.
    pub seed_scan: bool,
    /// Iteration cap for each Levenberg-Marquardt fit.
    pub lm_max_iter: usize,
    pub mask_file: Option<PathBuf>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::Mr,
            fit_logg: false,
            dm: 22.0,
            ddm: 0.1,
            max_iter: 50,
            convergence: Convergence {
                teff: 1.0,
                logg: 0.001,
                feh: 0.001,
                alphafe: 0.001,
            },
            flex_factor: 400.0,
            start: Atmosphere::new(4500.0, 1.0, -2.0, 0.0),
            bounds: ParamBounds {
                lower: Atmosphere::new(3500.0, 0.0, -4.5, -0.8),
                upper: Atmosphere::new(8000.0, 5.0, 0.0, 1.2),
            },
            continuum: ContinuumConfig {
                breakpoint_spacing: 150.0,
                clip_sigma: 3.0,
                clip_iters: 5,
                segment_gap: 50.0,
            },
            min_fit_pixels: 10,
            min_element_pixels: 5,
            elements: Element::ALL.to_vec(),
            seed_scan: true,
            lm_max_iter: 100,
            mask_file: None,
        }
    }
}
