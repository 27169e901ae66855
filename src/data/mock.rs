//! Mock spectra drawn from the synthetic library.
//!
//! A mock object is the smoothed synthesis at known parameters, multiplied by
//! a gently curved continuum, plus Gaussian noise at a fixed signal-to-noise
//! ratio. The photometric inputs are set to the true values so the record can
//! be fitted as-is.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Atmosphere, ObjectId, Photometry, PfsObject, ResolutionMode, Spectrum};
use crate::error::AppError;
use crate::fit::SpectrumModel;
use crate::grid::SynthLibrary;
use crate::instrument::dispersion_sigma;

const C_KMS: f64 = 299_792.458;

#[derive(Debug, Clone)]
pub struct MockSpec {
    pub atm: Atmosphere,
    /// Rest-frame wavelength range and pixel step (Angstrom).
    pub wvl_start: f64,
    pub wvl_end: f64,
    pub wvl_step: f64,
    /// Per-pixel signal-to-noise at the continuum.
    pub snr: f64,
    pub continuum_level: f64,
    pub rv_kms: f64,
    pub mode: ResolutionMode,
    pub seed: u64,
    pub teff_err: f64,
    pub logg_err: f64,
}

impl MockSpec {
    pub fn new(atm: Atmosphere, wvl_start: f64, wvl_end: f64) -> Self {
        Self {
            atm,
            wvl_start,
            wvl_end,
            wvl_step: 0.4,
            snr: 100.0,
            continuum_level: 1000.0,
            rv_kms: 0.0,
            mode: ResolutionMode::Mr,
            seed: 42,
            teff_err: 100.0,
            logg_err: 0.1,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if !(self.wvl_step > 0.0) || !(self.wvl_end > self.wvl_start) {
            return Err(AppError::new(2, "Mock wavelength range must be increasing with step > 0."));
        }
        if !(self.snr > 0.0) || !(self.continuum_level > 0.0) {
            return Err(AppError::new(2, "Mock S/N and continuum level must be > 0."));
        }
        if !self.rv_kms.is_finite() {
            return Err(AppError::new(2, "Mock radial velocity must be finite."));
        }
        Ok(())
    }
}

/// Simulate an observed object for `id`.
pub fn simulate(library: &SynthLibrary, spec: &MockSpec, id: ObjectId) -> Result<PfsObject, AppError> {
    spec.validate()?;

    let npix = ((spec.wvl_end - spec.wvl_start) / spec.wvl_step + 1e-9).floor() as usize + 1;
    let rest: Vec<f64> = (0..npix)
        .map(|i| spec.wvl_start + spec.wvl_step * i as f64)
        .collect();
    let dispersion = dispersion_sigma(&rest, spec.mode);
    let synth = SpectrumModel::new(library, &rest, &dispersion).synthesize_all(&spec.atm)?;

    let mut rng = StdRng::seed_from_u64(mock_seed(spec.seed, &id));
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let mid = 0.5 * (spec.wvl_start + spec.wvl_end);
    let half = 0.5 * (spec.wvl_end - spec.wvl_start);
    let mut flux = Vec::with_capacity(npix);
    let mut ivar = Vec::with_capacity(npix);
    for (&w, &s) in rest.iter().zip(&synth) {
        let u = (w - mid) / half;
        let cont = spec.continuum_level * (1.0 + 0.15 * u - 0.1 * u * u);
        let sigma = cont / spec.snr;
        flux.push(cont * s + sigma * normal.sample(&mut rng));
        ivar.push(1.0 / (sigma * sigma));
    }

    let factor = 1.0 + spec.rv_kms / C_KMS;
    let spectrum = Spectrum {
        wvl: rest.iter().map(|w| w * factor).collect(),
        flux,
        ivar,
    };
    let phot = Photometry {
        teffphot: Some(spec.atm.teff),
        teffphoterr: Some(spec.teff_err),
        loggphot: Some(spec.atm.logg),
        loggphoterr: Some(spec.logg_err),
        mbol: None,
    };

    let mut object = PfsObject::new(id, spectrum, phot);
    object.rv_kms = (spec.rv_kms != 0.0).then_some(spec.rv_kms);
    tracing::debug!(object = %object.id, npix, atm = %spec.atm, "simulated spectrum");
    Ok(object)
}

fn mock_seed(seed: u64, id: &ObjectId) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    id.cat_id.hash(&mut hasher);
    id.tract.hash(&mut hasher);
    id.patch.hash(&mut hasher);
    id.obj_id.hash(&mut hasher);
    hasher.finish()
}
