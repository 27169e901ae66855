//! Synthetic model on observed pixels and single parameter-subset fits.

use crate::domain::{Atmosphere, Measurement, Param, Spectrum};
use crate::error::AppError;
use crate::fit::lm::{LmBounds, LmOptions, levenberg_marquardt};
use crate::grid::{BLUE_BAND, RED_BAND, SynthLibrary};
use crate::math::smooth_gauss;

/// Extra synthetic range on each side of the requested pixels, in units of the
/// widest dispersion.
const PAD_SIGMAS: f64 = 4.0;

/// Grid synthesis smoothed to the instrument, evaluated on observed pixels.
pub struct SpectrumModel<'a> {
    library: &'a SynthLibrary,
    wvl: &'a [f64],
    dispersion: &'a [f64],
}

impl<'a> SpectrumModel<'a> {
    pub fn new(library: &'a SynthLibrary, wvl: &'a [f64], dispersion: &'a [f64]) -> Self {
        Self {
            library,
            wvl,
            dispersion,
        }
    }

    /// Normalized model flux at the pixels `idx`.
    ///
    /// Pixels in a band without a configured grid, or outside the synthetic
    /// range, come back as `1.0`.
    pub fn synthesize(&self, atm: &Atmosphere, idx: &[usize]) -> Result<Vec<f64>, AppError> {
        if idx.is_empty() {
            return Ok(Vec::new());
        }
        let wvl: Vec<f64> = idx.iter().map(|&i| self.wvl[i]).collect();
        let sigma: Vec<f64> = idx.iter().map(|&i| self.dispersion[i]).collect();

        let in_band = |band: (f64, f64)| wvl.iter().any(|&w| w >= band.0 && w < band.1);
        let use_blue = self.library.has_blue() && in_band(BLUE_BAND);
        let use_red = self.library.has_red() && in_band(RED_BAND);
        if !use_blue && !use_red {
            return Ok(vec![1.0; idx.len()]);
        }

        let pad = PAD_SIGMAS * sigma.iter().copied().fold(0.0, f64::max) + 1.0;
        let lo = wvl.iter().copied().fold(f64::INFINITY, f64::min) - pad;
        let hi = wvl.iter().copied().fold(f64::NEG_INFINITY, f64::max) + pad;

        let (wvl_synth, synth) = self.library.construct(atm, lo, hi, use_blue, use_red)?;
        Ok(smooth_gauss(&wvl_synth, &synth, &wvl, &sigma))
    }

    /// Model flux on every observed pixel.
    pub fn synthesize_all(&self, atm: &Atmosphere) -> Result<Vec<f64>, AppError> {
        let idx: Vec<usize> = (0..self.wvl.len()).collect();
        self.synthesize(atm, &idx)
    }
}

/// Observed spectrum divided by a continuum.
#[derive(Debug, Clone)]
pub struct NormalizedSpectrum {
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl NormalizedSpectrum {
    pub fn new(spectrum: &Spectrum, continuum: &[f64]) -> Self {
        let (flux, ivar) = spectrum
            .flux
            .iter()
            .zip(&spectrum.ivar)
            .zip(continuum)
            .map(|((&f, &iv), &c)| (f / c, iv * c * c))
            .unzip();
        Self { flux, ivar }
    }

    pub fn sigma(&self, i: usize) -> f64 {
        1.0 / self.ivar[i].sqrt()
    }

    /// Chi-squared of `model` against the pixels `idx`.
    pub fn chi2(&self, idx: &[usize], model: &[f64]) -> f64 {
        idx.iter()
            .zip(model)
            .map(|(&i, m)| {
                let r = self.flux[i] - m;
                r * r * self.ivar[i]
            })
            .sum()
    }
}

/// A Gaussian prior on `Teff`, appended to the data as one extra point.
#[derive(Debug, Clone, Copy)]
pub struct TeffPrior {
    pub value: f64,
    pub sigma: f64,
}

/// What to fit: free parameters, their bounds, and the fixed remainder.
#[derive(Debug, Clone)]
pub struct FitRequest<'p> {
    pub base: Atmosphere,
    pub params: &'p [Param],
    pub bounds: &'p [(f64, f64)],
    pub prior: Option<TeffPrior>,
}

#[derive(Debug, Clone)]
pub struct ParamFit {
    pub atm: Atmosphere,
    /// Errors of the free parameters, in request order.
    pub errors: Vec<Option<f64>>,
    pub chi2: f64,
    pub npix: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl ParamFit {
    pub fn measurement(&self, params: &[Param], param: Param) -> Measurement {
        let error = params
            .iter()
            .position(|&p| p == param)
            .and_then(|k| self.errors[k]);
        Measurement::new(self.atm.get(param), error)
    }
}

/// Fit the requested parameters to `obs` on pixels `idx`, starting from `request.base`.
pub fn fit_parameters(
    model: &SpectrumModel<'_>,
    obs: &NormalizedSpectrum,
    idx: &[usize],
    request: &FitRequest<'_>,
    opts: &LmOptions,
) -> Result<ParamFit, AppError> {
    let params = request.params;
    let base = request.base;

    let mut y: Vec<f64> = idx.iter().map(|&i| obs.flux[i]).collect();
    let mut sigma: Vec<f64> = idx.iter().map(|&i| obs.sigma(i)).collect();
    let teff_slot = match request.prior {
        Some(prior) if params.contains(&Param::Teff) => {
            y.push(prior.value);
            sigma.push(prior.sigma);
            params.iter().position(|&p| p == Param::Teff)
        }
        _ => None,
    };

    let p0: Vec<f64> = params.iter().map(|&p| base.get(p)).collect();
    let bounds = LmBounds {
        lower: request.bounds.iter().map(|b| b.0).collect(),
        upper: request.bounds.iter().map(|b| b.1).collect(),
        steps: params.iter().map(|p| p.diff_step()).collect(),
    };

    let fit = levenberg_marquardt(
        |p| {
            let mut out = model.synthesize(&base.with(params, p), idx)?;
            if let Some(k) = teff_slot {
                out.push(p[k]);
            }
            Ok(out)
        },
        &y,
        &sigma,
        &p0,
        &bounds,
        opts,
    )?;

    Ok(ParamFit {
        atm: base.with(params, &fit.params),
        errors: (0..params.len()).map(|k| fit.error(k)).collect(),
        chi2: fit.chi2,
        npix: idx.len(),
        iterations: fit.iterations,
        converged: fit.converged,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::grid::{AnalyticGrid, GridAxes, GridSource, linspace_nodes};
    use crate::instrument::dispersion_sigma;
    use crate::mask::MaskSet;
    use crate::domain::ResolutionMode;

    /// Small analytic red grid around the calcium triplet.
    pub(crate) fn red_library() -> SynthLibrary {
        let axes = GridAxes {
            teff: linspace_nodes(4000.0, 5000.0, 250.0),
            logg: linspace_nodes(0.5, 2.5, 0.5),
            feh: linspace_nodes(-3.0, -0.5, 0.25),
            alphafe: linspace_nodes(-0.4, 0.8, 0.2),
        };
        let wvl: Vec<f64> = (0..6000).map(|i| 8300.0 + 0.1 * i as f64).collect();
        let grid = AnalyticGrid::new("red", axes, wvl, &MaskSet::default()).unwrap();
        let grid: Arc<dyn GridSource> = Arc::new(grid);
        SynthLibrary::new(None, Some(grid)).unwrap()
    }

    pub(crate) fn observed_wvl() -> Vec<f64> {
        (0..1200).map(|i| 8320.0 + 0.45 * i as f64).collect()
    }

    #[test]
    fn synthesize_is_continuum_away_from_lines_and_grids() {
        let lib = red_library();
        let wvl = vec![5000.0, 8480.0, 8542.09];
        let sigma = dispersion_sigma(&wvl, ResolutionMode::Mr);
        let model = SpectrumModel::new(&lib, &wvl, &sigma);
        let flux = model
            .synthesize_all(&Atmosphere::new(4500.0, 1.5, -1.0, 0.2))
            .unwrap();
        assert_eq!(flux[0], 1.0);
        assert!((flux[1] - 1.0).abs() < 1e-3);
        assert!(flux[2] < 0.95);
    }

    #[test]
    fn recovers_metallicity_from_noiseless_spectrum() {
        let lib = red_library();
        let wvl = observed_wvl();
        let sigma = dispersion_sigma(&wvl, ResolutionMode::Mr);
        let model = SpectrumModel::new(&lib, &wvl, &sigma);
        let truth = Atmosphere::new(4500.0, 1.5, -1.5, 0.2);
        let flux = model.synthesize_all(&truth).unwrap();
        let spectrum = Spectrum {
            wvl: wvl.clone(),
            flux,
            ivar: vec![1e4; wvl.len()],
        };
        let obs = NormalizedSpectrum::new(&spectrum, &vec![1.0; wvl.len()]);
        let idx: Vec<usize> = (0..wvl.len()).collect();

        let params = [Param::FeH];
        let request = FitRequest {
            base: Atmosphere::new(4500.0, 1.5, -2.2, 0.2),
            params: &params,
            bounds: &[(-3.0, -0.5)],
            prior: None,
        };
        let fit = fit_parameters(&model, &obs, &idx, &request, &LmOptions::default()).unwrap();
        assert!((fit.atm.feh + 1.5).abs() < 0.01, "feh={}", fit.atm.feh);
        assert!(fit.measurement(&params, Param::FeH).error.unwrap() > 0.0);
        assert_eq!(fit.measurement(&params, Param::Teff).error, None);
    }

    #[test]
    fn teff_prior_pulls_unconstrained_temperature() {
        let lib = red_library();
        let wvl = vec![8480.0, 8481.0, 8482.0];
        let sigma = dispersion_sigma(&wvl, ResolutionMode::Mr);
        let model = SpectrumModel::new(&lib, &wvl, &sigma);
        let spectrum = Spectrum {
            wvl: wvl.clone(),
            flux: vec![1.0; 3],
            ivar: vec![1.0; 3],
        };
        let obs = NormalizedSpectrum::new(&spectrum, &[1.0; 3]);
        let params = [Param::Teff];
        let request = FitRequest {
            base: Atmosphere::new(4200.0, 1.5, -1.5, 0.0),
            params: &params,
            bounds: &[(4000.0, 5000.0)],
            prior: Some(TeffPrior {
                value: 4700.0,
                sigma: 50.0,
            }),
        };
        let fit = fit_parameters(&model, &obs, &[0, 1, 2], &request, &LmOptions::default())
            .unwrap();
        assert!((fit.atm.teff - 4700.0).abs() < 1.0);
    }
}
