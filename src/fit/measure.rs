//! Full abundance measurement for one object.
//!
//! Sequence:
//!
//! - rest-frame shift, photometric priors, masks, initial continuum
//! - loop: fit Teff/[Fe/H] (+ log g), fit [alpha/Fe], refine the continuum
//! - re-fit [Fe/H], [alpha/Fe], [Fe/H] against the final continuum
//! - individual element ratios
//! - write everything back into the record

use chrono::Utc;

use crate::continuum::{normalize, refine};
use crate::domain::{
    AbundanceResult, Atmosphere, Continuum, FitConfig, Measurement, Param, ParamBounds, PfsObject,
};
use crate::error::AppError;
use crate::fit::elements::{ElementFitInput, fit_elements};
use crate::fit::lm::LmOptions;
use crate::fit::model::{FitRequest, NormalizedSpectrum, SpectrumModel, TeffPrior, fit_parameters};
use crate::fit::seed::{best_seed, candidate_grid};
use crate::grid::SynthLibrary;
use crate::instrument::dispersion_sigma;
use crate::mask::{FitMasks, MaskSet, count, indices};
use crate::phot::{self, ResolvedPhotometry};

/// Measures stellar parameters and abundances against a synthetic library.
pub struct AbundanceFitter<'a> {
    library: &'a SynthLibrary,
    masks: &'a MaskSet,
    config: &'a FitConfig,
}

impl<'a> AbundanceFitter<'a> {
    pub fn new(library: &'a SynthLibrary, masks: &'a MaskSet, config: &'a FitConfig) -> Self {
        Self {
            library,
            masks,
            config,
        }
    }

    /// Fit `object` in place.
    ///
    /// On success the record gains `continuum`, `synth`, `abund` and
    /// `processed_at`. On error the record is left untouched.
    #[tracing::instrument(skip_all, fields(object = %object.id))]
    pub fn measure(&self, object: &mut PfsObject) -> Result<(), AppError> {
        let cfg = self.config;
        object.spectrum.validate()?;
        let spectrum = &object.spectrum;

        let wvl = match object.rv_kms {
            Some(rv) if rv.is_finite() => spectrum.to_rest_frame(rv),
            _ => spectrum.wvl.clone(),
        };

        let phot = phot::resolve(&object.phot, cfg.dm, cfg.ddm);
        if !cfg.fit_logg && phot.logg.is_none() {
            return Err(AppError::new(
                2,
                "log g is fixed to photometry but the record has no photometric gravity \
                 (loggphot, or teffphot with mbol).",
            ));
        }

        let dispersion = dispersion_sigma(&wvl, cfg.mode);
        let fm = FitMasks::build(&wvl, spectrum, self.masks);
        self.check_coverage(&fm)?;

        let feh_idx = indices(&fm.feh);
        let alpha_idx = indices(&fm.alpha);
        for (label, n) in [("Fe", feh_idx.len()), ("alpha", alpha_idx.len())] {
            if n < cfg.min_fit_pixels {
                return Err(AppError::new(
                    3,
                    format!(
                        "Only {n} usable {label} pixels (need {}).",
                        cfg.min_fit_pixels
                    ),
                ));
            }
        }
        tracing::debug!(
            npix = spectrum.len(),
            spec = count(&fm.spec),
            feh = feh_idx.len(),
            alpha = alpha_idx.len(),
            continuum = count(&fm.continuum),
            "built masks"
        );

        let initcont = normalize(&wvl, spectrum, &fm.continuum, &cfg.continuum)?;
        let mut refined = initcont.clone();

        let bounds = self.effective_bounds()?;
        let model = SpectrumModel::new(self.library, &wvl, &dispersion);
        let lm = LmOptions {
            max_iter: cfg.lm_max_iter,
            ..LmOptions::default()
        };

        let prior = phot.teff.map(|t| TeffPrior {
            value: t.value,
            sigma: t.error.unwrap_or(phot::DEFAULT_TEFF_ERR)
                * (cfg.flex_factor / feh_idx.len() as f64).sqrt(),
        });
        let main_params: Vec<Param> = if cfg.fit_logg {
            vec![Param::Teff, Param::Logg, Param::FeH]
        } else {
            vec![Param::Teff, Param::FeH]
        };
        let main_bounds: Vec<(f64, f64)> = main_params.iter().map(|&p| bounds.range(p)).collect();

        let mut atm = clamp_to(&self.start(&phot), &bounds);
        if cfg.seed_scan {
            let obs = NormalizedSpectrum::new(spectrum, &refined);
            atm = self.seed(&model, &obs, &feh_idx, atm, &bounds, phot.teff.is_none())?;
        }

        // Continuum refinement loop.
        let mut teff = Measurement::new(atm.teff, None);
        let mut logg_err = None;
        let mut converged = false;
        let mut iterations = 0;
        while iterations < cfg.max_iter {
            iterations += 1;
            let obs = NormalizedSpectrum::new(spectrum, &refined);

            let main = fit_parameters(
                &model,
                &obs,
                &feh_idx,
                &FitRequest {
                    base: atm,
                    params: &main_params,
                    bounds: &main_bounds,
                    prior,
                },
                &lm,
            )?;
            let alpha_params = [Param::AlphaFe];
            let alpha = fit_parameters(
                &model,
                &obs,
                &alpha_idx,
                &FitRequest {
                    base: restart(main.atm, Param::AlphaFe, cfg.start.alphafe, &bounds),
                    params: &alpha_params,
                    bounds: &[bounds.range(Param::AlphaFe)],
                    prior: None,
                },
                &lm,
            )?;
            let next = alpha.atm;
            teff = main.measurement(&main_params, Param::Teff);
            logg_err = main.measurement(&main_params, Param::Logg).error;

            let synth = model.synthesize_all(&next)?;
            refined = refine(&wvl, spectrum, &synth, &fm.spec, &cfg.continuum)?;

            tracing::debug!(iteration = iterations, atm = %next, "continuum pass");

            let done = Param::ALL
                .iter()
                .filter(|&&p| p != Param::Logg || cfg.fit_logg)
                .all(|&p| (next.get(p) - atm.get(p)).abs() < cfg.convergence.threshold(p));
            atm = next;
            if done {
                converged = true;
                break;
            }
        }
        if !converged {
            tracing::warn!(
                max_iter = cfg.max_iter,
                "continuum refinement did not converge"
            );
        }

        // Final abundance re-fits against the refined continuum.
        let obs = NormalizedSpectrum::new(spectrum, &refined);
        let feh_params = [Param::FeH];
        let alpha_params = [Param::AlphaFe];
        let feh_bounds = [bounds.range(Param::FeH)];
        let alpha_bounds = [bounds.range(Param::AlphaFe)];
        let refit = |base: Atmosphere, params: &[Param], bounds: &[(f64, f64)], idx: &[usize]| {
            fit_parameters(
                &model,
                &obs,
                idx,
                &FitRequest {
                    base,
                    params,
                    bounds,
                    prior: None,
                },
                &lm,
            )
        };

        let feh_a = refit(
            restart(atm, Param::FeH, cfg.start.feh, &bounds),
            &feh_params,
            &feh_bounds,
            &feh_idx,
        )?;
        let alpha_b = refit(
            restart(feh_a.atm, Param::AlphaFe, cfg.start.alphafe, &bounds),
            &alpha_params,
            &alpha_bounds,
            &alpha_idx,
        )?;
        let feh_c = refit(
            restart(alpha_b.atm, Param::FeH, cfg.start.feh, &bounds),
            &feh_params,
            &feh_bounds,
            &feh_idx,
        )?;
        let feh = feh_c.measurement(&feh_params, Param::FeH);
        let alphafe = alpha_b.measurement(&alpha_params, Param::AlphaFe);

        let logg = if cfg.fit_logg {
            Measurement::new(atm.logg, logg_err)
        } else {
            phot.logg.unwrap_or(Measurement::new(atm.logg, None))
        };
        let final_atm = Atmosphere::new(teff.value, logg.value, feh.value, alphafe.value);

        let elements = fit_elements(
            &ElementFitInput {
                model: &model,
                obs: &obs,
                masks: &fm,
                atm: final_atm,
                bounds,
                min_pixels: cfg.min_element_pixels,
            },
            &cfg.elements,
            &lm,
        )?;

        let synth = model.synthesize_all(&final_atm)?;
        let union: Vec<usize> = (0..wvl.len()).filter(|&i| fm.feh[i] || fm.alpha[i]).collect();
        let union_model: Vec<f64> = union.iter().map(|&i| synth[i]).collect();
        let chi2 = obs.chi2(&union, &union_model);
        let nfree = main_params.len() + 1;
        let reduced_chi2 = chi2 / (union.len().saturating_sub(nfree).max(1)) as f64;

        tracing::info!(
            atm = %final_atm,
            converged,
            iterations,
            elements = elements.len(),
            reduced_chi2,
            "measured abundances"
        );

        let result = AbundanceResult {
            teff,
            logg,
            vt: final_atm.microturbulence(),
            feh,
            alphafe,
            elements,
            logg_fitted: cfg.fit_logg,
            converged,
            iterations,
            chi2,
            reduced_chi2,
            npix_feh: feh_idx.len(),
            npix_alpha: alpha_idx.len(),
        };

        object.continuum = Some(Continuum {
            initcont,
            refinedcont: refined,
        });
        object.synth = Some(synth);
        object.abund = Some(result);
        object.processed_at = Some(Utc::now());
        Ok(())
    }

    fn check_coverage(&self, fm: &FitMasks) -> Result<(), AppError> {
        let bands = [
            (fm.has_blue, self.library.has_blue(), "blue"),
            (fm.has_red, self.library.has_red(), "red"),
        ];
        for (needed, available, label) in bands {
            if needed && !available {
                return Err(AppError::new(
                    2,
                    format!("Spectrum has {label} pixels but no {label} grid is configured."),
                ));
            }
        }
        Ok(())
    }

    /// Configured bounds intersected with what the grids cover.
    fn effective_bounds(&self) -> Result<ParamBounds, AppError> {
        let mut out = self.config.bounds;
        for p in Param::ALL {
            let (lo, hi) = self.config.bounds.range(p);
            let (glo, ghi) = self.library.extent(p);
            let (lo, hi) = (lo.max(glo), hi.min(ghi));
            if !(lo <= hi) {
                return Err(AppError::new(
                    2,
                    format!(
                        "Grid does not overlap the allowed {} range.",
                        p.display_name()
                    ),
                ));
            }
            out.lower.set(p, lo);
            out.upper.set(p, hi);
        }
        Ok(out)
    }

    fn start(&self, phot: &ResolvedPhotometry) -> Atmosphere {
        let start = self.config.start;
        Atmosphere::new(
            phot.teff.map_or(start.teff, |t| t.value),
            phot.logg.map_or(start.logg, |g| g.value),
            start.feh,
            start.alphafe,
        )
    }

    /// Best grid node in `[Fe/H]` (and `Teff` when unconstrained) for a starting point.
    fn seed(
        &self,
        model: &SpectrumModel<'_>,
        obs: &NormalizedSpectrum,
        idx: &[usize],
        atm: Atmosphere,
        bounds: &ParamBounds,
        scan_teff: bool,
    ) -> Result<Atmosphere, AppError> {
        let within = |p: Param| -> Vec<f64> {
            let (lo, hi) = bounds.range(p);
            self.library
                .nodes(p)
                .into_iter()
                .filter(|v| *v >= lo && *v <= hi)
                .collect()
        };

        let mut params = vec![Param::FeH];
        let mut axes = vec![within(Param::FeH)];
        if scan_teff {
            params.push(Param::Teff);
            axes.push(within(Param::Teff));
        }
        if axes.iter().any(Vec::is_empty) {
            return Ok(atm);
        }

        let candidates = candidate_grid(&axes);
        let best = best_seed(&candidates, |values| {
            let flux = model.synthesize(&atm.with(&params, values), idx)?;
            Ok(Some(obs.chi2(idx, &flux)))
        })?;
        let seeded = atm.with(&params, &best.params);
        tracing::debug!(atm = %seeded, chi2 = best.chi2, candidates = candidates.len(), "seed scan");
        Ok(seeded)
    }
}

/// `atm` with `param` reset to `value`, clamped into `bounds`.
fn restart(atm: Atmosphere, param: Param, value: f64, bounds: &ParamBounds) -> Atmosphere {
    let (lo, hi) = bounds.range(param);
    atm.with(&[param], &[value.clamp(lo, hi)])
}

fn clamp_to(atm: &Atmosphere, bounds: &ParamBounds) -> Atmosphere {
    let mut out = *atm;
    for p in Param::ALL {
        let (lo, hi) = bounds.range(p);
        out.set(p, atm.get(p).clamp(lo, hi));
    }
    out
}
