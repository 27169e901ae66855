//! Continuum refinement against a best-fit synthetic spectrum.
//!
//! Dividing the observed flux by the smoothed synthesis leaves the continuum
//! times noise, so the same clipped spline fit yields an improved continuum.
//! Pixels are weighted by `ivar * synth^2`, the inverse variance of the ratio.

use crate::continuum::fit_smooth;
use crate::domain::{ContinuumConfig, Spectrum};
use crate::error::AppError;

pub fn refine(
    wvl: &[f64],
    spectrum: &Spectrum,
    synth: &[f64],
    spec_mask: &[bool],
    cfg: &ContinuumConfig,
) -> Result<Vec<f64>, AppError> {
    if synth.len() != spectrum.flux.len() {
        return Err(AppError::new(
            4,
            format!(
                "Synthetic spectrum has {} pixels, observed has {}.",
                synth.len(),
                spectrum.flux.len()
            ),
        ));
    }

    let (ratio, weight): (Vec<f64>, Vec<f64>) = spectrum
        .flux
        .iter()
        .zip(&spectrum.ivar)
        .zip(synth)
        .map(|((&f, &iv), &s)| {
            if s > 0.0 && s.is_finite() {
                (f / s, iv * s * s)
            } else {
                (f64::NAN, 0.0)
            }
        })
        .unzip();

    fit_smooth(wvl, &ratio, &weight, spec_mask, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dividing_out_lines_recovers_continuum() {
        let wvl: Vec<f64> = (0..2000).map(|i| 8400.0 + 0.25 * i as f64).collect();
        let synth: Vec<f64> = wvl
            .iter()
            .map(|&w| 1.0 - 0.6 * (-0.5 * ((w - 8542.0) / 0.8).powi(2)).exp())
            .collect();
        let level = |w: f64| 1200.0 - 0.2 * (w - 8400.0);
        let spectrum = Spectrum {
            wvl: wvl.clone(),
            flux: wvl.iter().zip(&synth).map(|(&w, &s)| level(w) * s).collect(),
            ivar: vec![1e-2; wvl.len()],
        };
        let cfg = ContinuumConfig {
            breakpoint_spacing: 150.0,
            clip_sigma: 3.0,
            clip_iters: 5,
            segment_gap: 50.0,
        };
        let cont = refine(&wvl, &spectrum, &synth, &vec![true; wvl.len()], &cfg).unwrap();
        for i in (0..2000).step_by(173) {
            assert!((cont[i] / level(wvl[i]) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn length_mismatch_is_numerical_error() {
        let spectrum = Spectrum {
            wvl: vec![1.0, 2.0],
            flux: vec![1.0, 1.0],
            ivar: vec![1.0, 1.0],
        };
        let cfg = ContinuumConfig {
            breakpoint_spacing: 150.0,
            clip_sigma: 3.0,
            clip_iters: 5,
            segment_gap: 50.0,
        };
        let err = refine(&spectrum.wvl, &spectrum, &[1.0], &[true, true], &cfg).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
