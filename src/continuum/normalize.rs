//! Initial continuum from line-free pixels.

use crate::continuum::fit_smooth;
use crate::domain::{ContinuumConfig, Spectrum};
use crate::error::AppError;

/// Continuum (flux units) fitted through the `continuum`-masked pixels, weighted by ivar.
pub fn normalize(
    wvl: &[f64],
    spectrum: &Spectrum,
    continuum_mask: &[bool],
    cfg: &ContinuumConfig,
) -> Result<Vec<f64>, AppError> {
    let cont = fit_smooth(wvl, &spectrum.flux, &spectrum.ivar, continuum_mask, cfg)?;
    tracing::debug!(
        npix = continuum_mask.iter().filter(|&&m| m).count(),
        "initial continuum"
    );
    Ok(cont)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_smooth_continuum_under_masked_lines() {
        let wvl: Vec<f64> = (0..3000).map(|i| 8300.0 + 0.2 * i as f64).collect();
        let level = |w: f64| 500.0 * (1.0 + 0.1 * ((w - 8300.0) / 600.0));
        let mut flux: Vec<f64> = wvl.iter().map(|&w| level(w)).collect();
        let mut mask = vec![true; wvl.len()];
        for i in (100..3000).step_by(250) {
            for j in i..i + 8 {
                flux[j] *= 0.4;
                mask[j] = false;
            }
        }
        let spectrum = Spectrum {
            wvl: wvl.clone(),
            flux,
            ivar: vec![1.0; wvl.len()],
        };
        let cfg = ContinuumConfig {
            breakpoint_spacing: 150.0,
            clip_sigma: 3.0,
            clip_iters: 5,
            segment_gap: 50.0,
        };
        let cont = normalize(&wvl, &spectrum, &mask, &cfg).unwrap();
        for i in (0..3000).step_by(111) {
            assert!((cont[i] / level(wvl[i]) - 1.0).abs() < 1e-3);
        }
    }
}
