//! Spectrograph arms, wavelength coverage and resolution.
//!
//! Synthetic spectra are smoothed to the instrumental line-spread function,
//! approximated as a Gaussian whose width depends on which arm recorded the pixel.

use crate::domain::{Arm, ResolutionMode};

/// FWHM to Gaussian sigma.
pub const FWHM_TO_SIGMA: f64 = 1.0 / 2.35;

/// Wavelength coverage `[lo, hi]` (Angstrom) of an arm in a given mode.
pub fn coverage(arm: Arm, mode: ResolutionMode) -> (f64, f64) {
    match (arm, mode) {
        (Arm::Blue, ResolutionMode::Lr) => (3800.0, 6300.0),
        (Arm::Blue, ResolutionMode::Mr) => (3800.0, 6500.0),
        (Arm::Red, ResolutionMode::Lr) => (6300.0, 9700.0),
        (Arm::Red, ResolutionMode::Mr) => (7100.0, 8850.0),
        (Arm::Nir, _) => (9400.0, 12600.0),
    }
}

/// Resolution FWHM (Angstrom) of an arm in a given mode.
pub fn fwhm(arm: Arm, mode: ResolutionMode) -> f64 {
    match (arm, mode) {
        (Arm::Blue, _) => 2.1,
        (Arm::Red, ResolutionMode::Lr) => 2.7,
        (Arm::Red, ResolutionMode::Mr) => 1.6,
        (Arm::Nir, _) => 2.4,
    }
}

/// Arm a wavelength is attributed to.
///
/// Anything not strictly inside the blue coverage is treated as red, unless it
/// lies past the red coverage and inside the NIR coverage.
pub fn arm_for(wvl: f64, mode: ResolutionMode) -> Arm {
    let (blue_lo, blue_hi) = coverage(Arm::Blue, mode);
    if wvl > blue_lo && wvl < blue_hi {
        return Arm::Blue;
    }
    let (_, red_hi) = coverage(Arm::Red, mode);
    let (nir_lo, nir_hi) = coverage(Arm::Nir, mode);
    if wvl > red_hi && wvl >= nir_lo && wvl <= nir_hi {
        return Arm::Nir;
    }
    Arm::Red
}

/// Gaussian dispersion (Angstrom) for every pixel.
pub fn dispersion_sigma(wvl: &[f64], mode: ResolutionMode) -> Vec<f64> {
    wvl.iter()
        .map(|&w| fwhm(arm_for(w, mode), mode) * FWHM_TO_SIGMA)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blue_pixels_use_blue_resolution() {
        let sigma = dispersion_sigma(&[5000.0, 8500.0], ResolutionMode::Mr);
        assert!((sigma[0] - 2.1 / 2.35).abs() < 1e-12);
        assert!((sigma[1] - 1.6 / 2.35).abs() < 1e-12);
    }

    #[test]
    fn mr_blue_coverage_extends_past_lr() {
        assert_eq!(arm_for(6400.0, ResolutionMode::Mr), Arm::Blue);
        assert_eq!(arm_for(6400.0, ResolutionMode::Lr), Arm::Red);
    }

    #[test]
    fn nir_only_past_red_coverage() {
        assert_eq!(arm_for(9500.0, ResolutionMode::Lr), Arm::Red);
        assert_eq!(arm_for(9800.0, ResolutionMode::Lr), Arm::Nir);
        assert_eq!(arm_for(9500.0, ResolutionMode::Mr), Arm::Nir);
    }
}
