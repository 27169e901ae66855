//! Photometric temperature and gravity.
//!
//! Cross-matching happens upstream; this module only turns whatever the record
//! carries into the priors the fitter needs.

use crate::domain::{Measurement, Photometry};

/// Solar reference values.
const LOGG_SUN: f64 = 4.438;
const TEFF_SUN: f64 = 5772.0;
const MBOL_SUN: f64 = 4.74;
/// Mass (solar units) assumed for every target.
const STELLAR_MASS: f64 = 0.75;
/// Used when a photometric temperature comes without an error.
pub const DEFAULT_TEFF_ERR: f64 = 100.0;

/// Photometric priors resolved for one object.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResolvedPhotometry {
    pub teff: Option<Measurement>,
    pub logg: Option<Measurement>,
}

/// Take `teffphot`/`loggphot` as given, deriving gravity from `mbol` when needed.
pub fn resolve(phot: &Photometry, dm: f64, ddm: f64) -> ResolvedPhotometry {
    let teff = phot.teffphot.filter(|t| t.is_finite() && *t > 0.0).map(|t| {
        let err = phot
            .teffphoterr
            .filter(|e| e.is_finite() && *e > 0.0)
            .unwrap_or(DEFAULT_TEFF_ERR);
        Measurement::new(t, Some(err))
    });

    let given = phot.loggphot.filter(|g| g.is_finite()).map(|g| {
        Measurement::new(g, phot.loggphoterr.filter(|e| e.is_finite() && *e >= 0.0))
    });
    let logg = given.or_else(|| {
        let t = teff?;
        let mbol = phot.mbol.filter(|m| m.is_finite())?;
        Some(photometric_logg(t.value, t.error.unwrap_or(0.0), mbol, dm, ddm))
    });

    ResolvedPhotometry { teff, logg }
}

/// Surface gravity from the Stefan-Boltzmann relation.
///
/// `log g = log g_sun + log10(M) + 4 log10(Teff / Teff_sun) + 0.4 (M_bol - M_bol_sun)`
/// with `M_bol = mbol - dm`.
pub fn photometric_logg(teff: f64, teff_err: f64, mbol: f64, dm: f64, ddm: f64) -> Measurement {
    let abs_mbol = mbol - dm;
    let value = LOGG_SUN
        + STELLAR_MASS.log10()
        + 4.0 * (teff / TEFF_SUN).log10()
        + 0.4 * (abs_mbol - MBOL_SUN);
    let d_teff = 4.0 * teff_err / (teff * std::f64::consts::LN_10);
    let d_dm = 0.4 * ddm;
    Measurement::new(value, Some((d_teff * d_teff + d_dm * d_dm).sqrt()))
}
