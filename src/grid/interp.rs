//! Multilinear interpolation between grid nodes.

use crate::domain::Atmosphere;
use crate::error::AppError;
use crate::grid::axes::NodeIndex;
use crate::grid::store::GridSource;

/// Interpolate the synthetic spectrum at `atm`.
///
/// Values outside the grid are clamped to the edge nodes. Only corners with a
/// non-zero weight are read, so a point sitting on a node touches one file.
pub fn interpolate(source: &dyn GridSource, atm: &Atmosphere) -> Result<Vec<f64>, AppError> {
    if ![atm.teff, atm.logg, atm.feh, atm.alphafe]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(AppError::new(
            4,
            format!("Cannot interpolate grid at non-finite parameters ({atm})."),
        ));
    }

    let brackets = source.axes().brackets(atm);
    let npix = source.wavelength().len();
    let mut out = vec![0.0; npix];

    for corner in 0..16u32 {
        let mut weight = 1.0;
        let mut idx: NodeIndex = [0; 4];
        for (d, b) in brackets.iter().enumerate() {
            if corner & (1 << d) != 0 {
                weight *= b.frac;
                idx[d] = b.hi;
            } else {
                weight *= 1.0 - b.frac;
                idx[d] = b.lo;
            }
        }
        if weight == 0.0 {
            continue;
        }

        let flux = source.node_flux(idx)?;
        if flux.len() != npix {
            return Err(AppError::new(
                4,
                format!(
                    "Grid '{}' node has {} pixels, expected {npix}.",
                    source.name(),
                    flux.len()
                ),
            ));
        }
        for (o, f) in out.iter_mut().zip(flux.iter()) {
            *o += weight * f;
        }
    }

    Ok(out)
}
