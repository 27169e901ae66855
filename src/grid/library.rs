//! Blue and red synthetic grids combined into one spectrum source.

use std::sync::Arc;

use crate::domain::{Atmosphere, Param};
use crate::error::AppError;
use crate::grid::interp::interpolate;
use crate::grid::store::GridSource;

/// Wavelength band `[lo, hi)` served by the blue grid.
pub const BLUE_BAND: (f64, f64) = (4100.0, 6300.0);
/// Wavelength band `[lo, hi)` served by the red grid.
pub const RED_BAND: (f64, f64) = (6300.0, 9100.0);

/// The pair of grids used to synthesize a full spectrum.
#[derive(Clone)]
pub struct SynthLibrary {
    blue: Option<Arc<dyn GridSource>>,
    red: Option<Arc<dyn GridSource>>,
}

impl std::fmt::Debug for SynthLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthLibrary")
            .field("blue", &self.blue.as_ref().map(|g| g.name().to_string()))
            .field("red", &self.red.as_ref().map(|g| g.name().to_string()))
            .finish()
    }
}

impl SynthLibrary {
    pub fn new(
        blue: Option<Arc<dyn GridSource>>,
        red: Option<Arc<dyn GridSource>>,
    ) -> Result<Self, AppError> {
        if blue.is_none() && red.is_none() {
            return Err(AppError::new(
                2,
                "No synthetic grid configured (need a blue and/or red grid).",
            ));
        }
        Ok(Self { blue, red })
    }

    pub fn has_blue(&self) -> bool {
        self.blue.is_some()
    }

    pub fn has_red(&self) -> bool {
        self.red.is_some()
    }

    /// Parameter range covered by every configured grid.
    pub fn extent(&self, param: Param) -> (f64, f64) {
        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        for grid in self.blue.iter().chain(self.red.iter()) {
            let (a, b) = grid.axes().extent(param);
            lo = lo.max(a);
            hi = hi.min(b);
        }
        (lo, hi)
    }

    /// Node values along `param` of the first configured grid.
    pub fn nodes(&self, param: Param) -> Vec<f64> {
        self.blue
            .as_ref()
            .or(self.red.as_ref())
            .map(|g| g.axes().axis(param).to_vec())
            .unwrap_or_default()
    }

    /// Synthetic spectrum at `atm` restricted to `(lo, hi)`.
    ///
    /// The blue grid contributes pixels in `BLUE_BAND`, the red grid pixels in
    /// `RED_BAND`; only requested bands are read.
    pub fn construct(
        &self,
        atm: &Atmosphere,
        lo: f64,
        hi: f64,
        use_blue: bool,
        use_red: bool,
    ) -> Result<(Vec<f64>, Vec<f64>), AppError> {
        let mut wvl_out = Vec::new();
        let mut flux_out = Vec::new();

        let bands = [
            (use_blue, self.blue.as_ref(), BLUE_BAND, "blue"),
            (use_red, self.red.as_ref(), RED_BAND, "red"),
        ];
        for (wanted, grid, band, label) in bands {
            if !wanted {
                continue;
            }
            let grid = grid.ok_or_else(|| {
                AppError::new(
                    2,
                    format!("Spectrum has {label} pixels but no {label} grid is configured."),
                )
            })?;
            let flux = interpolate(grid.as_ref(), atm)?;
            for (&w, &f) in grid.wavelength().iter().zip(flux.iter()) {
                if w >= band.0 && w < band.1 && w > lo && w < hi {
                    wvl_out.push(w);
                    flux_out.push(f);
                }
            }
        }

        if wvl_out.is_empty() {
            return Err(AppError::new(
                3,
                format!("Synthetic grids have no pixels in ({lo:.1}, {hi:.1}) Angstrom."),
            ));
        }
        Ok((wvl_out, flux_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::axes::GridAxes;
    use crate::grid::store::MemoryGrid;

    fn flat_grid(name: &str, lo: f64, hi: f64, level: f64) -> Arc<dyn GridSource> {
        let axes = GridAxes {
            teff: vec![4000.0, 5000.0],
            logg: vec![0.0, 2.0],
            feh: vec![-3.0, 0.0],
            alphafe: vec![-0.5, 1.0],
        };
        let wvl: Vec<f64> = (0..=((hi - lo) as usize)).map(|i| lo + i as f64).collect();
        Arc::new(MemoryGrid::from_fn(name, axes, wvl, |_, w| vec![level; w.len()]).unwrap())
    }

    #[test]
    fn construct_concatenates_bands_in_order() {
        let lib = SynthLibrary::new(
            Some(flat_grid("blue", 6000.0, 6400.0, 0.9)),
            Some(flat_grid("red", 6200.0, 6600.0, 0.8)),
        )
        .unwrap();
        let atm = Atmosphere::new(4500.0, 1.0, -1.0, 0.0);
        let (wvl, flux) = lib.construct(&atm, 6250.0, 6350.0, true, true).unwrap();
        assert!(wvl.windows(2).all(|w| w[1] > w[0]));
        // Blue grid serves < 6300, red grid serves >= 6300.
        let split = wvl.partition_point(|&w| w < 6300.0);
        assert!(flux[..split].iter().all(|&f| (f - 0.9).abs() < 1e-12));
        assert!(flux[split..].iter().all(|&f| (f - 0.8).abs() < 1e-12));
    }

    #[test]
    fn missing_band_grid_is_an_error() {
        let lib = SynthLibrary::new(None, Some(flat_grid("red", 8000.0, 8100.0, 1.0))).unwrap();
        let atm = Atmosphere::new(4500.0, 1.0, -1.0, 0.0);
        let err = lib.construct(&atm, 5000.0, 8100.0, true, true).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(lib.construct(&atm, 8000.0, 8100.0, false, true).is_ok());
    }

    #[test]
    fn extent_intersects_grids() {
        let lib = SynthLibrary::new(Some(flat_grid("b", 5000.0, 5010.0, 1.0)), None).unwrap();
        assert_eq!(lib.extent(Param::FeH), (-3.0, 0.0));
        assert!(SynthLibrary::new(None, None).is_err());
    }
}
