//! Spectral masks selecting the pixels each fit step uses.
//!
//! A `MaskSet` describes line windows in wavelength; `FitMasks` turns it into
//! boolean masks over one observed spectrum.

pub mod lines;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Element, Spectrum};
use crate::error::AppError;
use crate::grid::{BLUE_BAND, RED_BAND};

/// Line windows used to build fit masks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskSet {
    /// Half-width (Angstrom) of every metal line window.
    pub line_half_width: f64,
    pub fe_lines: Vec<f64>,
    #[serde(default)]
    pub element_lines: BTreeMap<Element, Vec<f64>>,
    pub balmer_half_width: f64,
    #[serde(default)]
    pub balmer_lines: Vec<f64>,
    #[serde(default)]
    pub telluric_bands: Vec<(f64, f64)>,
}

impl Default for MaskSet {
    fn default() -> Self {
        Self {
            line_half_width: 1.5,
            fe_lines: lines::FE_LINES.to_vec(),
            element_lines: Element::ALL
                .iter()
                .map(|&e| (e, lines::element_lines(e).to_vec()))
                .collect(),
            balmer_half_width: 10.0,
            balmer_lines: lines::BALMER_LINES.to_vec(),
            telluric_bands: lines::TELLURIC_BANDS.to_vec(),
        }
    }
}

impl MaskSet {
    pub fn load_json(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to open mask file '{}': {e}", path.display()),
            )
        })?;
        let set: MaskSet = serde_json::from_reader(file).map_err(|e| {
            AppError::new(2, format!("Invalid mask file '{}': {e}", path.display()))
        })?;
        if !(set.line_half_width > 0.0) || !(set.balmer_half_width >= 0.0) {
            return Err(AppError::new(
                2,
                format!("Mask file '{}' needs positive half-widths.", path.display()),
            ));
        }
        if set.fe_lines.is_empty() {
            return Err(AppError::new(
                2,
                format!("Mask file '{}' lists no Fe lines.", path.display()),
            ));
        }
        Ok(set)
    }

    pub fn lines_for(&self, element: Element) -> &[f64] {
        self.element_lines
            .get(&element)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Centers of the alpha-element lines (Mg, Si, Ca, Ti).
    pub fn alpha_lines(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Element::ALL
            .iter()
            .filter(|e| e.is_alpha())
            .flat_map(|&e| self.lines_for(e).iter().copied())
            .collect();
        out.sort_by(f64::total_cmp);
        out
    }

    /// Every metal line center (Fe and all elements), sorted.
    pub fn all_lines(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self
            .fe_lines
            .iter()
            .chain(self.element_lines.values().flatten())
            .copied()
            .collect();
        out.sort_by(f64::total_cmp);
        out
    }

    pub fn in_telluric(&self, w: f64) -> bool {
        self.telluric_bands.iter().any(|&(lo, hi)| w >= lo && w <= hi)
    }

    pub fn in_balmer(&self, w: f64) -> bool {
        near_any(&self.balmer_lines, w, self.balmer_half_width)
    }
}

fn near_any(centers: &[f64], w: f64, half_width: f64) -> bool {
    centers.iter().any(|&c| (w - c).abs() <= half_width)
}

/// Boolean pixel masks for one spectrum.
#[derive(Debug, Clone)]
pub struct FitMasks {
    pub spec: Vec<bool>,
    pub feh: Vec<bool>,
    pub alpha: Vec<bool>,
    pub elements: BTreeMap<Element, Vec<bool>>,
    pub continuum: Vec<bool>,
    pub has_blue: bool,
    pub has_red: bool,
}

impl FitMasks {
    /// Build masks on rest-frame wavelengths `wvl`.
    pub fn build(wvl: &[f64], spectrum: &Spectrum, set: &MaskSet) -> Self {
        let hw = set.line_half_width;
        let alpha_lines = set.alpha_lines();
        let all_lines = set.all_lines();

        let good: Vec<bool> = spectrum
            .flux
            .iter()
            .zip(&spectrum.ivar)
            .map(|(&f, &iv)| f.is_finite() && iv.is_finite() && iv > 0.0)
            .collect();

        let spec: Vec<bool> = wvl
            .iter()
            .zip(&good)
            .map(|(&w, &g)| g && w >= BLUE_BAND.0 && w < RED_BAND.1 && !set.in_telluric(w))
            .collect();

        let within = |centers: &[f64]| -> Vec<bool> {
            wvl.iter()
                .zip(&spec)
                .map(|(&w, &s)| s && near_any(centers, w, hw))
                .collect()
        };

        let feh = within(&set.fe_lines);
        let alpha = within(&alpha_lines);
        let elements = set
            .element_lines
            .iter()
            .map(|(&e, centers)| (e, within(centers)))
            .collect();

        let continuum = wvl
            .iter()
            .zip(&good)
            .map(|(&w, &g)| {
                g && !near_any(&all_lines, w, hw) && !set.in_balmer(w) && !set.in_telluric(w)
            })
            .collect();

        let in_band = |band: (f64, f64)| {
            wvl.iter()
                .zip(&spec)
                .any(|(&w, &s)| s && w >= band.0 && w < band.1)
        };
        let has_blue = in_band(BLUE_BAND);
        let has_red = in_band(RED_BAND);

        Self {
            spec,
            feh,
            alpha,
            elements,
            continuum,
            has_blue,
            has_red,
        }
    }

    pub fn element(&self, element: Element) -> &[bool] {
        self.elements
            .get(&element)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Number of set entries in a mask.
pub fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

/// Indices of set entries in a mask.
pub fn indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_on(wvl: &[f64]) -> Spectrum {
        Spectrum {
            wvl: wvl.to_vec(),
            flux: vec![1.0; wvl.len()],
            ivar: vec![100.0; wvl.len()],
        }
    }

    #[test]
    fn fe_and_alpha_windows_select_line_pixels() {
        let wvl: Vec<f64> = (0..2000).map(|i| 8400.0 + 0.2 * i as f64).collect();
        let spec = spectrum_on(&wvl);
        let masks = FitMasks::build(&wvl, &spec, &MaskSet::default());

        let at = |w: f64| wvl.partition_point(|&x| x < w);
        assert!(masks.feh[at(8468.41)]);
        assert!(!masks.feh[at(8480.0)]);
        assert!(masks.alpha[at(8542.09)]);
        assert!(masks.element(Element::Ca)[at(8542.09)]);
        assert!(!masks.element(Element::Mg)[at(8542.09)]);
        assert!(!masks.continuum[at(8542.09)]);
        assert!(masks.continuum[at(8480.0)]);
        assert!(masks.has_red && !masks.has_blue);
    }

    #[test]
    fn bad_pixels_and_tellurics_are_excluded() {
        let wvl = vec![5000.0, 5001.0, 7600.0, 9500.0];
        let mut spec = spectrum_on(&wvl);
        spec.ivar[1] = 0.0;
        let masks = FitMasks::build(&wvl, &spec, &MaskSet::default());
        assert_eq!(masks.spec, vec![true, false, false, false]);
        assert!(!masks.continuum[1]);
        assert!(!masks.continuum[2]);
        assert!(masks.continuum[3]);
    }

    #[test]
    fn balmer_window_blocks_continuum_only() {
        let wvl = vec![6560.0, 6600.0];
        let masks = FitMasks::build(&wvl, &spectrum_on(&wvl), &MaskSet::default());
        assert!(masks.spec[0]);
        assert!(!masks.continuum[0]);
        assert!(masks.continuum[1]);
    }

    #[test]
    fn mask_set_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.json");
        let json = r#"{
            "line_half_width": 1.0,
            "fe_lines": [8468.41],
            "element_lines": {"Ca": [8542.09]},
            "balmer_half_width": 10.0
        }"#;
        std::fs::write(&path, json).unwrap();
        let set = MaskSet::load_json(&path).unwrap();
        assert_eq!(set.lines_for(Element::Ca), &[8542.09]);
        assert!(set.lines_for(Element::Mg).is_empty());
        assert!(set.telluric_bands.is_empty());
    }

    #[test]
    fn empty_fe_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.json");
        std::fs::write(
            &path,
            r#"{"line_half_width": 1.0, "fe_lines": [], "balmer_half_width": 10.0}"#,
        )
        .unwrap();
        assert_eq!(MaskSet::load_json(&path).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn count_and_indices_agree() {
        let m = [true, false, true, true];
        assert_eq!(count(&m), 3);
        assert_eq!(indices(&m), vec![0, 2, 3]);
    }
}
