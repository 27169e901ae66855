//! Continuum estimation.
//!
//! Both the initial normalization and the refinement against a synthetic
//! spectrum reduce to the same operation: per contiguous segment, a weighted,
//! sigma-clipped cubic B-spline through some ratio of observed flux.

pub mod normalize;
pub mod refine;

use std::ops::Range;

use crate::domain::ContinuumConfig;
use crate::error::AppError;
use crate::math::{fit_bspline, median, weighted_median};

pub use normalize::normalize;
pub use refine::refine;

/// Segments with fewer usable pixels than this fall back to a weighted median.
const MIN_SPLINE_PIXELS: usize = 10;

/// Split sorted wavelengths into index ranges at gaps wider than `max_gap`.
pub fn segments(wvl: &[f64], max_gap: f64) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    if wvl.is_empty() {
        return out;
    }
    let mut start = 0;
    for i in 1..wvl.len() {
        if wvl[i] - wvl[i - 1] > max_gap {
            out.push(start..i);
            start = i;
        }
    }
    out.push(start..wvl.len());
    out
}

/// Fit a smooth curve to `y` over `mask`ed pixels, segment by segment.
///
/// Returns the curve evaluated on every pixel. Non-finite or non-positive
/// values are replaced by the segment median of the valid ones.
pub(crate) fn fit_smooth(
    wvl: &[f64],
    y: &[f64],
    w: &[f64],
    mask: &[bool],
    cfg: &ContinuumConfig,
) -> Result<Vec<f64>, AppError> {
    let mut out = vec![f64::NAN; wvl.len()];

    for seg in segments(wvl, cfg.segment_gap) {
        let x = &wvl[seg.clone()];
        let ys = &y[seg.clone()];
        let mut ws: Vec<f64> = seg
            .clone()
            .map(|i| if mask[i] && y[i].is_finite() { w[i] } else { 0.0 })
            .collect();

        let curve = fit_segment(x, ys, &mut ws, cfg);
        out[seg].copy_from_slice(&curve);
    }

    sanitize(wvl, &mut out, cfg.segment_gap)?;
    Ok(out)
}

/// Clipped spline through one segment; `w` is zeroed for rejected pixels.
fn fit_segment(x: &[f64], y: &[f64], w: &mut [f64], cfg: &ContinuumConfig) -> Vec<f64> {
    let usable = |w: &[f64]| w.iter().filter(|&&v| v.is_finite() && v > 0.0).count();

    for pass in 0..=cfg.clip_iters {
        if usable(w) < MIN_SPLINE_PIXELS {
            break;
        }
        let Some(spline) = fit_bspline(x, y, w, cfg.breakpoint_spacing) else {
            break;
        };
        let curve: Vec<f64> = x.iter().map(|&v| spline.evaluate(v)).collect();
        if pass == cfg.clip_iters {
            return curve;
        }

        let mut rejected = 0;
        for i in 0..x.len() {
            if w[i] > 0.0 && ((y[i] - curve[i]) * w[i].sqrt()).abs() > cfg.clip_sigma {
                w[i] = 0.0;
                rejected += 1;
            }
        }
        if rejected == 0 || usable(w) < MIN_SPLINE_PIXELS {
            return curve;
        }
    }

    let level = weighted_median(y, w).unwrap_or(f64::NAN);
    vec![level; x.len()]
}

fn sanitize(wvl: &[f64], curve: &mut [f64], max_gap: f64) -> Result<(), AppError> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    let global: Vec<f64> = curve.iter().copied().filter(|&v| valid(v)).collect();
    let Some(global) = median(&global) else {
        return Err(AppError::new(3, "No usable pixels to estimate a continuum."));
    };

    for seg in segments(wvl, max_gap) {
        let part = &mut curve[seg];
        let good: Vec<f64> = part.iter().copied().filter(|&v| valid(v)).collect();
        let fill = median(&good).unwrap_or(global);
        for v in part.iter_mut().filter(|v| !valid(**v)) {
            *v = fill;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ContinuumConfig {
        ContinuumConfig {
            breakpoint_spacing: 150.0,
            clip_sigma: 3.0,
            clip_iters: 5,
            segment_gap: 50.0,
        }
    }

    #[test]
    fn segments_split_at_gaps() {
        let wvl = [1.0, 2.0, 3.0, 100.0, 101.0, 300.0];
        let segs = segments(&wvl, 50.0);
        assert_eq!(segs, vec![0..3, 3..5, 5..6]);
        assert!(segments(&[], 50.0).is_empty());
    }

    #[test]
    fn clipping_ignores_absorption_dips() {
        let wvl: Vec<f64> = (0..1000).map(|i| 8000.0 + 0.5 * i as f64).collect();
        let mut y: Vec<f64> = wvl.iter().map(|w| 100.0 + 0.01 * (w - 8000.0)).collect();
        for i in (50..1000).step_by(100) {
            y[i] *= 0.5;
        }
        let w = vec![1.0; wvl.len()];
        let mask = vec![true; wvl.len()];
        let curve = fit_smooth(&wvl, &y, &w, &mask, &cfg()).unwrap();
        for i in (0..1000).step_by(97) {
            let truth = 100.0 + 0.01 * (wvl[i] - 8000.0);
            assert!((curve[i] - truth).abs() < 0.05, "i={i} {}", curve[i]);
        }
    }

    #[test]
    fn sparse_segment_uses_weighted_median() {
        let wvl = vec![5000.0, 5001.0, 5002.0, 6000.0, 6001.0];
        let y = vec![2.0, 4.0, 3.0, 10.0, 10.0];
        let w = vec![1.0; 5];
        let mask = vec![true; 5];
        let curve = fit_smooth(&wvl, &y, &w, &mask, &cfg()).unwrap();
        assert_eq!(&curve[..3], &[3.0, 3.0, 3.0]);
        assert_eq!(&curve[3..], &[10.0, 10.0]);
    }

    #[test]
    fn masked_out_segment_takes_global_median() {
        let wvl = vec![5000.0, 5001.0, 6000.0, 6001.0];
        let y = vec![2.0, 2.0, 8.0, 8.0];
        let mask = vec![true, true, false, false];
        let curve = fit_smooth(&wvl, &y, &[1.0; 4], &mask, &cfg()).unwrap();
        assert_eq!(curve, vec![2.0; 4]);
    }

    #[test]
    fn nothing_usable_is_insufficient_data() {
        let err = fit_smooth(&[1.0, 2.0], &[1.0, 1.0], &[0.0, 0.0], &[true, true], &cfg())
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
