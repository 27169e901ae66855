//! Resampling synthetic spectra onto observed wavelengths.
//!
//! Synthetic spectra are computed at much higher resolution than the
//! spectrograph delivers. Each observed pixel receives the Gaussian-weighted
//! mean of the synthetic pixels around it, with a per-pixel dispersion.

/// Kernel half-width in units of sigma.
const KERNEL_HALF_WIDTH: f64 = 4.0;

/// Gaussian-smooth `synth` (sampled at `wvl_synth`) onto `wvl_obs`.
///
/// `sigma[i]` is the dispersion (Angstrom) at `wvl_obs[i]`. Observed pixels
/// outside the synthetic range get `1.0` (the normalized continuum). Where the
/// kernel covers no synthetic pixel, the value is linearly interpolated.
pub fn smooth_gauss(wvl_synth: &[f64], synth: &[f64], wvl_obs: &[f64], sigma: &[f64]) -> Vec<f64> {
    let n_synth = wvl_synth.len().min(synth.len());
    if n_synth == 0 {
        return vec![1.0; wvl_obs.len()];
    }
    let wvl_synth = &wvl_synth[..n_synth];
    let synth = &synth[..n_synth];
    let first = wvl_synth[0];
    let last = wvl_synth[n_synth - 1];

    wvl_obs
        .iter()
        .zip(sigma)
        .map(|(&w, &s)| {
            if w < first || w > last {
                return 1.0;
            }
            let half = KERNEL_HALF_WIDTH * s;
            let lo = wvl_synth.partition_point(|&x| x < w - half);
            let hi = wvl_synth.partition_point(|&x| x <= w + half);

            let mut sum = 0.0;
            let mut norm = 0.0;
            if s > 0.0 {
                let inv = 1.0 / (2.0 * s * s);
                for j in lo..hi {
                    let d = wvl_synth[j] - w;
                    let k = (-d * d * inv).exp();
                    sum += k * synth[j];
                    norm += k;
                }
            }
            if norm > 0.0 {
                sum / norm
            } else {
                interp_linear(wvl_synth, synth, w)
            }
        })
        .collect()
}

/// Linear interpolation of `(xp, fp)` at `x`, clamped to the end values.
pub fn interp_linear(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let hi = xp[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span.abs() < 1e-300 {
        return fp[lo];
    }
    let u = (x - xp[lo]) / span;
    fp[lo] + u * (fp[hi] - fp[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_spectrum_stays_flat() {
        let wvl: Vec<f64> = (0..1000).map(|i| 8000.0 + i as f64 * 0.02).collect();
        let synth = vec![0.8; wvl.len()];
        let obs = [8005.0, 8010.0, 8015.0];
        let out = smooth_gauss(&wvl, &synth, &obs, &[0.7, 0.7, 0.7]);
        for v in out {
            assert!((v - 0.8).abs() < 1e-12);
        }
    }

    #[test]
    fn smoothing_conserves_equivalent_width() {
        // A narrow absorption line broadened by the kernel keeps its integrated depth.
        let step = 0.01;
        let wvl: Vec<f64> = (0..4000).map(|i| 8480.0 + i as f64 * step).collect();
        let synth: Vec<f64> = wvl
            .iter()
            .map(|&w| 1.0 - 0.5 * (-(w - 8500.0).powi(2) / (2.0 * 0.05f64.powi(2))).exp())
            .collect();
        let ew_in: f64 = synth.iter().map(|f| (1.0 - f) * step).sum();

        let obs: Vec<f64> = (0..400).map(|i| 8482.0 + i as f64 * 0.1).collect();
        let out = smooth_gauss(&wvl, &synth, &obs, &vec![0.68; obs.len()]);
        let ew_out: f64 = out.iter().map(|f| (1.0 - f) * 0.1).sum();
        assert!((ew_in - ew_out).abs() / ew_in < 1e-3, "in={ew_in} out={ew_out}");
        // Broadened line is shallower than the intrinsic one.
        let min_out = out.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(min_out > 0.5);
    }

    #[test]
    fn pixels_outside_synthetic_range_are_continuum() {
        let out = smooth_gauss(&[8000.0, 8001.0], &[0.5, 0.5], &[7000.0, 9000.0], &[1.0, 1.0]);
        assert_eq!(out, vec![1.0, 1.0]);
    }

    #[test]
    fn interp_linear_midpoint_and_clamp() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        assert!((interp_linear(&xp, &fp, 1.5) - 20.0).abs() < 1e-12);
        assert_eq!(interp_linear(&xp, &fp, -1.0), 0.0);
        assert_eq!(interp_linear(&xp, &fp, 5.0), 30.0);
    }
}
