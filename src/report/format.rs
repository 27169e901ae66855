//! Formatted terminal output for fitted objects and batch runs.
//!
//! Formatting lives here so the fitting code stays free of presentation and
//! output changes stay localized.

use crate::domain::{AbundanceResult, Measurement, PfsObject};
use crate::error::AppError;

/// Normalized residual statistics over the pixels that carry a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub npix: usize,
    /// RMS of `(flux / continuum - synth)`.
    pub rms: f64,
    /// RMS of the residual in units of the pixel error.
    pub rms_sigma: f64,
}

/// Residuals of a fitted object against its best-fit synthesis.
///
/// Returns `None` for objects that have not been fitted yet.
pub fn compute_residuals(object: &PfsObject) -> Result<Option<ResidualStats>, AppError> {
    let (Some(cont), Some(synth)) = (&object.continuum, &object.synth) else {
        return Ok(None);
    };
    let spec = &object.spectrum;
    if cont.refinedcont.len() != spec.len() || synth.len() != spec.len() {
        return Err(AppError::new(
            2,
            format!(
                "Record {} has continuum/synthesis arrays that do not match the spectrum.",
                object.id
            ),
        ));
    }

    let mut n = 0usize;
    let mut ss = 0.0;
    let mut ss_sigma = 0.0;
    for i in 0..spec.len() {
        let c = cont.refinedcont[i];
        let iv = spec.ivar[i];
        if !(c > 0.0) || !(iv > 0.0) || !spec.flux[i].is_finite() {
            continue;
        }
        let r = spec.flux[i] / c - synth[i];
        n += 1;
        ss += r * r;
        ss_sigma += r * r * iv * c * c;
    }
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(ResidualStats {
        npix: n,
        rms: (ss / n as f64).sqrt(),
        rms_sigma: (ss_sigma / n as f64).sqrt(),
    }))
}

/// Format the per-object summary (identifiers, atmosphere, element table).
pub fn format_object_summary(object: &PfsObject) -> Result<String, AppError> {
    let mut out = String::new();

    out.push_str("=== pfsabund - 1D abundance fit ===\n");
    out.push_str(&format!("Object: {}\n", object.id));
    let spec = &object.spectrum;
    if let (Some(first), Some(last)) = (spec.wvl.first(), spec.wvl.last()) {
        out.push_str(&format!(
            "Spectrum: n={} | wvl=[{first:.1}, {last:.1}]A\n",
            spec.len()
        ));
    }
    if let Some(rv) = object.rv_kms {
        out.push_str(&format!("RV: {rv:.2} km/s\n"));
    }

    let Some(abund) = &object.abund else {
        out.push_str("\n(not fitted)\n");
        return Ok(out);
    };
    if let Some(ts) = object.processed_at {
        out.push_str(&format!("Processed: {}\n", ts.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    out.push_str("\nAtmosphere:\n");
    out.push_str(&format_param("Teff", &abund.teff, 0, "K"));
    let logg_src = if abund.logg_fitted { "fitted" } else { "photometric" };
    out.push_str(
        format!(
            "{} ({logg_src})\n",
            format_param("log g", &abund.logg, 2, "").trim_end()
        )
        .as_str(),
    );
    out.push_str(&format!("  {:<11} {:>9.2} km/s\n", "vt", abund.vt));
    out.push_str(&format_param("[Fe/H]", &abund.feh, 3, ""));
    out.push_str(&format_param("[alpha/Fe]", &abund.alphafe, 3, ""));

    out.push_str("\nFit diagnostics:\n");
    out.push_str(&format_diagnostics(abund));
    if let Some(res) = compute_residuals(object)? {
        out.push_str(&format!(
            "- residuals: n={} rms={:.4} rms/sigma={:.3}\n",
            res.npix, res.rms, res.rms_sigma
        ));
    }

    out.push_str("\nElements:\n");
    out.push_str(&format_element_table(abund));
    Ok(out)
}

fn format_param(label: &str, m: &Measurement, precision: usize, unit: &str) -> String {
    let err = m
        .error
        .map(|e| format!("+/- {e:.precision$}"))
        .unwrap_or_else(|| "+/- -".to_string());
    format!("  {label:<11} {:>9.precision$} {err} {unit}", m.value)
        .trim_end()
        .to_string()
        + "\n"
}

fn format_diagnostics(abund: &AbundanceResult) -> String {
    let status = if abund.converged { "converged" } else { "NOT converged" };
    let mut out = String::new();
    out.push_str(&format!(
        "- continuum: {status} after {} iteration(s)\n",
        abund.iterations
    ));
    out.push_str(&format!(
        "- pixels: Fe={} alpha={}\n",
        abund.npix_feh, abund.npix_alpha
    ));
    out.push_str(&format!(
        "- chi2={:.2} reduced={:.3}\n",
        abund.chi2, abund.reduced_chi2
    ));
    out
}

fn format_element_table(abund: &AbundanceResult) -> String {
    if abund.elements.is_empty() {
        return "  (none measured)\n".to_string();
    }
    let mut out = String::new();
    out.push_str(format!("{:<8} {:>8} {:>8} {:>6}", "element", "[X/Fe]", "err", "npix").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<8} {:-<8} {:-<8} {:-<6}", "", "", "", "").trim_end());
    out.push('\n');
    for e in &abund.elements {
        let err = e.error.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<8} {:>+8.3} {:>8} {:>6}",
                format!("[{}/Fe]", e.element.symbol()),
                e.value,
                err,
                e.npix
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Outcome of one object in a batch run.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Where the object came from (record path or object id).
    pub source: String,
    pub outcome: Result<PfsObject, AppError>,
}

/// One line per object, then totals.
pub fn format_batch_summary(entries: &[BatchEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<28} {:>6} {:>6} {:>8} {:>8} {:<6}",
            "object", "teff", "logg", "[Fe/H]", "[a/Fe]", "status"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<28} {:-<6} {:-<6} {:-<8} {:-<8} {:-<6}", "", "", "", "", "", "").trim_end());
    out.push('\n');

    let mut failed = 0;
    for entry in entries {
        let line = match &entry.outcome {
            Ok(obj) => match &obj.abund {
                Some(a) => format!(
                    "{:<28} {:>6.0} {:>6.2} {:>+8.3} {:>+8.3} {}",
                    truncate(&obj.id.to_string(), 28),
                    a.teff.value,
                    a.logg.value,
                    a.feh.value,
                    a.alphafe.value,
                    if a.converged { "ok" } else { "nocnv" }
                ),
                None => format!("{:<28} unfitted", truncate(&obj.id.to_string(), 28)),
            },
            Err(e) => {
                failed += 1;
                format!(
                    "{:<28} error (exit {}): {}",
                    truncate(&entry.source, 28),
                    e.exit_code(),
                    e.message()
                )
            }
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&format!(
        "\nFitted {} of {} object(s); {failed} failed.\n",
        entries.len() - failed,
        entries.len()
    ));
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Continuum, Element, ElementRatio, ObjectId, Photometry, Spectrum,
    };

    fn fitted_object() -> PfsObject {
        let id = ObjectId {
            cat_id: 7,
            tract: 9813,
            patch: "4,4".to_string(),
            obj_id: 255,
            visits: vec![],
        };
        let spectrum = Spectrum {
            wvl: vec![8500.0, 8500.5, 8501.0, 8501.5],
            flux: vec![100.0, 90.0, 100.0, 102.0],
            ivar: vec![1.0, 1.0, 0.0, 1.0],
        };
        let mut obj = PfsObject::new(id, spectrum, Photometry::default());
        obj.continuum = Some(Continuum {
            initcont: vec![100.0; 4],
            refinedcont: vec![100.0; 4],
        });
        obj.synth = Some(vec![1.0, 0.9, 1.0, 1.0]);
        obj.abund = Some(AbundanceResult {
            teff: Measurement::new(4512.3, Some(41.0)),
            logg: Measurement::new(1.5, Some(0.1)),
            vt: 1.785,
            feh: Measurement::new(-1.512, Some(0.02)),
            alphafe: Measurement::new(0.31, None),
            elements: vec![ElementRatio {
                element: Element::Ca,
                value: 0.35,
                error: Some(0.05),
                npix: 42,
            }],
            logg_fitted: false,
            converged: true,
            iterations: 3,
            chi2: 812.0,
            reduced_chi2: 1.02,
            npix_feh: 700,
            npix_alpha: 120,
        });
        obj
    }

    #[test]
    fn residuals_skip_bad_pixels() {
        let stats = compute_residuals(&fitted_object()).unwrap().unwrap();
        assert_eq!(stats.npix, 3);
        // Only the last pixel deviates: 0.02 in normalized flux, 2 sigma.
        assert!((stats.rms - (0.0004f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((stats.rms_sigma - (4.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn residuals_need_a_fit() {
        let mut obj = fitted_object();
        obj.synth = None;
        assert!(compute_residuals(&obj).unwrap().is_none());
    }

    #[test]
    fn summary_lists_parameters_and_elements() {
        let txt = format_object_summary(&fitted_object()).unwrap();
        assert!(txt.contains("Object: 00007-09813-4,4-00000000000000ff"));
        assert!(txt.contains("  Teff             4512 +/- 41 K\n"));
        assert!(txt.contains("(photometric)"));
        assert!(txt.contains("  [alpha/Fe]      0.310 +/- -\n"));
        assert!(txt.contains("converged after 3 iteration(s)"));
        assert!(txt.contains("[Ca/Fe]    +0.350    0.050     42\n"));
    }

    #[test]
    fn unfitted_summary_says_so() {
        let mut obj = fitted_object();
        obj.abund = None;
        let txt = format_object_summary(&obj).unwrap();
        assert!(txt.ends_with("(not fitted)\n"));
    }

    #[test]
    fn batch_summary_counts_failures() {
        let entries = vec![
            BatchEntry {
                source: "a.json".to_string(),
                outcome: Ok(fitted_object()),
            },
            BatchEntry {
                source: "b.json".to_string(),
                outcome: Err(AppError::new(3, "Only 4 usable Fe pixels (need 10).")),
            },
        ];
        let txt = format_batch_summary(&entries);
        assert!(txt.contains("b.json"));
        assert!(txt.contains("error (exit 3)"));
        assert!(txt.ends_with("Fitted 1 of 2 object(s); 1 failed.\n"));
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
