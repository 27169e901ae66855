//! Simulate a spectrum from the analytic grid, fit it through the batch
//! pipeline and read the outputs back.

use std::sync::Arc;

use pfs_abund::app::pipeline::{OutputSpec, RunContext, run_batch};
use pfs_abund::data::{MockSpec, simulate};
use pfs_abund::domain::{Atmosphere, Element, FitConfig, ObjectId};
use pfs_abund::grid::{AnalyticGrid, GridAxes, GridSource, SynthLibrary, linspace_nodes};
use pfs_abund::io::{read_record_json, write_record_json};
use pfs_abund::mask::MaskSet;
use pfs_abund::report::{compute_residuals, format_object_summary};

fn red_library(masks: &MaskSet) -> SynthLibrary {
    let axes = GridAxes {
        teff: linspace_nodes(4000.0, 5000.0, 250.0),
        logg: linspace_nodes(0.5, 2.5, 0.5),
        feh: linspace_nodes(-3.0, -0.5, 0.25),
        alphafe: linspace_nodes(-0.4, 0.8, 0.2),
    };
    let wvl: Vec<f64> = (0..6500).map(|i| 8280.0 + 0.1 * i as f64).collect();
    let grid = AnalyticGrid::new("red", axes, wvl, masks).unwrap();
    let grid: Arc<dyn GridSource> = Arc::new(grid);
    SynthLibrary::new(None, Some(grid)).unwrap()
}

#[test]
fn simulated_giant_is_recovered_through_batch_pipeline() {
    let masks = MaskSet::default();
    let library = red_library(&masks);
    let truth = Atmosphere::new(4500.0, 1.5, -1.5, 0.3);

    let spec = MockSpec {
        snr: 200.0,
        rv_kms: 85.0,
        seed: 7,
        ..MockSpec::new(truth, 8320.0, 8860.0)
    };
    let id = ObjectId {
        cat_id: 1,
        tract: 9813,
        patch: "4,4".to_string(),
        obj_id: 42,
        visits: vec![1, 2, 3],
    };
    let mock = simulate(&library, &spec, id).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in").join("mock.json");
    write_record_json(&input, &mock).unwrap();

    let ctx = RunContext {
        library,
        masks,
        config: FitConfig::default(),
    };
    let output = OutputSpec {
        out_dir: dir.path().join("out"),
        catalog: Some(dir.path().join("catalog.csv")),
    };
    let entries = run_batch(&ctx, &[dir.path().join("in")], &output).unwrap();
    assert_eq!(entries.len(), 1);
    let fitted = entries[0].outcome.as_ref().unwrap();

    let abund = fitted.abund.as_ref().unwrap();
    assert!((abund.feh.value - truth.feh).abs() < 0.15, "feh={}", abund.feh.value);
    assert!((abund.alphafe.value - truth.alphafe).abs() < 0.2, "alpha={}", abund.alphafe.value);
    assert!((abund.teff.value - truth.teff).abs() < 250.0, "teff={}", abund.teff.value);
    assert_eq!(abund.logg.value, truth.logg);
    assert!(!abund.logg_fitted);
    assert!(abund.feh.error.is_some_and(|e| e > 0.0));
    assert!(abund.reduced_chi2.is_finite());
    if let Some(ca) = abund.element(Element::Ca) {
        assert!((ca.value - truth.alphafe).abs() < 0.3, "[Ca/Fe]={}", ca.value);
    }

    let residuals = compute_residuals(fitted).unwrap().unwrap();
    assert!(residuals.rms_sigma < 3.0, "rms/sigma={}", residuals.rms_sigma);

    // The written record round-trips with the fit attached.
    let record = dir
        .path()
        .join("out")
        .join("pfsabund-00001-09813-4,4-000000000000002a.json");
    let reread = read_record_json(&record).unwrap();
    let reread_abund = reread.abund.as_ref().unwrap();
    assert!((reread_abund.feh.value - abund.feh.value).abs() < 1e-9);
    assert_eq!(reread_abund.elements.len(), abund.elements.len());
    assert_eq!(reread.rv_kms, Some(85.0));
    assert!(format_object_summary(&reread).unwrap().contains("[Fe/H]"));

    let catalog = std::fs::read_to_string(dir.path().join("catalog.csv")).unwrap();
    let lines: Vec<&str> = catalog.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("object_id,"));
    assert!(lines[1].contains("00001-09813-4,4-000000000000002a"));
}
