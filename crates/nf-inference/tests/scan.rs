mod common;

use approx::assert_abs_diff_eq;
use common::{counts, shape_maker};
use nf_core::{DistributionMaker, Metric};
use nf_inference::{
    read_json, Analysis, Counter, FitSettings, ScanDetail, ScanResults, ScanSettings, ScanValues,
};

fn data() -> nf_core::MapSet {
    counts(vec![123.0, 82.0, 46.0])
}

#[test]
fn test_outer_grid_has_one_record_per_point() {
    let analysis = Analysis::new(FitSettings::with_metric(Metric::Chi2)).unwrap();
    let mut maker = shape_maker();
    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("scan").join("norm_slope.json");

    let mut settings =
        ScanSettings::new(vec!["norm".into(), "slope".into()], ScanValues::Steps(vec![3, 4]));
    settings.outfile = Some(outfile.clone());
    let results = analysis.scan(&data(), &mut maker, &settings, &mut Counter::new()).unwrap();

    assert_eq!(results.results.len(), 12);
    let norm = &results.steps["norm"];
    let slope = &results.steps["slope"];
    assert_eq!(norm.len(), 12);
    assert_eq!(slope.len(), 12);
    assert_eq!(norm.iter().cloned().fold(f64::INFINITY, f64::min), 0.5);
    assert_eq!(norm.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 2.0);
    assert_eq!(slope.iter().cloned().fold(f64::INFINITY, f64::min), -0.4);
    assert_eq!(slope.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 0.8);

    for (i, fit) in results.results.iter().enumerate() {
        assert_eq!(fit.params.get("norm").unwrap().value(), norm[i]);
        assert_eq!(fit.params.get("slope").unwrap().value(), slope[i]);
        assert!(fit.fit_history.is_none());
    }

    // Scanned parameters are free again afterwards.
    assert!(maker.params().is_free("norm") && maker.params().is_free("slope"));

    let on_disk: ScanResults = read_json(&outfile).unwrap();
    assert_eq!(on_disk.results.len(), 12);
    assert_eq!(on_disk.steps, results.steps);
}

#[test]
fn test_profiled_point_beats_raw_point() {
    let analysis = Analysis::new(FitSettings::with_metric(Metric::Chi2)).unwrap();
    let values = ScanValues::Flat(vec![1.2]);

    let profiled = ScanSettings::new(vec!["norm".into()], values.clone());
    let raw = ScanSettings { profile: false, ..ScanSettings::new(vec!["norm".into()], values) };

    let p = analysis.scan(&data(), &mut shape_maker(), &profiled, &mut Counter::new()).unwrap();
    let r = analysis.scan(&data(), &mut shape_maker(), &raw, &mut Counter::new()).unwrap();
    assert!(p.results[0].metric_val < r.results[0].metric_val);
    assert!(r.results[0].minimizer_metadata.is_none());
    assert_eq!(r.results[0].params.get("bkg").unwrap().value(), 5.0);
}

#[test]
fn test_zipped_subset_and_minimal_detail() {
    let analysis = Analysis::new(FitSettings::with_metric(Metric::Chi2)).unwrap();
    let mut settings = ScanSettings::new(
        vec!["norm".into(), "slope".into()],
        ScanValues::Nested(vec![vec![0.8, 1.0, 1.2], vec![0.0, 0.1, 0.2]]),
    );
    settings.outer = false;
    settings.only_points = Some(vec![2, 0]);
    settings.detail = ScanDetail::Minimal;

    let results = analysis.scan(&data(), &mut shape_maker(), &settings, &mut Counter::new()).unwrap();
    assert_eq!(results.steps["norm"], vec![1.2, 0.8]);
    assert_eq!(results.steps["slope"], vec![0.2, 0.0]);
    for fit in &results.results {
        assert!(fit.hypo_asimov_dist.is_none());
        assert!(fit.main_metric_info().unwrap().maps_binned.is_empty());
    }
    assert_abs_diff_eq!(
        results.results[0].main_metric_info().unwrap().maps["total"],
        results.results[0].metric_val,
        epsilon = 1e-9
    );
}

#[test]
fn test_unknown_scan_parameter_is_rejected() {
    let analysis = Analysis::new(FitSettings::default()).unwrap();
    let settings = ScanSettings::new(vec!["nope".into()], ScanValues::Scalar(1.0));
    assert!(analysis.scan(&data(), &mut shape_maker(), &settings, &mut Counter::new()).is_err());
}
