mod common;

use approx::assert_abs_diff_eq;
use common::{counts, ordering_maker, value, ToyMaker};
use nf_core::{Error, Metric};
use nf_inference::{
    Analysis, DataSource, FitSettings, FitSink, HypoTesting, HypoTestingSettings, JsonDirSink,
    NullSink, ScanSettings, ScanValues, ShiftDirection, SystTestSettings,
};

fn settings() -> HypoTestingSettings {
    HypoTestingSettings {
        h0_param_selections: vec!["nh".into()],
        h1_param_selections: vec!["ih".into()],
        ..Default::default()
    }
}

fn study_with<S: FitSink>(fit: FitSettings, sink: S) -> HypoTesting<ToyMaker, S> {
    let analysis = Analysis::new(fit).unwrap();
    HypoTesting::new(analysis, settings(), ordering_maker(&["nh"]), None, DataSource::Model(None), sink)
        .unwrap()
}

fn study() -> HypoTesting<ToyMaker, NullSink> {
    study_with(FitSettings::with_metric(Metric::Llh), NullSink)
}

#[test]
fn test_injected_scan_moves_data_and_restores_models() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonDirSink::new(dir.path());
    let mut test = study_with(FitSettings::with_metric(Metric::Llh), sink);

    let points = test.asimov_inj_param_scan("norm", &[0.8, 1.2]).unwrap();
    assert_eq!(points.len(), 2);
    for point in &points {
        // h0 generated the data at the injected value.
        let h0 = &point.trial.h0_fit_to_data;
        assert_eq!(value(&h0.params, "norm"), point.value);
        assert!(h0.metric_val.abs() < 1e-12);
        assert!(point.trial.h1_fit_to_data.metric_val < 0.0);
    }
    let low = dir.path().join("inj_norm_0.8000/data_0/h1_fit_to_h0_fid_0.json");
    assert!(low.is_file(), "{}", low.display());
    assert!(dir.path().join("inj_norm_1.2000/data_0/h0_fit_to_h1_fid_0.json").is_file());

    let plain = test.run_data_trial(0).unwrap();
    assert_eq!(value(&plain.h0_fit_to_data.params, "norm"), 1.0);
}

#[test]
fn test_injected_value_outside_range_is_rejected() {
    let mut test = study();
    let err = test.asimov_inj_param_scan("norm", &[2.0]).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { .. }), "{err}");
    assert!(matches!(
        test.asimov_inj_param_scan("theta13", &[0.1]),
        Err(Error::Configuration(_))
    ));
    let plain = test.run_data_trial(0).unwrap();
    assert_eq!(value(&plain.h0_fit_to_data.params, "norm"), 1.0);
}

#[test]
fn test_nminusone_fixes_systematic_in_both_hypotheses() {
    let mut test = study();
    let results = test.asimov_syst_tests(&SystTestSettings::default()).unwrap();
    let baseline = results.baseline.as_ref().unwrap();
    assert!(baseline.h1_fit_to_data.minimizer_metadata.is_some());

    assert_eq!(results.tests.len(), 1);
    let n1 = &results.tests[0];
    assert_eq!(n1.param, "norm");
    assert_eq!(n1.direction, None);
    assert!(n1.fixed_in_fit);
    assert_eq!(n1.injected_value, 1.0);
    // Nothing left to fit in h1.
    assert!(n1.trial.h1_fit_to_data.minimizer_metadata.is_none());
    assert_eq!(value(&n1.trial.h1_fit_to_data.params, "norm"), 1.0);
    assert!(n1.trial.h1_fit_to_data.metric_val <= baseline.h1_fit_to_data.metric_val + 1e-9);

    // Free again afterwards.
    let plain = test.run_data_trial(0).unwrap();
    assert!(plain.h1_fit_to_data.minimizer_metadata.is_some());
}

#[test]
fn test_wrong_injection_held_at_baseline() {
    let mut test = study();
    let syst = SystTestSettings {
        inject_wrong: true,
        only_syst: Some(vec!["norm".into()]),
        do_baseline: false,
        ..Default::default()
    };
    let results = test.asimov_syst_tests(&syst).unwrap();
    assert!(results.baseline.is_none());
    assert_eq!(results.tests.len(), 2);

    let up = &results.tests[0];
    assert_eq!(up.direction, Some(ShiftDirection::Up));
    assert_abs_diff_eq!(up.injected_value, 1.1, epsilon = 1e-12);
    assert_abs_diff_eq!(results.tests[1].injected_value, 0.9, epsilon = 1e-12);
    for t in &results.tests {
        let h0 = &t.trial.h0_fit_to_data;
        // Shifted data is never scored as h0's own expectation.
        assert_eq!(value(&h0.params, "norm"), 1.0);
        assert!(h0.metric_val < -1e-3, "{}", h0.metric_val);
    }
}

#[test]
fn test_wrong_injection_fitted_away() {
    let mut test = study();
    let up = test.sys_wrong_asimov_test("norm", ShiftDirection::Up, true).unwrap();
    assert!(!up.fixed_in_fit);
    let h0 = &up.trial.h0_fit_to_data;
    assert!(h0.minimizer_metadata.is_some());
    assert_abs_diff_eq!(value(&h0.params, "norm"), 1.1, epsilon = 5e-3);
    assert_abs_diff_eq!(h0.metric_val, 0.0, epsilon = 1e-4);
}

#[test]
fn test_studies_need_model_data() {
    let analysis = Analysis::new(FitSettings::with_metric(Metric::Llh)).unwrap();
    let data = counts(vec![200.0, 100.0, 50.0]);
    let mut test = HypoTesting::new(
        analysis,
        settings(),
        ordering_maker(&["nh"]),
        None,
        DataSource::Measured(data),
        NullSink,
    )
    .unwrap();
    assert!(matches!(test.asimov_inj_param_scan("norm", &[1.0]), Err(Error::Configuration(_))));
    assert!(matches!(
        test.asimov_syst_tests(&SystTestSettings::default()),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_hypo_scan_peaks_at_truth() {
    let mut test = study();
    let scan = ScanSettings::new(vec!["norm".into()], ScanValues::Steps(vec![3]));
    let trials = test.hypo_scan(&scan).unwrap();
    assert_eq!(trials.len(), 1);
    let results = &trials[0].scan;
    assert_eq!(results.steps["norm"], vec![0.5, 1.0, 1.5]);
    let vals: Vec<f64> = results.results.iter().map(|r| r.metric_val).collect();
    assert!(vals[1] > vals[0] && vals[1] > vals[2], "{vals:?}");
    assert_abs_diff_eq!(vals[1], 0.0, epsilon = 1e-9);
}

#[test]
fn test_hypo_scan_refused_when_blind() {
    let blind = FitSettings { blind: true, ..FitSettings::with_metric(Metric::Llh) };
    let mut test = study_with(blind, NullSink);
    let scan = ScanSettings::new(vec!["norm".into()], ScanValues::Steps(vec![3]));
    assert!(matches!(test.hypo_scan(&scan), Err(Error::Configuration(_))));
}
