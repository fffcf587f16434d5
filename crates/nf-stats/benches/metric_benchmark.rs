use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nf_core::{BinDim, Binning, Map, MapSet, Metric};
use std::hint::black_box;

/// Energy x cos(zenith) binning similar to an oscillation analysis.
fn binning(n_e: usize, n_cz: usize) -> Binning {
    let e_edges = (0..=n_e).map(|i| 10f64.powf(0.5 + 1.5 * i as f64 / n_e as f64)).collect();
    let cz_edges = (0..=n_cz).map(|i| -1.0 + 2.0 * i as f64 / n_cz as f64).collect();
    Binning::new(vec![
        BinDim::new("reco_energy", e_edges).unwrap(),
        BinDim::new("reco_coszen", cz_edges).unwrap(),
    ])
    .unwrap()
}

fn make_pair(n_e: usize, n_cz: usize) -> (MapSet, MapSet) {
    let b = binning(n_e, n_cz);
    let n = b.num_bins();
    let expected: Vec<f64> = (0..n).map(|i| 20.0 + 15.0 * ((i as f64) * 0.37).sin()).collect();
    let observed: Vec<f64> = expected.iter().map(|v| (v * 1.05).round()).collect();
    let errors: Vec<f64> = expected.iter().map(|v| 0.08 * v).collect();
    let samples: Vec<Vec<f64>> =
        expected.iter().map(|v| vec![0.25; (v / 0.25).round() as usize]).collect();

    let obs = Map::new("total", b.clone(), observed).unwrap();
    let exp = Map::new("total", b, expected)
        .unwrap()
        .with_errors(errors)
        .unwrap()
        .with_weight_samples(samples)
        .unwrap();
    (MapSet::single(obs), MapSet::single(exp))
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metric_total");
    let (obs, exp) = make_pair(20, 20);

    for metric in Metric::ALL {
        group.bench_with_input(BenchmarkId::new(metric.name(), 400), &metric, |b, &m| {
            b.iter(|| black_box(nf_stats::metric_total(&obs, &exp, m).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_metrics);
criterion_main!(benches);
