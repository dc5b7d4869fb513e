use criterion::{black_box, criterion_group, criterion_main, Criterion};
use simfarm_search::{check_stop, StopCondition};

fn history(n: usize) -> Vec<f64> {
    (0..n).map(|k| (k as f64 * 0.1).sin()).collect()
}

fn bench_stop_conditions(c: &mut Criterion) {
    let evaluations = history(128);

    let numeric = StopCondition::Number(0.5);
    c.bench_function("stop_numeric_crossing", |b| {
        b.iter(|| check_stop(black_box(&numeric), black_box(&evaluations)).unwrap())
    });

    let comparison = StopCondition::Expr("> 0.5".to_string());
    c.bench_function("stop_leading_comparison", |b| {
        b.iter(|| check_stop(black_box(&comparison), black_box(&evaluations)).unwrap())
    });

    let indexed = StopCondition::Expr("abs([-1] - [-2]) > 0.01 and [0] < 1".to_string());
    c.bench_function("stop_indexed_expression", |b| {
        b.iter(|| check_stop(black_box(&indexed), black_box(&evaluations)).unwrap())
    });
}

criterion_group!(benches, bench_stop_conditions);
criterion_main!(benches);
