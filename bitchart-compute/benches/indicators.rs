use bitchart_compute::decimate::decimate_m4;
use bitchart_compute::indicators;
use bitchart_core::Bar;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + (i as f64 * 0.01).sin() * 5.0)
        .collect()
}

fn bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let c = 100.0 + (i as f32 * 0.01).sin() * 5.0;
            Bar::new(i as f32 * 60_000.0, c - 0.5, c + 1.0, c - 1.0, c, 10.0)
        })
        .collect()
}

fn bench_indicators(c: &mut Criterion) {
    let data = closes(1_000_000);
    c.bench_function("sma_20_1m", |b| {
        b.iter(|| indicators::sma(black_box(&data), 20))
    });
    c.bench_function("ema_20_1m", |b| {
        b.iter(|| indicators::ema(black_box(&data), 20))
    });
    c.bench_function("rsi_14_1m", |b| {
        b.iter(|| indicators::rsi(black_box(&data), 14))
    });
    c.bench_function("macd_12_26_9_1m", |b| {
        b.iter(|| indicators::macd(black_box(&data), 12, 26, 9))
    });
    c.bench_function("bollinger_20_1m", |b| {
        b.iter(|| indicators::bollinger(black_box(&data), 20, 2.0))
    });
}

fn bench_decimation(c: &mut Criterion) {
    let source = bars(1_000_000);
    c.bench_function("m4_1m_to_4k", |b| {
        b.iter(|| decimate_m4(black_box(&source), 4_096))
    });
}

criterion_group!(benches, bench_indicators, bench_decimation);
criterion_main!(benches);
