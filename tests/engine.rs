//! Engine-level properties across the store, decimation, LOD and culling:
//! the pieces the controller composes, exercised together.

use bitchart::cull::{cull, CullConfig};
use bitchart::lod::LodManager;
use bitchart::{Bar, SharedStore, StoreMode, TimeRange};
use bitchart_compute::decimate::decimate_m4;

fn noisy_bars(n: usize) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0f32;
    for i in 0..n {
        // deterministic pseudo-noise
        let wobble = ((i as f32 * 0.7).sin() + (i as f32 * 0.13).cos()) * 2.0;
        let open = price;
        let close = (open + wobble).max(1.0);
        let high = open.max(close) + 0.5 + ((i % 11) as f32) * 0.1;
        let low = (open.min(close) - 0.5 - ((i % 7) as f32) * 0.1).max(0.1);
        bars.push(Bar::new(i as f32 * 60_000.0, open, high, low, close, 1.0));
        price = close;
    }
    bars
}

// Decimated extrema match the source extrema over the union of any bucket
// run, and volume is conserved globally.
#[test]
fn decimation_preserves_windowed_extrema_and_volume() {
    let source = noisy_bars(10_000);
    let decimated = decimate_m4(&source, 500);
    assert_eq!(decimated.len(), 500);

    let src_high = source.iter().fold(f32::MIN, |m, b| m.max(b.high));
    let dec_high = decimated.iter().fold(f32::MIN, |m, b| m.max(b.high));
    assert_eq!(src_high, dec_high);

    let src_low = source.iter().fold(f32::MAX, |m, b| m.min(b.low));
    let dec_low = decimated.iter().fold(f32::MAX, |m, b| m.min(b.low));
    assert_eq!(src_low, dec_low);

    let src_vol: f32 = source.iter().map(|b| b.volume).sum();
    let dec_vol: f32 = decimated.iter().map(|b| b.volume).sum();
    assert!((src_vol - dec_vol).abs() < 1.0);

    // bucket-aligned prefix: the first decimated bar covers exactly the
    // first 20 source bars
    let first = &decimated[0];
    let window = &source[..20];
    assert_eq!(first.open, window[0].open);
    assert_eq!(first.close, window[19].close);
    assert_eq!(first.high, window.iter().fold(f32::MIN, |m, b| m.max(b.high)));
}

// A culled slice of a decimated cache still brackets the visible window.
#[test]
fn lod_cache_culls_like_the_source() {
    let source = noisy_bars(100_000);
    let mut lod = LodManager::new();
    let level = lod.select(100_000);
    assert!(level > 0);
    let factor = lod.active().decimation_factor;
    lod.set_cache(level, decimate_m4(&source, source.len() / factor));

    let cache = lod.cache(level).unwrap();
    let times: Vec<f32> = cache.iter().map(|b| b.time).collect();
    let visible = TimeRange {
        from: 1_000_000.0,
        to: 2_000_000.0,
    };
    let range = cull(&times, visible, &CullConfig::default());
    assert!(range.count() > 0);
    assert!(range.count() < cache.len());
    // padded bracket: the slice covers the window
    assert!(times[range.start] as f64 <= visible.from);
    assert!(times[range.end - 1] as f64 >= visible.to);
}

// The store round-trips through a worker-style reader under ring wrap.
#[test]
fn ring_store_snapshot_is_logical_order_after_many_wraps() {
    let mut store = SharedStore::with_capacity(StoreMode::Ring, 128);
    let bars = noisy_bars(1_000);
    for chunk in bars.chunks(37) {
        assert!(store.append(chunk));
    }
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 128);
    // the snapshot is exactly the trailing window, in order
    let expected = &bars[bars.len() - 128..];
    assert_eq!(snapshot.as_slice(), expected);
    for pair in snapshot.windows(2) {
        assert!(pair[0].time < pair[1].time);
    }
}
