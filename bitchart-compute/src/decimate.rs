//! M4 temporal decimation.
//!
//! Partitions the source bars into equal floating-point buckets and emits
//! one bar per bucket carrying the bucket's first open/time, last close,
//! extrema, and summed volume. Visible highs and lows survive any zoom
//! level built on the output, and total volume is conserved.

use bitchart_core::Bar;

/// Reduce `bars` to at most `target_count` bars. When the source already
/// fits (or `target_count` is zero), the source is returned unchanged.
pub fn decimate_m4(bars: &[Bar], target_count: usize) -> Vec<Bar> {
    if target_count == 0 || bars.len() <= target_count {
        return bars.to_vec();
    }
    let bucket_size = bars.len() as f64 / target_count as f64;
    let mut out = Vec::with_capacity(target_count);
    for bucket in 0..target_count {
        let start = (bucket as f64 * bucket_size) as usize;
        let end = (((bucket + 1) as f64 * bucket_size) as usize).min(bars.len());
        let start = start.min(bars.len() - 1);
        let end = end.max(start + 1);
        let first = &bars[start];
        let last = &bars[end - 1];
        let mut high = f32::MIN;
        let mut low = f32::MAX;
        let mut volume = 0.0f32;
        for bar in &bars[start..end] {
            high = high.max(bar.high);
            low = low.min(bar.low);
            volume += bar.volume;
        }
        out.push(Bar {
            time: first.time,
            open: first.open,
            high,
            low,
            close: last.close,
            volume,
        });
    }
    out
}
