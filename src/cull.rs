//! Frustum culling: narrowing the bar payload to the visible time range.
//!
//! Binary search over the (sorted) timestamp array yields `[start, end)`;
//! padding widens both sides by a fixed bar count so edge bars never pop
//! while panning, and the result is clamped between a minimum and maximum
//! instance count.

use bitchart_core::TimeRange;

/// First index whose timestamp is `>= t`.
pub fn lower_bound(times: &[f32], t: f32) -> usize {
    times.partition_point(|&x| x < t)
}

/// First index whose timestamp is `> t`.
pub fn upper_bound(times: &[f32], t: f32) -> usize {
    times.partition_point(|&x| x <= t)
}

#[derive(Clone, Copy, Debug)]
pub struct CullConfig {
    /// Bars of padding added on each side of the visible range.
    pub padding_bars: usize,
    pub min_count: usize,
    pub max_count: usize,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            padding_bars: 5,
            min_count: 1,
            max_count: 1 << 20,
        }
    }
}

/// A `[start, end)` slice of the logical bar array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullRange {
    pub start: usize,
    pub end: usize,
}

impl CullRange {
    pub fn count(&self) -> usize {
        self.end - self.start
    }
}

/// Narrow `times` to the bars visible in `range`, padded and clamped.
/// Over-full ranges are trimmed symmetrically around their center.
pub fn cull(times: &[f32], range: TimeRange, config: &CullConfig) -> CullRange {
    if times.is_empty() {
        return CullRange { start: 0, end: 0 };
    }
    let mut start = lower_bound(times, range.from as f32).saturating_sub(config.padding_bars);
    let mut end = (upper_bound(times, range.to as f32) + config.padding_bars).min(times.len());
    if end < start {
        end = start;
    }

    let count = end - start;
    if count > config.max_count {
        let trim = count - config.max_count;
        start += trim / 2;
        end = start + config.max_count;
    } else if count < config.min_count {
        end = (start + config.min_count).min(times.len());
        start = end.saturating_sub(config.min_count);
    }
    CullRange { start, end }
}

/// Whether the previously culled range is stale for the new view: true
/// when zoom drifted more than 10 % or the pan moved more than 10 % of the
/// span.
pub fn needs_update(previous: &TimeRange, next: &TimeRange) -> bool {
    let prev_span = previous.span();
    let next_span = next.span();
    if prev_span <= 0.0 || next_span <= 0.0 {
        return true;
    }
    let zoom_drift = (next_span / prev_span - 1.0).abs();
    let pan_drift = (next.from - previous.from).abs() / next_span;
    zoom_drift > 0.10 || pan_drift > 0.10
}
