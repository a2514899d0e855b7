//! Time and price scales: pure data <-> normalized <-> pixel math.
//!
//! Nothing here touches the GPU or any surface; the controller reads these
//! and ships the results to the render worker as uniforms and to the
//! overlay painter as tick positions.

use bitchart_core::{PriceRange, TimeRange};

/// Fraction of the data span the view may extend past the newest bar.
pub const DEFAULT_RIGHT_PADDING: f64 = 0.05;

/// Minimum visible time span: 1 % of the data span, or one minute,
/// whichever is smaller (so sparse data stays zoomable).
const MIN_TIME_SPAN_FRACTION: f64 = 0.01;
const MIN_TIME_SPAN_MS: f64 = 60_000.0;

/// Minimum visible price span as a fraction of the data span.
const MIN_PRICE_SPAN_FRACTION: f64 = 0.001;

/// Fixed ladder of nice time steps, in milliseconds.
const TIME_STEPS: &[f64] = &[
    1_000.0,          // 1 s
    5_000.0,          // 5 s
    10_000.0,         // 10 s
    30_000.0,         // 30 s
    60_000.0,         // 1 min
    300_000.0,        // 5 min
    900_000.0,        // 15 min
    1_800_000.0,      // 30 min
    3_600_000.0,      // 1 h
    7_200_000.0,      // 2 h
    14_400_000.0,     // 4 h
    21_600_000.0,     // 6 h
    43_200_000.0,     // 12 h
    86_400_000.0,     // 1 d
    172_800_000.0,    // 2 d
    604_800_000.0,    // 1 wk
    1_209_600_000.0,  // 2 wk
    2_592_000_000.0,  // 1 mo
    7_776_000_000.0,  // 3 mo
    15_552_000_000.0, // 6 mo
    31_536_000_000.0, // 1 yr
];

/// Horizontal scale over bar timestamps (ms).
#[derive(Clone, Debug)]
pub struct TimeScale {
    data: Option<TimeRange>,
    visible: TimeRange,
    pixel_extent: f64,
    right_padding: f64,
}

impl TimeScale {
    pub fn new(pixel_extent: f64) -> Self {
        Self {
            data: None,
            visible: TimeRange { from: 0.0, to: 1.0 },
            pixel_extent: pixel_extent.max(1.0),
            right_padding: DEFAULT_RIGHT_PADDING,
        }
    }

    pub fn set_right_padding(&mut self, fraction: f64) {
        self.right_padding = fraction.max(0.0);
    }

    pub fn set_pixel_extent(&mut self, extent: f64) {
        self.pixel_extent = extent.max(1.0);
    }

    pub fn pixel_extent(&self) -> f64 {
        self.pixel_extent
    }

    pub fn visible(&self) -> TimeRange {
        self.visible
    }

    pub fn data_range(&self) -> Option<TimeRange> {
        self.data
    }

    pub fn set_data_range(&mut self, min: f64, max: f64) {
        if min < max {
            self.data = Some(TimeRange { from: min, to: max });
        } else {
            // a single bar still needs a non-empty span to map into
            self.data = Some(TimeRange {
                from: min,
                to: min + 1.0,
            });
        }
        self.clamp();
    }

    pub fn data_to_normalized(&self, t: f64) -> f64 {
        (t - self.visible.from) / self.visible.span()
    }

    pub fn normalized_to_data(&self, n: f64) -> f64 {
        self.visible.from + n * self.visible.span()
    }

    pub fn data_to_pixel(&self, t: f64) -> f64 {
        self.data_to_normalized(t) * self.pixel_extent
    }

    pub fn pixel_to_data(&self, px: f64) -> f64 {
        self.normalized_to_data(px / self.pixel_extent)
    }

    /// `factor < 1` zooms in. `center` defaults to the visible midpoint.
    pub fn zoom(&mut self, factor: f64, center: Option<f64>) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let c = center.unwrap_or_else(|| self.normalized_to_data(0.5));
        self.visible = TimeRange {
            from: c - (c - self.visible.from) * factor,
            to: c + (self.visible.to - c) * factor,
        };
        self.clamp();
    }

    pub fn pan(&mut self, delta: f64) {
        self.visible = TimeRange {
            from: self.visible.from + delta,
            to: self.visible.to + delta,
        };
        self.clamp();
    }

    pub fn pan_by_pixels(&mut self, delta_px: f64) {
        self.pan(delta_px / self.pixel_extent * self.visible.span());
    }

    /// Show the whole data range plus the right padding.
    pub fn fit_content(&mut self) {
        if let Some(data) = self.data {
            self.visible = TimeRange {
                from: data.from,
                to: data.to + self.right_padding * data.span(),
            };
        }
    }

    fn min_span(&self, data: &TimeRange) -> f64 {
        (data.span() * MIN_TIME_SPAN_FRACTION).min(MIN_TIME_SPAN_MS)
    }

    /// Keep the view inside `[min_data, max_data + padding]` and above the
    /// minimum span. An out-of-bounds pan is absorbed: the whole window
    /// shifts so the opposite edge moves by the same amount.
    fn clamp(&mut self) {
        let Some(data) = self.data else { return };
        let max_bound = data.to + self.right_padding * data.span();
        let min_bound = data.from;

        let min_span = self.min_span(&data);
        let max_span = max_bound - min_bound;
        let mut span = self.visible.span().clamp(min_span, max_span);
        if !span.is_finite() || span <= 0.0 {
            span = min_span;
        }
        let center = 0.5 * (self.visible.from + self.visible.to);
        let mut from = center - 0.5 * span;
        let mut to = center + 0.5 * span;

        if from < min_bound {
            to += min_bound - from;
            from = min_bound;
        }
        if to > max_bound {
            from -= to - max_bound;
            to = max_bound;
        }
        // narrow data can leave `from` below the bound again; the span
        // already equals the full bounds in that case
        if from < min_bound {
            from = min_bound;
        }
        self.visible = TimeRange { from, to };
    }

    /// Nice tick positions from the fixed ladder: the smallest step with at
    /// most `target_count` ticks across the visible span.
    pub fn grid_ticks(&self, target_count: usize) -> Vec<f64> {
        if target_count == 0 {
            return Vec::new();
        }
        let span = self.visible.span();
        let step = TIME_STEPS
            .iter()
            .copied()
            .find(|s| span / s <= target_count as f64)
            .unwrap_or_else(|| {
                // beyond the ladder: whole multiples of years
                let years = (span / target_count as f64 / TIME_STEPS[TIME_STEPS.len() - 1]).ceil();
                years * TIME_STEPS[TIME_STEPS.len() - 1]
            });
        ticks_for(self.visible.from, self.visible.to, step)
    }

    /// The ladder step the current view resolves to, for label formatting.
    pub fn tick_step(&self, target_count: usize) -> f64 {
        let span = self.visible.span();
        TIME_STEPS
            .iter()
            .copied()
            .find(|s| span / s <= target_count.max(1) as f64)
            .unwrap_or(TIME_STEPS[TIME_STEPS.len() - 1])
    }
}

/// Vertical scale over prices. Pixel 0 is the top of the pane and maps to
/// the maximum visible price.
#[derive(Clone, Debug)]
pub struct PriceScale {
    data: Option<PriceRange>,
    visible: PriceRange,
    pixel_extent: f64,
    log_scale: bool,
}

impl PriceScale {
    pub fn new(pixel_extent: f64) -> Self {
        Self {
            data: None,
            visible: PriceRange { min: 0.0, max: 1.0 },
            pixel_extent: pixel_extent.max(1.0),
            log_scale: false,
        }
    }

    pub fn set_pixel_extent(&mut self, extent: f64) {
        self.pixel_extent = extent.max(1.0);
    }

    pub fn pixel_extent(&self) -> f64 {
        self.pixel_extent
    }

    pub fn visible(&self) -> PriceRange {
        self.visible
    }

    pub fn data_range(&self) -> Option<PriceRange> {
        self.data
    }

    pub fn log_scale(&self) -> bool {
        self.log_scale
    }

    pub fn set_log_scale(&mut self, enabled: bool) {
        self.log_scale = enabled;
        self.clamp();
    }

    pub fn set_data_range(&mut self, min: f64, max: f64) {
        if min <= max {
            self.data = Some(PriceRange { min, max });
        }
    }

    /// Replace the visible window directly (auto-fit path).
    pub fn set_visible(&mut self, min: f64, max: f64) {
        if min < max {
            self.visible = PriceRange { min, max };
            self.clamp();
        }
    }

    pub fn data_to_normalized(&self, price: f64) -> f64 {
        if self.log_scale {
            let lo = self.visible.min.max(f64::MIN_POSITIVE).ln();
            let hi = self.visible.max.max(f64::MIN_POSITIVE).ln();
            (price.max(f64::MIN_POSITIVE).ln() - lo) / (hi - lo)
        } else {
            (price - self.visible.min) / self.visible.span()
        }
    }

    pub fn normalized_to_data(&self, n: f64) -> f64 {
        if self.log_scale {
            let lo = self.visible.min.max(f64::MIN_POSITIVE).ln();
            let hi = self.visible.max.max(f64::MIN_POSITIVE).ln();
            (lo + n * (hi - lo)).exp()
        } else {
            self.visible.min + n * self.visible.span()
        }
    }

    /// Inverted Y: pixel 0 is the maximum price.
    pub fn data_to_pixel(&self, price: f64) -> f64 {
        (1.0 - self.data_to_normalized(price)) * self.pixel_extent
    }

    pub fn pixel_to_data(&self, px: f64) -> f64 {
        self.normalized_to_data(1.0 - px / self.pixel_extent)
    }

    pub fn zoom(&mut self, factor: f64, center: Option<f64>) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let c = center.unwrap_or_else(|| self.normalized_to_data(0.5));
        self.visible = PriceRange {
            min: c - (c - self.visible.min) * factor,
            max: c + (self.visible.max - c) * factor,
        };
        self.clamp();
    }

    pub fn pan(&mut self, delta: f64) {
        self.visible = PriceRange {
            min: self.visible.min + delta,
            max: self.visible.max + delta,
        };
        self.clamp();
    }

    /// Positive pixel delta pans the view down (toward lower prices is a
    /// negative data delta because the axis is inverted).
    pub fn pan_by_pixels(&mut self, delta_px: f64) {
        self.pan(delta_px / self.pixel_extent * self.visible.span());
    }

    pub fn fit_content(&mut self) {
        if let Some(data) = self.data {
            let margin = data.span().max(f64::MIN_POSITIVE) * 0.05;
            self.visible = PriceRange {
                min: data.min - margin,
                max: data.max + margin,
            };
            self.clamp();
        }
    }

    fn clamp(&mut self) {
        if let Some(data) = self.data {
            let min_span = data.span() * MIN_PRICE_SPAN_FRACTION;
            if min_span > 0.0 && self.visible.span() < min_span {
                let center = 0.5 * (self.visible.min + self.visible.max);
                self.visible = PriceRange {
                    min: center - 0.5 * min_span,
                    max: center + 0.5 * min_span,
                };
            }
        }
        if self.log_scale && self.visible.min <= 0.0 {
            let max = self.visible.max.max(f64::MIN_POSITIVE * 4.0);
            self.visible = PriceRange {
                min: max * 1.0e-6,
                max,
            };
        }
    }

    /// Nice ticks: smallest step `m * 10^e`, `m` in {1, 2, 5}, such that
    /// the visible span holds at most `target_count` steps.
    pub fn grid_ticks(&self, target_count: usize) -> Vec<f64> {
        if target_count == 0 {
            return Vec::new();
        }
        let step = nice_step(self.visible.span(), target_count);
        ticks_for(self.visible.min, self.visible.max, step)
    }

    /// The step the ticks resolve to, for choosing label precision.
    pub fn tick_step(&self, target_count: usize) -> f64 {
        nice_step(self.visible.span(), target_count.max(1))
    }
}

fn nice_step(span: f64, target_count: usize) -> f64 {
    if !(span.is_finite() && span > 0.0) {
        return 1.0;
    }
    let raw = span / target_count as f64;
    let exp = raw.log10().floor();
    let base = 10f64.powf(exp);
    for m in [1.0, 2.0, 5.0, 10.0] {
        let step = m * base;
        if span / step <= target_count as f64 {
            return step;
        }
    }
    10.0 * base
}

fn ticks_for(from: f64, to: f64, step: f64) -> Vec<f64> {
    if !(step.is_finite() && step > 0.0) {
        return Vec::new();
    }
    let first = (from / step).ceil() * step;
    let mut out = Vec::new();
    let mut t = first;
    while t <= to {
        out.push(t);
        t += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_scale(data: (f64, f64), visible: (f64, f64)) -> TimeScale {
        let mut scale = TimeScale::new(800.0);
        scale.set_data_range(data.0, data.1);
        scale.visible = TimeRange {
            from: visible.0,
            to: visible.1,
        };
        scale.clamp();
        scale
    }

    #[test]
    fn time_round_trip() {
        let scale = time_scale((0.0, 1000.0), (100.0, 900.0));
        for t in [100.0, 321.5, 900.0] {
            let back = scale.pixel_to_data(scale.data_to_pixel(t));
            assert!((back - t).abs() < 1e-9, "round trip drifted: {t} -> {back}");
        }
    }

    #[test]
    fn zoom_is_reversible() {
        let mut scale = time_scale((0.0, 100_000.0), (20_000.0, 80_000.0));
        let before = scale.visible();
        scale.zoom(0.5, Some(50_000.0));
        scale.zoom(2.0, Some(50_000.0));
        let after = scale.visible();
        assert!((after.from - before.from).abs() < 1e-6);
        assert!((after.to - before.to).abs() < 1e-6);
    }

    #[test]
    fn pan_at_right_edge_is_absorbed() {
        // data [0, 1000], padding 0.05 -> bound 1050, view [900, 1050]
        let mut scale = time_scale((0.0, 1000.0), (900.0, 1050.0));
        scale.pan(200.0);
        let v = scale.visible();
        assert!((v.from - 900.0).abs() < 1e-9);
        assert!((v.to - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn pan_at_left_edge_is_absorbed() {
        let mut scale = time_scale((0.0, 1000.0), (0.0, 150.0));
        scale.pan(-300.0);
        let v = scale.visible();
        assert!((v.from - 0.0).abs() < 1e-9);
        assert!((v.to - 150.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_in_respects_minimum_span() {
        let mut scale = time_scale((0.0, 1000.0), (400.0, 600.0));
        for _ in 0..50 {
            scale.zoom(0.5, None);
        }
        let v = scale.visible();
        // 1 % of the 1000 ms data span
        assert!(v.span() >= 10.0 - 1e-9);
        assert!(v.from < v.to);
        assert!(v.from >= 0.0);
    }

    #[test]
    fn zoom_out_clamps_to_padded_bounds() {
        let mut scale = time_scale((0.0, 1000.0), (400.0, 600.0));
        for _ in 0..20 {
            scale.zoom(3.0, None);
        }
        let v = scale.visible();
        assert!(v.from >= 0.0);
        assert!(v.to <= 1050.0 + 1e-9);
    }

    #[test]
    fn fit_content_shows_all_plus_padding() {
        let mut scale = time_scale((0.0, 1000.0), (400.0, 600.0));
        scale.fit_content();
        let v = scale.visible();
        assert_eq!(v.from, 0.0);
        assert!((v.to - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn time_ticks_use_the_ladder() {
        // one hour visible, ~6 ticks -> 15 min step
        let mut scale = TimeScale::new(800.0);
        scale.set_data_range(0.0, 10.0 * 3_600_000.0);
        scale.visible = TimeRange {
            from: 0.0,
            to: 3_600_000.0,
        };
        let ticks = scale.grid_ticks(6);
        assert_eq!(scale.tick_step(6), 900_000.0);
        assert!(ticks.len() <= 6 && !ticks.is_empty());
        for pair in ticks.windows(2) {
            assert!((pair[1] - pair[0] - 900_000.0).abs() < 1e-6);
        }
    }

    fn price_scale(data: (f64, f64), visible: (f64, f64)) -> PriceScale {
        let mut scale = PriceScale::new(600.0);
        scale.set_data_range(data.0, data.1);
        scale.set_visible(visible.0, visible.1);
        scale
    }

    #[test]
    fn price_round_trip_linear() {
        let scale = price_scale((10.0, 110.0), (20.0, 100.0));
        for p in [20.0, 55.5, 100.0] {
            let back = scale.pixel_to_data(scale.data_to_pixel(p));
            assert!((back - p).abs() < 1e-9);
        }
    }

    #[test]
    fn price_axis_is_inverted() {
        let scale = price_scale((0.0, 100.0), (0.0, 100.0));
        assert!((scale.data_to_pixel(100.0) - 0.0).abs() < 1e-9);
        assert!((scale.data_to_pixel(0.0) - 600.0).abs() < 1e-9);
    }

    #[test]
    fn log_scale_stays_positive_and_round_trips() {
        let mut scale = price_scale((1.0, 1000.0), (1.0, 1000.0));
        scale.set_log_scale(true);
        scale.pan(-5000.0);
        assert!(scale.visible().min > 0.0);

        let mut scale = price_scale((1.0, 1000.0), (10.0, 100.0));
        scale.set_log_scale(true);
        for p in [10.0, 31.6, 100.0] {
            let back = scale.pixel_to_data(scale.data_to_pixel(p));
            assert!((back - p).abs() / p < 1e-9);
        }
    }

    #[test]
    fn price_ticks_are_1_2_5() {
        let scale = price_scale((0.0, 100.0), (0.0, 100.0));
        // span 100, target 5 -> raw 20 -> step 20
        assert_eq!(scale.tick_step(5), 20.0);
        let ticks = scale.grid_ticks(5);
        assert_eq!(ticks, vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);

        let scale = price_scale((0.0, 7.0), (0.0, 7.0));
        assert_eq!(scale.tick_step(10), 1.0);
        let scale = price_scale((0.0, 0.3), (0.0, 0.3));
        assert_eq!(scale.tick_step(4), 0.1);
    }

    #[test]
    fn price_minimum_span_enforced() {
        let mut scale = price_scale((0.0, 1000.0), (500.0, 501.0));
        for _ in 0..50 {
            scale.zoom(0.1, None);
        }
        assert!(scale.visible().span() >= 1.0 - 1e-9);
    }
}
