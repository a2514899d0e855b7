//! Tick-to-bar aggregation.
//!
//! Ticks bucket by `floor(t / timeframe) * timeframe`. A tick landing in a
//! new bucket closes the previous bar; ticks inside the current bucket
//! fold into it (`high = max`, `low = min`, `close = price`,
//! `volume += tick.volume`).

use bitchart_core::{Bar, Tick};

/// A bar under construction, in full f64 epoch milliseconds. Narrowing to
/// the f32 store record happens against the chart epoch at emit time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedBar {
    pub time: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl FeedBar {
    pub fn to_bar(&self, epoch_ms: f64) -> Bar {
        Bar {
            time: (self.time - epoch_ms) as f32,
            open: self.open as f32,
            high: self.high as f32,
            low: self.low as f32,
            close: self.close as f32,
            volume: self.volume as f32,
        }
    }
}

pub struct BarBuilder {
    timeframe_ms: f64,
    current: Option<FeedBar>,
}

impl BarBuilder {
    pub fn new(timeframe_ms: f64) -> Self {
        Self {
            timeframe_ms: timeframe_ms.max(1.0),
            current: None,
        }
    }

    pub fn timeframe_ms(&self) -> f64 {
        self.timeframe_ms
    }

    /// Switching timeframe discards the bar under construction.
    pub fn set_timeframe(&mut self, timeframe_ms: f64) {
        self.timeframe_ms = timeframe_ms.max(1.0);
        self.current = None;
    }

    /// The partial bar being built, if any.
    pub fn current(&self) -> Option<&FeedBar> {
        self.current.as_ref()
    }

    /// Fold one tick in. Returns the completed previous bar when the tick
    /// opens a new bucket.
    pub fn push(&mut self, tick: &Tick) -> Option<FeedBar> {
        let bucket = (tick.time / self.timeframe_ms).floor() * self.timeframe_ms;
        let volume = tick.volume.unwrap_or(0.0);
        match self.current.as_mut() {
            Some(bar) if bar.time == bucket => {
                bar.high = bar.high.max(tick.price);
                bar.low = bar.low.min(tick.price);
                bar.close = tick.price;
                bar.volume += volume;
                None
            }
            _ => {
                let completed = self.current.take();
                self.current = Some(FeedBar {
                    time: bucket,
                    open: tick.price,
                    high: tick.price,
                    low: tick.price,
                    close: tick.price,
                    volume,
                });
                completed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(time: f64, price: f64, volume: f64) -> Tick {
        Tick::new(time, price).with_volume(volume)
    }

    #[test]
    fn ticks_fold_into_one_bucket() {
        let mut builder = BarBuilder::new(60_000.0);
        assert!(builder.push(&tick(10.0, 100.0, 1.0)).is_none());
        assert!(builder.push(&tick(20_000.0, 105.0, 2.0)).is_none());
        assert!(builder.push(&tick(59_000.0, 95.0, 1.5)).is_none());
        let bar = builder.current().unwrap();
        assert_eq!(bar.time, 0.0);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 95.0);
        assert_eq!(bar.close, 95.0);
        assert_eq!(bar.volume, 4.5);
    }

    #[test]
    fn new_bucket_emits_previous_bar() {
        let mut builder = BarBuilder::new(60_000.0);
        builder.push(&tick(1_000.0, 100.0, 1.0));
        let completed = builder.push(&tick(61_000.0, 110.0, 2.0)).unwrap();
        assert_eq!(completed.time, 0.0);
        assert_eq!(completed.close, 100.0);
        let current = builder.current().unwrap();
        assert_eq!(current.time, 60_000.0);
        assert_eq!(current.open, 110.0);
        assert_eq!(current.volume, 2.0);
    }

    #[test]
    fn tick_without_volume_counts_zero() {
        let mut builder = BarBuilder::new(1_000.0);
        builder.push(&Tick::new(0.0, 5.0));
        assert_eq!(builder.current().unwrap().volume, 0.0);
    }

    #[test]
    fn bucket_alignment_uses_floor() {
        let mut builder = BarBuilder::new(60_000.0);
        builder.push(&tick(119_999.0, 1.0, 0.0));
        assert_eq!(builder.current().unwrap().time, 60_000.0);
    }

    #[test]
    fn timeframe_switch_resets() {
        let mut builder = BarBuilder::new(60_000.0);
        builder.push(&tick(0.0, 1.0, 0.0));
        builder.set_timeframe(300_000.0);
        assert!(builder.current().is_none());
        assert_eq!(builder.timeframe_ms(), 300_000.0);
    }

    #[test]
    fn feed_bar_rebases_to_epoch() {
        let bar = FeedBar {
            time: 1_700_000_060_000.0,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 3.0,
        };
        let rebased = bar.to_bar(1_700_000_000_000.0);
        assert_eq!(rebased.time, 60_000.0);
        assert_eq!(rebased.close, 1.5);
    }
}
