use bytemuck::{Pod, Zeroable};

/// Floats per bar record: `time, open, high, low, close, volume`.
pub const FLOATS_PER_BAR: usize = 6;
/// Bar record size in bytes.
pub const BYTES_PER_BAR: usize = FLOATS_PER_BAR * 4;

/// One OHLCV record at a fixed timeframe.
///
/// `time` is milliseconds since an arbitrary epoch, monotonic and
/// non-negative. The layout is the GPU instance layout: six packed f32,
/// uploaded verbatim as per-instance attributes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Bar {
    pub time: f32,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
}

impl Bar {
    pub fn new(time: f32, open: f32, high: f32, low: f32, close: f32, volume: f32) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub(crate) fn from_floats(f: [f32; FLOATS_PER_BAR]) -> Self {
        Self {
            time: f[0],
            open: f[1],
            high: f[2],
            low: f[3],
            close: f[4],
            volume: f[5],
        }
    }

    pub(crate) fn to_floats(self) -> [f32; FLOATS_PER_BAR] {
        [
            self.time,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ]
    }

    /// `low <= min(open, close) <= max(open, close) <= high`, `volume >= 0`.
    pub fn is_well_formed(&self) -> bool {
        let body_lo = self.open.min(self.close);
        let body_hi = self.open.max(self.close);
        self.low <= body_lo && body_hi <= self.high && self.volume >= 0.0 && self.time >= 0.0
    }

    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// Trade aggressor side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// A single trade event, prior to bar aggregation.
///
/// `time` stays f64 here: tick timestamps arrive as full epoch milliseconds
/// and only get narrowed to f32 once a bar is built against the chart epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    pub time: f64,
    pub price: f64,
    pub volume: Option<f64>,
    pub side: Option<Side>,
}

impl Tick {
    pub fn new(time: f64, price: f64) -> Self {
        Self {
            time,
            price,
            volume: None,
            side: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_layout_is_24_bytes() {
        assert_eq!(std::mem::size_of::<Bar>(), BYTES_PER_BAR);
        let bar = Bar::new(1.0, 2.0, 3.0, 0.5, 2.5, 7.0);
        let floats: [f32; FLOATS_PER_BAR] = bar.to_floats();
        assert_eq!(floats, [1.0, 2.0, 3.0, 0.5, 2.5, 7.0]);
        assert_eq!(Bar::from_floats(floats), bar);
    }

    #[test]
    fn well_formedness() {
        assert!(Bar::new(0.0, 10.0, 12.0, 9.0, 11.0, 5.0).is_well_formed());
        // high below the body
        assert!(!Bar::new(0.0, 10.0, 10.5, 9.0, 11.0, 5.0).is_well_formed());
        // negative volume
        assert!(!Bar::new(0.0, 10.0, 12.0, 9.0, 11.0, -1.0).is_well_formed());
    }
}
