/// Visible time window, milliseconds. Invariant: `from < to`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub from: f64,
    pub to: f64,
}

impl TimeRange {
    pub fn new(from: f64, to: f64) -> Self {
        debug_assert!(from < to, "empty time range {from}..{to}");
        Self { from, to }
    }

    pub fn span(&self) -> f64 {
        self.to - self.from
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.from && t <= self.to
    }
}

/// Visible price window. Invariant: `min <= max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max, "inverted price range {min}..{max}");
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Volume scaling for the bottom strip. Invariant: `min <= max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeRange {
    pub min: f64,
    pub max: f64,
}

impl VolumeRange {
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max, "inverted volume range {min}..{max}");
        Self { min, max }
    }
}

/// Everything the render worker needs to place one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub time: TimeRange,
    pub price: PriceRange,
    pub volume: VolumeRange,
}

impl Viewport {
    pub fn new(time: TimeRange, price: PriceRange, volume: VolumeRange) -> Self {
        Self {
            time,
            price,
            volume,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            time: TimeRange { from: 0.0, to: 1.0 },
            price: PriceRange { min: 0.0, max: 1.0 },
            volume: VolumeRange { min: 0.0, max: 1.0 },
        }
    }
}
