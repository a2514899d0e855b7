//! Shared vocabulary and data plane for BitChart.
//!
//! Everything the UI thread and the two workers agree on lives here: the
//! 24-byte OHLCV bar record, tick and viewport types, theme colors, and the
//! lock-free shared bar store that all three contexts map.

mod bar;
mod store;
mod theme;
mod viewport;

pub use bar::{Bar, Side, Tick, BYTES_PER_BAR, FLOATS_PER_BAR};
pub use store::{SharedStore, StoreHandle, StoreMode, StoreRegion, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use theme::Theme;
pub use viewport::{PriceRange, TimeRange, Viewport, VolumeRange};
