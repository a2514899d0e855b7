//! BitChart: a GPU-accelerated OHLCV chart engine.
//!
//! Three cooperating contexts: the embedder's UI thread runs the
//! [`ChartController`]; a render worker owns the surface and produces one
//! frame per tick; a compute worker does indicator math and M4 decimation.
//! The bar payload lives in a [`bitchart_core::SharedStore`] all three map,
//! published bar-by-bar with release/acquire ordering.
//!
//! ```no_run
//! use bitchart::{Bar, ChartConfig, ChartController};
//!
//! let mut chart = ChartController::new(ChartConfig::default());
//! // chart.init(window) attaches the GPU surface
//! chart.set_data(&[Bar::new(0.0, 10.0, 12.0, 9.0, 11.0, 5.0)]).unwrap();
//! ```

pub mod controller;
pub mod cull;
pub mod events;
pub mod ingest;
pub mod lod;
pub mod overlay;
pub mod scale;

pub use bitchart_compute::{ComputeError, IndicatorKind, Pending};
pub use bitchart_core::{
    Bar, PriceRange, SharedStore, Side, StoreMode, Theme, Tick, TimeRange, Viewport, VolumeRange,
};
pub use bitchart_render::{FrameStats, RenderEvent, SeriesKind};

pub use controller::{ChartConfig, ChartController, ChartError};
pub use events::{ChartEvent, Crosshair, SubscriptionId};
pub use ingest::{
    BarBuilder, ConnectionState, DefaultParser, ExchangeTradeParser, FeedBar, FeedConfig,
    FeedEvent, RealtimeFeed, TickParser,
};
pub use overlay::{OverlayRenderer, OverlaySurface};
pub use scale::{PriceScale, TimeScale};
