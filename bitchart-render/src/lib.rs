//! GPU rendering for BitChart.
//!
//! One worker thread owns the surface, device and queue; the UI thread
//! holds a [`RenderHandle`] and speaks the message protocol in
//! [`worker`]. Buffers live in a [`buffers::BufferArena`]; streaming data
//! goes through its orphaning `replace` path so uploads never stall behind
//! in-flight GPU reads.

pub mod buffers;
pub mod pipeline;
pub mod ticker;
pub mod worker;

pub use buffers::{BufferArena, BufferKey};
pub use ticker::{FrameTicker, IntervalTicker, ManualTicker, ManualTickerControl};
pub use worker::{
    FrameStats, RenderConfig, RenderEvent, RenderHandle, RenderMsg, RenderWorker, SeriesKind,
};
