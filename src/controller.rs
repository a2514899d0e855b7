//! The chart controller: UI-thread conductor.
//!
//! Owns the shared store, both workers, both scales, LOD selection and
//! culling, the optional realtime feed, and the listener registry. All
//! public entry points run on the embedder's thread; the only blocking
//! they do is bounded channel sends. GPU work happens in the render
//! worker, indicator math in the compute worker.
//!
//! Data sync keeps one ordering invariant: every instance upload is
//! followed by the `SetViewport` derived from the same state, over the
//! same FIFO channel, so the render worker never draws new data against a
//! stale viewport.

use crate::cull::{cull, lower_bound, needs_update, CullConfig, CullRange};
use crate::events::{ChartEvent, Crosshair, EventRegistry, SubscriptionId};
use crate::ingest::{FeedBar, FeedConfig, FeedEvent, FeedHandle, RealtimeFeed, TickParser};
use crate::lod::LodManager;
use crate::overlay::{OverlayRenderer, OverlaySurface};
use crate::scale::{PriceScale, TimeScale};
use bitchart_compute::{ComputeHandle, ComputeWorker, IndicatorKind, Pending};
use bitchart_core::{Bar, SharedStore, StoreMode, Theme, TimeRange, Viewport, VolumeRange};
use bitchart_render::{
    IntervalTicker, RenderConfig, RenderEvent, RenderHandle, RenderMsg, RenderWorker, SeriesKind,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart controller already destroyed")]
    Destroyed,
    #[error("chart controller already initialized")]
    AlreadyInitialized,
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Compute(#[from] bitchart_compute::ComputeError),
}

#[derive(Clone, Debug)]
pub struct ChartConfig {
    /// Initial surface size, physical pixels.
    pub width: u32,
    pub height: u32,
    pub dpr: f32,
    pub store_mode: StoreMode,
    /// `false` degrades to copy mode: workers receive owned snapshots.
    pub shared_memory: bool,
    pub theme: Theme,
    pub lod_enabled: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            dpr: 1.0,
            store_mode: StoreMode::Growable,
            shared_memory: true,
            theme: Theme::dark(),
            lod_enabled: true,
        }
    }
}

struct PanState {
    last_x: f64,
    last_y: f64,
    start_x: f64,
    start_y: f64,
    travelled: f64,
}

/// Pixel travel below which a pointer press-release counts as a click.
const CLICK_SLOP_PX: f64 = 3.0;

pub struct ChartController {
    store: SharedStore,
    compute: ComputeHandle,
    render: Option<RenderHandle>,
    time_scale: TimeScale,
    price_scale: PriceScale,
    lod: LodManager,
    lod_enabled: bool,
    lod_pending: Option<(usize, Pending<Vec<Bar>>)>,
    uploaded_range: Option<TimeRange>,
    cull_config: CullConfig,
    timestamps: Vec<f32>,
    price_bounds: Option<(f64, f64)>,
    registry: EventRegistry,
    theme: Theme,
    overlay: OverlayRenderer,
    overlay_lanes: HashMap<u32, usize>,
    crosshair: Option<Crosshair>,
    pan: Option<PanState>,
    pinch_distance: Option<f64>,
    price_auto: bool,
    feed: Option<FeedHandle>,
    epoch_ms: f64,
    handle_generation_sent: u64,
    width: u32,
    height: u32,
    dpr: f32,
    destroyed: bool,
}

impl ChartController {
    pub fn new(config: ChartConfig) -> Self {
        let store = if config.shared_memory {
            SharedStore::new(config.store_mode)
        } else {
            SharedStore::private(config.store_mode, bitchart_core::DEFAULT_CAPACITY)
        };
        let compute = ComputeWorker::spawn(store.shared_handle());
        let logical_w = config.width as f64 / config.dpr as f64;
        let logical_h = config.height as f64 / config.dpr as f64;
        Self {
            store,
            compute,
            render: None,
            time_scale: TimeScale::new(logical_w),
            price_scale: PriceScale::new(logical_h),
            lod: LodManager::new(),
            lod_enabled: config.lod_enabled,
            lod_pending: None,
            uploaded_range: None,
            cull_config: CullConfig::default(),
            timestamps: Vec::new(),
            price_bounds: None,
            registry: EventRegistry::new(),
            theme: config.theme,
            overlay: OverlayRenderer::new(config.dpr),
            overlay_lanes: HashMap::new(),
            crosshair: None,
            pan: None,
            pinch_distance: None,
            price_auto: true,
            feed: None,
            epoch_ms: 0.0,
            handle_generation_sent: 0,
            width: config.width,
            height: config.height,
            dpr: config.dpr,
            destroyed: false,
        }
    }

    fn ensure_alive(&self) -> Result<(), ChartError> {
        if self.destroyed {
            Err(ChartError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Attach the GPU surface and start the render worker. `target` is
    /// anything wgpu can build a surface from (the host's window).
    pub fn init<T>(&mut self, target: T) -> Result<(), ChartError>
    where
        T: Into<wgpu::SurfaceTarget<'static>> + Send + 'static,
    {
        self.ensure_alive()?;
        if self.render.is_some() {
            return Err(ChartError::AlreadyInitialized);
        }
        let render = RenderWorker::spawn(
            target,
            RenderConfig {
                width: self.width,
                height: self.height,
                dpr: self.dpr,
            },
            self.store.shared_handle(),
            Box::new(IntervalTicker::vsync()),
        );
        render.send(RenderMsg::SetTheme(self.theme));
        self.render = Some(render);
        self.upload_and_viewport(true);
        Ok(())
    }

    pub fn subscribe(
        &mut self,
        listener: impl Fn(&ChartEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.registry.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    //=========================================================================
    // Data plane
    //=========================================================================

    /// Replace the data set. Malformed bars are dropped with a warning.
    pub fn set_data(&mut self, bars: &[Bar]) -> Result<(), ChartError> {
        self.ensure_alive()?;
        let clean = validate_bars(bars);
        if !self.store.set_all(&clean) {
            return Err(ChartError::InvalidData(format!(
                "{} bars exceed the store capacity cap",
                clean.len()
            )));
        }
        self.timestamps = clean.iter().map(|b| b.time).collect();
        self.price_bounds = price_bounds(&clean);
        self.lod.invalidate();
        self.lod_pending = None;
        self.refresh_scales(true);
        self.sync_workers();
        self.upload_and_viewport(true);
        self.registry.emit(&ChartEvent::DataChange {
            count: self.store.count(),
        });
        Ok(())
    }

    /// Append bars after the current end. A growable store at its cap
    /// drops the batch (matching the store contract) with a warning.
    pub fn append_data(&mut self, bars: &[Bar]) -> Result<(), ChartError> {
        self.ensure_alive()?;
        let clean = validate_bars(bars);
        if clean.is_empty() {
            return Ok(());
        }
        let was_empty = self.timestamps.is_empty();
        if !self.store.append(&clean) {
            log::warn!("append dropped: store at capacity");
            return Ok(());
        }
        match self.store.mode() {
            StoreMode::Ring => {
                // wrapping may have evicted the oldest bars
                self.timestamps = self.store.snapshot().iter().map(|b| b.time).collect();
            }
            StoreMode::Growable => {
                self.timestamps.extend(clean.iter().map(|b| b.time));
            }
        }
        merge_price_bounds(&mut self.price_bounds, &clean);
        self.lod.invalidate();
        self.refresh_scales(was_empty);
        self.sync_workers();
        self.upload_and_viewport(true);
        self.registry.emit(&ChartEvent::DataChange {
            count: self.store.count(),
        });
        Ok(())
    }

    /// Overwrite the last bar in place (streaming partial updates).
    pub fn update_last_candle(&mut self, bar: &Bar) -> Result<(), ChartError> {
        self.ensure_alive()?;
        if !bar.is_well_formed() {
            return Err(ChartError::InvalidData(format!("malformed bar {bar:?}")));
        }
        if !self.store.update_last(bar) {
            return Err(ChartError::InvalidData("no bar to update".into()));
        }
        merge_price_bounds(&mut self.price_bounds, std::slice::from_ref(bar));
        self.refresh_scales(false);
        self.sync_workers();
        self.upload_and_viewport(true);
        self.registry.emit(&ChartEvent::DataChange {
            count: self.store.count(),
        });
        Ok(())
    }

    pub fn clear_data(&mut self) -> Result<(), ChartError> {
        self.ensure_alive()?;
        self.store.clear();
        self.timestamps.clear();
        self.price_bounds = None;
        self.lod.invalidate();
        self.uploaded_range = None;
        self.sync_workers();
        if let Some(render) = &self.render {
            render.send(RenderMsg::UpdateData(Vec::new()));
        }
        self.registry.emit(&ChartEvent::DataChange { count: 0 });
        Ok(())
    }

    /// Epoch the f32 bar timestamps are relative to; feeds and time labels
    /// use it to recover absolute time.
    pub fn set_epoch_ms(&mut self, epoch_ms: f64) {
        self.epoch_ms = epoch_ms;
        self.overlay.epoch_ms = epoch_ms;
    }

    pub fn bar_count(&self) -> usize {
        self.store.count()
    }

    pub fn snapshot(&self) -> Vec<Bar> {
        self.store.snapshot()
    }

    //=========================================================================
    // Indicators
    //=========================================================================

    /// Kick an indicator computation over the full data set; the result
    /// arrives on the returned promise (30 s default timeout).
    pub fn compute_indicator(
        &mut self,
        kind: IndicatorKind,
    ) -> Result<Pending<Vec<f64>>, ChartError> {
        self.ensure_alive()?;
        let count = self.store.count();
        Ok(self.compute.compute_indicator(kind, 0, count))
    }

    /// Compute an indicator and push it to the GPU as line overlays, one
    /// per lane (so MACD/Bollinger occupy `id`, `id + 1`, `id + 2`).
    /// Blocks on the compute worker up to the request timeout.
    pub fn apply_indicator_overlay(
        &mut self,
        id: u32,
        kind: IndicatorKind,
        color: [f32; 4],
        thickness_px: f32,
    ) -> Result<(), ChartError> {
        self.ensure_alive()?;
        let count = self.store.count();
        let values = self.compute.compute_indicator(kind, 0, count).wait()?;
        let lanes = kind.lanes();
        if let Some(render) = &self.render {
            for lane in 0..lanes {
                let points: Vec<[f32; 2]> = self
                    .timestamps
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &t)| {
                        let v = values[i * lanes + lane];
                        (!v.is_nan()).then(|| [t, v as f32])
                    })
                    .collect();
                render.send(RenderMsg::SetOverlay {
                    id: id + lane as u32,
                    points,
                    color,
                    thickness_px,
                });
            }
        }
        self.overlay_lanes.insert(id, lanes);
        Ok(())
    }

    pub fn remove_indicator_overlay(&mut self, id: u32) {
        let lanes = self.overlay_lanes.remove(&id).unwrap_or(1);
        if let Some(render) = &self.render {
            for lane in 0..lanes {
                render.send(RenderMsg::RemoveOverlay {
                    id: id + lane as u32,
                });
            }
        }
    }

    //=========================================================================
    // Appearance & layout
    //=========================================================================

    pub fn set_theme(&mut self, theme: Theme) -> Result<(), ChartError> {
        self.ensure_alive()?;
        self.theme = theme;
        if let Some(render) = &self.render {
            render.send(RenderMsg::SetTheme(theme));
        }
        Ok(())
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn set_series_visibility(&mut self, series: SeriesKind, visible: bool) {
        if let Some(render) = &self.render {
            render.send(RenderMsg::SetSeriesVisibility { series, visible });
        }
    }

    /// New surface size in physical pixels.
    pub fn resize(&mut self, width: u32, height: u32, dpr: f32) -> Result<(), ChartError> {
        self.ensure_alive()?;
        self.width = width;
        self.height = height;
        self.dpr = dpr;
        self.overlay.dpr = dpr;
        self.time_scale.set_pixel_extent(width as f64 / dpr as f64);
        self.price_scale.set_pixel_extent(height as f64 / dpr as f64);
        if let Some(render) = &self.render {
            render.send(RenderMsg::Resize { width, height, dpr });
        }
        self.upload_and_viewport(true);
        Ok(())
    }

    /// Paint the 2D layer (grid labels, crosshair, tooltip) onto the
    /// host-provided surface.
    pub fn paint_overlay(&self, surface: &mut dyn OverlaySurface) {
        self.overlay.paint(
            surface,
            &self.time_scale,
            &self.price_scale,
            &self.theme,
            self.crosshair.as_ref(),
        );
    }

    pub fn time_scale(&self) -> &TimeScale {
        &self.time_scale
    }

    pub fn price_scale(&self) -> &PriceScale {
        &self.price_scale
    }

    //=========================================================================
    // Interaction
    //=========================================================================

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.pan = Some(PanState {
            last_x: x,
            last_y: y,
            start_x: x,
            start_y: y,
            travelled: 0.0,
        });
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        if let Some(pan) = self.pan.as_mut() {
            let dx = x - pan.last_x;
            let dy = y - pan.last_y;
            pan.last_x = x;
            pan.last_y = y;
            pan.travelled += dx.abs() + dy.abs();
            self.time_scale.pan_by_pixels(-dx);
            if dy != 0.0 {
                self.price_auto = false;
                self.price_scale.pan_by_pixels(dy);
            }
            self.upload_and_viewport(false);
        } else {
            let time = self.time_scale.pixel_to_data(x);
            let price = self.price_scale.pixel_to_data(y);
            let bar = self
                .nearest_index(time as f32)
                .and_then(|i| self.store.get(i));
            let crosshair = Crosshair {
                x,
                y,
                time,
                price,
                bar,
            };
            self.crosshair = Some(crosshair.clone());
            self.registry.emit(&ChartEvent::Crosshair(Some(crosshair)));
        }
    }

    pub fn pointer_up(&mut self, x: f64, y: f64) {
        if let Some(pan) = self.pan.take() {
            let travelled = pan.travelled + (x - pan.last_x).abs() + (y - pan.last_y).abs();
            if travelled < CLICK_SLOP_PX
                && (x - pan.start_x).abs() < CLICK_SLOP_PX
                && (y - pan.start_y).abs() < CLICK_SLOP_PX
            {
                self.registry.emit(&ChartEvent::Click {
                    x,
                    y,
                    time: self.time_scale.pixel_to_data(x),
                    price: self.price_scale.pixel_to_data(y),
                });
            }
        }
    }

    pub fn pointer_leave(&mut self) {
        self.pan = None;
        if self.crosshair.take().is_some() {
            self.registry.emit(&ChartEvent::Crosshair(None));
        }
    }

    /// Wheel zoom anchored at the pointer's time position.
    pub fn wheel(&mut self, delta_y: f64, x: f64) {
        let factor = if delta_y > 0.0 { 1.1 } else { 0.9 };
        let center = self.time_scale.pixel_to_data(x);
        self.time_scale.zoom(factor, Some(center));
        self.upload_and_viewport(false);
    }

    /// Two-finger pinch: the distance ratio feeds the zoom.
    pub fn pinch_update(&mut self, distance: f64) {
        if distance <= 0.0 {
            return;
        }
        if let Some(previous) = self.pinch_distance {
            let factor = previous / distance;
            self.time_scale.zoom(factor, None);
            self.upload_and_viewport(false);
        }
        self.pinch_distance = Some(distance);
    }

    pub fn pinch_end(&mut self) {
        self.pinch_distance = None;
    }

    pub fn double_click(&mut self) {
        self.time_scale.fit_content();
        self.price_scale.fit_content();
        self.price_auto = true;
        self.upload_and_viewport(true);
    }

    //=========================================================================
    // Realtime feed
    //=========================================================================

    pub fn connect_feed(
        &mut self,
        config: FeedConfig,
        parser: Box<dyn TickParser>,
    ) -> Result<(), ChartError> {
        self.ensure_alive()?;
        self.feed = Some(RealtimeFeed::spawn(config, parser));
        Ok(())
    }

    pub fn disconnect_feed(&mut self) {
        self.feed = None;
    }

    /// Fold one feed candle in: same bucket overwrites the last bar, a new
    /// bucket appends. Public so embedders with their own transport can
    /// drive the same path the built-in feed uses.
    pub fn ingest_candle(&mut self, bar: FeedBar, _partial: bool) -> Result<(), ChartError> {
        self.ensure_alive()?;
        if self.timestamps.is_empty() && self.epoch_ms == 0.0 {
            // align the f32 timeline on the first live bar
            self.set_epoch_ms(bar.time);
        }
        let rebased = bar.to_bar(self.epoch_ms);
        match self.timestamps.last() {
            Some(&last) if last == rebased.time => self.update_last_candle(&rebased),
            Some(&last) if last > rebased.time => {
                log::warn!("out-of-order candle dropped: {} < {}", rebased.time, last);
                Ok(())
            }
            _ => self.append_data(std::slice::from_ref(&rebased)),
        }
    }

    //=========================================================================
    // Pumping
    //=========================================================================

    /// Drain worker and feed events; call once per host frame.
    pub fn pump(&mut self) {
        if self.destroyed {
            return;
        }
        let mut events: Vec<ChartEvent> = Vec::new();
        if let Some(render) = &self.render {
            while let Ok(event) = render.events().try_recv() {
                match event {
                    RenderEvent::Ready {
                        backend,
                        device_name,
                        max_texture_size,
                    } => {
                        log::info!(
                            "render ready: {device_name} ({backend}), max texture {max_texture_size}"
                        );
                        events.push(ChartEvent::Ready {
                            backend,
                            device_name,
                        });
                    }
                    RenderEvent::FrameComplete {
                        frame_time,
                        draw_calls,
                        instances,
                    } => {
                        log::debug!(
                            "slow frame: {frame_time:?}, {draw_calls} draws, {instances} instances"
                        );
                    }
                    RenderEvent::Error { message } => {
                        log::error!("render worker error: {message}");
                        events.push(ChartEvent::Error { message });
                    }
                }
            }
        }
        for event in events {
            self.registry.emit(&event);
        }

        let mut candles: Vec<(FeedBar, bool)> = Vec::new();
        let mut feed_errors: Vec<String> = Vec::new();
        if let Some(feed) = &self.feed {
            while let Ok(event) = feed.events().try_recv() {
                match event {
                    FeedEvent::Candle { bar, partial } => candles.push((bar, partial)),
                    FeedEvent::Error(message) => feed_errors.push(message),
                    FeedEvent::Connect => log::info!("feed connected"),
                    FeedEvent::Disconnect => log::info!("feed disconnected"),
                    FeedEvent::Tick(_) | FeedEvent::Batch(_) => {}
                }
            }
        }
        for (bar, partial) in candles {
            if let Err(error) = self.ingest_candle(bar, partial) {
                log::warn!("feed candle rejected: {error}");
            }
        }
        for message in feed_errors {
            self.registry.emit(&ChartEvent::Error { message });
        }

        // LOD decimation arriving from the compute worker
        let outcome = match &self.lod_pending {
            Some((level, pending)) => pending.try_take().map(|result| (*level, result)),
            None => None,
        };
        if let Some((level, result)) = outcome {
            self.lod_pending = None;
            match result {
                Ok(bars) => {
                    self.lod.set_cache(level, bars);
                    self.upload_and_viewport(true);
                }
                Err(error) => log::warn!("decimation for level {level} failed: {error}"),
            }
        }
    }

    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.feed = None;
        self.lod_pending = None;
        if let Some(mut render) = self.render.take() {
            render.destroy();
        }
        self.compute.shutdown();
        log::debug!("chart controller destroyed");
    }

    //=========================================================================
    // Internals
    //=========================================================================

    fn refresh_scales(&mut self, fit: bool) {
        if let (Some(&first), Some(&last)) = (self.timestamps.first(), self.timestamps.last()) {
            self.time_scale.set_data_range(first as f64, last as f64);
        }
        if let Some((min, max)) = self.price_bounds {
            self.price_scale.set_data_range(min, max);
        }
        if fit {
            self.time_scale.fit_content();
            self.price_scale.fit_content();
            self.price_auto = true;
        }
    }

    /// Re-distribute handles after a growable reallocation, or ship owned
    /// snapshots in copy mode.
    fn sync_workers(&mut self) {
        match self.store.shared_handle() {
            Some(handle) => {
                if self.store.generation() != self.handle_generation_sent {
                    self.handle_generation_sent = self.store.generation();
                    self.compute.set_handle(Some(handle.clone()));
                    if let Some(render) = &self.render {
                        render.send(RenderMsg::UpdateHandle(Some(handle)));
                    }
                }
            }
            None => {
                self.compute.set_bars(self.store.snapshot());
            }
        }
    }

    fn nearest_index(&self, t: f32) -> Option<usize> {
        if self.timestamps.is_empty() {
            return None;
        }
        let idx = lower_bound(&self.timestamps, t);
        if idx == 0 {
            return Some(0);
        }
        if idx >= self.timestamps.len() {
            return Some(self.timestamps.len() - 1);
        }
        let before = self.timestamps[idx - 1];
        let after = self.timestamps[idx];
        if (t - before).abs() <= (after - t).abs() {
            Some(idx - 1)
        } else {
            Some(idx)
        }
    }

    /// The data-sync tail: cull, pick LOD, upload instances when the view
    /// drifted enough, then always derive and send the viewport (and the
    /// grid) for the current state.
    fn upload_and_viewport(&mut self, force_upload: bool) {
        let visible = self.time_scale.visible();
        let range = cull(&self.timestamps, visible, &self.cull_config);

        let stale = force_upload
            || self
                .uploaded_range
                .map_or(true, |previous| needs_update(&previous, &visible));
        if stale && !self.timestamps.is_empty() {
            self.upload_instances(&range);
            self.uploaded_range = Some(visible);
        }

        self.autoscale_price(&range);
        let volume_max = self.visible_volume_max(&range);
        let viewport = Viewport {
            time: visible,
            price: self.price_scale.visible(),
            volume: VolumeRange {
                min: 0.0,
                max: volume_max.max(f64::MIN_POSITIVE),
            },
        };
        if let Some(render) = &self.render {
            render.send(RenderMsg::SetViewport(viewport));
            let xs: Vec<f32> = self
                .time_scale
                .grid_ticks(8)
                .into_iter()
                .map(|t| (2.0 * self.time_scale.data_to_normalized(t) - 1.0) as f32)
                .collect();
            let ys: Vec<f32> = self
                .price_scale
                .grid_ticks(8)
                .into_iter()
                .map(|p| (2.0 * self.price_scale.data_to_normalized(p) - 1.0) as f32)
                .collect();
            render.send(RenderMsg::SetGrid { xs, ys });
        }
        self.registry.emit(&ChartEvent::ViewportChange(viewport));
    }

    fn upload_instances(&mut self, range: &CullRange) {
        let level_id = if self.lod_enabled {
            self.lod.select(range.count())
        } else {
            0
        };
        let level = &self.lod.levels()[level_id];

        if level.decimation_factor > 1 {
            if let Some(cache) = self.lod.cache(level_id) {
                // narrow the decimated payload by its own timestamps
                let times: Vec<f32> = cache.iter().map(|b| b.time).collect();
                let sub = cull(&times, self.time_scale.visible(), &self.cull_config);
                let slice = cache[sub.start..sub.end].to_vec();
                if let Some(render) = &self.render {
                    render.send(RenderMsg::UpdateData(slice));
                }
                return;
            }
            // cache miss: request the decimation, draw the raw slice for now
            if self.lod_pending.is_none() {
                let count = self.store.count();
                let target = count / level.decimation_factor;
                let pending = self.compute.decimate(0, count, target.max(1));
                self.lod_pending = Some((level_id, pending));
            }
        }

        match self.store.shared_handle() {
            Some(_) => {
                if let Some(render) = &self.render {
                    render.send(RenderMsg::UpdateDataShared {
                        offset: range.start,
                        count: range.count(),
                    });
                }
            }
            None => {
                let bars = self.store.snapshot();
                let end = range.end.min(bars.len());
                let start = range.start.min(end);
                if let Some(render) = &self.render {
                    render.send(RenderMsg::UpdateData(bars[start..end].to_vec()));
                }
            }
        }
    }

    /// Fit the price window to the bars in view (unless the user panned
    /// the axis), expanding 5 % beyond the extremes.
    fn autoscale_price(&mut self, range: &CullRange) {
        if !self.price_auto || range.count() == 0 {
            return;
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for i in range.start..range.end {
            if let Some(bar) = self.store.get(i) {
                min = min.min(bar.low as f64);
                max = max.max(bar.high as f64);
            }
        }
        if min < max {
            let margin = (max - min) * 0.05;
            self.price_scale.set_visible(min - margin, max + margin);
        }
    }

    fn visible_volume_max(&self, range: &CullRange) -> f64 {
        let mut max = 0.0f64;
        for i in range.start..range.end {
            if let Some(bar) = self.store.get(i) {
                max = max.max(bar.volume as f64);
            }
        }
        max
    }
}

impl Drop for ChartController {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn validate_bars(bars: &[Bar]) -> Vec<Bar> {
    let mut clean = Vec::with_capacity(bars.len());
    let mut dropped = 0usize;
    for bar in bars {
        if bar.is_well_formed() {
            clean.push(*bar);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        log::warn!("dropped {dropped} malformed bars");
    }
    clean
}

fn price_bounds(bars: &[Bar]) -> Option<(f64, f64)> {
    if bars.is_empty() {
        return None;
    }
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for bar in bars {
        min = min.min(bar.low as f64);
        max = max.max(bar.high as f64);
    }
    Some((min, max))
}

fn merge_price_bounds(bounds: &mut Option<(f64, f64)>, bars: &[Bar]) {
    let Some((new_min, new_max)) = price_bounds(bars) else {
        return;
    };
    *bounds = Some(match bounds {
        Some((min, max)) => (min.min(new_min), max.max(new_max)),
        None => (new_min, new_max),
    });
}
