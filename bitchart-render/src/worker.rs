//! The render worker: owns the surface, device, queue and frame loop.
//!
//! All GPU calls happen on this thread. Messages are drained synchronously
//! at the top of each tick, then exactly one frame is produced. The UI
//! thread talks to the worker through [`RenderHandle`]; the worker talks
//! back through a bounded event channel (`Ready`, slow-frame
//! `FrameComplete`, `Error`).

use crate::buffers::{BufferArena, BufferKey};
use crate::pipeline::{
    candle_vertices, expand_polyline, grid_vertices, uniform_bind_group, uniform_buffer,
    volume_vertices, CandleUniforms, GridUniforms, LineUniforms, Pipelines, VolumeUniforms,
};
use crate::ticker::FrameTicker;
use bitchart_core::{Bar, StoreHandle, Theme, Viewport};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// NDC band at the bottom of the canvas reserved for volume bars.
const VOLUME_STRIP_BASE: f32 = -1.0;
const VOLUME_STRIP_HEIGHT: f32 = 0.5;

/// Frames slower than this are reported upstream.
const SLOW_FRAME: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Candlestick,
    Volume,
    Grid,
}

/// Inbound protocol. FIFO per sender; an `UpdateData*` followed by a
/// `SetViewport` is observed in that order.
pub enum RenderMsg {
    Resize {
        width: u32,
        height: u32,
        dpr: f32,
    },
    /// Transferred copy of the bars to draw (copy mode).
    UpdateData(Vec<Bar>),
    /// Shared mode: read `[offset, offset + count)` from the store handle.
    UpdateDataShared {
        offset: usize,
        count: usize,
    },
    /// Install the (re-grown) shared mapping.
    UpdateHandle(Option<StoreHandle>),
    SetViewport(Viewport),
    /// Grid rule positions in NDC, supplied by the scales.
    SetGrid {
        xs: Vec<f32>,
        ys: Vec<f32>,
    },
    /// Indicator overlay polyline in data space `(time, value)`.
    SetOverlay {
        id: u32,
        points: Vec<[f32; 2]>,
        color: [f32; 4],
        thickness_px: f32,
    },
    RemoveOverlay {
        id: u32,
    },
    SetTheme(Theme),
    SetSeriesVisibility {
        series: SeriesKind,
        visible: bool,
    },
    Destroy,
}

#[derive(Clone, Debug)]
pub enum RenderEvent {
    Ready {
        backend: String,
        device_name: String,
        max_texture_size: u32,
    },
    /// Emitted only for frames slower than 16 ms.
    FrameComplete {
        frame_time: Duration,
        draw_calls: u32,
        instances: u32,
    },
    Error {
        message: String,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub dpr: f32,
}

/// Rolling frame statistics, exposed through [`RenderHandle::stats`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    pub frames: u64,
    pub last_frame_time: Duration,
    pub average_frame_time: Duration,
    pub draw_calls: u32,
    pub instances: u32,
}

pub struct RenderWorker;

impl RenderWorker {
    /// Spawn the worker thread. `target` is anything wgpu can make a
    /// surface from (a window handle); the surface is created on the
    /// worker thread so every GPU object lives and dies there.
    pub fn spawn<T>(
        target: T,
        config: RenderConfig,
        store: Option<StoreHandle>,
        ticker: Box<dyn FrameTicker>,
    ) -> RenderHandle
    where
        T: Into<wgpu::SurfaceTarget<'static>> + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (stats_tx, stats_rx) = unbounded();
        let join = std::thread::Builder::new()
            .name("bitchart-render".into())
            .spawn(move || run(target.into(), config, store, ticker, rx, event_tx, stats_tx))
            .expect("failed to spawn render worker thread");
        RenderHandle {
            tx,
            events: event_rx,
            stats: stats_rx,
            last_stats: FrameStats::default(),
            join: Some(join),
        }
    }
}

/// The UI thread's side of the worker.
pub struct RenderHandle {
    tx: Sender<RenderMsg>,
    events: Receiver<RenderEvent>,
    stats: Receiver<FrameStats>,
    last_stats: FrameStats,
    join: Option<JoinHandle<()>>,
}

impl RenderHandle {
    pub fn send(&self, msg: RenderMsg) {
        // A closed channel means the worker already died; its Error event
        // is (or was) in the queue.
        let _ = self.tx.send(msg);
    }

    pub fn events(&self) -> &Receiver<RenderEvent> {
        &self.events
    }

    /// Latest frame statistics published by the worker.
    pub fn stats(&mut self) -> FrameStats {
        while let Ok(stats) = self.stats.try_recv() {
            self.last_stats = stats;
        }
        self.last_stats
    }

    /// Send `Destroy` and join the thread.
    pub fn destroy(&mut self) {
        let _ = self.tx.send(RenderMsg::Destroy);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

//=============================================================================
// GPU context
//=============================================================================

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    adapter_info: wgpu::AdapterInfo,
    max_texture_size: u32,
}

fn init_gpu(
    target: wgpu::SurfaceTarget<'static>,
    width: u32,
    height: u32,
) -> Result<Gpu, String> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(target)
        .map_err(|e| format!("surface creation failed: {e}"))?;
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .map_err(|e| format!("no compatible GPU adapter: {e}"))?;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("bitchart device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::default(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        trace: wgpu::Trace::Off,
    }))
    .map_err(|e| format!("device request failed: {e}"))?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .unwrap_or(caps.formats[0]);
    // Lowest-latency mode the surface offers; charts would rather tear a
    // streaming update than queue behind vsync.
    let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo
    };
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode,
        alpha_mode: wgpu::CompositeAlphaMode::Opaque,
        view_formats: vec![],
        desired_maximum_frame_latency: 1,
    };
    surface.configure(&device, &config);
    let max_texture_size = device.limits().max_texture_dimension_2d;
    Ok(Gpu {
        surface,
        device,
        queue,
        config,
        adapter_info: adapter.get_info(),
        max_texture_size,
    })
}

//=============================================================================
// Worker state and loop
//=============================================================================

struct Overlay {
    vertices: BufferKey,
    vertex_count: u32,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    color: [f32; 4],
    thickness_px: f32,
}

struct WorkerState {
    gpu: Gpu,
    pipelines: Pipelines,
    arena: BufferArena,
    candle_geometry: BufferKey,
    volume_geometry: BufferKey,
    candle_instances: BufferKey,
    volume_instances: BufferKey,
    grid_vertices: BufferKey,
    grid_vertex_count: u32,
    overlays: HashMap<u32, Overlay>,
    store: Option<StoreHandle>,
    viewport: Viewport,
    theme: Theme,
    dpr: f32,
    instance_count: u32,
    bar_interval: f32,
    candles_visible: bool,
    volume_visible: bool,
    grid_visible: bool,
    stats: FrameStats,
    frame_time_accum: Duration,
}

enum Flow {
    Continue,
    Exit,
}

#[allow(clippy::too_many_arguments)]
fn run(
    target: wgpu::SurfaceTarget<'static>,
    config: RenderConfig,
    store: Option<StoreHandle>,
    mut ticker: Box<dyn FrameTicker>,
    rx: Receiver<RenderMsg>,
    events: Sender<RenderEvent>,
    stats_tx: Sender<FrameStats>,
) {
    let gpu = match init_gpu(target, config.width, config.height) {
        Ok(gpu) => gpu,
        Err(message) => {
            log::error!("render worker init failed: {message}");
            let _ = events.send(RenderEvent::Error { message });
            return;
        }
    };
    let _ = events.send(RenderEvent::Ready {
        backend: format!("{:?}", gpu.adapter_info.backend),
        device_name: gpu.adapter_info.name.clone(),
        max_texture_size: gpu.max_texture_size,
    });
    log::info!(
        "render worker up on {} ({:?})",
        gpu.adapter_info.name,
        gpu.adapter_info.backend
    );

    let pipelines = Pipelines::new(&gpu.device, gpu.config.format);
    let mut arena = BufferArena::new();
    let candle_geometry = arena.create_with_data(
        &gpu.device,
        &gpu.queue,
        "candle geometry",
        bytemuck::cast_slice(&candle_vertices()),
        wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    );
    let volume_geometry = arena.create_with_data(
        &gpu.device,
        &gpu.queue,
        "volume geometry",
        bytemuck::cast_slice(&volume_vertices()),
        wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    );
    let instance_usage = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
    let candle_instances = arena.create(&gpu.device, "candle instances", 4, instance_usage);
    let volume_instances = arena.create(&gpu.device, "volume instances", 4, instance_usage);
    let grid_buffer = arena.create(&gpu.device, "grid rules", 4, instance_usage);

    let mut state = WorkerState {
        gpu,
        pipelines,
        arena,
        candle_geometry,
        volume_geometry,
        candle_instances,
        volume_instances,
        grid_vertices: grid_buffer,
        grid_vertex_count: 0,
        overlays: HashMap::new(),
        store,
        viewport: Viewport::default(),
        theme: Theme::default(),
        dpr: config.dpr,
        instance_count: 0,
        bar_interval: 0.0,
        candles_visible: true,
        volume_visible: true,
        grid_visible: true,
        stats: FrameStats::default(),
        frame_time_accum: Duration::ZERO,
    };

    loop {
        // Messages are processed synchronously at the top of each tick.
        loop {
            match rx.try_recv() {
                Ok(msg) => {
                    if let Flow::Exit = state.handle(msg, &events) {
                        log::debug!("render worker down");
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        state.frame(&events, &stats_tx);
        if !ticker.wait_frame() {
            return;
        }
    }
}

impl WorkerState {
    fn handle(&mut self, msg: RenderMsg, events: &Sender<RenderEvent>) -> Flow {
        match msg {
            RenderMsg::Resize { width, height, dpr } => {
                self.gpu.config.width = width.max(1);
                self.gpu.config.height = height.max(1);
                self.dpr = dpr;
                self.gpu
                    .surface
                    .configure(&self.gpu.device, &self.gpu.config);
            }
            RenderMsg::UpdateData(bars) => self.upload_instances(&bars),
            RenderMsg::UpdateDataShared { offset, count } => match &self.store {
                Some(handle) => {
                    let bars = handle.read_bars(offset, count);
                    self.upload_instances(&bars);
                }
                None => {
                    let _ = events.send(RenderEvent::Error {
                        message: "shared data update without a store handle".into(),
                    });
                }
            },
            RenderMsg::UpdateHandle(handle) => self.store = handle,
            RenderMsg::SetViewport(viewport) => self.viewport = viewport,
            RenderMsg::SetGrid { xs, ys } => {
                // grid changes per viewport, not per frame; in-place update
                // is enough here
                let vertices = grid_vertices(&xs, &ys);
                self.grid_vertex_count = vertices.len() as u32;
                self.arena.update(
                    &self.gpu.device,
                    &self.gpu.queue,
                    self.grid_vertices,
                    bytemuck::cast_slice(&vertices),
                    0,
                );
            }
            RenderMsg::SetOverlay {
                id,
                points,
                color,
                thickness_px,
            } => self.set_overlay(id, &points, color, thickness_px),
            RenderMsg::RemoveOverlay { id } => {
                if let Some(overlay) = self.overlays.remove(&id) {
                    self.arena.destroy(overlay.vertices);
                }
            }
            RenderMsg::SetTheme(theme) => self.theme = theme,
            RenderMsg::SetSeriesVisibility { series, visible } => match series {
                SeriesKind::Candlestick => self.candles_visible = visible,
                SeriesKind::Volume => self.volume_visible = visible,
                SeriesKind::Grid => self.grid_visible = visible,
            },
            RenderMsg::Destroy => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Streaming upload path: both instance buffers are orphaned with the
    /// same payload so no in-flight frame ever aliases the new data.
    fn upload_instances(&mut self, bars: &[Bar]) {
        profiling::scope!("upload_instances");
        let bytes: &[u8] = bytemuck::cast_slice(bars);
        self.arena
            .replace(&self.gpu.device, &self.gpu.queue, self.candle_instances, bytes);
        self.arena
            .replace(&self.gpu.device, &self.gpu.queue, self.volume_instances, bytes);
        self.instance_count = bars.len() as u32;
        self.bar_interval = if bars.len() >= 2 {
            (bars[1].time - bars[0].time).abs()
        } else {
            0.0
        };
    }

    fn set_overlay(&mut self, id: u32, points: &[[f32; 2]], color: [f32; 4], thickness_px: f32) {
        let time_span = self.viewport.time.span() as f32;
        let value_span = self.viewport.price.span() as f32;
        let vertices = expand_polyline(points, time_span, value_span);
        let vertex_count = vertices.len() as u32;
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        match self.overlays.get_mut(&id) {
            Some(overlay) => {
                self.arena
                    .replace(&self.gpu.device, &self.gpu.queue, overlay.vertices, bytes);
                overlay.vertex_count = vertex_count;
                overlay.color = color;
                overlay.thickness_px = thickness_px;
            }
            None => {
                let vertices_key = self.arena.create_with_data(
                    &self.gpu.device,
                    &self.gpu.queue,
                    &format!("overlay {id}"),
                    bytes,
                    wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                );
                let uniforms = uniform_buffer(
                    &self.gpu.device,
                    &format!("overlay {id} uniforms"),
                    std::mem::size_of::<LineUniforms>() as u64,
                );
                let bind_group = uniform_bind_group(
                    &self.gpu.device,
                    &self.pipelines.line_bind_layout,
                    &uniforms,
                    &format!("overlay {id}"),
                );
                self.overlays.insert(
                    id,
                    Overlay {
                        vertices: vertices_key,
                        vertex_count,
                        uniforms,
                        bind_group,
                        color,
                        thickness_px,
                    },
                );
            }
        }
    }

    fn candle_width_ndc(&self) -> f32 {
        let span = self.viewport.time.span() as f32;
        if span <= 0.0 || self.bar_interval <= 0.0 {
            return 0.01;
        }
        (2.0 * self.bar_interval / span * 0.8).clamp(0.0005, 0.2)
    }

    fn frame(&mut self, events: &Sender<RenderEvent>, stats_tx: &Sender<FrameStats>) {
        profiling::scope!("frame");
        let started = Instant::now();
        let frame = match self.gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.gpu
                    .surface
                    .configure(&self.gpu.device, &self.gpu.config);
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => return,
            Err(error) => {
                let _ = events.send(RenderEvent::Error {
                    message: format!("surface acquire failed: {error}"),
                });
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.write_frame_uniforms();

        let mut draw_calls = 0u32;
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("chart frame"),
            });
        {
            let bg = self.theme.background;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("chart"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: bg[0] as f64,
                            g: bg[1] as f64,
                            b: bg[2] as f64,
                            a: bg[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if self.volume_visible && self.instance_count > 0 {
                pass.set_pipeline(&self.pipelines.volume.pipeline);
                pass.set_bind_group(0, &self.pipelines.volume.bind_group, &[]);
                pass.set_vertex_buffer(0, self.arena.get(self.volume_geometry).slice(..));
                pass.set_vertex_buffer(1, self.arena.get(self.volume_instances).slice(..));
                pass.draw(0..6, 0..self.instance_count);
                draw_calls += 1;
            }
            if self.candles_visible && self.instance_count > 0 {
                pass.set_pipeline(&self.pipelines.candle.pipeline);
                pass.set_bind_group(0, &self.pipelines.candle.bind_group, &[]);
                pass.set_vertex_buffer(0, self.arena.get(self.candle_geometry).slice(..));
                pass.set_vertex_buffer(1, self.arena.get(self.candle_instances).slice(..));
                pass.draw(0..18, 0..self.instance_count);
                draw_calls += 1;
            }
            if self.grid_visible && self.grid_vertex_count > 0 {
                pass.set_pipeline(&self.pipelines.grid.pipeline);
                pass.set_bind_group(0, &self.pipelines.grid.bind_group, &[]);
                pass.set_vertex_buffer(0, self.arena.get(self.grid_vertices).slice(..));
                pass.draw(0..self.grid_vertex_count, 0..1);
                draw_calls += 1;
            }
            for overlay in self.overlays.values() {
                if overlay.vertex_count < 2 {
                    continue;
                }
                pass.set_pipeline(&self.pipelines.line);
                pass.set_bind_group(0, &overlay.bind_group, &[]);
                pass.set_vertex_buffer(0, self.arena.get(overlay.vertices).slice(..));
                pass.draw(0..overlay.vertex_count, 0..1);
                draw_calls += 1;
            }
        }
        self.gpu.queue.submit([encoder.finish()]);
        frame.present();

        let frame_time = started.elapsed();
        self.stats.frames += 1;
        self.stats.last_frame_time = frame_time;
        self.stats.draw_calls = draw_calls;
        self.stats.instances = self.instance_count;
        self.frame_time_accum += frame_time;
        if self.stats.frames % 120 == 0 {
            self.stats.average_frame_time = self.frame_time_accum / 120;
            self.frame_time_accum = Duration::ZERO;
            let _ = stats_tx.send(self.stats);
        }
        if frame_time > SLOW_FRAME {
            let _ = events.send(RenderEvent::FrameComplete {
                frame_time,
                draw_calls,
                instances: self.instance_count,
            });
        }
    }

    fn write_frame_uniforms(&mut self) {
        let time_range = [self.viewport.time.from as f32, self.viewport.time.to as f32];
        let resolution = [
            self.gpu.config.width as f32,
            self.gpu.config.height as f32,
        ];
        let candle = CandleUniforms {
            up_color: self.theme.up,
            down_color: self.theme.down,
            time_range,
            price_range: [
                self.viewport.price.min as f32,
                self.viewport.price.max as f32,
            ],
            resolution,
            candle_width: self.candle_width_ndc(),
            _pad: 0.0,
        };
        self.gpu.queue.write_buffer(
            &self.pipelines.candle.uniforms,
            0,
            bytemuck::bytes_of(&candle),
        );
        let volume = VolumeUniforms {
            up_color: self.theme.up,
            down_color: self.theme.down,
            time_range,
            volume_range: [
                self.viewport.volume.min as f32,
                self.viewport.volume.max as f32,
            ],
            strip: [VOLUME_STRIP_BASE, VOLUME_STRIP_HEIGHT],
            opacity: self.theme.volume_opacity,
            bar_width: self.candle_width_ndc(),
        };
        self.gpu.queue.write_buffer(
            &self.pipelines.volume.uniforms,
            0,
            bytemuck::bytes_of(&volume),
        );
        let grid = GridUniforms {
            color: self.theme.grid,
        };
        self.gpu
            .queue
            .write_buffer(&self.pipelines.grid.uniforms, 0, bytemuck::bytes_of(&grid));
        for overlay in self.overlays.values() {
            let uniforms = LineUniforms {
                color: overlay.color,
                time_range,
                price_range: [
                    self.viewport.price.min as f32,
                    self.viewport.price.max as f32,
                ],
                resolution,
                thickness_px: overlay.thickness_px * self.dpr,
                _pad: 0.0,
            };
            self.gpu
                .queue
                .write_buffer(&overlay.uniforms, 0, bytemuck::bytes_of(&uniforms));
        }
    }
}
