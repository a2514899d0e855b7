//! The four render pipelines: candlestick, volume, grid, line.
//!
//! Uniform struct layouts here mirror the WGSL blocks field for field;
//! the instance layout is the raw bar record (24-byte stride, `time` at 0,
//! `ohlc` vec4 at 4, `volume` at 20, divisor-1 stepping).

use bytemuck::{Pod, Zeroable};

/// Matches `Uniforms` in `candlestick.wgsl` (64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CandleUniforms {
    pub up_color: [f32; 4],
    pub down_color: [f32; 4],
    pub time_range: [f32; 2],
    pub price_range: [f32; 2],
    pub resolution: [f32; 2],
    pub candle_width: f32,
    pub _pad: f32,
}

/// Matches `Uniforms` in `volume.wgsl` (64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct VolumeUniforms {
    pub up_color: [f32; 4],
    pub down_color: [f32; 4],
    pub time_range: [f32; 2],
    pub volume_range: [f32; 2],
    pub strip: [f32; 2],
    pub opacity: f32,
    pub bar_width: f32,
}

/// Matches `Uniforms` in `grid.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GridUniforms {
    pub color: [f32; 4],
}

/// Matches `Uniforms` in `line.wgsl` (48 bytes).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LineUniforms {
    pub color: [f32; 4],
    pub time_range: [f32; 2],
    pub price_range: [f32; 2],
    pub resolution: [f32; 2],
    pub thickness_px: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CandleVertex {
    pub corner: [f32; 2],
    pub kind: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct QuadVertex {
    pub corner: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    pub normal: [f32; 2],
    pub side: f32,
}

/// Candle geometry: body, upper wick, lower wick. Three quads, 18
/// vertices. `corner.x` picks the left/right edge, `corner.y` runs the
/// quad's own span, `kind` tags which quad the shader is placing.
pub fn candle_vertices() -> [CandleVertex; 18] {
    let mut out = [CandleVertex {
        corner: [0.0, 0.0],
        kind: 0.0,
    }; 18];
    let quad = [
        [-1.0, 0.0],
        [1.0, 0.0],
        [-1.0, 1.0],
        [1.0, 0.0],
        [1.0, 1.0],
        [-1.0, 1.0],
    ];
    for (q, vertex) in out.iter_mut().enumerate() {
        vertex.corner = quad[q % 6];
        vertex.kind = (q / 6) as f32;
    }
    out
}

/// Volume geometry: one quad, 6 vertices.
pub fn volume_vertices() -> [QuadVertex; 6] {
    [
        QuadVertex { corner: [-1.0, 0.0] },
        QuadVertex { corner: [1.0, 0.0] },
        QuadVertex { corner: [-1.0, 1.0] },
        QuadVertex { corner: [1.0, 0.0] },
        QuadVertex { corner: [1.0, 1.0] },
        QuadVertex { corner: [-1.0, 1.0] },
    ]
}

/// Build NDC line-list segments for the grid: one full-height vertical per
/// x, one full-width horizontal per y.
pub fn grid_vertices(xs: &[f32], ys: &[f32]) -> Vec<QuadVertex> {
    let mut out = Vec::with_capacity((xs.len() + ys.len()) * 2);
    for &x in xs {
        out.push(QuadVertex { corner: [x, -1.0] });
        out.push(QuadVertex { corner: [x, 1.0] });
    }
    for &y in ys {
        out.push(QuadVertex { corner: [-1.0, y] });
        out.push(QuadVertex { corner: [1.0, y] });
    }
    out
}

/// Expand a data-space polyline into a triangle strip: two vertices per
/// point, displaced along the joint normal, one per side. Normals are
/// computed in span-relative space so the shader's pixel conversion stays
/// a pure scale.
pub fn expand_polyline(points: &[[f32; 2]], time_span: f32, value_span: f32) -> Vec<LineVertex> {
    if points.len() < 2 {
        return Vec::new();
    }
    let time_span = if time_span.abs() < f32::EPSILON { 1.0 } else { time_span };
    let value_span = if value_span.abs() < f32::EPSILON { 1.0 } else { value_span };

    let segment_normal = |a: [f32; 2], b: [f32; 2]| -> [f32; 2] {
        let dx = (b[0] - a[0]) / time_span;
        let dy = (b[1] - a[1]) / value_span;
        let len = (dx * dx + dy * dy).sqrt();
        if len < f32::EPSILON {
            [0.0, 1.0]
        } else {
            [-dy / len, dx / len]
        }
    };

    let mut out = Vec::with_capacity(points.len() * 2);
    for i in 0..points.len() {
        let normal = if i == 0 {
            segment_normal(points[0], points[1])
        } else if i == points.len() - 1 {
            segment_normal(points[i - 1], points[i])
        } else {
            let before = segment_normal(points[i - 1], points[i]);
            let after = segment_normal(points[i], points[i + 1]);
            let sum = [before[0] + after[0], before[1] + after[1]];
            let len = (sum[0] * sum[0] + sum[1] * sum[1]).sqrt();
            if len < f32::EPSILON {
                before
            } else {
                [sum[0] / len, sum[1] / len]
            }
        };
        for side in [-1.0f32, 1.0] {
            out.push(LineVertex {
                position: points[i],
                normal,
                side,
            });
        }
    }
    out
}

//=============================================================================
// Pipeline construction
//=============================================================================

/// A pipeline together with its uniform buffer and bind group.
pub struct PipelineSet {
    pub pipeline: wgpu::RenderPipeline,
    pub uniforms: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

pub struct Pipelines {
    pub candle: PipelineSet,
    pub volume: PipelineSet,
    pub grid: PipelineSet,
    pub line: wgpu::RenderPipeline,
    pub line_bind_layout: wgpu::BindGroupLayout,
}

/// Per-instance bar layout shared by the candlestick and volume pipelines.
fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 3] = [
        wgpu::VertexAttribute {
            offset: 0,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32,
        },
        wgpu::VertexAttribute {
            offset: 4,
            shader_location: 3,
            format: wgpu::VertexFormat::Float32x4,
        },
        wgpu::VertexAttribute {
            offset: 20,
            shader_location: 4,
            format: wgpu::VertexFormat::Float32,
        },
    ];
    wgpu::VertexBufferLayout {
        array_stride: 24,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRS,
    }
}

fn uniform_bind_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

pub fn uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

pub fn uniform_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Create a pipeline inside a validation error scope, logging anything the
/// backend rejects.
fn with_error_scope<T, F: FnOnce() -> T>(device: &wgpu::Device, name: &str, f: F) -> T {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = f();
    if let Some(error) = pollster::block_on(scope.pop()) {
        log::error!("pipeline '{}' validation error: {}", name, error);
    }
    result
}

struct PipelineDesc<'a> {
    name: &'a str,
    source: &'a str,
    vertex_layouts: &'a [wgpu::VertexBufferLayout<'a>],
    topology: wgpu::PrimitiveTopology,
    blend: Option<wgpu::BlendState>,
}

fn build_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    bind_layout: &wgpu::BindGroupLayout,
    desc: PipelineDesc,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(desc.name),
        source: wgpu::ShaderSource::Wgsl(desc.source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.name),
        bind_group_layouts: &[bind_layout],
        immediate_size: 0,
    });
    with_error_scope(device, desc.name, || {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.name),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: desc.vertex_layouts,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: desc.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: desc.topology,
                strip_index_format: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    })
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let bind_layout = uniform_bind_layout(device, "chart uniforms");

        let candle_geometry_attrs = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32,
            },
        ];
        let candle_geometry = wgpu::VertexBufferLayout {
            array_stride: 12,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &candle_geometry_attrs,
        };
        let quad_geometry_attrs = [wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x2,
        }];
        let quad_geometry = wgpu::VertexBufferLayout {
            array_stride: 8,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &quad_geometry_attrs,
        };
        let line_attrs = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32,
            },
        ];
        let line_geometry = wgpu::VertexBufferLayout {
            array_stride: 20,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &line_attrs,
        };

        let candle_pipeline = build_pipeline(
            device,
            format,
            &bind_layout,
            PipelineDesc {
                name: "candlestick",
                source: include_str!("shaders/candlestick.wgsl"),
                vertex_layouts: &[candle_geometry, instance_layout()],
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: None,
            },
        );
        let volume_pipeline = build_pipeline(
            device,
            format,
            &bind_layout,
            PipelineDesc {
                name: "volume",
                source: include_str!("shaders/volume.wgsl"),
                vertex_layouts: &[quad_geometry.clone(), instance_layout()],
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            },
        );
        let grid_pipeline = build_pipeline(
            device,
            format,
            &bind_layout,
            PipelineDesc {
                name: "grid",
                source: include_str!("shaders/grid.wgsl"),
                vertex_layouts: &[quad_geometry],
                topology: wgpu::PrimitiveTopology::LineList,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            },
        );
        let line_pipeline = build_pipeline(
            device,
            format,
            &bind_layout,
            PipelineDesc {
                name: "line",
                source: include_str!("shaders/line.wgsl"),
                vertex_layouts: &[line_geometry],
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            },
        );

        let candle_uniforms = uniform_buffer(
            device,
            "candlestick uniforms",
            std::mem::size_of::<CandleUniforms>() as u64,
        );
        let volume_uniforms = uniform_buffer(
            device,
            "volume uniforms",
            std::mem::size_of::<VolumeUniforms>() as u64,
        );
        let grid_uniforms = uniform_buffer(
            device,
            "grid uniforms",
            std::mem::size_of::<GridUniforms>() as u64,
        );

        let candle_bind = uniform_bind_group(device, &bind_layout, &candle_uniforms, "candlestick");
        let volume_bind = uniform_bind_group(device, &bind_layout, &volume_uniforms, "volume");
        let grid_bind = uniform_bind_group(device, &bind_layout, &grid_uniforms, "grid");

        Self {
            candle: PipelineSet {
                pipeline: candle_pipeline,
                uniforms: candle_uniforms,
                bind_group: candle_bind,
            },
            volume: PipelineSet {
                pipeline: volume_pipeline,
                uniforms: volume_uniforms,
                bind_group: volume_bind,
            },
            grid: PipelineSet {
                pipeline: grid_pipeline,
                uniforms: grid_uniforms,
                bind_group: grid_bind,
            },
            line: line_pipeline,
            line_bind_layout: bind_layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_blocks_match_wgsl_sizes() {
        assert_eq!(std::mem::size_of::<CandleUniforms>(), 64);
        assert_eq!(std::mem::size_of::<VolumeUniforms>(), 64);
        assert_eq!(std::mem::size_of::<LineUniforms>(), 48);
        assert_eq!(std::mem::size_of::<GridUniforms>(), 16);
    }

    #[test]
    fn candle_geometry_tags_three_quads() {
        let vertices = candle_vertices();
        assert_eq!(vertices.len(), 18);
        assert!(vertices[..6].iter().all(|v| v.kind == 0.0));
        assert!(vertices[6..12].iter().all(|v| v.kind == 1.0));
        assert!(vertices[12..].iter().all(|v| v.kind == 2.0));
    }

    #[test]
    fn grid_vertices_pair_per_rule() {
        let out = grid_vertices(&[0.0, 0.5], &[-0.25]);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].corner, [0.0, -1.0]);
        assert_eq!(out[1].corner, [0.0, 1.0]);
        assert_eq!(out[4].corner, [-1.0, -0.25]);
    }

    #[test]
    fn polyline_expansion_doubles_points() {
        let points = [[0.0, 0.0], [1.0, 0.0], [2.0, 1.0]];
        let strip = expand_polyline(&points, 2.0, 1.0);
        assert_eq!(strip.len(), 6);
        // sides alternate
        assert_eq!(strip[0].side, -1.0);
        assert_eq!(strip[1].side, 1.0);
        // flat first segment has a vertical normal
        assert!((strip[0].normal[0]).abs() < 1e-6);
        assert!((strip[0].normal[1]).abs() > 0.99);
        // degenerate input
        assert!(expand_polyline(&points[..1], 1.0, 1.0).is_empty());
    }
}
