//! Debug overlays: landmark markers and the translucent mouth fill.

use bytemuck::{Pod, Zeroable};
use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};
use tracing::warn;
use wgpu::util::DeviceExt;

use crate::geometry::NdcPoint;

const MARKER_HALF_SIZE: f32 = 0.006;
const MARKER_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const MOUTH_FILL_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 0.4];

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl OverlayVertex {
    fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<OverlayVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRS,
        }
    }
}

/// Triangulated overlay geometry, already in device space.
pub fn build_overlay_geometry(
    markers: &[NdcPoint],
    mouth: Option<&[NdcPoint]>,
) -> VertexBuffers<OverlayVertex, u32> {
    let mut buffers: VertexBuffers<OverlayVertex, u32> = VertexBuffers::new();

    if let Some(outline) = mouth.filter(|o| o.len() >= 3) {
        let mut builder = Path::builder();
        builder.begin(point(outline[0].x, outline[0].y));
        for p in &outline[1..] {
            builder.line_to(point(p.x, p.y));
        }
        builder.end(true);
        let path = builder.build();

        let mut tessellator = FillTessellator::new();
        if let Err(err) = tessellator.tessellate_path(
            &path,
            &FillOptions::tolerance(0.001),
            &mut BuffersBuilder::new(&mut buffers, |vertex: FillVertex| OverlayVertex {
                position: vertex.position().to_array(),
                color: MOUTH_FILL_COLOR,
            }),
        ) {
            warn!(error = %err, "mouth_fill_tessellation_failed");
            buffers.vertices.clear();
            buffers.indices.clear();
        }
    }

    for p in markers {
        let base = buffers.vertices.len() as u32;
        let h = MARKER_HALF_SIZE;
        for (dx, dy) in [(-h, h), (h, h), (h, -h), (-h, -h)] {
            buffers.vertices.push(OverlayVertex {
                position: [p.x + dx, p.y + dy],
                color: MARKER_COLOR,
            });
        }
        buffers
            .indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    buffers
}

pub struct OverlayRenderer {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    index_count: u32,
}

impl OverlayRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("overlay.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-pipeline-layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[OverlayVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        Self {
            pipeline,
            vertex_buffer: None,
            index_buffer: None,
            index_count: 0,
        }
    }

    pub fn prepare(&mut self, device: &wgpu::Device, markers: &[NdcPoint], mouth: Option<&[NdcPoint]>) {
        let geometry = build_overlay_geometry(markers, mouth);
        if geometry.indices.is_empty() {
            self.vertex_buffer = None;
            self.index_buffer = None;
            self.index_count = 0;
            return;
        }
        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overlay-vertices"),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overlay-indices"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
        self.index_count = geometry.indices.len() as u32;
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.index_count == 0 {
            return;
        }
        if let (Some(vertex_buffer), Some(index_buffer)) = (&self.vertex_buffer, &self.index_buffer)
        {
            pass.set_pipeline(&self.pipeline);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
    }
}
