use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::atlas::TextureId;
use crate::engines::SpriteDraw;

use super::gpu::GpuTextures;

const VERTICES_PER_SPRITE: u32 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl SpriteVertex {
    fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRS,
        }
    }
}

/// Two triangles per sprite, corners taken from the scaled quad.
/// UVs: top-left (0,0), top-right (1,0), bottom-right (1,1), bottom-left (0,1).
pub fn sprite_vertices(draws: &[SpriteDraw]) -> Vec<SpriteVertex> {
    const UV: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    const ORDER: [usize; 6] = [0, 1, 2, 0, 2, 3];

    let mut out = Vec::with_capacity(draws.len() * VERTICES_PER_SPRITE as usize);
    for draw in draws {
        let corners = draw.placed_quad();
        for i in ORDER {
            let p = corners.0[i];
            out.push(SpriteVertex {
                position: [p.x, p.y],
                uv: UV[i],
            });
        }
    }
    out
}

pub struct SpriteRenderer {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: Option<wgpu::Buffer>,
    textures: Vec<TextureId>,
}

impl SpriteRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, textures: &GpuTextures) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("sprite.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite-pipeline-layout"),
            bind_group_layouts: &[textures.layout()],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[SpriteVertex::layout()],
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
            textures: Vec::new(),
        }
    }

    /// Uploads this frame's sprites; draw order follows `draws`.
    pub fn prepare(&mut self, device: &wgpu::Device, draws: &[SpriteDraw]) {
        self.textures = draws.iter().map(|d| d.texture).collect();
        if draws.is_empty() {
            self.vertex_buffer = None;
            return;
        }
        let vertices = sprite_vertices(draws);
        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite-vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
    }

    /// Draws the prepared sprites in `range`. Sprites whose texture has
    /// already been released are skipped.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, textures: &GpuTextures, range: Range<usize>) {
        let Some(vertex_buffer) = self.vertex_buffer.as_ref() else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        let end = range.end.min(self.textures.len());
        for i in range.start..end {
            let Some(bind_group) = textures.bind_group(self.textures[i]) else {
                continue;
            };
            let first = i as u32 * VERTICES_PER_SPRITE;
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(first..first + VERTICES_PER_SPRITE, 0..1);
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{NdcPoint, Quad};

    #[test]
    fn vertices_follow_corner_order_and_scale() {
        let draw = SpriteDraw {
            texture: TextureId(1),
            quad: Quad::from_corners(
                NdcPoint::new(-0.5, 0.5),
                NdcPoint::new(0.5, 0.5),
                NdcPoint::new(0.5, -0.5),
                NdcPoint::new(-0.5, -0.5),
            ),
            scale: 0.5,
        };
        let v = sprite_vertices(&[draw]);
        assert_eq!(v.len(), 6);
        assert_eq!(v[0].position, [-0.25, 0.25]);
        assert_eq!(v[0].uv, [0.0, 0.0]);
        assert_eq!(v[2].position, [0.25, -0.25]);
        assert_eq!(v[2].uv, [1.0, 1.0]);
        assert_eq!(v[5].uv, [0.0, 1.0]);
    }
}
