// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Full-screen textured triangle used for scaled blits and texture copies.

use super::conversions::IntoWgpu;
use prism_core::renderer::{BlendMode, FilterMode};
use std::borrow::Cow;
use std::collections::HashMap;

const BLIT_WGSL: &str = r#"
struct Params {
    // Source sub-rectangle in uv space: offset.xy, scale.zw.
    src: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) position : vec4<f32>,
    @location(0) uv : vec2<f32>,
};

@group(0) @binding(0) var t_source : texture_2d<f32>;
@group(0) @binding(1) var s_source : sampler;
@group(0) @binding(2) var<uniform> params : Params;

@vertex
fn vs_main(@builtin(vertex_index) vertexIndex : u32) -> VertexOutput {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    var output : VertexOutput;
    output.position = vec4<f32>(pos[vertexIndex], 0.0, 1.0);
    var uv = pos[vertexIndex] * 0.5 + 0.5;
    uv.y = 1.0 - uv.y;
    output.uv = params.src.xy + uv * params.src.zw;
    return output;
}

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_source, s_source, in.uv);
}
"#;

/// Where and how a [`FullscreenBlit::draw`] writes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlitTarget {
    /// Viewport in texture coordinates (origin top-left).
    pub viewport: [f32; 4],
    /// Scissor in texture coordinates, if any.
    pub scissor: Option<[u32; 4]>,
    /// Source rectangle in uv space: offset then scale.
    pub src_uv: [f32; 4],
    pub filter: FilterMode,
    pub blend: BlendMode,
}

/// Lazily built pipelines, one per target format and blend mode.
#[derive(Debug)]
pub(crate) struct FullscreenBlit {
    layout: wgpu::BindGroupLayout,
    shader: wgpu::ShaderModule,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    pipelines: HashMap<(wgpu::TextureFormat, BlendMode), wgpu::RenderPipeline>,
}

impl FullscreenBlit {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Prism Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_WGSL)),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Prism Blit Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let sampler = |filter: FilterMode, label: &'static str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                mag_filter: filter.into_wgpu(),
                min_filter: filter.into_wgpu(),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                ..Default::default()
            })
        };

        Self {
            layout,
            shader,
            nearest: sampler(FilterMode::Nearest, "Prism Blit Nearest"),
            linear: sampler(FilterMode::Linear, "Prism Blit Linear"),
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        blend: BlendMode,
    ) -> wgpu::RenderPipeline {
        let (layout, shader) = (&self.layout, &self.shader);
        self.pipelines
            .entry((format, blend))
            .or_insert_with(|| {
                log::debug!("Creating blit pipeline for {format:?} ({blend:?})");
                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("Prism Blit Pipeline Layout"),
                        bind_group_layouts: &[layout],
                        immediate_size: 0,
                    });
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Prism Blit Pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: shader,
                        entry_point: Some("vs_main"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: shader,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: blend.into_wgpu(),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview_mask: None,
                    cache: None,
                })
            })
            .clone()
    }

    /// Draws `source` into `target` and submits the work.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        params: BlitTarget,
    ) {
        let pipeline = self.pipeline(device, target_format, params.blend);
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Prism Blit Params"),
            size: std::mem::size_of::<[f32; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&uniform, 0, bytemuck::cast_slice(&params.src_uv));
        let sampler = match params.filter {
            FilterMode::Nearest => &self.nearest,
            FilterMode::Linear => &self.linear,
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Prism Blit Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Prism Blit Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Prism Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            let [x, y, w, h] = params.viewport;
            pass.set_viewport(x, y, w, h, 0.0, 1.0);
            if let Some([sx, sy, sw, sh]) = params.scissor {
                pass.set_scissor_rect(sx, sy, sw, sh);
            }
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }
}
