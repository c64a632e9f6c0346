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

use super::blit::{BlitTarget, FullscreenBlit};
use super::conversions::{decode_texel, texel_size, IntoWgpu};
use crate::graphics::frame::{AttachmentInfo, FrameObject};
use anyhow::anyhow;
use prism_core::math::Rect;
use prism_core::renderer::{
    AttachmentPoint, AttachmentTarget, BlitDescriptor, BlitMask, ClearFlags, DeviceCapabilities,
    FramebufferBinding, FramebufferId, FramebufferStatus, GraphicsDevice, PixelFormat,
    RenderState, RenderbufferDescriptor, RenderbufferId, ResourceError, TextureDescriptor,
    TextureFormat, TextureId,
};
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};

/// A texture backing a Prism texture, renderbuffer or the surface.
#[derive(Debug)]
struct GpuImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    width: u32,
    height: u32,
    samples: u32,
}

impl GpuImage {
    fn new(
        device: &wgpu::Device,
        label: Option<&str>,
        width: u32,
        height: u32,
        format: TextureFormat,
        samples: u32,
    ) -> Self {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if samples == 1 {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format: format.into_wgpu(),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
            width,
            height,
            samples,
        }
    }

    fn info(&self) -> AttachmentInfo {
        AttachmentInfo {
            format: self.format,
            width: self.width,
            height: self.height,
            samples: self.samples,
        }
    }

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Converts the bottom edge of a bottom-up rectangle to a top-down row.
    fn flip_y(&self, rect: Rect) -> u32 {
        (self.height as i32 - rect.top()).max(0) as u32
    }

    fn aspect(&self) -> wgpu::TextureAspect {
        if self.format.is_depth() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKey {
    SurfaceColor,
    SurfaceDepth,
    Texture(TextureId),
    Renderbuffer(RenderbufferId),
}

impl From<AttachmentTarget> for ImageKey {
    fn from(target: AttachmentTarget) -> Self {
        match target {
            AttachmentTarget::Texture(id) => ImageKey::Texture(id),
            AttachmentTarget::Renderbuffer(id) => ImageKey::Renderbuffer(id),
        }
    }
}

#[derive(Debug)]
struct WgpuState {
    surface_color: GpuImage,
    surface_depth: GpuImage,
    textures: HashMap<TextureId, GpuImage>,
    renderbuffers: HashMap<RenderbufferId, GpuImage>,
    framebuffers: HashMap<FramebufferId, FrameObject>,
    next_id: usize,
    read: Option<FramebufferId>,
    draw: Option<FramebufferId>,
    viewport: Rect,
    render_state: RenderState,
    blit: Option<FullscreenBlit>,
}

impl WgpuState {
    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn image(&self, key: ImageKey) -> Option<&GpuImage> {
        match key {
            ImageKey::SurfaceColor => Some(&self.surface_color),
            ImageKey::SurfaceDepth => Some(&self.surface_depth),
            ImageKey::Texture(id) => self.textures.get(&id),
            ImageKey::Renderbuffer(id) => self.renderbuffers.get(&id),
        }
    }

    fn attachment_key(
        &self,
        framebuffer: Option<FramebufferId>,
        point: AttachmentPoint,
    ) -> Result<ImageKey, ResourceError> {
        match framebuffer {
            None => match point {
                AttachmentPoint::Color(0) => Ok(ImageKey::SurfaceColor),
                AttachmentPoint::Depth => Ok(ImageKey::SurfaceDepth),
                AttachmentPoint::Color(_) => Err(ResourceError::NotFound),
            },
            Some(id) => self
                .framebuffers
                .get(&id)
                .ok_or(ResourceError::NotFound)?
                .attachments
                .get(&point)
                .map(|target| ImageKey::from(*target))
                .ok_or(ResourceError::NotFound),
        }
    }

    fn draw_keys(&self) -> Result<Vec<ImageKey>, ResourceError> {
        match self.draw {
            None => Ok(vec![ImageKey::SurfaceColor]),
            Some(id) => {
                let frame = self.framebuffers.get(&id).ok_or(ResourceError::NotFound)?;
                Ok(frame
                    .draw_buffers
                    .iter()
                    .filter_map(|point| frame.attachments.get(point))
                    .map(|target| ImageKey::from(*target))
                    .collect())
            }
        }
    }

    fn status(&self, id: FramebufferId, requires_color: bool) -> FramebufferStatus {
        match self.framebuffers.get(&id) {
            Some(frame) => frame.status(requires_color, |target| {
                self.image(ImageKey::from(target)).map(GpuImage::info)
            }),
            None => FramebufferStatus::Undefined,
        }
    }

    fn ensure_complete(
        &self,
        framebuffer: Option<FramebufferId>,
        requires_color: bool,
    ) -> Result<(), ResourceError> {
        let Some(id) = framebuffer else {
            return Ok(());
        };
        let status = self.status(id, requires_color);
        if status.is_complete() {
            Ok(())
        } else {
            Err(ResourceError::InvalidDescriptor(format!(
                "framebuffer {id:?} is incomplete ({status:?})"
            )))
        }
    }
}

/// Views of the bound draw target, for scene renderers recording their own
/// `wgpu` passes.
#[derive(Debug, Clone)]
pub struct DrawTargetViews {
    /// One view per active draw buffer.
    pub colors: Vec<wgpu::TextureView>,
    /// The depth attachment, if any.
    pub depth: Option<wgpu::TextureView>,
    /// The sample count of the attachments.
    pub samples: u32,
}

/// A [`GraphicsDevice`] backed by `wgpu`.
///
/// Frame objects are attachment tables kept on the CPU; the surface is an
/// off-screen texture pair. Every call encodes and submits its own work.
/// Multisampled colour is resolved with a resolve pass; multisampled depth
/// has no `wgpu` resolve and is left untouched.
#[derive(Debug)]
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: DeviceCapabilities,
    state: Mutex<WgpuState>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl WgpuDevice {
    /// Wraps an existing device. The surface is a `width`x`height` off-screen
    /// target; `max_samples` is the largest sample count to grant.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        max_samples: u32,
    ) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Box::new(move |e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(e.to_string());
        }));

        let capabilities = DeviceCapabilities {
            max_samples,
            requires_color_attachment: false,
            max_texture_size: device.limits().max_texture_dimension_2d,
        };
        let state = WgpuState {
            surface_color: GpuImage::new(
                &device,
                Some("Prism Surface Color"),
                width,
                height,
                TextureFormat::Rgba8Unorm,
                1,
            ),
            surface_depth: GpuImage::new(
                &device,
                Some("Prism Surface Depth"),
                width,
                height,
                TextureFormat::Depth24Plus,
                1,
            ),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            read: None,
            draw: None,
            viewport: Rect::new(0, 0, width, height),
            render_state: RenderState::default(),
            blit: None,
        };
        log::info!("WgpuDevice: surface {width}x{height}, {capabilities:?}");
        Self {
            device,
            queue,
            capabilities,
            state: Mutex::new(state),
            errors,
        }
    }

    /// Requests an adapter and a device without any window.
    pub fn headless(width: u32, height: u32) -> anyhow::Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| anyhow!("Failed to find a suitable adapter: {}", e))?;
            let info = adapter.get_info();
            log::info!(
                "Using graphics adapter: \"{}\" (Backend: {:?})",
                info.name,
                info.backend
            );
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Prism Headless Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    ..Default::default()
                })
                .await
                .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
            Ok(Self::new(device, queue, width, height, 4))
        })
    }

    fn state(&self) -> MutexGuard<'_, WgpuState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record<T>(&self, operation: &str, result: Result<T, ResourceError>) -> Result<T, ResourceError> {
        if let Err(err) = &result {
            log::debug!("WgpuDevice: {operation} failed: {err}");
            self.errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format!("{operation}: {err}"));
        }
        result
    }

    /// The underlying `wgpu` device.
    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The queue work is submitted to.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Views of the bound draw framebuffer.
    pub fn draw_target_views(&self) -> Result<DrawTargetViews, ResourceError> {
        let state = self.state();
        let mut samples = 1;
        let mut colors = Vec::new();
        for key in state.draw_keys()? {
            let image = state.image(key).ok_or(ResourceError::NotFound)?;
            samples = image.samples;
            colors.push(image.view.clone());
        }
        let depth = state
            .attachment_key(state.draw, AttachmentPoint::Depth)
            .ok()
            .and_then(|key| state.image(key))
            .map(|image| image.view.clone());
        Ok(DrawTargetViews {
            colors,
            depth,
            samples,
        })
    }

    /// A view of a texture, for sampling it in a scene pass.
    pub fn texture_view(&self, id: TextureId) -> Option<wgpu::TextureView> {
        self.state().textures.get(&id).map(|image| image.view.clone())
    }

    fn create_image(
        &self,
        label: Option<&str>,
        width: u32,
        height: u32,
        format: TextureFormat,
        samples: u32,
    ) -> Result<GpuImage, ResourceError> {
        let max = self.capabilities.max_texture_size;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(ResourceError::InvalidDescriptor(format!(
                "size {width}x{height} outside 1..={max}"
            )));
        }
        Ok(GpuImage::new(&self.device, label, width, height, format, samples))
    }

    fn clear_targets(
        &self,
        state: &WgpuState,
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
    ) -> Result<(), ResourceError> {
        state.ensure_complete(state.draw, self.capabilities.requires_color_attachment)?;
        let colors = state
            .draw_keys()?
            .into_iter()
            .filter_map(|key| state.image(key))
            .collect::<Vec<_>>();
        let depth_image = state
            .attachment_key(state.draw, AttachmentPoint::Depth)
            .ok()
            .and_then(|key| state.image(key));

        let load = if flags.contains(ClearFlags::COLOR) {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: color[0] as f64,
                g: color[1] as f64,
                b: color[2] as f64,
                a: color[3] as f64,
            })
        } else {
            wgpu::LoadOp::Load
        };
        let color_attachments = colors
            .iter()
            .map(|image| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &image.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect::<Vec<_>>();
        let depth_stencil_attachment =
            depth_image.map(|image| wgpu::RenderPassDepthStencilAttachment {
                view: &image.view,
                depth_ops: Some(wgpu::Operations {
                    load: if flags.contains(ClearFlags::DEPTH) {
                        wgpu::LoadOp::Clear(depth)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Prism Clear Encoder"),
            });
        drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Prism Clear Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            ..Default::default()
        }));
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn blit(&self, state: &mut WgpuState, descriptor: &BlitDescriptor) -> Result<(), ResourceError> {
        let requires_color = self.capabilities.requires_color_attachment;
        state.ensure_complete(state.read, requires_color)?;
        state.ensure_complete(state.draw, requires_color)?;

        if descriptor.mask.contains(BlitMask::DEPTH) {
            self.blit_depth(state, descriptor)?;
        }
        if descriptor.mask.contains(BlitMask::COLOR) {
            let from = state.attachment_key(state.read, descriptor.read_attachment)?;
            for to in state.draw_keys()? {
                self.blit_color(state, from, to, descriptor)?;
            }
        }
        Ok(())
    }

    fn blit_depth(&self, state: &WgpuState, descriptor: &BlitDescriptor) -> Result<(), ResourceError> {
        let from = state.attachment_key(state.read, AttachmentPoint::Depth)?;
        let to = state.attachment_key(state.draw, AttachmentPoint::Depth)?;
        let src = state.image(from).ok_or(ResourceError::NotFound)?;
        let dst = state.image(to).ok_or(ResourceError::NotFound)?;
        if src.samples > 1 {
            log::trace!("WgpuDevice: multisampled depth is not resolved");
            return Ok(());
        }
        if descriptor.src != src.bounds()
            || descriptor.dst != dst.bounds()
            || src.bounds() != dst.bounds()
        {
            return Err(ResourceError::InvalidDescriptor(
                "depth blits must copy whole, equally sized attachments".to_string(),
            ));
        }
        self.copy_texture(src, dst, descriptor.src, descriptor.dst);
        Ok(())
    }

    fn blit_color(
        &self,
        state: &mut WgpuState,
        from: ImageKey,
        to: ImageKey,
        descriptor: &BlitDescriptor,
    ) -> Result<(), ResourceError> {
        let (src_rect, dst_rect) = (descriptor.src, descriptor.dst);
        let src = state.image(from).ok_or(ResourceError::NotFound)?;
        let dst = state.image(to).ok_or(ResourceError::NotFound)?;
        if !src.bounds().contains_rect(&src_rect) || !dst.bounds().contains_rect(&dst_rect) {
            return Err(ResourceError::OutOfBounds);
        }

        if src.samples > 1 {
            if dst.samples != 1
                || src_rect != src.bounds()
                || dst_rect != dst.bounds()
                || src.bounds() != dst.bounds()
                || src.format != dst.format
            {
                return Err(ResourceError::InvalidDescriptor(
                    "multisample resolves must cover whole, equally sized attachments".to_string(),
                ));
            }
            self.resolve(src, dst);
            return Ok(());
        }
        if src.format == dst.format && src_rect.extent() == dst_rect.extent() {
            self.copy_texture(src, dst, src_rect, dst_rect);
            return Ok(());
        }

        let params = BlitTarget {
            viewport: [
                dst_rect.x as f32,
                dst.flip_y(dst_rect) as f32,
                dst_rect.width as f32,
                dst_rect.height as f32,
            ],
            scissor: None,
            src_uv: [
                src_rect.x as f32 / src.width as f32,
                src.flip_y(src_rect) as f32 / src.height as f32,
                src_rect.width as f32 / src.width as f32,
                src_rect.height as f32 / src.height as f32,
            ],
            filter: descriptor.filter,
            blend: prism_core::renderer::BlendMode::Opaque,
        };
        let (source, target, format) = (src.view.clone(), dst.view.clone(), dst.format.into_wgpu());
        let blit = state
            .blit
            .get_or_insert_with(|| FullscreenBlit::new(&self.device));
        blit.draw(&self.device, &self.queue, &source, &target, format, params);
        Ok(())
    }

    fn resolve(&self, src: &GpuImage, dst: &GpuImage) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Prism Resolve Encoder"),
            });
        drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Prism Resolve Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &src.view,
                resolve_target: Some(&dst.view),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        }));
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn copy_texture(&self, src: &GpuImage, dst: &GpuImage, src_rect: Rect, dst_rect: Rect) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Prism Copy Encoder"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: src_rect.x as u32,
                    y: src.flip_y(src_rect),
                    z: 0,
                },
                aspect: src.aspect(),
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: dst_rect.x as u32,
                    y: dst.flip_y(dst_rect),
                    z: 0,
                },
                aspect: dst.aspect(),
            },
            wgpu::Extent3d {
                width: src_rect.width,
                height: src_rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn read_image(&self, image: &GpuImage, rect: Rect) -> Result<Vec<[f32; 4]>, ResourceError> {
        if image.samples > 1 {
            return Err(ResourceError::InvalidDescriptor(
                "cannot read back a multisampled attachment".to_string(),
            ));
        }
        if !image.bounds().contains_rect(&rect) {
            return Err(ResourceError::OutOfBounds);
        }
        let bytes_per_texel = texel_size(image.format);
        let tight = bytes_per_texel * rect.width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = tight.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Prism Readback Staging"),
            size: padded as u64 * rect.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Prism Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x as u32,
                    y: image.flip_y(rect),
                    z: 0,
                },
                aspect: image.aspect(),
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        if let Err(e) = self.device.poll(wgpu::PollType::Wait) {
            return Err(ResourceError::BackendError(format!("poll failed: {e:?}")));
        }
        receiver
            .recv()
            .map_err(|e| ResourceError::BackendError(format!("map_async callback dropped: {e}")))?
            .map_err(|e| ResourceError::BackendError(format!("map_async failed: {e:?}")))?;

        let data = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(rect.area());
        // Texture rows are top-down; return them bottom-up.
        for row in (0..rect.height as usize).rev() {
            let start = row * padded as usize;
            for texel in data[start..start + tight as usize].chunks_exact(bytes_per_texel as usize) {
                texels.push(decode_texel(image.format, texel));
            }
        }
        drop(data);
        staging.unmap();
        Ok(texels)
    }
}

impl GraphicsDevice for WgpuDevice {
    fn backend_name(&self) -> &str {
        "wgpu"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn create_framebuffer(&self, label: Option<&str>) -> Result<FramebufferId, ResourceError> {
        let mut state = self.state();
        let id = FramebufferId(state.next_id());
        state.framebuffers.insert(id, FrameObject::default());
        log::trace!("WgpuDevice: created framebuffer {id:?} ({label:?})");
        Ok(id)
    }

    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.framebuffers.remove(&id).is_none() {
            return self.record("destroy_framebuffer", Err(ResourceError::NotFound));
        }
        if state.read == Some(id) {
            state.read = None;
        }
        if state.draw == Some(id) {
            state.draw = None;
        }
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let image = self.create_image(
            descriptor.label.as_deref(),
            descriptor.width,
            descriptor.height,
            descriptor.format,
            1,
        );
        let image = self.record("create_texture", image)?;
        let mut state = self.state();
        let id = TextureId(state.next_id());
        state.textures.insert(id, image);
        log::debug!(
            "WgpuDevice: Created texture '{}' with ID: {id:?}",
            descriptor.label.as_deref().unwrap_or_default()
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        match self.state().textures.remove(&id) {
            Some(image) => {
                image.texture.destroy();
                Ok(())
            }
            None => self.record("destroy_texture", Err(ResourceError::NotFound)),
        }
    }

    fn create_renderbuffer(
        &self,
        descriptor: &RenderbufferDescriptor,
    ) -> Result<RenderbufferId, ResourceError> {
        let samples = self.capabilities.clamp_samples(descriptor.samples);
        let image = self.create_image(
            descriptor.label.as_deref(),
            descriptor.width,
            descriptor.height,
            descriptor.format,
            samples,
        );
        let image = self.record("create_renderbuffer", image)?;
        let mut state = self.state();
        let id = RenderbufferId(state.next_id());
        state.renderbuffers.insert(id, image);
        Ok(id)
    }

    fn destroy_renderbuffer(&self, id: RenderbufferId) -> Result<(), ResourceError> {
        match self.state().renderbuffers.remove(&id) {
            Some(image) => {
                image.texture.destroy();
                Ok(())
            }
            None => self.record("destroy_renderbuffer", Err(ResourceError::NotFound)),
        }
    }

    fn attach(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        if let Some(target) = target {
            if state.image(ImageKey::from(target)).is_none() {
                return self.record("attach", Err(ResourceError::InvalidHandle));
            }
        }
        let Some(frame) = state.framebuffers.get_mut(&framebuffer) else {
            return self.record("attach", Err(ResourceError::NotFound));
        };
        match target {
            Some(target) => frame.attachments.insert(point, target),
            None => frame.attachments.remove(&point),
        };
        Ok(())
    }

    fn set_draw_buffers(
        &self,
        framebuffer: FramebufferId,
        buffers: &[AttachmentPoint],
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        let Some(frame) = state.framebuffers.get_mut(&framebuffer) else {
            return self.record("set_draw_buffers", Err(ResourceError::NotFound));
        };
        frame.draw_buffers = buffers.to_vec();
        Ok(())
    }

    fn draw_buffers(&self, framebuffer: FramebufferId) -> Result<Vec<AttachmentPoint>, ResourceError> {
        let result = self
            .state()
            .framebuffers
            .get(&framebuffer)
            .map(|frame| frame.draw_buffers.clone())
            .ok_or(ResourceError::NotFound);
        self.record("draw_buffers", result)
    }

    fn check_framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        self.state()
            .status(framebuffer, self.capabilities.requires_color_attachment)
    }

    fn bind_framebuffer(
        &self,
        binding: FramebufferBinding,
        framebuffer: Option<FramebufferId>,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        if let Some(id) = framebuffer {
            if !state.framebuffers.contains_key(&id) {
                return self.record("bind_framebuffer", Err(ResourceError::NotFound));
            }
        }
        match binding {
            FramebufferBinding::Read => state.read = framebuffer,
            FramebufferBinding::Draw => state.draw = framebuffer,
            FramebufferBinding::Both => {
                state.read = framebuffer;
                state.draw = framebuffer;
            }
        }
        Ok(())
    }

    fn bound_framebuffer(&self, binding: FramebufferBinding) -> Option<FramebufferId> {
        let state = self.state();
        match binding {
            FramebufferBinding::Read => state.read,
            FramebufferBinding::Draw | FramebufferBinding::Both => state.draw,
        }
    }

    fn blit_framebuffer(&self, descriptor: &BlitDescriptor) -> Result<(), ResourceError> {
        let mut state = self.state();
        let result = self.blit(&mut state, descriptor);
        self.record("blit_framebuffer", result)
    }

    fn draw_fullscreen_texture(&self, texture: TextureId) -> Result<(), ResourceError> {
        let mut state = self.state();
        let result = (|| {
            state.ensure_complete(state.draw, self.capabilities.requires_color_attachment)?;
            let source = state
                .textures
                .get(&texture)
                .ok_or(ResourceError::NotFound)?
                .view
                .clone();
            // Only the first draw buffer receives the copy.
            let key = *state.draw_keys()?.first().ok_or(ResourceError::NotFound)?;
            let target = state.image(key).ok_or(ResourceError::NotFound)?;
            let viewport = state.viewport;
            let scissor = state.render_state.scissor.and_then(|s| s.intersect(&target.bounds()));
            let params = BlitTarget {
                viewport: [
                    viewport.x as f32,
                    target.height as f32 - viewport.top() as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                ],
                scissor: scissor.map(|s| [s.x as u32, target.flip_y(s), s.width, s.height]),
                src_uv: [0.0, 0.0, 1.0, 1.0],
                filter: prism_core::renderer::FilterMode::Linear,
                blend: state.render_state.blend,
            };
            let (view, format) = (target.view.clone(), target.format.into_wgpu());
            let blit = state
                .blit
                .get_or_insert_with(|| FullscreenBlit::new(&self.device));
            blit.draw(&self.device, &self.queue, &source, &view, format, params);
            Ok(())
        })();
        self.record("draw_fullscreen_texture", result)
    }

    fn set_viewport(&self, rect: Rect) {
        self.state().viewport = rect;
    }

    fn viewport(&self) -> Rect {
        self.state().viewport
    }

    fn set_render_state(&self, state: &RenderState) {
        self.state().render_state = *state;
    }

    fn render_state(&self) -> RenderState {
        self.state().render_state
    }

    fn clear(&self, flags: ClearFlags, color: [f32; 4], depth: f32) -> Result<(), ResourceError> {
        let state = self.state();
        let result = self.clear_targets(&state, flags, color, depth);
        self.record("clear", result)
    }

    fn read_pixels(
        &self,
        rect: Rect,
        attachment: AttachmentPoint,
        format: PixelFormat,
    ) -> Result<Vec<u8>, ResourceError> {
        let state = self.state();
        let result = (|| {
            state.ensure_complete(state.read, self.capabilities.requires_color_attachment)?;
            let key = state.attachment_key(state.read, attachment)?;
            let image = state.image(key).ok_or(ResourceError::NotFound)?;
            let texels = self.read_image(image, rect)?;
            let mut pixels = Vec::with_capacity(texels.len() * format.bytes_per_pixel());
            for texel in texels {
                match format {
                    PixelFormat::Rgba8 => pixels
                        .extend(texel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)),
                    PixelFormat::Rgba32Float => {
                        pixels.extend_from_slice(bytemuck::cast_slice(&texel))
                    }
                }
            }
            Ok(pixels)
        })();
        self.record("read_pixels", result)
    }

    fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
