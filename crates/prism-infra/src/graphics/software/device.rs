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

use super::image::{to_unorm8, Image};
use crate::graphics::frame::{AttachmentInfo, FrameObject};
use prism_core::math::Rect;
use prism_core::renderer::{
    AttachmentPoint, AttachmentTarget, BlitDescriptor, BlitMask, ClearFlags, DeviceCapabilities,
    FilterMode, FramebufferBinding, FramebufferId, FramebufferStatus, GraphicsDevice, PixelFormat,
    RenderState, RenderbufferDescriptor, RenderbufferId, ResourceError, TextureDescriptor,
    TextureFormat, TextureId,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A device call recorded in the journal of a [`SoftwareDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A frame object was created.
    CreateFramebuffer(FramebufferId),
    /// A frame object was destroyed.
    DestroyFramebuffer(FramebufferId),
    /// A texture was created.
    CreateTexture {
        /// The new handle.
        id: TextureId,
        /// Its format.
        format: TextureFormat,
    },
    /// A texture was destroyed.
    DestroyTexture(TextureId),
    /// A renderbuffer was created.
    CreateRenderbuffer {
        /// The new handle.
        id: RenderbufferId,
        /// Its format.
        format: TextureFormat,
        /// The granted sample count.
        samples: u32,
    },
    /// A renderbuffer was destroyed.
    DestroyRenderbuffer(RenderbufferId),
    /// A framebuffer was bound.
    Bind {
        /// The binding point.
        binding: FramebufferBinding,
        /// The bound frame object, `None` for the surface.
        framebuffer: Option<FramebufferId>,
    },
    /// A blit was executed.
    Blit {
        /// The copied buffers.
        mask: BlitMask,
        /// Source rectangle.
        src: Rect,
        /// Destination rectangle.
        dst: Rect,
    },
    /// A texture was drawn over the viewport.
    DrawFullscreen(TextureId),
    /// The draw framebuffer was cleared.
    Clear(ClearFlags),
    /// Pixels were read back.
    ReadPixels(Rect),
}

/// Live object counts and operation counters of a [`SoftwareDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareStats {
    /// Live frame objects.
    pub framebuffers: usize,
    /// Live textures.
    pub textures: usize,
    /// Live renderbuffers.
    pub renderbuffers: usize,
    /// Blits executed.
    pub blits: u64,
    /// Clears executed.
    pub clears: u64,
    /// Readbacks executed.
    pub readbacks: u64,
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
struct State {
    capabilities: DeviceCapabilities,
    surface_color: Image,
    surface_depth: Image,
    textures: HashMap<TextureId, Image>,
    renderbuffers: HashMap<RenderbufferId, Image>,
    framebuffers: HashMap<FramebufferId, FrameObject>,
    next_id: usize,
    read: Option<FramebufferId>,
    draw: Option<FramebufferId>,
    viewport: Rect,
    render_state: RenderState,
    forced_status: Option<FramebufferStatus>,
    errors: Vec<String>,
    journal: Vec<DeviceEvent>,
    stats: SoftwareStats,
}

/// A CPU implementation of [`GraphicsDevice`].
///
/// Follows the framebuffer model to the letter: completeness rules, bindings,
/// draw buffers, multisampled renderbuffers that cannot be read back before
/// a resolve, and an error queue fed by every failing call. The surface is an
/// off-screen RGBA8 image with a depth buffer.
///
/// Besides the trait, it offers what tests need: a journal of device calls,
/// object counts, a way to force completeness failures, rectangle fills for
/// fake scenes and direct pixel access.
#[derive(Debug)]
pub struct SoftwareDevice {
    state: Mutex<State>,
}

impl SoftwareDevice {
    /// Creates a device whose surface is `width`x`height`, with default capabilities.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capabilities(width, height, DeviceCapabilities::default())
    }

    /// Creates a device with explicit capabilities.
    pub fn with_capabilities(width: u32, height: u32, capabilities: DeviceCapabilities) -> Self {
        log::debug!("SoftwareDevice: surface {width}x{height}, {capabilities:?}");
        Self {
            state: Mutex::new(State {
                capabilities,
                surface_color: Image::new(width, height, TextureFormat::Rgba8Unorm, 1),
                surface_depth: Image::new(width, height, TextureFormat::Depth24Plus, 1),
                textures: HashMap::new(),
                renderbuffers: HashMap::new(),
                framebuffers: HashMap::new(),
                next_id: 1,
                read: None,
                draw: None,
                viewport: Rect::new(0, 0, width, height),
                render_state: RenderState::default(),
                forced_status: None,
                errors: Vec::new(),
                journal: Vec::new(),
                stats: SoftwareStats::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the surface with a cleared one of the new size.
    pub fn resize_surface(&self, width: u32, height: u32) {
        let mut state = self.state();
        state.surface_color = Image::new(width, height, TextureFormat::Rgba8Unorm, 1);
        state.surface_depth = Image::new(width, height, TextureFormat::Depth24Plus, 1);
    }

    /// Changes the reported capabilities.
    pub fn set_capabilities(&self, capabilities: DeviceCapabilities) {
        self.state().capabilities = capabilities;
    }

    /// Makes every completeness query return `status` until reset with `None`.
    pub fn force_status(&self, status: Option<FramebufferStatus>) {
        self.state().forced_status = status;
    }

    /// The device calls recorded since the last [`clear_journal`](Self::clear_journal).
    pub fn journal(&self) -> Vec<DeviceEvent> {
        self.state().journal.clone()
    }

    /// Empties the journal.
    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    /// Object counts and counters.
    pub fn stats(&self) -> SoftwareStats {
        let state = self.state();
        SoftwareStats {
            framebuffers: state.framebuffers.len(),
            textures: state.textures.len(),
            renderbuffers: state.renderbuffers.len(),
            ..state.stats
        }
    }

    /// The sample count of a renderbuffer.
    pub fn renderbuffer_samples(&self, id: RenderbufferId) -> Option<u32> {
        self.state().renderbuffers.get(&id).map(|image| image.samples)
    }

    /// The format of a texture.
    pub fn texture_format(&self, id: TextureId) -> Option<TextureFormat> {
        self.state().textures.get(&id).map(|image| image.format)
    }

    /// Reads one texel of `point` of `framebuffer` (`None` is the surface).
    pub fn pixel(
        &self,
        framebuffer: Option<FramebufferId>,
        point: AttachmentPoint,
        x: i32,
        y: i32,
    ) -> Option<[f32; 4]> {
        let state = self.state();
        let key = state.attachment_key(framebuffer, point).ok()?;
        state.image(key)?.get(x, y)
    }

    /// Reads one texel of a texture.
    pub fn texture_pixel(&self, id: TextureId, x: i32, y: i32) -> Option<[f32; 4]> {
        self.state().textures.get(&id)?.get(x, y)
    }

    /// Rasterizes a rectangle into the bound draw framebuffer, like a quad
    /// at constant `depth` would.
    ///
    /// The rectangle is in framebuffer pixels and clipped to the viewport and
    /// the scissor. Depth test (less), depth write and blending follow the
    /// current render state.
    pub fn fill_rect(&self, rect: Rect, color: [f32; 4], depth: f32) -> Result<(), ResourceError> {
        let mut state = self.state();
        let result = state.fill_rect(rect, color, depth);
        state.track("fill_rect", result)
    }
}

impl State {
    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn track<T>(&mut self, operation: &str, result: Result<T, ResourceError>) -> Result<T, ResourceError> {
        if let Err(err) = &result {
            log::debug!("SoftwareDevice: {operation} failed: {err}");
            self.errors.push(format!("{operation}: {err}"));
        }
        result
    }

    fn image(&self, key: ImageKey) -> Option<&Image> {
        match key {
            ImageKey::SurfaceColor => Some(&self.surface_color),
            ImageKey::SurfaceDepth => Some(&self.surface_depth),
            ImageKey::Texture(id) => self.textures.get(&id),
            ImageKey::Renderbuffer(id) => self.renderbuffers.get(&id),
        }
    }

    fn image_mut(&mut self, key: ImageKey) -> Option<&mut Image> {
        match key {
            ImageKey::SurfaceColor => Some(&mut self.surface_color),
            ImageKey::SurfaceDepth => Some(&mut self.surface_depth),
            ImageKey::Texture(id) => self.textures.get_mut(&id),
            ImageKey::Renderbuffer(id) => self.renderbuffers.get_mut(&id),
        }
    }

    fn frame(&self, id: FramebufferId) -> Result<&FrameObject, ResourceError> {
        self.framebuffers.get(&id).ok_or(ResourceError::NotFound)
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
                .frame(id)?
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
                let frame = self.frame(id)?;
                Ok(frame
                    .draw_buffers
                    .iter()
                    .filter_map(|point| frame.attachments.get(point))
                    .map(|target| ImageKey::from(*target))
                    .collect())
            }
        }
    }

    fn depth_key(&self) -> Option<ImageKey> {
        self.attachment_key(self.draw, AttachmentPoint::Depth).ok()
    }

    fn ensure_complete(&self, framebuffer: Option<FramebufferId>) -> Result<(), ResourceError> {
        match framebuffer {
            None => Ok(()),
            Some(id) => {
                let status = self.status(id);
                if status.is_complete() {
                    Ok(())
                } else {
                    Err(ResourceError::InvalidDescriptor(format!(
                        "framebuffer {id:?} is incomplete ({status:?})"
                    )))
                }
            }
        }
    }

    fn status(&self, id: FramebufferId) -> FramebufferStatus {
        if let Some(status) = self.forced_status {
            return status;
        }
        let Some(frame) = self.framebuffers.get(&id) else {
            return FramebufferStatus::Undefined;
        };
        frame.status(self.capabilities.requires_color_attachment, |target| {
            self.image(ImageKey::from(target)).map(|image| AttachmentInfo {
                format: image.format,
                width: image.width,
                height: image.height,
                samples: image.samples,
            })
        })
    }

    fn clip_to_state(&self, rect: Rect) -> Option<Rect> {
        let rect = rect.intersect(&self.viewport)?;
        match self.render_state.scissor {
            Some(scissor) => rect.intersect(&scissor),
            None => Some(rect),
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: [f32; 4], depth: f32) -> Result<(), ResourceError> {
        self.ensure_complete(self.draw)?;
        let Some(area) = self.clip_to_state(rect) else {
            return Ok(());
        };
        let targets = self.draw_keys()?;
        let depth_key = self.depth_key();
        let state = self.render_state;

        for y in area.y..area.top() {
            for x in area.x..area.right() {
                if let Some(key) = depth_key {
                    let Some(depth_image) = self.image_mut(key) else {
                        continue;
                    };
                    let stored = depth_image.get(x, y).map_or(1.0, |t| t[0]);
                    if state.depth_test && depth >= stored {
                        continue;
                    }
                    if state.depth_write {
                        depth_image.set(x, y, [depth, 0.0, 0.0, 0.0]);
                    }
                }
                for &key in &targets {
                    if let Some(image) = self.image_mut(key) {
                        image.blend(x, y, color, state.blend);
                    }
                }
            }
        }
        Ok(())
    }

    fn blit(&mut self, descriptor: &BlitDescriptor) -> Result<(), ResourceError> {
        self.ensure_complete(self.read)?;
        self.ensure_complete(self.draw)?;
        let (src, dst) = (descriptor.src, descriptor.dst);

        if descriptor.mask.contains(BlitMask::DEPTH) {
            if src.extent() != dst.extent() || descriptor.filter != FilterMode::Nearest {
                return Err(ResourceError::InvalidDescriptor(
                    "depth blits need equal sizes and nearest filtering".to_string(),
                ));
            }
            let from = self.attachment_key(self.read, AttachmentPoint::Depth)?;
            let to = self.attachment_key(self.draw, AttachmentPoint::Depth)?;
            self.copy_region(from, &[to], src, dst, FilterMode::Nearest)?;
        }
        if descriptor.mask.contains(BlitMask::COLOR) {
            let from = self.attachment_key(self.read, descriptor.read_attachment)?;
            let to = self.draw_keys()?;
            self.copy_region(from, &to, src, dst, descriptor.filter)?;
        }
        self.stats.blits += 1;
        Ok(())
    }

    fn copy_region(
        &mut self,
        from: ImageKey,
        to: &[ImageKey],
        src: Rect,
        dst: Rect,
        filter: FilterMode,
    ) -> Result<(), ResourceError> {
        let source = self.image(from).ok_or(ResourceError::NotFound)?.clone();
        if src.is_empty() || dst.is_empty() {
            return Ok(());
        }
        for &key in to {
            let image = self.image_mut(key).ok_or(ResourceError::NotFound)?;
            for y in dst.y..dst.top() {
                for x in dst.x..dst.right() {
                    let fu = (x - dst.x) as f32 + 0.5;
                    let fv = (y - dst.y) as f32 + 0.5;
                    let sx = src.x as f32 + fu * src.width as f32 / dst.width as f32;
                    let sy = src.y as f32 + fv * src.height as f32 / dst.height as f32;
                    let texel = match filter {
                        FilterMode::Nearest => source.get(sx.floor() as i32, sy.floor() as i32),
                        FilterMode::Linear => Some(source.sample_linear(
                            sx / source.width as f32,
                            sy / source.height as f32,
                        )),
                    };
                    if let Some(texel) = texel {
                        image.set(x, y, texel);
                    }
                }
            }
        }
        Ok(())
    }

    fn draw_fullscreen(&mut self, texture: TextureId) -> Result<(), ResourceError> {
        self.ensure_complete(self.draw)?;
        let source = self
            .textures
            .get(&texture)
            .ok_or(ResourceError::NotFound)?
            .clone();
        let viewport = self.viewport;
        let Some(area) = self.clip_to_state(viewport) else {
            return Ok(());
        };
        let blend = self.render_state.blend;
        for key in self.draw_keys()? {
            let Some(image) = self.image_mut(key) else {
                continue;
            };
            for y in area.y..area.top() {
                for x in area.x..area.right() {
                    let u = ((x - viewport.x) as f32 + 0.5) / viewport.width as f32;
                    let v = ((y - viewport.y) as f32 + 0.5) / viewport.height as f32;
                    image.blend(x, y, source.sample_linear(u, v), blend);
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32) -> Result<(), ResourceError> {
        self.ensure_complete(self.draw)?;
        if flags.contains(ClearFlags::COLOR) {
            for key in self.draw_keys()? {
                if let Some(image) = self.image_mut(key) {
                    image.fill(color);
                }
            }
        }
        if flags.contains(ClearFlags::DEPTH) {
            if let Some(image) = self.depth_key().and_then(|key| self.image_mut(key)) {
                image.fill([depth, 0.0, 0.0, 0.0]);
            }
        }
        self.stats.clears += 1;
        Ok(())
    }

    fn read_pixels(
        &mut self,
        rect: Rect,
        attachment: AttachmentPoint,
        format: PixelFormat,
    ) -> Result<Vec<u8>, ResourceError> {
        self.ensure_complete(self.read)?;
        let key = self.attachment_key(self.read, attachment)?;
        let image = self.image(key).ok_or(ResourceError::NotFound)?;
        if image.samples > 1 {
            return Err(ResourceError::InvalidDescriptor(
                "cannot read back a multisampled attachment".to_string(),
            ));
        }
        if !Rect::new(0, 0, image.width, image.height).contains_rect(&rect) {
            return Err(ResourceError::OutOfBounds);
        }

        let mut pixels = Vec::with_capacity(rect.area() * format.bytes_per_pixel());
        for y in rect.y..rect.top() {
            for x in rect.x..rect.right() {
                let texel = image.get(x, y).unwrap_or_default();
                match format {
                    PixelFormat::Rgba8 => pixels.extend_from_slice(&to_unorm8(texel)),
                    PixelFormat::Rgba32Float => {
                        pixels.extend_from_slice(bytemuck::cast_slice(&texel))
                    }
                }
            }
        }
        self.stats.readbacks += 1;
        Ok(pixels)
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn backend_name(&self) -> &str {
        "software"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.state().capabilities.clone()
    }

    fn create_framebuffer(&self, label: Option<&str>) -> Result<FramebufferId, ResourceError> {
        let mut state = self.state();
        let id = FramebufferId(state.next_id());
        state.framebuffers.insert(id, FrameObject::default());
        state.journal.push(DeviceEvent::CreateFramebuffer(id));
        log::trace!("SoftwareDevice: created framebuffer {id:?} ({label:?})");
        Ok(id)
    }

    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.framebuffers.remove(&id).is_none() {
            return state.track("destroy_framebuffer", Err(ResourceError::NotFound));
        }
        if state.read == Some(id) {
            state.read = None;
        }
        if state.draw == Some(id) {
            state.draw = None;
        }
        state.journal.push(DeviceEvent::DestroyFramebuffer(id));
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = self.state();
        let max = state.capabilities.max_texture_size;
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.width > max || descriptor.height > max {
            let err = ResourceError::InvalidDescriptor(format!(
                "texture size {}x{} outside 1..={max}",
                descriptor.width, descriptor.height
            ));
            return state.track("create_texture", Err(err));
        }
        let id = TextureId(state.next_id());
        state.textures.insert(
            id,
            Image::new(descriptor.width, descriptor.height, descriptor.format, 1),
        );
        state.journal.push(DeviceEvent::CreateTexture {
            id,
            format: descriptor.format,
        });
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.textures.remove(&id).is_none() {
            return state.track("destroy_texture", Err(ResourceError::NotFound));
        }
        state.journal.push(DeviceEvent::DestroyTexture(id));
        Ok(())
    }

    fn create_renderbuffer(
        &self,
        descriptor: &RenderbufferDescriptor,
    ) -> Result<RenderbufferId, ResourceError> {
        let mut state = self.state();
        let max = state.capabilities.max_texture_size;
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.width > max || descriptor.height > max {
            let err = ResourceError::InvalidDescriptor(format!(
                "renderbuffer size {}x{} outside 1..={max}",
                descriptor.width, descriptor.height
            ));
            return state.track("create_renderbuffer", Err(err));
        }
        let samples = state.capabilities.clamp_samples(descriptor.samples);
        let id = RenderbufferId(state.next_id());
        state.renderbuffers.insert(
            id,
            Image::new(descriptor.width, descriptor.height, descriptor.format, samples),
        );
        state.journal.push(DeviceEvent::CreateRenderbuffer {
            id,
            format: descriptor.format,
            samples,
        });
        Ok(id)
    }

    fn destroy_renderbuffer(&self, id: RenderbufferId) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.renderbuffers.remove(&id).is_none() {
            return state.track("destroy_renderbuffer", Err(ResourceError::NotFound));
        }
        state.journal.push(DeviceEvent::DestroyRenderbuffer(id));
        Ok(())
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
                return state.track("attach", Err(ResourceError::InvalidHandle));
            }
        }
        let result = match state.framebuffers.get_mut(&framebuffer) {
            Some(frame) => {
                match target {
                    Some(target) => frame.attachments.insert(point, target),
                    None => frame.attachments.remove(&point),
                };
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        };
        state.track("attach", result)
    }

    fn set_draw_buffers(
        &self,
        framebuffer: FramebufferId,
        buffers: &[AttachmentPoint],
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        let result = match state.framebuffers.get_mut(&framebuffer) {
            Some(frame) => {
                frame.draw_buffers = buffers.to_vec();
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        };
        state.track("set_draw_buffers", result)
    }

    fn draw_buffers(&self, framebuffer: FramebufferId) -> Result<Vec<AttachmentPoint>, ResourceError> {
        let mut state = self.state();
        let result = state.frame(framebuffer).map(|frame| frame.draw_buffers.clone());
        state.track("draw_buffers", result)
    }

    fn check_framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        self.state().status(framebuffer)
    }

    fn bind_framebuffer(
        &self,
        binding: FramebufferBinding,
        framebuffer: Option<FramebufferId>,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        if let Some(id) = framebuffer {
            if !state.framebuffers.contains_key(&id) {
                return state.track("bind_framebuffer", Err(ResourceError::NotFound));
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
        state.journal.push(DeviceEvent::Bind {
            binding,
            framebuffer,
        });
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
        let result = state.blit(descriptor);
        if result.is_ok() {
            state.journal.push(DeviceEvent::Blit {
                mask: descriptor.mask,
                src: descriptor.src,
                dst: descriptor.dst,
            });
        }
        state.track("blit_framebuffer", result)
    }

    fn draw_fullscreen_texture(&self, texture: TextureId) -> Result<(), ResourceError> {
        let mut state = self.state();
        let result = state.draw_fullscreen(texture);
        if result.is_ok() {
            state.journal.push(DeviceEvent::DrawFullscreen(texture));
        }
        state.track("draw_fullscreen_texture", result)
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
        let mut state = self.state();
        let result = state.clear(flags, color, depth);
        if result.is_ok() {
            state.journal.push(DeviceEvent::Clear(flags));
        }
        state.track("clear", result)
    }

    fn read_pixels(
        &self,
        rect: Rect,
        attachment: AttachmentPoint,
        format: PixelFormat,
    ) -> Result<Vec<u8>, ResourceError> {
        let mut state = self.state();
        let result = state.read_pixels(rect, attachment, format);
        if result.is_ok() {
            state.journal.push(DeviceEvent::ReadPixels(rect));
        }
        state.track("read_pixels", result)
    }

    fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut self.state().errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn texture(device: &SoftwareDevice, w: u32, h: u32, format: TextureFormat) -> TextureId {
        device
            .create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed("test")),
                width: w,
                height: h,
                format,
            })
            .unwrap()
    }

    fn color_target(device: &SoftwareDevice, w: u32, h: u32) -> (FramebufferId, TextureId) {
        let fb = device.create_framebuffer(None).unwrap();
        let color = texture(device, w, h, TextureFormat::Rgba8Unorm);
        device
            .attach(fb, AttachmentPoint::COLOR0, Some(AttachmentTarget::Texture(color)))
            .unwrap();
        (fb, color)
    }

    #[test]
    fn test_completeness_rules() {
        let device = SoftwareDevice::new(8, 8);
        let fb = device.create_framebuffer(None).unwrap();
        assert_eq!(device.check_framebuffer_status(fb), FramebufferStatus::MissingAttachment);
        assert_eq!(
            device.check_framebuffer_status(FramebufferId(999)),
            FramebufferStatus::Undefined
        );

        let depth = texture(&device, 8, 8, TextureFormat::Depth24Plus);
        device
            .attach(fb, AttachmentPoint::Depth, Some(AttachmentTarget::Texture(depth)))
            .unwrap();
        assert_eq!(
            device.check_framebuffer_status(fb),
            FramebufferStatus::IncompleteDrawBuffer
        );
        device.set_draw_buffers(fb, &[]).unwrap();
        assert!(device.check_framebuffer_status(fb).is_complete());

        let small = texture(&device, 4, 4, TextureFormat::Rgba8Unorm);
        device
            .attach(fb, AttachmentPoint::COLOR0, Some(AttachmentTarget::Texture(small)))
            .unwrap();
        assert_eq!(
            device.check_framebuffer_status(fb),
            FramebufferStatus::IncompleteDimensions
        );
    }

    #[test]
    fn test_depth_only_unsupported_when_color_required() {
        let device = SoftwareDevice::with_capabilities(
            8,
            8,
            DeviceCapabilities {
                requires_color_attachment: true,
                ..Default::default()
            },
        );
        let fb = device.create_framebuffer(None).unwrap();
        let depth = texture(&device, 8, 8, TextureFormat::Depth24Plus);
        device
            .attach(fb, AttachmentPoint::Depth, Some(AttachmentTarget::Texture(depth)))
            .unwrap();
        device.set_draw_buffers(fb, &[]).unwrap();
        assert_eq!(device.check_framebuffer_status(fb), FramebufferStatus::Unsupported);
    }

    #[test]
    fn test_clear_and_read_back_bottom_up() {
        let device = SoftwareDevice::new(8, 8);
        let (fb, _) = color_target(&device, 4, 2);
        device
            .bind_framebuffer(FramebufferBinding::Both, Some(fb))
            .unwrap();
        device.set_viewport(Rect::new(0, 0, 4, 2));
        device
            .clear(ClearFlags::COLOR, [0.0, 0.0, 1.0, 1.0], 1.0)
            .unwrap();
        device.set_render_state(&RenderState::BACKGROUND);
        device
            .fill_rect(Rect::new(0, 0, 4, 1), [1.0, 0.0, 0.0, 1.0], 0.5)
            .unwrap();

        let pixels = device
            .read_pixels(Rect::new(0, 0, 1, 2), AttachmentPoint::COLOR0, PixelFormat::Rgba8)
            .unwrap();
        assert_eq!(pixels, vec![255, 0, 0, 255, 0, 0, 255, 255]);
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_multisampled_read_requires_resolve() {
        let device = SoftwareDevice::new(8, 8);
        let ms = device.create_framebuffer(None).unwrap();
        let rb = device
            .create_renderbuffer(&RenderbufferDescriptor {
                label: None,
                width: 4,
                height: 4,
                format: TextureFormat::Rgba8Unorm,
                samples: 16,
            })
            .unwrap();
        assert_eq!(device.renderbuffer_samples(rb), Some(4));
        device
            .attach(ms, AttachmentPoint::COLOR0, Some(AttachmentTarget::Renderbuffer(rb)))
            .unwrap();
        device
            .bind_framebuffer(FramebufferBinding::Both, Some(ms))
            .unwrap();
        device.clear(ClearFlags::COLOR, [1.0; 4], 1.0).unwrap();
        assert!(device
            .read_pixels(Rect::new(0, 0, 1, 1), AttachmentPoint::COLOR0, PixelFormat::Rgba8)
            .is_err());
        assert_eq!(device.take_errors().len(), 1);

        let (resolved, _) = color_target(&device, 4, 4);
        device
            .bind_framebuffer(FramebufferBinding::Draw, Some(resolved))
            .unwrap();
        let rect = Rect::new(0, 0, 4, 4);
        device
            .blit_framebuffer(&BlitDescriptor::same_size(rect, AttachmentPoint::COLOR0, BlitMask::COLOR))
            .unwrap();
        assert_eq!(device.pixel(Some(resolved), AttachmentPoint::COLOR0, 3, 3), Some([1.0; 4]));
    }

    #[test]
    fn test_scaled_blit_and_out_of_bounds_readback() {
        let device = SoftwareDevice::new(8, 8);
        let (src, _) = color_target(&device, 2, 2);
        device
            .bind_framebuffer(FramebufferBinding::Draw, Some(src))
            .unwrap();
        device.set_viewport(Rect::new(0, 0, 2, 2));
        device.set_render_state(&RenderState::BACKGROUND);
        device
            .fill_rect(Rect::new(1, 0, 1, 2), [0.0, 1.0, 0.0, 1.0], 0.0)
            .unwrap();

        device
            .bind_framebuffer(FramebufferBinding::Read, Some(src))
            .unwrap();
        device.bind_framebuffer(FramebufferBinding::Draw, None).unwrap();
        device
            .blit_framebuffer(&BlitDescriptor {
                src: Rect::new(0, 0, 2, 2),
                dst: Rect::new(0, 0, 8, 8),
                read_attachment: AttachmentPoint::COLOR0,
                mask: BlitMask::COLOR,
                filter: FilterMode::Nearest,
            })
            .unwrap();
        assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 7, 0), Some([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 0, 7), Some([0.0; 4]));

        assert!(matches!(
            device.read_pixels(Rect::new(1, 1, 2, 2), AttachmentPoint::COLOR0, PixelFormat::Rgba8),
            Err(ResourceError::OutOfBounds)
        ));
    }

    #[test]
    fn test_destroying_bound_framebuffer_falls_back_to_surface() {
        let device = SoftwareDevice::new(8, 8);
        let (fb, color) = color_target(&device, 8, 8);
        device
            .bind_framebuffer(FramebufferBinding::Both, Some(fb))
            .unwrap();
        device.destroy_framebuffer(fb).unwrap();
        device.destroy_texture(color).unwrap();
        assert_eq!(device.bound_framebuffer(FramebufferBinding::Draw), None);
        assert_eq!(device.bound_framebuffer(FramebufferBinding::Read), None);
        assert!(device.destroy_texture(color).is_err());
        let stats = device.stats();
        assert_eq!((stats.framebuffers, stats.textures), (0, 0));
    }

    #[test]
    fn test_depth_test_rejects_farther_fragments() {
        let device = SoftwareDevice::new(4, 4);
        device.set_render_state(&RenderState::OPAQUE);
        let rect = Rect::new(0, 0, 4, 4);
        device.fill_rect(rect, [1.0, 0.0, 0.0, 1.0], 0.3).unwrap();
        device.fill_rect(rect, [0.0, 1.0, 0.0, 1.0], 0.6).unwrap();
        assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 2, 2), Some([1.0, 0.0, 0.0, 1.0]));
    }
}
