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

//! Allocation, multisample resolve and deletion of off-screen framebuffers.

use super::framebuffer::{Framebuffer, FramebufferFlags, FramebufferRequest};
use prism_core::math::Rect;
use prism_core::renderer::{
    AttachmentPoint, AttachmentTarget, BlitDescriptor, BlitMask, ClearFlags, FramebufferBinding,
    FramebufferId, GraphicsDevice, RenderbufferDescriptor, RenderbufferId, ResourceError,
    TextureDescriptor, TextureFormat, TextureId,
};
use std::borrow::Cow;
use std::sync::Arc;

/// Depth format of every framebuffer the pool allocates.
const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24Plus;

/// Counters of the device calls issued by a [`FramebufferPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Calls to [`FramebufferPool::prepare`].
    pub prepares: u64,
    /// Frame objects created.
    pub framebuffers_created: u64,
    /// Textures created.
    pub textures_created: u64,
    /// Renderbuffers created.
    pub renderbuffers_created: u64,
    /// Handles of any kind destroyed.
    pub handles_deleted: u64,
    /// Completeness checks that failed.
    pub incomplete: u64,
    /// Multisample resolves performed.
    pub resolves: u64,
}

/// Owns the creation, resizing, multisample resolution, invalidation and
/// deletion of [`Framebuffer`]s.
///
/// The pool negotiates one sample count with the device. A new count set with
/// [`set_max_samples`](Self::set_max_samples) only takes effect on the next
/// [`prepare`](Self::prepare) outside a frame, so all buffers of a frame
/// agree on it.
#[derive(Debug)]
pub struct FramebufferPool {
    device: Arc<dyn GraphicsDevice>,
    requested_samples: u32,
    max_samples: u32,
    samples_stale: bool,
    in_frame: bool,
    clear_color: [f32; 4],
    stats: PoolStats,
}

impl FramebufferPool {
    /// Creates a pool allocating on `device`. Multisampling is off until
    /// [`set_max_samples`](Self::set_max_samples) is called.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            requested_samples: 1,
            max_samples: 1,
            samples_stale: true,
            in_frame: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            stats: PoolStats::default(),
        }
    }

    /// The device the pool allocates on.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Allocation counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Sets the colour used when `prepare` clears a buffer.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// The colour used when `prepare` clears a buffer.
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Requests a new sample count. The negotiated count is marked stale and
    /// re-clamped to the device maximum on the next `prepare` outside a frame.
    pub fn set_max_samples(&mut self, samples: u32) {
        log::debug!("Requested max sample count {samples}");
        self.requested_samples = samples;
        self.samples_stale = true;
    }

    /// The negotiated sample count.
    pub fn max_samples(&self) -> u32 {
        self.max_samples
    }

    /// Marks the start of a frame. The negotiated sample count is frozen until
    /// [`end_frame`](Self::end_frame).
    pub fn begin_frame(&mut self) {
        self.negotiate_samples();
        self.in_frame = true;
    }

    /// Marks the end of a frame.
    pub fn end_frame(&mut self) {
        self.in_frame = false;
    }

    /// Returns `true` between `begin_frame` and `end_frame`.
    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    fn negotiate_samples(&mut self) {
        if !self.samples_stale || self.in_frame {
            return;
        }
        let granted = self
            .device
            .capabilities()
            .clamp_samples(self.requested_samples);
        if granted != self.max_samples {
            log::info!(
                "Negotiated sample count {granted} (requested {}, was {})",
                self.requested_samples,
                self.max_samples
            );
        }
        self.max_samples = granted;
        self.samples_stale = false;
    }

    /// Makes `fb` match `request`, allocating only what is missing.
    ///
    /// If the size, sample count or any format flag differs from the current
    /// state, every handle is deleted first. A second identical call issues no
    /// allocation. Multisampling is dropped when the negotiated sample count is
    /// 1, and devices that require a colour attachment always get one.
    ///
    /// Returns `false` (after logging a diagnostic) if the buffer cannot be
    /// allocated or is incomplete.
    pub fn prepare(&mut self, fb: &mut Framebuffer, request: &FramebufferRequest) -> bool {
        self.negotiate_samples();
        self.stats.prepares += 1;

        let caps = self.device.capabilities();
        if request.width == 0 || request.height == 0 {
            log::warn!(
                "Refusing to prepare an empty {}x{} framebuffer",
                request.width,
                request.height
            );
            return false;
        }
        if request.width > caps.max_texture_size || request.height > caps.max_texture_size {
            log::error!(
                "Framebuffer size {}x{} exceeds the device limit {}",
                request.width,
                request.height,
                caps.max_texture_size
            );
            return false;
        }

        let granted = request.multisample && self.max_samples > 1;
        let samples = if granted { self.max_samples } else { 1 };
        let mut flags = FramebufferFlags::empty();
        flags.set(FramebufferFlags::HDR, request.hdr);
        flags.set(FramebufferFlags::EXTENDED, request.extended);
        flags.set(FramebufferFlags::MULTISAMPLE_REQUESTED, request.multisample);
        flags.set(FramebufferFlags::MULTISAMPLE_GRANTED, granted);
        flags.set(
            FramebufferFlags::COLOR,
            request.color || caps.requires_color_attachment,
        );

        if fb.width != request.width
            || fb.height != request.height
            || fb.samples != samples
            || fb.flags != flags
        {
            if !fb.is_empty() {
                log::debug!(
                    "Reallocating framebuffer {:?}: {}x{}x{} {:?} -> {}x{}x{} {:?}",
                    fb.frame,
                    fb.width,
                    fb.height,
                    fb.samples,
                    fb.flags,
                    request.width,
                    request.height,
                    samples,
                    flags
                );
                self.delete_buffer(fb);
            }
            fb.width = request.width;
            fb.height = request.height;
            fb.samples = samples;
            fb.flags = flags;
        }

        if let Err(err) = self.allocate_missing(fb) {
            log::error!(
                "Failed to allocate framebuffer {}x{} {:?}: {err}",
                fb.width,
                fb.height,
                fb.flags
            );
            return false;
        }
        if !self.check_complete(fb) {
            return false;
        }
        if request.clear {
            if let Err(err) = self.clear_with(fb, self.clear_color) {
                log::error!("Failed to clear framebuffer {:?}: {err}", fb.frame);
                return false;
            }
        }
        true
    }

    fn allocate_missing(&mut self, fb: &mut Framebuffer) -> Result<(), ResourceError> {
        let (width, height) = (fb.width, fb.height);
        let color_format = TextureFormat::color_for(fb.is_hdr());
        let color_points = fb.color_attachments();
        let wants_color = fb.flags.contains(FramebufferFlags::COLOR);
        let extended = fb.is_extended();
        let mut created = false;

        let frame = match fb.frame {
            Some(frame) => frame,
            None => {
                let frame = self.device.create_framebuffer(Some("prism framebuffer"))?;
                self.stats.framebuffers_created += 1;
                fb.frame = Some(frame);
                created = true;
                frame
            }
        };
        let texture = |format: TextureFormat, label: &'static str| TextureDescriptor {
            label: Some(Cow::Borrowed(label)),
            width,
            height,
            format,
        };
        if wants_color {
            created |= self.ensure_texture(
                &mut fb.color,
                frame,
                AttachmentPoint::COLOR0,
                &texture(color_format, "prism color"),
            )?;
        }
        created |= self.ensure_texture(
            &mut fb.depth,
            frame,
            AttachmentPoint::Depth,
            &texture(DEPTH_FORMAT, "prism depth"),
        )?;
        if extended {
            created |= self.ensure_texture(
                &mut fb.normals,
                frame,
                AttachmentPoint::NORMALS,
                &texture(color_format, "prism normals"),
            )?;
            created |= self.ensure_texture(
                &mut fb.specular,
                frame,
                AttachmentPoint::SPECULAR,
                &texture(color_format, "prism specular"),
            )?;
        }
        if created {
            self.device.set_draw_buffers(frame, &color_points)?;
        }

        if !fb.flags.contains(FramebufferFlags::MULTISAMPLE_GRANTED) {
            return Ok(());
        }

        let samples = fb.samples;
        let companion = &mut fb.multisample;
        let mut created = false;
        let ms_frame = match companion.frame {
            Some(frame) => frame,
            None => {
                let frame = self
                    .device
                    .create_framebuffer(Some("prism multisample framebuffer"))?;
                self.stats.framebuffers_created += 1;
                companion.frame = Some(frame);
                created = true;
                frame
            }
        };
        let renderbuffer = |format: TextureFormat, label: &'static str| RenderbufferDescriptor {
            label: Some(Cow::Borrowed(label)),
            width,
            height,
            format,
            samples,
        };
        if wants_color {
            created |= self.ensure_renderbuffer(
                &mut companion.color,
                ms_frame,
                AttachmentPoint::COLOR0,
                &renderbuffer(color_format, "prism multisample color"),
            )?;
        }
        created |= self.ensure_renderbuffer(
            &mut companion.depth,
            ms_frame,
            AttachmentPoint::Depth,
            &renderbuffer(DEPTH_FORMAT, "prism multisample depth"),
        )?;
        if extended {
            created |= self.ensure_renderbuffer(
                &mut companion.normals,
                ms_frame,
                AttachmentPoint::NORMALS,
                &renderbuffer(color_format, "prism multisample normals"),
            )?;
            created |= self.ensure_renderbuffer(
                &mut companion.specular,
                ms_frame,
                AttachmentPoint::SPECULAR,
                &renderbuffer(color_format, "prism multisample specular"),
            )?;
        }
        if created {
            self.device.set_draw_buffers(ms_frame, &color_points)?;
        }
        Ok(())
    }

    fn ensure_texture(
        &mut self,
        handle: &mut Option<TextureId>,
        frame: FramebufferId,
        point: AttachmentPoint,
        descriptor: &TextureDescriptor,
    ) -> Result<bool, ResourceError> {
        if handle.is_some() {
            return Ok(false);
        }
        let id = self.device.create_texture(descriptor)?;
        self.stats.textures_created += 1;
        *handle = Some(id);
        self.device
            .attach(frame, point, Some(AttachmentTarget::Texture(id)))?;
        Ok(true)
    }

    fn ensure_renderbuffer(
        &mut self,
        handle: &mut Option<RenderbufferId>,
        frame: FramebufferId,
        point: AttachmentPoint,
        descriptor: &RenderbufferDescriptor,
    ) -> Result<bool, ResourceError> {
        if handle.is_some() {
            return Ok(false);
        }
        let id = self.device.create_renderbuffer(descriptor)?;
        self.stats.renderbuffers_created += 1;
        *handle = Some(id);
        self.device
            .attach(frame, point, Some(AttachmentTarget::Renderbuffer(id)))?;
        Ok(true)
    }

    fn check_complete(&mut self, fb: &Framebuffer) -> bool {
        for frame in [fb.frame, fb.multisample.frame].into_iter().flatten() {
            let status = self.device.check_framebuffer_status(frame);
            if !status.is_complete() {
                self.stats.incomplete += 1;
                log::error!(
                    "Framebuffer {frame:?} is incomplete ({status:?}) on {}: {}x{} samples={} flags={:?} handles={fb:?}",
                    self.device.backend_name(),
                    fb.width,
                    fb.height,
                    fb.samples,
                    fb.flags,
                );
                return false;
            }
        }
        true
    }

    /// Binds the draw target of `fb` and clears its colour and depth.
    pub fn clear_with(&self, fb: &Framebuffer, color: [f32; 4]) -> Result<(), ResourceError> {
        self.bind_draw(fb)?;
        self.device
            .set_viewport(Rect::new(0, 0, fb.width, fb.height));
        self.device
            .clear(ClearFlags::COLOR | ClearFlags::DEPTH, color, 1.0)
    }

    /// Binds the draw target of `fb` (its companion when multisampled).
    pub fn bind_draw(&self, fb: &Framebuffer) -> Result<(), ResourceError> {
        let target = fb.draw_target().ok_or(ResourceError::InvalidHandle)?;
        self.device
            .bind_framebuffer(FramebufferBinding::Draw, Some(target))
    }

    /// Copies every active colour attachment and depth from the companion of
    /// `fb` to its primary textures, with nearest filtering.
    ///
    /// The primary draw-buffer set and the framebuffer bindings are restored
    /// afterwards. Does nothing without a companion.
    pub fn resolve_multisample(&mut self, fb: &Framebuffer) -> Result<(), ResourceError> {
        let (Some(primary), Some(companion)) = (fb.frame, fb.multisample.frame) else {
            return Ok(());
        };
        let device = Arc::clone(&self.device);
        let previous_read = device.bound_framebuffer(FramebufferBinding::Read);
        let previous_draw = device.bound_framebuffer(FramebufferBinding::Draw);
        let saved = device.draw_buffers(primary)?;

        let result = Self::blit_companion(device.as_ref(), fb, primary, companion);

        let restored = device
            .set_draw_buffers(primary, &saved)
            .and_then(|_| device.bind_framebuffer(FramebufferBinding::Read, previous_read))
            .and_then(|_| device.bind_framebuffer(FramebufferBinding::Draw, previous_draw));
        if result.is_ok() {
            self.stats.resolves += 1;
        }
        result.and(restored)
    }

    fn blit_companion(
        device: &dyn GraphicsDevice,
        fb: &Framebuffer,
        primary: FramebufferId,
        companion: FramebufferId,
    ) -> Result<(), ResourceError> {
        device.bind_framebuffer(FramebufferBinding::Read, Some(companion))?;
        device.bind_framebuffer(FramebufferBinding::Draw, Some(primary))?;
        let rect = Rect::new(0, 0, fb.width, fb.height);
        for point in fb.color_attachments() {
            device.set_draw_buffers(primary, &[point])?;
            device.blit_framebuffer(&BlitDescriptor::same_size(rect, point, BlitMask::COLOR))?;
        }
        device.blit_framebuffer(&BlitDescriptor::same_size(
            rect,
            AttachmentPoint::COLOR0,
            BlitMask::DEPTH,
        ))
    }

    /// Forgets every handle of `fb` without any device call.
    ///
    /// Used when the context is lost: the handles are already gone on the
    /// device side. Size and flags are kept so the next `prepare` recreates
    /// the same buffer.
    pub fn invalidate(&self, fb: &mut Framebuffer) {
        if !fb.is_empty() {
            log::debug!("Invalidating framebuffer {:?}", fb.frame);
        }
        *fb = Framebuffer {
            width: fb.width,
            height: fb.height,
            samples: fb.samples,
            flags: fb.flags,
            ..Default::default()
        };
    }

    /// Destroys every handle `fb` holds and empties it.
    ///
    /// Empty handles are skipped, so deleting twice is harmless. Device
    /// failures are logged and the handle is forgotten anyway.
    pub fn delete_buffer(&mut self, fb: &mut Framebuffer) {
        let device = Arc::clone(&self.device);
        let mut deleted = 0;
        let mut report = |what: &str, result: Result<(), ResourceError>| {
            deleted += 1;
            if let Err(err) = result {
                log::warn!("Failed to destroy {what}: {err}");
            }
        };

        for frame in [fb.multisample.frame.take(), fb.frame.take()]
            .into_iter()
            .flatten()
        {
            report("framebuffer", device.destroy_framebuffer(frame));
        }
        for handle in [
            &mut fb.multisample.color,
            &mut fb.multisample.depth,
            &mut fb.multisample.normals,
            &mut fb.multisample.specular,
        ] {
            if let Some(id) = handle.take() {
                report("renderbuffer", device.destroy_renderbuffer(id));
            }
        }
        for handle in [
            &mut fb.color,
            &mut fb.depth,
            &mut fb.normals,
            &mut fb.specular,
        ] {
            if let Some(id) = handle.take() {
                report("texture", device.destroy_texture(id));
            }
        }

        if deleted > 0 {
            log::debug!("Deleted {deleted} framebuffer handles");
        }
        self.stats.handles_deleted += deleted;
    }
}
