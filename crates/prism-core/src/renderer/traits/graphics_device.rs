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

use crate::math::Rect;
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use std::fmt::Debug;

/// The seam between the frame pipeline and a native graphics API.
///
/// The model is the classic framebuffer-object one: framebuffers are
/// containers of attachments, one framebuffer is bound for reading and one
/// for drawing, and `None` designates the default (window) framebuffer.
/// Rows are addressed bottom-up, `y = 0` being the bottom row.
///
/// Every method takes `&self`; implementations use interior mutability.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// A short name of the backend, for logging.
    fn backend_name(&self) -> &str;

    /// Returns the limits and quirks of the device.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Creates an empty framebuffer object.
    fn create_framebuffer(&self, label: Option<&str>) -> Result<FramebufferId, ResourceError>;

    /// Destroys a framebuffer object. Its attachments are not destroyed.
    ///
    /// If the framebuffer is bound, the binding falls back to the default framebuffer.
    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError>;

    /// Creates a single-sampled, sampleable texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a (possibly multisampled) renderbuffer.
    ///
    /// The granted sample count may be lower than the requested one but never
    /// exceeds [`DeviceCapabilities::max_samples`].
    fn create_renderbuffer(
        &self,
        descriptor: &RenderbufferDescriptor,
    ) -> Result<RenderbufferId, ResourceError>;

    /// Destroys a renderbuffer.
    fn destroy_renderbuffer(&self, id: RenderbufferId) -> Result<(), ResourceError>;

    /// Binds `target` to `point` of `framebuffer`; `None` detaches.
    fn attach(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    ) -> Result<(), ResourceError>;

    /// Selects the colour attachments draws and clears write to.
    fn set_draw_buffers(
        &self,
        framebuffer: FramebufferId,
        buffers: &[AttachmentPoint],
    ) -> Result<(), ResourceError>;

    /// Returns the active draw buffers of `framebuffer`.
    fn draw_buffers(&self, framebuffer: FramebufferId) -> Result<Vec<AttachmentPoint>, ResourceError>;

    /// Runs the completeness query on `framebuffer`.
    fn check_framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    /// Binds `framebuffer` (or the default framebuffer) to `binding`.
    fn bind_framebuffer(
        &self,
        binding: FramebufferBinding,
        framebuffer: Option<FramebufferId>,
    ) -> Result<(), ResourceError>;

    /// Returns the framebuffer bound to `binding`. [`FramebufferBinding::Both`] reports the draw binding.
    fn bound_framebuffer(&self, binding: FramebufferBinding) -> Option<FramebufferId>;

    /// Copies from the bound read framebuffer to the bound draw framebuffer.
    ///
    /// Multisampled sources are resolved; depth copies require equal sizes
    /// and nearest filtering.
    fn blit_framebuffer(&self, descriptor: &BlitDescriptor) -> Result<(), ResourceError>;

    /// Draws `texture` stretched over the viewport into the active draw buffers
    /// of the bound draw framebuffer, with the current render state.
    fn draw_fullscreen_texture(&self, texture: TextureId) -> Result<(), ResourceError>;

    /// Sets the viewport rectangle.
    fn set_viewport(&self, rect: Rect);

    /// Returns the viewport rectangle.
    fn viewport(&self) -> Rect;

    /// Sets depth, blend and scissor state for subsequent draws.
    fn set_render_state(&self, state: &RenderState);

    /// Returns the current render state.
    fn render_state(&self) -> RenderState;

    /// Clears the bound draw framebuffer. Clears ignore the scissor rectangle.
    fn clear(&self, flags: ClearFlags, color: [f32; 4], depth: f32) -> Result<(), ResourceError>;

    /// Reads `rect` of `attachment` from the bound read framebuffer.
    ///
    /// Rows are returned bottom-up and tightly packed.
    fn read_pixels(
        &self,
        rect: Rect,
        attachment: AttachmentPoint,
        format: PixelFormat,
    ) -> Result<Vec<u8>, ResourceError>;

    /// Drains the errors the device recorded since the last call.
    fn take_errors(&self) -> Vec<String>;
}
