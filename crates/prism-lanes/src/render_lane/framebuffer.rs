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

//! CPU-side bookkeeping of one off-screen render target.

use bitflags::bitflags;
use prism_core::renderer::{AttachmentPoint, FramebufferId, RenderbufferId, TextureId};

bitflags! {
    /// Format flags of a [`Framebuffer`]. Any change forces a reallocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FramebufferFlags: u32 {
        /// Colour attachments use a floating-point format.
        const HDR = 1 << 0;
        /// Normals and specular colour attachments are present.
        const EXTENDED = 1 << 1;
        /// The caller asked for multisampling.
        const MULTISAMPLE_REQUESTED = 1 << 2;
        /// The device granted multisampling; a companion is allocated.
        const MULTISAMPLE_GRANTED = 1 << 3;
        /// A main colour attachment is present.
        const COLOR = 1 << 4;
    }
}

/// Renderbuffers backing the multisampled companion of a [`Framebuffer`].
///
/// Draws target the companion; resolving copies it into the primary textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MultisampleCompanion {
    /// The companion frame object.
    pub frame: Option<FramebufferId>,
    /// Multisampled main colour.
    pub color: Option<RenderbufferId>,
    /// Multisampled depth.
    pub depth: Option<RenderbufferId>,
    /// Multisampled normals.
    pub normals: Option<RenderbufferId>,
    /// Multisampled specular.
    pub specular: Option<RenderbufferId>,
}

impl MultisampleCompanion {
    fn is_empty(&self) -> bool {
        *self == MultisampleCompanion::default()
    }
}

/// An off-screen render target and the handles that make it up.
///
/// A default-constructed or [invalidated] framebuffer holds no handle at all.
/// Handles are filled by [`FramebufferPool::prepare`] and emptied by
/// [`FramebufferPool::delete_buffer`].
///
/// [invalidated]: super::FramebufferPool::invalidate
/// [`FramebufferPool::prepare`]: super::FramebufferPool::prepare
/// [`FramebufferPool::delete_buffer`]: super::FramebufferPool::delete_buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Framebuffer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Granted sample count; 1 when not multisampled.
    pub samples: u32,
    /// Format flags.
    pub flags: FramebufferFlags,
    /// The primary frame object.
    pub frame: Option<FramebufferId>,
    /// Main colour texture.
    pub color: Option<TextureId>,
    /// Depth texture.
    pub depth: Option<TextureId>,
    /// Normals texture (extended buffers only).
    pub normals: Option<TextureId>,
    /// Specular texture (extended buffers only).
    pub specular: Option<TextureId>,
    /// The multisampled companion, when granted.
    pub multisample: MultisampleCompanion,
}

impl Framebuffer {
    /// Returns `true` if no handle is held.
    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
            && self.color.is_none()
            && self.depth.is_none()
            && self.normals.is_none()
            && self.specular.is_none()
            && self.multisample.is_empty()
    }

    /// Returns `true` if the primary frame object exists.
    pub fn is_allocated(&self) -> bool {
        self.frame.is_some()
    }

    /// Returns `true` if draws go to a multisampled companion.
    pub fn has_companion(&self) -> bool {
        self.multisample.frame.is_some()
    }

    /// The frame object draws should target: the companion when present.
    pub fn draw_target(&self) -> Option<FramebufferId> {
        self.multisample.frame.or(self.frame)
    }

    /// The active colour draw buffers implied by the flags.
    pub fn color_attachments(&self) -> Vec<AttachmentPoint> {
        let mut points = Vec::with_capacity(3);
        if self.flags.contains(FramebufferFlags::COLOR) {
            points.push(AttachmentPoint::COLOR0);
        }
        if self.flags.contains(FramebufferFlags::EXTENDED) {
            points.push(AttachmentPoint::NORMALS);
            points.push(AttachmentPoint::SPECULAR);
        }
        points
    }

    /// Returns `true` if the colour image is HDR.
    pub fn is_hdr(&self) -> bool {
        self.flags.contains(FramebufferFlags::HDR)
    }

    /// Returns `true` if normals and specular are present.
    pub fn is_extended(&self) -> bool {
        self.flags.contains(FramebufferFlags::EXTENDED)
    }
}

/// Parameters of [`FramebufferPool::prepare`](super::FramebufferPool::prepare).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferRequest {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether a main colour attachment is wanted.
    pub color: bool,
    /// Whether multisampling is wanted.
    pub multisample: bool,
    /// Whether colour attachments are floating point.
    pub hdr: bool,
    /// Whether normals and specular attachments are wanted.
    pub extended: bool,
    /// Whether the target is bound and cleared after preparation.
    pub clear: bool,
}

impl FramebufferRequest {
    /// A single-sampled LDR colour target of the given size, not cleared.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: true,
            multisample: false,
            hdr: false,
            extended: false,
            clear: false,
        }
    }

    /// Sets whether a colour attachment is wanted.
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Sets whether multisampling is wanted.
    pub fn multisample(mut self, multisample: bool) -> Self {
        self.multisample = multisample;
        self
    }

    /// Sets the HDR flag.
    pub fn hdr(mut self, hdr: bool) -> Self {
        self.hdr = hdr;
        self
    }

    /// Sets the extended flag.
    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    /// Sets whether the target is cleared.
    pub fn clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_framebuffer_is_empty() {
        let fb = Framebuffer::default();
        assert!(fb.is_empty());
        assert!(!fb.is_allocated());
        assert_eq!(fb.draw_target(), None);
    }

    #[test]
    fn test_draw_target_prefers_companion() {
        let mut fb = Framebuffer {
            frame: Some(FramebufferId(1)),
            ..Default::default()
        };
        assert_eq!(fb.draw_target(), Some(FramebufferId(1)));
        fb.multisample.frame = Some(FramebufferId(2));
        assert!(fb.has_companion());
        assert_eq!(fb.draw_target(), Some(FramebufferId(2)));
    }

    #[test]
    fn test_color_attachments_follow_flags() {
        let mut fb = Framebuffer::default();
        assert!(fb.color_attachments().is_empty());
        fb.flags = FramebufferFlags::COLOR | FramebufferFlags::EXTENDED;
        assert_eq!(
            fb.color_attachments(),
            vec![
                AttachmentPoint::COLOR0,
                AttachmentPoint::NORMALS,
                AttachmentPoint::SPECULAR
            ]
        );
    }
}
