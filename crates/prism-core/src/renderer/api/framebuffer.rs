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

//! Defines framebuffer objects, their attachments and the copy (blit) operation.

use crate::math::Rect;
use crate::renderer::{FilterMode, RenderbufferId, TextureId};
use bitflags::bitflags;
use std::fmt;

/// An opaque handle to a framebuffer object.
///
/// `None` in APIs taking an `Option<FramebufferId>` designates the default
/// framebuffer, i.e. the window surface owned by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub usize);

/// A binding point of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentPoint {
    /// A colour attachment, indexed from 0.
    Color(u8),
    /// The depth attachment.
    Depth,
}

impl AttachmentPoint {
    /// The main colour attachment.
    pub const COLOR0: AttachmentPoint = AttachmentPoint::Color(0);
    /// The normals attachment of extended (G-buffer) framebuffers.
    pub const NORMALS: AttachmentPoint = AttachmentPoint::Color(1);
    /// The specular attachment of extended (G-buffer) framebuffers.
    pub const SPECULAR: AttachmentPoint = AttachmentPoint::Color(2);

    /// Returns `true` for colour attachments.
    pub fn is_color(&self) -> bool {
        matches!(self, AttachmentPoint::Color(_))
    }
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentPoint::Color(i) => write!(f, "COLOR{i}"),
            AttachmentPoint::Depth => write!(f, "DEPTH"),
        }
    }
}

/// The storage bound to an [`AttachmentPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentTarget {
    /// A sampleable texture.
    Texture(TextureId),
    /// A (possibly multisampled) renderbuffer.
    Renderbuffer(RenderbufferId),
}

/// The result of a framebuffer completeness query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    /// The framebuffer can be rendered to.
    Complete,
    /// The framebuffer id is unknown to the device.
    Undefined,
    /// An attachment has an invalid format for its binding point.
    IncompleteAttachment,
    /// The framebuffer has no attachment at all.
    MissingAttachment,
    /// A draw buffer refers to an empty attachment point.
    IncompleteDrawBuffer,
    /// The attachments disagree on their sample counts.
    IncompleteMultisample,
    /// The attachments disagree on their dimensions.
    IncompleteDimensions,
    /// The combination of formats is not supported by the device.
    Unsupported,
}

impl FramebufferStatus {
    /// Returns `true` if the framebuffer is complete.
    pub fn is_complete(&self) -> bool {
        matches!(self, FramebufferStatus::Complete)
    }
}

/// Which framebuffer binding a bind or query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferBinding {
    /// The source of blits and readbacks.
    Read,
    /// The target of draws, clears and blits.
    Draw,
    /// Both bindings at once.
    Both,
}

bitflags! {
    /// Which buffers a blit copies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlitMask: u32 {
        /// Copy the colour attachment selected as read attachment.
        const COLOR = 1 << 0;
        /// Copy the depth attachment.
        const DEPTH = 1 << 1;
    }
}

/// Describes a copy from the bound read framebuffer to the bound draw framebuffer.
///
/// Colour is read from `read_attachment` and written to every active draw
/// buffer of the draw framebuffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlitDescriptor {
    /// Region of the read framebuffer.
    pub src: Rect,
    /// Region of the draw framebuffer.
    pub dst: Rect,
    /// Colour attachment to read from.
    pub read_attachment: AttachmentPoint,
    /// Which buffers to copy.
    pub mask: BlitMask,
    /// Filter applied when `src` and `dst` differ in size.
    pub filter: FilterMode,
}

impl BlitDescriptor {
    /// A same-size copy of `rect` from `read_attachment`.
    pub fn same_size(rect: Rect, read_attachment: AttachmentPoint, mask: BlitMask) -> Self {
        Self {
            src: rect,
            dst: rect,
            read_attachment,
            mask,
            filter: FilterMode::Nearest,
        }
    }
}
