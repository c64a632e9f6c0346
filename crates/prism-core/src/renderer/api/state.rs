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

//! Fixed-function state applied before a pass hands control to the scene.

use crate::math::Rect;
use bitflags::bitflags;

/// How fragment colours are combined with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// The fragment replaces the target.
    #[default]
    Opaque,
    /// Standard `src * a + dst * (1 - a)` blending.
    Alpha,
    /// `src * a + dst`.
    Additive,
}

/// Depth, blending and scissor state for subsequent draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderState {
    /// Whether fragments are tested against the depth buffer.
    pub depth_test: bool,
    /// Whether passing fragments write their depth.
    pub depth_write: bool,
    /// The blend mode.
    pub blend: BlendMode,
    /// If set, draws are restricted to this rectangle.
    pub scissor: Option<Rect>,
}

impl RenderState {
    /// Depth-tested, depth-writing, opaque geometry.
    pub const OPAQUE: RenderState = RenderState {
        depth_test: true,
        depth_write: true,
        blend: BlendMode::Opaque,
        scissor: None,
    };

    /// Depth-tested, non-writing, alpha-blended geometry.
    pub const TRANSPARENT: RenderState = RenderState {
        depth_test: true,
        depth_write: false,
        blend: BlendMode::Alpha,
        scissor: None,
    };

    /// No depth, alpha-blended overlays.
    pub const OVERLAY: RenderState = RenderState {
        depth_test: false,
        depth_write: false,
        blend: BlendMode::Alpha,
        scissor: None,
    };

    /// No depth, no blending.
    pub const BACKGROUND: RenderState = RenderState {
        depth_test: false,
        depth_write: false,
        blend: BlendMode::Opaque,
        scissor: None,
    };

    /// Returns a copy restricted to `rect`.
    pub fn with_scissor(mut self, rect: Rect) -> Self {
        self.scissor = Some(rect);
        self
    }
}

bitflags! {
    /// Which buffers a clear affects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Clear every active colour draw buffer.
        const COLOR = 1 << 0;
        /// Clear the depth attachment.
        const DEPTH = 1 << 1;
    }
}
