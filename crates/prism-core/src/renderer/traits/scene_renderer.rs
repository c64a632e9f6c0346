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

//! The render callback the pipeline hands each pass to.

use crate::math::{Mat4, Rect};
use crate::renderer::api::{PassKind, PickKind, PickingRegistry};
use crate::renderer::light::SceneLight;
use crate::renderer::traits::GraphicsDevice;
use std::fmt::Debug;

/// Draws the content of the passes. Implemented by the scene collaborator.
pub trait SceneRenderer {
    /// Draws the pass described by `ctx` into the currently bound draw target.
    ///
    /// Errors are logged with the step identifier and never abort the frame.
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()>;

    /// Returns `false` to skip `pass` entirely. Defaults to `true`.
    fn wants_pass(&self, _pass: PassKind) -> bool {
        true
    }
}

/// A post-process effect owning steps of the pass list.
///
/// Owned steps are rendered by their owner instead of the scene.
pub trait PostProcess: Debug {
    /// A human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Renders one of the owned steps.
    fn render(&self, ctx: &mut PassContext<'_>) -> anyhow::Result<()>;
}

/// Everything a pass callback needs to know about the pass it draws.
pub struct PassContext<'a> {
    /// The kind of pass being drawn.
    pub pass: PassKind,
    /// The name tag of the step, if any.
    pub step_name: Option<&'a str>,
    /// Whether colour targets are floating point.
    pub hdr: bool,
    /// Whether normals and specular attachments are bound.
    pub extended: bool,
    /// The viewport of the pass.
    pub viewport: Rect,
    /// The device to draw with.
    pub device: &'a dyn GraphicsDevice,
    /// The light and level being rendered, during the light pass.
    pub light: Option<LightPassInfo>,
    /// The ID allocator and query, during the picking pass.
    pub picking: Option<PickingPass<'a>>,
}

impl<'a> PassContext<'a> {
    /// A context for `pass` without light or picking data.
    pub fn new(pass: PassKind, viewport: Rect, device: &'a dyn GraphicsDevice) -> Self {
        Self {
            pass,
            step_name: None,
            hdr: false,
            extended: false,
            viewport,
            device,
            light: None,
            picking: None,
        }
    }
}

impl Debug for PassContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassContext")
            .field("pass", &self.pass)
            .field("step_name", &self.step_name)
            .field("hdr", &self.hdr)
            .field("extended", &self.extended)
            .field("viewport", &self.viewport)
            .field("light", &self.light)
            .finish_non_exhaustive()
    }
}

/// The light-pass payload of a [`PassContext`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightPassInfo {
    /// Index of the light in the configured list.
    pub light_index: usize,
    /// The light being rendered.
    pub light: SceneLight,
    /// The cascade level being rendered.
    pub level: u32,
    /// Projection used to render the depth texture.
    pub view_projection: Mat4,
    /// Maps world positions to depth-texture coordinates in `[0, 1]`.
    pub world_to_texture: Mat4,
}

/// The picking-pass payload of a [`PassContext`].
#[derive(Debug)]
pub struct PickingPass<'a> {
    /// Hands out IDs to drawables.
    pub registry: &'a mut PickingRegistry,
    /// The kind of the request.
    pub kind: PickKind,
    /// The requested position, in window coordinates.
    pub position: (i32, i32),
}
