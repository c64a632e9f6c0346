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

//! Spreads shadow depth rendering over several frames.

use super::cascade;
use crate::error::PassError;
use crate::render_lane::{
    invoke_guarded, DeviceStateGuard, Framebuffer, FramebufferPool, FramebufferRequest,
};
use glam::Mat4;
use prism_core::math::Rect;
use prism_core::renderer::{
    GraphicsDevice, LightPassInfo, PassContext, PassKind, RenderState, SceneBounds, SceneLight,
    SceneRenderer, TextureId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Depth buffers and transforms of one light, one entry per cascade level.
#[derive(Debug, Default)]
pub struct LightRenderState {
    /// Depth framebuffer of each level.
    pub levels: Vec<Framebuffer>,
    /// Projection of each level.
    pub view_projection: Vec<Mat4>,
    /// World-to-texture transform of each level.
    pub world_to_texture: Vec<Mat4>,
}

/// What one [`LightBudgetScheduler::run_light_pass`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LightPassOutcome {
    /// (light, level) units rendered.
    pub units_rendered: u32,
    /// Units whose target or callback failed.
    pub units_failed: u32,
    /// Levels completed by this call.
    pub levels_rendered: u32,
    /// Whether levels remain for a later frame.
    pub more_remaining: bool,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

/// Renders the depth buffers of shadow-casting lights level by level, within
/// a time budget per call.
///
/// A single level counter advances for all lights at once. Only spot lights
/// have levels above 0. The counter resets whenever the number of lights,
/// the type of a light or the level configuration changes; once every level
/// is rendered it holds until then.
#[derive(Debug)]
pub struct LightBudgetScheduler {
    lights: Vec<SceneLight>,
    states: Vec<LightRenderState>,
    max_levels: u32,
    texture_size: u32,
    bounds: SceneBounds,
    current_level: u32,
}

impl Default for LightBudgetScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LightBudgetScheduler {
    /// Creates a scheduler with no light.
    pub fn new() -> Self {
        Self {
            lights: Vec::new(),
            states: Vec::new(),
            max_levels: 1,
            texture_size: 1024,
            bounds: SceneBounds::default(),
            current_level: 0,
        }
    }

    /// Replaces the lights and the number of cascade levels.
    ///
    /// Returns `true` if the configuration changed and the counter was reset.
    /// Depth buffers of removed lights or levels are deleted.
    pub fn configure(
        &mut self,
        pool: &mut FramebufferPool,
        lights: &[SceneLight],
        max_levels: u32,
    ) -> bool {
        let changed = max_levels != self.max_levels
            || lights.len() != self.lights.len()
            || lights.iter().zip(&self.lights).any(|(new, old)| {
                new.kind() != old.kind() || new.casts_shadows != old.casts_shadows
            });
        self.lights = lights.to_vec();
        self.max_levels = max_levels;

        if changed {
            while self.states.len() > lights.len() {
                if let Some(mut state) = self.states.pop() {
                    for fb in state.levels.iter_mut() {
                        pool.delete_buffer(fb);
                    }
                }
            }
            self.states.resize_with(lights.len(), LightRenderState::default);
            for (state, light) in self.states.iter_mut().zip(&self.lights) {
                let levels = if light.casts_shadows {
                    light.kind().levels(max_levels) as usize
                } else {
                    0
                };
                while state.levels.len() > levels {
                    if let Some(mut fb) = state.levels.pop() {
                        pool.delete_buffer(&mut fb);
                    }
                }
                state.levels.resize_with(levels, Framebuffer::default);
            }
            log::debug!(
                "Light configuration changed: {} lights, {} levels",
                self.lights.len(),
                max_levels
            );
            self.reset();
        }
        self.update_transforms();
        changed
    }

    /// Changes the number of cascade levels, keeping the lights.
    pub fn set_max_levels(&mut self, pool: &mut FramebufferPool, max_levels: u32) -> bool {
        if max_levels == self.max_levels {
            return false;
        }
        let lights = self.lights.clone();
        self.configure(pool, &lights, max_levels)
    }

    /// Changes the edge length of the depth textures. Buffers are reallocated
    /// on the next pass.
    pub fn set_texture_size(&mut self, size: u32) {
        if size != self.texture_size {
            self.texture_size = size;
            self.reset();
        }
    }

    /// Sets the bounds directional shadows are fitted to.
    pub fn set_scene_bounds(&mut self, bounds: SceneBounds) {
        if bounds != self.bounds {
            self.bounds = bounds;
            self.update_transforms();
            self.reset();
        }
    }

    fn update_transforms(&mut self) {
        for (state, light) in self.states.iter_mut().zip(&self.lights) {
            let levels = state.levels.len() as u32;
            state.view_projection = (0..levels)
                .map(|level| cascade::light_view_projection(light, level, levels, &self.bounds))
                .collect();
            state.world_to_texture = state
                .view_projection
                .iter()
                .map(|vp| cascade::world_to_texture(*vp))
                .collect();
        }
    }

    /// Restarts rendering at level 0.
    pub fn reset(&mut self) {
        if self.current_level != 0 {
            log::debug!("Light level counter reset from {}", self.current_level);
        }
        self.current_level = 0;
    }

    /// The configured lights.
    pub fn lights(&self) -> &[SceneLight] {
        &self.lights
    }

    /// The configured number of cascade levels.
    pub fn max_levels(&self) -> u32 {
        self.max_levels
    }

    /// The edge length of the depth textures.
    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    /// The number of levels rendered so far. Never exceeds [`total_levels`](Self::total_levels).
    pub fn rendered_levels(&self) -> u32 {
        self.current_level
    }

    /// The number of levels needed by the current lights.
    pub fn total_levels(&self) -> u32 {
        self.states
            .iter()
            .map(|state| state.levels.len() as u32)
            .max()
            .unwrap_or(0)
    }

    /// Returns `true` when every level is rendered.
    pub fn is_complete(&self) -> bool {
        self.current_level >= self.total_levels()
    }

    /// Per-light depth buffers and transforms.
    pub fn states(&self) -> &[LightRenderState] {
        &self.states
    }

    /// The world-to-texture transform of `level` of light `light`.
    pub fn world_to_texture(&self, light: usize, level: u32) -> Option<Mat4> {
        self.states
            .get(light)?
            .world_to_texture
            .get(level as usize)
            .copied()
    }

    /// The depth texture of `level` of light `light`, once rendered.
    pub fn depth_texture(&self, light: usize, level: u32) -> Option<TextureId> {
        self.states.get(light)?.levels.get(level as usize)?.depth
    }

    /// Renders whole levels from the current one until `budget` is spent or
    /// every level is done.
    ///
    /// The budget is checked between levels, so at least one level is
    /// rendered per call and no level is ever left half done.
    pub fn run_light_pass(
        &mut self,
        pool: &mut FramebufferPool,
        scene: &mut dyn SceneRenderer,
        budget: Duration,
    ) -> LightPassOutcome {
        let start = Instant::now();
        let total = self.total_levels();
        let mut outcome = LightPassOutcome::default();
        if self.current_level >= total || !scene.wants_pass(PassKind::Light) {
            return outcome;
        }

        let device = Arc::clone(pool.device());
        let _restore = DeviceStateGuard::new(device.as_ref());
        while self.current_level < total {
            let level = self.current_level;
            for index in 0..self.states.len() {
                if level as usize >= self.states[index].levels.len() {
                    continue;
                }
                match self.render_unit(pool, device.as_ref(), scene, index, level) {
                    Ok(()) => outcome.units_rendered += 1,
                    Err(err) => {
                        outcome.units_failed += 1;
                        log::error!("Light {index} level {level} failed: {err}");
                    }
                }
            }
            self.current_level += 1;
            outcome.levels_rendered += 1;
            if start.elapsed() >= budget {
                break;
            }
        }

        outcome.elapsed = start.elapsed();
        outcome.more_remaining = self.current_level < total;
        log::debug!(
            "Light pass rendered {} units over {} levels in {:?} ({}/{total} levels done)",
            outcome.units_rendered,
            outcome.levels_rendered,
            outcome.elapsed,
            self.current_level
        );
        outcome
    }

    fn render_unit(
        &mut self,
        pool: &mut FramebufferPool,
        device: &dyn GraphicsDevice,
        scene: &mut dyn SceneRenderer,
        index: usize,
        level: u32,
    ) -> Result<(), PassError> {
        let size = self.texture_size;
        let request = FramebufferRequest::new(size, size).color(false).clear(true);
        let state = &mut self.states[index];
        if !pool.prepare(&mut state.levels[level as usize], &request) {
            return Err(PassError::LightTargetUnavailable {
                light: index,
                level,
            });
        }
        device.set_render_state(&RenderState::OPAQUE);

        let info = LightPassInfo {
            light_index: index,
            light: self.lights[index],
            level,
            view_projection: state.view_projection[level as usize],
            world_to_texture: state.world_to_texture[level as usize],
        };
        let mut ctx = PassContext {
            light: Some(info),
            ..PassContext::new(PassKind::Light, Rect::new(0, 0, size, size), device)
        };
        invoke_guarded(|| scene.render(&mut ctx))
    }

    /// Forgets every depth buffer without device calls.
    pub fn invalidate(&mut self, pool: &FramebufferPool) {
        for state in self.states.iter_mut() {
            for fb in state.levels.iter_mut() {
                pool.invalidate(fb);
            }
        }
        self.reset();
    }

    /// Destroys every depth buffer.
    pub fn release(&mut self, pool: &mut FramebufferPool) {
        for state in self.states.iter_mut() {
            for fb in state.levels.iter_mut() {
                pool.delete_buffer(fb);
            }
        }
        self.reset();
    }
}
