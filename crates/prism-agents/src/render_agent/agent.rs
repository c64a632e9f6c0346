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

//! Defines the RenderAgent, the entry point of the frame pipeline.

use super::capture::CapturedImage;
use super::guard::ReentrancyGuard;
use prism_core::math::Rect;
use prism_core::renderer::{
    AttachmentPoint, FramebufferBinding, FramebufferError, GraphicsDevice, PickKind, PickResult,
    PixelFormat, PostProcess, RenderError, RenderPassStep, RenderSettings, ResourceError,
    SceneBounds, SceneLight, SceneRenderer, StepKind,
};
use prism_lanes::render_lane::DeviceStateGuard;
use prism_lanes::{Framebuffer, FrameReport, FramebufferRequest, PickingEngine, RenderPassSequencer};
use std::cell::{Ref, RefCell, RefMut};
use std::sync::Arc;

/// Everything the agent keeps across frames.
#[derive(Debug)]
struct AgentState {
    settings: RenderSettings,
    sequencer: RenderPassSequencer,
    picking: PickingEngine,
    // Target of render_to_image, kept between captures.
    capture: Framebuffer,
    initialized: bool,
    frame_count: u64,
    // Device errors drained after the last paint, pick or capture.
    device_errors: Vec<String>,
}

/// Drives the frame pipeline on behalf of the embedding application.
///
/// The agent maps the lifecycle of a GPU context onto the lanes:
/// [`initialize`](Self::initialize) once the context exists,
/// [`resize`](Self::resize) on every surface change, [`paint`](Self::paint)
/// per frame, and [`invalidate_buffers`](Self::invalidate_buffers) before the
/// context goes away. It must stay on the thread owning the context; nested
/// calls from scene callbacks are rejected with [`RenderError::Reentrant`].
pub struct RenderAgent {
    device: Arc<dyn GraphicsDevice>,
    guard: ReentrancyGuard,
    state: RefCell<AgentState>,
}

impl std::fmt::Debug for RenderAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderAgent")
            .field("backend", &self.device.backend_name())
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl RenderAgent {
    /// Creates an agent rendering on `device` with `settings`.
    ///
    /// Nothing is allocated before [`initialize`](Self::initialize).
    pub fn new(device: Arc<dyn GraphicsDevice>, settings: RenderSettings) -> Self {
        let mut sequencer = RenderPassSequencer::new(Arc::clone(&device));
        sequencer.configure(&settings);
        Self {
            device,
            guard: ReentrancyGuard::new(),
            state: RefCell::new(AgentState {
                settings,
                sequencer,
                picking: PickingEngine::new(),
                capture: Framebuffer::default(),
                initialized: false,
                frame_count: 0,
                device_errors: Vec::new(),
            }),
        }
    }

    // Queries made from a render callback find the state borrowed.
    fn state_ref(&self) -> Result<Ref<'_, AgentState>, RenderError> {
        self.state.try_borrow().map_err(|_| RenderError::Reentrant)
    }

    fn state_mut(&self) -> Result<RefMut<'_, AgentState>, RenderError> {
        self.state
            .try_borrow_mut()
            .map_err(|_| RenderError::Reentrant)
    }

    fn initialized_state(&self) -> Result<RefMut<'_, AgentState>, RenderError> {
        let state = self.state_mut()?;
        if !state.initialized {
            return Err(RenderError::NotInitialized);
        }
        Ok(state)
    }

    fn drain_device_errors(&self, state: &mut AgentState) {
        state.device_errors = self.device.take_errors();
        for err in &state.device_errors {
            log::error!("Graphics device error: {err}");
        }
    }

    /// The device the agent renders with.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Called once a valid context exists. Picks up the current surface
    /// viewport and schedules a full frame.
    pub fn initialize(&self) -> Result<(), RenderError> {
        let mut state = self.state_mut()?;
        let capabilities = self.device.capabilities();
        log::info!(
            "RenderAgent: initializing on '{}' ({capabilities:?})",
            self.device.backend_name()
        );
        if state.sequencer.viewport().area() == 0 {
            state.sequencer.set_viewport(self.device.viewport());
        }
        state.sequencer.request_reset();
        state.initialized = true;
        Ok(())
    }

    /// Adapts the pipeline to a new surface size.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), RenderError> {
        let mut state = self.state_mut()?;
        log::debug!("RenderAgent: resized to {width}x{height}");
        let viewport = Rect::new(0, 0, width, height);
        state.sequencer.set_viewport(viewport);
        self.device.set_viewport(viewport);
        Ok(())
    }

    /// Forgets every buffer without touching the device.
    ///
    /// Must be called before the context is destroyed or swapped; the next
    /// paint reallocates everything.
    pub fn invalidate_buffers(&self) -> Result<(), RenderError> {
        let mut state = self.state_mut()?;
        let state = &mut *state;
        log::info!("RenderAgent: invalidating buffers");
        state.picking.invalidate(&state.sequencer);
        state.sequencer.pool().invalidate(&mut state.capture);
        state.sequencer.invalidate();
        Ok(())
    }

    /// Destroys every buffer while the context is still alive.
    pub fn release(&self) -> Result<(), RenderError> {
        let _scope = self.guard.enter()?;
        let mut state = self.state_mut()?;
        let state = &mut *state;
        log::info!(
            "RenderAgent: releasing buffers after {} frames",
            state.frame_count
        );
        state.picking.release(&mut state.sequencer);
        state.sequencer.pool_mut().delete_buffer(&mut state.capture);
        state.sequencer.release();
        state.initialized = false;
        Ok(())
    }

    /// Renders one frame into the window.
    pub fn paint(&self, scene: &mut dyn SceneRenderer) -> Result<FrameReport, RenderError> {
        let _scope = self.guard.enter()?;
        let mut state = self.initialized_state()?;
        let state = &mut *state;

        let pool = state.sequencer.pool_mut();
        pool.begin_frame();
        let report = state.sequencer.run_frame(scene);
        state.sequencer.pool_mut().end_frame();

        state.frame_count += 1;
        self.drain_device_errors(state);
        if !report.failures.is_empty() {
            log::warn!(
                "Frame {} completed with {} failed steps",
                state.frame_count,
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Returns the drawable under `position` (window coordinates, origin
    /// top-left), or `None` if nothing was hit.
    pub fn perform_pick(
        &self,
        scene: &mut dyn SceneRenderer,
        kind: PickKind,
        position: (i32, i32),
    ) -> Result<Option<PickResult>, RenderError> {
        let _scope = self.guard.enter()?;
        let mut state = self.initialized_state()?;
        let state = &mut *state;

        let viewport = state.sequencer.viewport();
        let local = (position.0 - viewport.x, position.1 - viewport.y);
        state.sequencer.pool_mut().begin_frame();
        let result = state
            .picking
            .perform_pick(&mut state.sequencer, scene, kind, local);
        state.sequencer.pool_mut().end_frame();
        self.drain_device_errors(state);
        Ok(result)
    }

    /// Renders a full frame off-screen and reads it back.
    ///
    /// Rows come back bottom-up; `flip` returns them top-down. The window
    /// viewport and output are restored afterwards and the next paint redraws
    /// everything.
    pub fn render_to_image(
        &self,
        scene: &mut dyn SceneRenderer,
        width: u32,
        height: u32,
        format: PixelFormat,
        flip: bool,
    ) -> Result<CapturedImage, RenderError> {
        let _scope = self.guard.enter()?;
        let mut state = self.initialized_state()?;
        let state = &mut *state;

        let max = self.device.capabilities().max_texture_size;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::InvalidSize { width, height });
        }

        let _restore = DeviceStateGuard::new(self.device.as_ref());
        let request = FramebufferRequest::new(width, height)
            .hdr(format.is_hdr())
            .clear(true);
        let prepared = state
            .sequencer
            .pool_mut()
            .prepare(&mut state.capture, &request);
        let frame = state.capture.frame.ok_or(ResourceError::InvalidHandle)?;
        if !prepared {
            let status = self.device.check_framebuffer_status(frame);
            return Err(FramebufferError::Incomplete { id: frame, status }.into());
        }

        let previous_viewport = state.sequencer.viewport();
        let previous_output = state.sequencer.output();
        state.sequencer.set_viewport(Rect::new(0, 0, width, height));
        state.sequencer.set_output(Some(frame));
        state.sequencer.request_reset();

        state.sequencer.pool_mut().begin_frame();
        let report = state.sequencer.run_frame(scene);
        state.sequencer.pool_mut().end_frame();
        if !report.failures.is_empty() {
            log::warn!(
                "Capture completed with {} failed steps",
                report.failures.len()
            );
        }

        let pixels = self
            .device
            .bind_framebuffer(FramebufferBinding::Read, Some(frame))
            .and_then(|()| {
                self.device.read_pixels(
                    Rect::new(0, 0, width, height),
                    AttachmentPoint::COLOR0,
                    format,
                )
            });

        state.sequencer.set_output(previous_output);
        state.sequencer.set_viewport(previous_viewport);
        state.sequencer.request_reset();
        self.drain_device_errors(state);

        let mut image = CapturedImage {
            width,
            height,
            format,
            pixels: pixels?,
        };
        if flip {
            image.flip_vertically();
        }
        log::debug!("Captured {width}x{height} {format:?} image");
        Ok(image)
    }

    /// Replaces the shadow-casting lights.
    pub fn set_lights(&self, lights: &[SceneLight]) -> Result<(), RenderError> {
        self.state_mut()?.sequencer.set_lights(lights);
        Ok(())
    }

    /// Sets the bounds directional shadows are fitted to.
    pub fn set_scene_bounds(&self, bounds: SceneBounds) -> Result<(), RenderError> {
        self.state_mut()?.sequencer.set_scene_bounds(bounds);
        Ok(())
    }

    /// Applies new settings. The next paint redraws everything.
    pub fn configure(&self, settings: RenderSettings) -> Result<(), RenderError> {
        let mut state = self.state_mut()?;
        state.sequencer.configure(&settings);
        state.settings = settings;
        Ok(())
    }

    /// The settings last applied.
    pub fn settings(&self) -> Result<RenderSettings, RenderError> {
        Ok(self.state_ref()?.settings.clone())
    }

    /// Inserts the steps of a post-process effect before the first step of
    /// kind `before` (at the end if there is none).
    pub fn add_post_process(
        &self,
        effect: Arc<dyn PostProcess>,
        before: StepKind,
        steps: &[StepKind],
    ) -> Result<(), RenderError> {
        let mut state = self.state_mut()?;
        let sequencer = &mut state.sequencer;
        let mut index = sequencer
            .step_index_of(before)
            .unwrap_or(sequencer.steps().len());
        for kind in steps {
            sequencer.insert_step(
                index,
                RenderPassStep::new(*kind)
                    .named(effect.name())
                    .owned_by(Arc::clone(&effect)),
            );
            index += 1;
        }
        log::info!(
            "Post-process '{}' added with {} steps",
            effect.name(),
            steps.len()
        );
        Ok(())
    }

    /// Removes every step of `effect` and returns how many were removed.
    pub fn remove_post_process(&self, effect: &Arc<dyn PostProcess>) -> Result<usize, RenderError> {
        Ok(self.state_mut()?.sequencer.remove_steps_owned_by(effect))
    }

    /// Returns `true` if a frame or a light-pass continuation is pending.
    ///
    /// Reports `true` while a paint is running.
    pub fn needs_redraw(&self) -> bool {
        self.state
            .try_borrow()
            .map(|state| state.sequencer.needs_redraw())
            .unwrap_or(true)
    }

    /// The number of cascade levels already rendered by the light pass.
    pub fn rendered_light_levels(&self) -> Result<u32, RenderError> {
        Ok(self.state_ref()?.sequencer.lights().rendered_levels())
    }

    /// The current window viewport.
    pub fn viewport(&self) -> Result<Rect, RenderError> {
        Ok(self.state_ref()?.sequencer.viewport())
    }

    /// The number of frames painted so far.
    pub fn frame_count(&self) -> Result<u64, RenderError> {
        Ok(self.state_ref()?.frame_count)
    }

    /// The device errors drained after the last paint, pick or capture.
    pub fn last_device_errors(&self) -> Result<Vec<String>, RenderError> {
        Ok(self.state_ref()?.device_errors.clone())
    }

    /// Returns `true` between [`initialize`](Self::initialize) and [`release`](Self::release).
    pub fn is_initialized(&self) -> Result<bool, RenderError> {
        Ok(self.state_ref()?.initialized)
    }
}
