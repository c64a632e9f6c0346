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

//! Drives the ordered list of steps a frame is made of.
//!
//! The sequencer walks the configured [`RenderPassStep`]s, ping-pongs between
//! the six intermediate buffers and hands content passes to the scene. When a
//! resume stage is pending, the steps before it only replay their read/draw
//! bookkeeping so the frame picks up where the buffers are still valid.

use super::framebuffer::{Framebuffer, FramebufferRequest};
use super::framebuffer_pool::FramebufferPool;
use super::invoke::invoke_guarded;
use crate::error::PassError;
use crate::shadow_lane::{LightBudgetScheduler, LightPassOutcome};
use prism_core::math::Rect;
use prism_core::renderer::{
    BufferSlot, FramebufferBinding, FramebufferId, GraphicsDevice, PassContext, PassKind,
    PickingPass, PostProcess, RenderPassStep, RenderSettings, RenderState, SceneBounds,
    SceneLight, SceneRenderer, StepKind,
};
use std::sync::Arc;
use std::time::Duration;

/// Where draws of the current step go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    /// One of the intermediate buffers.
    Slot(BufferSlot),
    /// The output: the window, or the capture buffer during render-to-image.
    Output,
}

/// A step that failed during a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Index of the step in the list.
    pub index: usize,
    /// Display form of the step.
    pub step: String,
    /// The error message.
    pub message: String,
}

/// What happened during one [`RenderPassSequencer::run_frame`].
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// The stage execution started at.
    pub start_stage: usize,
    /// Steps that only replayed their bookkeeping.
    pub skipped: usize,
    /// Steps that ran successfully.
    pub executed: usize,
    /// Steps that failed and were skipped.
    pub failures: Vec<StepFailure>,
    /// The result of the light pass, if it ran.
    pub light_pass: Option<LightPassOutcome>,
    /// Whether the light pass asked for another frame.
    pub more_lights_requested: bool,
}

/// Holds the ordered step list and drives the per-frame pipeline.
#[derive(Debug)]
pub struct RenderPassSequencer {
    pool: FramebufferPool,
    lights: LightBudgetScheduler,
    slots: [Framebuffer; BufferSlot::COUNT],
    steps: Vec<RenderPassStep>,
    pending: Option<usize>,
    current_read: Option<BufferSlot>,
    current_draw: DrawTarget,
    output: Option<FramebufferId>,
    viewport: Rect,
    hdr: bool,
    extended: bool,
    max_light_levels: u32,
    light_budget: Duration,
}

impl RenderPassSequencer {
    /// Creates a sequencer running the default pipeline on `device`.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        let settings = RenderSettings::default();
        let mut sequencer = Self {
            pool: FramebufferPool::new(device),
            lights: LightBudgetScheduler::new(),
            slots: Default::default(),
            steps: RenderPassStep::default_pipeline(),
            pending: None,
            current_read: None,
            current_draw: DrawTarget::Output,
            output: None,
            viewport: Rect::default(),
            hdr: false,
            extended: false,
            max_light_levels: settings.max_light_levels,
            light_budget: Duration::ZERO,
        };
        sequencer.configure(&settings);
        sequencer
    }

    /// Applies `settings` and schedules a full frame.
    pub fn configure(&mut self, settings: &RenderSettings) {
        self.pool.set_max_samples(settings.samples);
        self.pool.set_clear_color(settings.clear_color);
        self.hdr = settings.hdr;
        self.extended = settings.extended;
        self.light_budget = Duration::from_secs_f64(settings.light_budget_ms.max(0.0) / 1000.0);
        self.max_light_levels = settings.max_light_levels;
        self.lights.set_texture_size(settings.light_texture_size);
        self.lights
            .set_max_levels(&mut self.pool, settings.max_light_levels);
        self.set_steps(
            settings
                .passes
                .iter()
                .copied()
                .map(RenderPassStep::new)
                .collect(),
        );
    }

    /// The pool allocating every buffer of the pipeline.
    pub fn pool(&self) -> &FramebufferPool {
        &self.pool
    }

    /// Mutable access to the pool, for targets owned outside the sequencer.
    pub fn pool_mut(&mut self) -> &mut FramebufferPool {
        &mut self.pool
    }

    /// The device of the pool.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        self.pool.device()
    }

    /// The light-pass scheduler.
    pub fn lights(&self) -> &LightBudgetScheduler {
        &self.lights
    }

    /// Replaces the shadow-casting lights. A change of count, type or level
    /// configuration restarts the light pass at level 0.
    pub fn set_lights(&mut self, lights: &[SceneLight]) {
        if self
            .lights
            .configure(&mut self.pool, lights, self.max_light_levels)
        {
            self.request_more_lights();
        }
    }

    /// Sets the bounds directional shadows are fitted to.
    pub fn set_scene_bounds(&mut self, bounds: SceneBounds) {
        self.lights.set_scene_bounds(bounds);
    }

    /// Returns one of the intermediate buffers.
    pub fn slot(&self, slot: BufferSlot) -> &Framebuffer {
        &self.slots[slot.index()]
    }

    /// The configured steps.
    pub fn steps(&self) -> &[RenderPassStep] {
        &self.steps
    }

    /// Replaces the step list and schedules a full frame.
    pub fn set_steps(&mut self, steps: Vec<RenderPassStep>) {
        self.steps = steps;
        self.request_reset();
    }

    /// Inserts `step` at `index` (clamped to the list length).
    pub fn insert_step(&mut self, index: usize, step: RenderPassStep) {
        let index = index.min(self.steps.len());
        log::debug!("Inserting step {step} at #{index}");
        self.steps.insert(index, step);
        self.request_reset();
    }

    /// Removes every step inserted by `owner` and returns how many were removed.
    pub fn remove_steps_owned_by(&mut self, owner: &Arc<dyn PostProcess>) -> usize {
        let before = self.steps.len();
        self.steps.retain(|step| !step.is_owned_by(owner));
        let removed = before - self.steps.len();
        if removed > 0 {
            log::debug!("Removed {removed} steps owned by '{}'", owner.name());
            self.request_reset();
        }
        removed
    }

    /// Index of the first step of kind `kind`.
    pub fn step_index_of(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().position(|step| step.kind == kind)
    }

    /// Sets the output viewport. A change schedules a full frame.
    pub fn set_viewport(&mut self, viewport: Rect) {
        if viewport != self.viewport {
            self.viewport = viewport;
            self.request_reset();
        }
    }

    /// The output viewport.
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Sets whether intermediate buffers are floating point.
    pub fn set_hdr(&mut self, hdr: bool) {
        if hdr != self.hdr {
            self.hdr = hdr;
            self.request_reset();
        }
    }

    /// Whether intermediate buffers are floating point.
    pub fn hdr(&self) -> bool {
        self.hdr
    }

    /// Sets whether intermediate buffers carry normals and specular.
    pub fn set_extended(&mut self, extended: bool) {
        if extended != self.extended {
            self.extended = extended;
            self.request_reset();
        }
    }

    /// Whether intermediate buffers carry normals and specular.
    pub fn extended(&self) -> bool {
        self.extended
    }

    /// Redirects the output; `None` is the window.
    pub fn set_output(&mut self, output: Option<FramebufferId>) {
        self.output = output;
    }

    /// The output framebuffer; `None` is the window.
    pub fn output(&self) -> Option<FramebufferId> {
        self.output
    }

    /// Asks the next frame to resume at `stage`. Merged with any pending
    /// request by keeping the earliest stage.
    pub fn request_resume(&mut self, stage: usize) {
        let merged = self.pending.map_or(stage, |pending| pending.min(stage));
        log::trace!("Resume requested at stage {stage}, pending {merged}");
        self.pending = Some(merged);
    }

    /// Asks the next frame to run every step.
    pub fn request_reset(&mut self) {
        self.request_resume(0);
    }

    /// Asks the next frame to resume at the light pass.
    pub fn request_more_lights(&mut self) {
        if let Some(stage) = self.step_index_of(StepKind::LightPass) {
            self.request_resume(stage);
        }
    }

    /// The stage the next frame resumes at, if any request is pending.
    pub fn pending_stage(&self) -> Option<usize> {
        self.pending
    }

    /// Returns `true` if a request is pending.
    pub fn needs_redraw(&self) -> bool {
        self.pending.is_some()
    }

    /// The buffer last demoted to read.
    pub fn current_read(&self) -> Option<BufferSlot> {
        self.current_read
    }

    /// The current draw target.
    pub fn current_draw(&self) -> DrawTarget {
        self.current_draw
    }

    /// Runs one frame.
    ///
    /// Steps before the pending resume stage only replay their bookkeeping;
    /// without a pending request the whole list runs. Failing steps are
    /// logged and skipped.
    pub fn run_frame(&mut self, scene: &mut dyn SceneRenderer) -> FrameReport {
        let start = self.pending.take().unwrap_or(0).min(self.steps.len());
        self.current_read = None;
        self.current_draw = DrawTarget::Output;

        let mut report = FrameReport {
            start_stage: start,
            ..Default::default()
        };
        let steps = self.steps.clone();
        for (index, step) in steps.iter().enumerate() {
            if index < start {
                if let Err(err) = self.apply_bookkeeping(step.kind) {
                    log::warn!("Skipped step #{index} ({step}): {err}");
                }
                report.skipped += 1;
                continue;
            }

            log::trace!("Executing step #{index} ({step})");
            match self.execute_step(step, scene, &mut report) {
                Ok(()) => report.executed += 1,
                Err(err) => {
                    log::error!("Render step #{index} ({step}) failed: {err}");
                    report.failures.push(StepFailure {
                        index,
                        step: step.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Runs the content pass `kind` alone, into whatever the caller bound.
    ///
    /// Used by picking: the caller binds its own target and viewport. The
    /// name and owner of the first matching configured step are used.
    pub fn run_single_pass(
        &mut self,
        kind: StepKind,
        scene: &mut dyn SceneRenderer,
        picking: Option<PickingPass<'_>>,
    ) -> Result<(), PassError> {
        let Some(pass) = kind.pass_kind() else {
            log::warn!("{kind} is not a content pass");
            return Ok(());
        };
        let step = self
            .steps
            .iter()
            .find(|step| step.kind == kind)
            .cloned()
            .unwrap_or_else(|| RenderPassStep::new(kind));
        if step.owner.is_none() && !scene.wants_pass(pass) {
            return Ok(());
        }

        let device = Arc::clone(self.pool.device());
        let viewport = device.viewport();
        device.set_render_state(&render_state_for(pass, viewport));
        let mut ctx = PassContext {
            pass,
            step_name: step.name.as_deref(),
            hdr: false,
            extended: false,
            viewport,
            device: device.as_ref(),
            light: None,
            picking,
        };
        call_renderer(&step, scene, &mut ctx)
    }

    fn apply_bookkeeping(&mut self, kind: StepKind) -> Result<(), PassError> {
        match kind {
            StepKind::PrepareDrawTarget => {
                self.current_read = Some(BufferSlot::Main);
                self.current_draw = DrawTarget::Slot(BufferSlot::Main);
            }
            StepKind::SwapToBuffer { slot, .. } => {
                let read = self.demoted_read();
                if read == Some(slot) {
                    return Err(PassError::AliasedSwap { slot });
                }
                self.current_read = read;
                self.current_draw = DrawTarget::Slot(slot);
            }
            StepKind::FinishDrawTarget => {
                self.current_read = self.demoted_read();
                self.current_draw = DrawTarget::Output;
            }
            _ => {}
        }
        Ok(())
    }

    fn demoted_read(&self) -> Option<BufferSlot> {
        match self.current_draw {
            DrawTarget::Slot(slot) => Some(slot),
            DrawTarget::Output => self.current_read,
        }
    }

    fn execute_step(
        &mut self,
        step: &RenderPassStep,
        scene: &mut dyn SceneRenderer,
        report: &mut FrameReport,
    ) -> Result<(), PassError> {
        match step.kind {
            StepKind::LightPass => {
                let outcome = self
                    .lights
                    .run_light_pass(&mut self.pool, scene, self.light_budget);
                if outcome.more_remaining {
                    self.request_more_lights();
                    report.more_lights_requested = true;
                }
                report.light_pass = Some(outcome);
                Ok(())
            }
            StepKind::PrepareDrawTarget => self.prepare_draw_target(),
            StepKind::SwapToBuffer { slot, clear } => self.swap_to_buffer(slot, clear),
            StepKind::BlitFromBuffer { slot } => self.blit_from_buffer(slot),
            StepKind::FinishDrawTarget => self.finish_draw_target(),
            StepKind::Picking => {
                log::trace!("Picking steps only run on pick requests");
                Ok(())
            }
            StepKind::PreRender
            | StepKind::Background
            | StepKind::Normal
            | StepKind::Transparency
            | StepKind::Text
            | StepKind::Gui
            | StepKind::Custom(_) => match step.kind.pass_kind() {
                Some(pass) => self.render_step(step, pass, scene),
                None => Ok(()),
            },
        }
    }

    fn slot_request(&self, slot: BufferSlot, clear: bool) -> FramebufferRequest {
        FramebufferRequest::new(self.viewport.width, self.viewport.height)
            .multisample(slot.is_multisampled())
            .hdr(self.hdr)
            .extended(self.extended)
            .clear(clear)
    }

    fn prepare_draw_target(&mut self) -> Result<(), PassError> {
        self.apply_bookkeeping(StepKind::PrepareDrawTarget)?;
        let request = self.slot_request(BufferSlot::Main, true);
        if !self
            .pool
            .prepare(&mut self.slots[BufferSlot::Main.index()], &request)
        {
            return Err(PassError::TargetUnavailable {
                slot: BufferSlot::Main,
            });
        }
        Ok(())
    }

    fn swap_to_buffer(&mut self, slot: BufferSlot, clear: bool) -> Result<(), PassError> {
        let previous = self.current_draw;
        self.apply_bookkeeping(StepKind::SwapToBuffer { slot, clear })?;
        if let DrawTarget::Slot(previous) = previous {
            self.pool
                .resolve_multisample(&self.slots[previous.index()])?;
        }

        let request = self.slot_request(slot, clear);
        if !self.pool.prepare(&mut self.slots[slot.index()], &request) {
            return Err(PassError::TargetUnavailable { slot });
        }
        if !clear {
            self.pool.bind_draw(&self.slots[slot.index()])?;
        }
        Ok(())
    }

    fn blit_from_buffer(&mut self, slot: BufferSlot) -> Result<(), PassError> {
        let target = self.draw_framebuffer()?;
        self.device()
            .bind_framebuffer(FramebufferBinding::Draw, target)?;
        self.copy_into_draw_target(slot)
    }

    fn finish_draw_target(&mut self) -> Result<(), PassError> {
        let previous = self.current_draw;
        self.apply_bookkeeping(StepKind::FinishDrawTarget)?;
        let DrawTarget::Slot(slot) = previous else {
            return Ok(());
        };
        self.pool.resolve_multisample(&self.slots[slot.index()])?;
        self.device()
            .bind_framebuffer(FramebufferBinding::Draw, self.output)?;
        self.copy_into_draw_target(slot)
    }

    /// Copies the colour image of `slot` into the bound draw framebuffer,
    /// covering the viewport of the current draw target.
    #[cfg(not(feature = "shader-blit"))]
    fn copy_into_draw_target(&self, slot: BufferSlot) -> Result<(), PassError> {
        use prism_core::renderer::{AttachmentPoint, BlitDescriptor, BlitMask, FilterMode};

        let source = &self.slots[slot.index()];
        let frame = source.frame.ok_or(PassError::EmptySource { slot })?;
        if source.color.is_none() {
            return Err(PassError::EmptySource { slot });
        }
        let src = Rect::new(0, 0, source.width, source.height);
        let dst = self.target_viewport();
        let filter = if src.extent() == dst.extent() {
            FilterMode::Nearest
        } else {
            FilterMode::Linear
        };

        let device = self.device();
        device.bind_framebuffer(FramebufferBinding::Read, Some(frame))?;
        device.set_viewport(dst);
        device.blit_framebuffer(&BlitDescriptor {
            src,
            dst,
            read_attachment: AttachmentPoint::COLOR0,
            mask: BlitMask::COLOR,
            filter,
        })?;
        Ok(())
    }

    /// Copies the colour image of `slot` into the bound draw framebuffer
    /// with a full-screen textured draw over the viewport.
    #[cfg(feature = "shader-blit")]
    fn copy_into_draw_target(&self, slot: BufferSlot) -> Result<(), PassError> {
        let source = &self.slots[slot.index()];
        let texture = source.color.ok_or(PassError::EmptySource { slot })?;

        let device = self.device();
        device.set_viewport(self.target_viewport());
        device.set_render_state(&RenderState::BACKGROUND);
        device.draw_fullscreen_texture(texture)?;
        Ok(())
    }

    /// The frame object of the current draw target; `None` is the window.
    fn draw_framebuffer(&self) -> Result<Option<FramebufferId>, PassError> {
        match self.current_draw {
            DrawTarget::Slot(slot) => self.slots[slot.index()]
                .draw_target()
                .map(Some)
                .ok_or(PassError::TargetUnavailable { slot }),
            DrawTarget::Output => Ok(self.output),
        }
    }

    fn target_viewport(&self) -> Rect {
        match self.current_draw {
            DrawTarget::Slot(_) => Rect::new(0, 0, self.viewport.width, self.viewport.height),
            DrawTarget::Output => self.viewport,
        }
    }

    fn render_step(
        &mut self,
        step: &RenderPassStep,
        pass: PassKind,
        scene: &mut dyn SceneRenderer,
    ) -> Result<(), PassError> {
        if step.owner.is_none() && !scene.wants_pass(pass) {
            log::trace!("Scene skips {pass}");
            return Ok(());
        }

        let device = Arc::clone(self.pool.device());
        let on_slot = matches!(self.current_draw, DrawTarget::Slot(_));
        let viewport = self.target_viewport();
        if pass != PassKind::PreRender {
            let target = self.draw_framebuffer()?;
            device.bind_framebuffer(FramebufferBinding::Draw, target)?;
            device.set_viewport(viewport);
            device.set_render_state(&render_state_for(pass, viewport));
        }

        let mut ctx = PassContext {
            pass,
            step_name: step.name.as_deref(),
            hdr: on_slot && self.hdr,
            extended: on_slot && self.extended,
            viewport,
            device: device.as_ref(),
            light: None,
            picking: None,
        };
        call_renderer(step, scene, &mut ctx)
    }

    /// Forgets every intermediate and light buffer without device calls.
    pub fn invalidate(&mut self) {
        for fb in self.slots.iter_mut() {
            self.pool.invalidate(fb);
        }
        self.lights.invalidate(&self.pool);
        self.request_reset();
    }

    /// Destroys every intermediate and light buffer.
    pub fn release(&mut self) {
        for fb in self.slots.iter_mut() {
            self.pool.delete_buffer(fb);
        }
        self.lights.release(&mut self.pool);
        self.request_reset();
    }
}

/// Depth, blending and scissor state of each content pass.
pub fn render_state_for(pass: PassKind, viewport: Rect) -> RenderState {
    match pass {
        PassKind::Background => RenderState::BACKGROUND,
        PassKind::Transparency => RenderState::TRANSPARENT,
        PassKind::Text => RenderState::OVERLAY,
        PassKind::Gui => RenderState::OVERLAY.with_scissor(viewport),
        PassKind::PreRender
        | PassKind::Light
        | PassKind::Normal
        | PassKind::Picking
        | PassKind::Custom(_) => RenderState::OPAQUE,
    }
}

/// Hands `ctx` to the owner of `step`, or to the scene.
pub(crate) fn call_renderer(
    step: &RenderPassStep,
    scene: &mut dyn SceneRenderer,
    ctx: &mut PassContext<'_>,
) -> Result<(), PassError> {
    match &step.owner {
        Some(owner) => invoke_guarded(|| owner.render(ctx)),
        None => invoke_guarded(|| scene.render(ctx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_infra::graphics::software::SoftwareDevice;

    fn sequencer() -> RenderPassSequencer {
        let device = Arc::new(SoftwareDevice::new(64, 64));
        let mut sequencer = RenderPassSequencer::new(device);
        sequencer.set_viewport(Rect::new(0, 0, 64, 64));
        sequencer
    }

    #[test]
    fn test_resume_requests_merge_by_minimum() {
        let mut sequencer = sequencer();
        sequencer.pending = None;
        sequencer.request_resume(5);
        sequencer.request_resume(2);
        sequencer.request_resume(7);
        assert_eq!(sequencer.pending_stage(), Some(2));
        sequencer.request_reset();
        assert_eq!(sequencer.pending_stage(), Some(0));
    }

    #[test]
    fn test_more_lights_resumes_at_light_pass() {
        let mut sequencer = sequencer();
        sequencer.pending = None;
        sequencer.request_more_lights();
        assert_eq!(sequencer.pending_stage(), Some(1));
    }

    #[test]
    fn test_bookkeeping_ping_pong() {
        let mut sequencer = sequencer();
        sequencer
            .apply_bookkeeping(StepKind::PrepareDrawTarget)
            .unwrap();
        assert_eq!(sequencer.current_read(), Some(BufferSlot::Main));
        assert_eq!(sequencer.current_draw(), DrawTarget::Slot(BufferSlot::Main));

        sequencer
            .apply_bookkeeping(StepKind::SwapToBuffer {
                slot: BufferSlot::Ping,
                clear: true,
            })
            .unwrap();
        assert_eq!(sequencer.current_read(), Some(BufferSlot::Main));
        assert_eq!(sequencer.current_draw(), DrawTarget::Slot(BufferSlot::Ping));

        sequencer
            .apply_bookkeeping(StepKind::FinishDrawTarget)
            .unwrap();
        assert_eq!(sequencer.current_read(), Some(BufferSlot::Ping));
        assert_eq!(sequencer.current_draw(), DrawTarget::Output);
    }

    #[test]
    fn test_swap_onto_read_buffer_is_rejected() {
        let mut sequencer = sequencer();
        sequencer
            .apply_bookkeeping(StepKind::PrepareDrawTarget)
            .unwrap();
        let err = sequencer
            .apply_bookkeeping(StepKind::SwapToBuffer {
                slot: BufferSlot::Main,
                clear: false,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            PassError::AliasedSwap {
                slot: BufferSlot::Main
            }
        ));
        assert_eq!(sequencer.current_draw(), DrawTarget::Slot(BufferSlot::Main));
    }

    #[test]
    fn test_gui_is_scissored_to_viewport() {
        let viewport = Rect::new(0, 0, 32, 16);
        assert_eq!(
            render_state_for(PassKind::Gui, viewport).scissor,
            Some(viewport)
        );
        assert!(!render_state_for(PassKind::Background, viewport).depth_test);
        assert!(!render_state_for(PassKind::Transparency, viewport).depth_write);
        assert!(render_state_for(PassKind::Normal, viewport).depth_write);
    }
}
