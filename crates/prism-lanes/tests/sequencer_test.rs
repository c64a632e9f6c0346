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

//! Integration tests of the RenderPassSequencer running whole frames.

use prism_core::math::Rect;
use prism_core::renderer::{
    AttachmentPoint, BufferSlot, CustomPassId, GraphicsDevice, PassContext, PassKind, PostProcess,
    RenderPassStep, RenderSettings, StepKind,
};
use prism_infra::SoftwareDevice;
use prism_lanes::render_lane::DrawTarget;
use prism_lanes::RenderPassSequencer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// Red background, a green 4x4 square in the normal pass, and optional
/// failures in chosen passes.
#[derive(Default)]
struct Scene {
    device: Option<Arc<SoftwareDevice>>,
    passes: Vec<PassKind>,
    fail_in: Option<PassKind>,
    panic_in: Option<PassKind>,
}

impl Scene {
    fn drawing_on(device: &Arc<SoftwareDevice>) -> Self {
        Self {
            device: Some(Arc::clone(device)),
            ..Default::default()
        }
    }
}

impl prism_core::SceneRenderer for Scene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        self.passes.push(ctx.pass);
        if self.fail_in == Some(ctx.pass) {
            anyhow::bail!("{} exploded", ctx.pass);
        }
        if self.panic_in == Some(ctx.pass) {
            panic!("{} panicked", ctx.pass);
        }
        if let Some(device) = &self.device {
            match ctx.pass {
                PassKind::Background => device.fill_rect(ctx.viewport, RED, 0.9)?,
                PassKind::Normal => device.fill_rect(Rect::new(10, 10, 4, 4), GREEN, 0.5)?,
                _ => {}
            }
        }
        Ok(())
    }
}

fn setup(settings: &RenderSettings) -> (Arc<SoftwareDevice>, RenderPassSequencer) {
    let device = Arc::new(SoftwareDevice::new(64, 64));
    let mut sequencer = RenderPassSequencer::new(Arc::clone(&device) as Arc<dyn GraphicsDevice>);
    sequencer.configure(settings);
    sequencer.set_viewport(Rect::new(0, 0, 64, 64));
    (device, sequencer)
}

#[test]
fn test_default_frame_reaches_the_window() {
    let (device, mut sequencer) = setup(&RenderSettings::default());
    let mut scene = Scene::drawing_on(&device);

    let report = sequencer.run_frame(&mut scene);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.executed, StepKind::DEFAULT_PIPELINE.len());
    assert_eq!(
        scene.passes,
        vec![
            PassKind::PreRender,
            PassKind::Background,
            PassKind::Normal,
            PassKind::Transparency,
            PassKind::Text,
            PassKind::Gui,
        ]
    );
    assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 1, 1), Some(RED));
    assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 11, 11), Some(GREEN));
    assert!(sequencer.slot(BufferSlot::Main).has_companion());
    assert_eq!(sequencer.current_read(), Some(BufferSlot::Main));
    assert_eq!(sequencer.current_draw(), DrawTarget::Output);
    assert!(!sequencer.needs_redraw());
    assert!(device.take_errors().is_empty());
}

#[test]
fn test_ping_pong_with_blit() {
    let settings = RenderSettings {
        passes: vec![
            StepKind::PrepareDrawTarget,
            StepKind::Background,
            StepKind::SwapToBuffer {
                slot: BufferSlot::Ping,
                clear: true,
            },
            StepKind::BlitFromBuffer {
                slot: BufferSlot::Main,
            },
            StepKind::Normal,
            StepKind::FinishDrawTarget,
        ],
        ..Default::default()
    };
    let (device, mut sequencer) = setup(&settings);
    let mut scene = Scene::drawing_on(&device);

    let report = sequencer.run_frame(&mut scene);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(sequencer.current_read(), Some(BufferSlot::Ping));

    let ping = sequencer.slot(BufferSlot::Ping);
    assert!(!ping.has_companion());
    assert_eq!(device.texture_pixel(ping.color.unwrap(), 1, 1), Some(RED));
    assert_eq!(device.texture_pixel(ping.color.unwrap(), 11, 11), Some(GREEN));
    assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 11, 11), Some(GREEN));
    assert!(device.take_errors().is_empty());
}

#[test]
fn test_failing_steps_do_not_abort_the_frame() {
    let (device, mut sequencer) = setup(&RenderSettings::default());
    let mut scene = Scene {
        fail_in: Some(PassKind::Normal),
        panic_in: Some(PassKind::Transparency),
        ..Scene::drawing_on(&device)
    };

    let report = sequencer.run_frame(&mut scene);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].index, 4);
    assert!(report.failures[0].message.contains("Normal exploded"));
    assert!(report.failures[1].message.contains("panicked"));
    assert_eq!(scene.passes.last(), Some(&PassKind::Gui));
    // The background still made it to the window.
    assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 1, 1), Some(RED));
}

#[test]
fn test_resume_skips_earlier_steps() {
    let (device, mut sequencer) = setup(&RenderSettings::default());
    let mut scene = Scene::drawing_on(&device);
    sequencer.run_frame(&mut scene);

    sequencer.request_resume(5);
    sequencer.request_resume(2);
    scene.passes.clear();
    let report = sequencer.run_frame(&mut scene);
    assert_eq!(report.start_stage, 2);
    assert_eq!(report.skipped, 2);
    assert!(!scene.passes.contains(&PassKind::PreRender));
    assert!(scene.passes.contains(&PassKind::Background));

    // Without a request the next frame runs everything again.
    let report = sequencer.run_frame(&mut scene);
    assert_eq!(report.start_stage, 0);
}

#[test]
fn test_skipped_steps_replay_bookkeeping() {
    let (device, mut sequencer) = setup(&RenderSettings::default());
    let mut scene = Scene::drawing_on(&device);
    sequencer.run_frame(&mut scene);

    // Resuming at the transparency pass still draws into slot 0.
    let stage = sequencer.step_index_of(StepKind::Transparency).unwrap();
    sequencer.request_resume(stage);
    scene.passes.clear();
    let report = sequencer.run_frame(&mut scene);
    assert!(report.failures.is_empty());
    assert_eq!(scene.passes[0], PassKind::Transparency);
    assert_eq!(device.pixel(None, AttachmentPoint::COLOR0, 11, 11), Some(GREEN));
}

#[test]
fn test_aliased_swap_is_skipped() {
    let settings = RenderSettings {
        passes: vec![
            StepKind::PrepareDrawTarget,
            StepKind::SwapToBuffer {
                slot: BufferSlot::Main,
                clear: false,
            },
            StepKind::Normal,
            StepKind::FinishDrawTarget,
        ],
        ..Default::default()
    };
    let (device, mut sequencer) = setup(&settings);
    let mut scene = Scene::drawing_on(&device);

    let report = sequencer.run_frame(&mut scene);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert!(scene.passes.contains(&PassKind::Normal));
}

#[test]
fn test_picking_steps_only_run_on_request() {
    let settings = RenderSettings {
        passes: vec![StepKind::Picking, StepKind::Gui],
        ..Default::default()
    };
    let (device, mut sequencer) = setup(&settings);
    let mut scene = Scene::drawing_on(&device);
    sequencer.run_frame(&mut scene);
    assert_eq!(scene.passes, vec![PassKind::Gui]);
}

#[derive(Debug, Default)]
struct Vignette {
    calls: AtomicUsize,
}

impl PostProcess for Vignette {
    fn name(&self) -> &str {
        "vignette"
    }

    fn render(&self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        assert_eq!(ctx.step_name, Some("vignette"));
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_owned_steps_render_through_their_owner() {
    let (device, mut sequencer) = setup(&RenderSettings::default());
    let effect = Arc::new(Vignette::default());
    let owner: Arc<dyn PostProcess> = effect.clone();
    let index = sequencer.step_index_of(StepKind::FinishDrawTarget).unwrap();
    let custom = StepKind::Custom(CustomPassId::new(3).unwrap());
    sequencer.insert_step(
        index,
        RenderPassStep::new(custom)
            .named("vignette")
            .owned_by(Arc::clone(&owner)),
    );
    assert_eq!(sequencer.pending_stage(), Some(0));

    let mut scene = Scene::drawing_on(&device);
    let report = sequencer.run_frame(&mut scene);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(effect.calls.load(Ordering::Relaxed), 1);

    assert_eq!(sequencer.remove_steps_owned_by(&owner), 1);
    assert_eq!(sequencer.remove_steps_owned_by(&owner), 0);
    assert_eq!(sequencer.steps().len(), StepKind::DEFAULT_PIPELINE.len());
}

#[test]
fn test_release_destroys_every_slot() {
    let (device, mut sequencer) = setup(&RenderSettings::default());
    let mut scene = Scene::drawing_on(&device);
    sequencer.run_frame(&mut scene);
    assert!(device.stats().framebuffers > 0);

    sequencer.release();
    let stats = device.stats();
    assert_eq!((stats.framebuffers, stats.textures, stats.renderbuffers), (0, 0, 0));
    assert!(sequencer.slot(BufferSlot::Main).is_empty());
    assert_eq!(sequencer.pending_stage(), Some(0));
}
