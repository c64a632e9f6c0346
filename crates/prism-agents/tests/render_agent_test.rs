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

//! Integration tests of the RenderAgent lifecycle, driven by the software device.

use prism_agents::RenderAgent;
use prism_core::renderer::{
    encode_pick_id, CustomPassId, GraphicsDevice, LightType, PassContext, PassKind, PickKind,
    PixelFormat, PostProcess, RenderError, RenderSettings, SceneLight, SceneRenderer, SpotLight,
    StepKind, NO_HIT,
};
use prism_core::math::{Extent2D, Rect, Vec3};
use prism_infra::SoftwareDevice;
use std::any::Any;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

/// Helper: a 64x64 software device and an initialized agent on it.
fn setup(settings: RenderSettings) -> (Arc<SoftwareDevice>, RenderAgent) {
    let device = Arc::new(SoftwareDevice::new(64, 64));
    let agent = RenderAgent::new(Arc::clone(&device) as Arc<dyn GraphicsDevice>, settings);
    agent.initialize().unwrap();
    agent.resize(64, 64).unwrap();
    (device, agent)
}

fn pick_color(id: u32) -> [f32; 4] {
    encode_pick_id(id).map(|b| b as f32 / 255.0)
}

/// Paints a red background and, during picking, covers the viewport with
/// `pick_id` after registering the ranges [0, 1) and [1, 2).
struct TestScene {
    device: Arc<SoftwareDevice>,
    pick_id: u32,
    passes: Vec<PassKind>,
}

impl TestScene {
    fn new(device: &Arc<SoftwareDevice>) -> Self {
        Self {
            device: Arc::clone(device),
            pick_id: NO_HIT,
            passes: Vec::new(),
        }
    }
}

impl SceneRenderer for TestScene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        self.passes.push(ctx.pass);
        match ctx.pass {
            PassKind::Background => self.device.fill_rect(ctx.viewport, RED, 0.5)?,
            PassKind::Picking => {
                if let Some(picking) = ctx.picking.as_mut() {
                    picking
                        .registry
                        .register(0, 1, |_| Some(Box::new("first") as Box<dyn Any>))?;
                    picking
                        .registry
                        .register(1, 1, |_| Some(Box::new("second") as Box<dyn Any>))?;
                }
                if self.pick_id != NO_HIT {
                    self.device
                        .fill_rect(ctx.viewport, pick_color(self.pick_id), 0.5)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[test]
fn test_paint_requires_initialize() {
    let device = Arc::new(SoftwareDevice::new(64, 64));
    let agent = RenderAgent::new(device.clone(), RenderSettings::default());
    let mut scene = TestScene::new(&device);
    assert_eq!(agent.paint(&mut scene).unwrap_err(), RenderError::NotInitialized);
}

#[test]
fn test_paint_runs_every_content_pass() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);

    let report = agent.paint(&mut scene).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.start_stage, 0);
    assert!(scene.passes.contains(&PassKind::Background));
    assert!(scene.passes.contains(&PassKind::Gui));
    assert!(!scene.passes.contains(&PassKind::Picking));
    assert!(agent.last_device_errors().unwrap().is_empty());
    assert_eq!(agent.frame_count().unwrap(), 1);

    // The finished frame lands in the window.
    assert_eq!(device.pixel(None, prism_core::renderer::AttachmentPoint::COLOR0, 10, 10), Some(RED));
}

#[test]
fn test_render_to_image_rgba8() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);

    let image = agent
        .render_to_image(&mut scene, 64, 64, PixelFormat::Rgba8, false)
        .unwrap();
    assert_eq!(image.pixels.len(), 16384);
    assert_eq!((image.width, image.height), (64, 64));
    assert_eq!(image.pixel(32, 32), Some(&[255u8, 0, 0, 255][..]));
    assert!(agent.last_device_errors().unwrap().is_empty());
    assert!(device.take_errors().is_empty());

    // The window viewport is restored and a full redraw is pending.
    assert_eq!(agent.viewport().unwrap().extent(), Extent2D::new(64, 64));
    assert!(agent.needs_redraw());
}

#[test]
fn test_render_to_image_float_is_four_times_larger() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);

    let image = agent
        .render_to_image(&mut scene, 16, 8, PixelFormat::Rgba32Float, true)
        .unwrap();
    assert_eq!(image.pixels.len(), 16 * 8 * 16);
    assert!(device.take_errors().is_empty());
}

#[test]
fn test_render_to_image_rejects_invalid_sizes() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);

    assert_eq!(
        agent
            .render_to_image(&mut scene, 0, 16, PixelFormat::Rgba8, false)
            .unwrap_err(),
        RenderError::InvalidSize {
            width: 0,
            height: 16
        }
    );
    let too_large = device.capabilities().max_texture_size + 1;
    assert!(matches!(
        agent.render_to_image(&mut scene, too_large, 16, PixelFormat::Rgba8, false),
        Err(RenderError::InvalidSize { .. })
    ));
}

#[test]
fn test_light_levels_complete_within_budget() {
    let settings = RenderSettings {
        light_texture_size: 64,
        max_light_levels: 4,
        light_budget_ms: 30.0,
        ..Default::default()
    };
    let (device, agent) = setup(settings);
    let spot = LightType::Spot(SpotLight::default());
    agent
        .set_lights(&[
            SceneLight::new(spot, Vec3::new(0.0, 5.0, 0.0)),
            SceneLight::new(spot, Vec3::new(3.0, 5.0, 0.0)),
        ])
        .unwrap();

    let mut scene = TestScene::new(&device);
    let mut last = None;
    for _ in 0..16 {
        last = Some(agent.paint(&mut scene).unwrap());
        if !agent.needs_redraw() {
            break;
        }
    }

    let last = last.unwrap();
    assert_eq!(agent.rendered_light_levels().unwrap(), 4);
    assert!(!last.more_lights_requested);
    assert!(!agent.needs_redraw());

    // Later frames leave the finished light pass alone.
    let report = agent.paint(&mut scene).unwrap();
    assert!(report.light_pass.map_or(true, |outcome| outcome.units_rendered == 0));
}

#[test]
fn test_pick_returns_second_registration() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);
    scene.pick_id = 1;

    let result = agent
        .perform_pick(&mut scene, PickKind(7), (32, 32))
        .unwrap()
        .expect("ID 1 should be hit");
    assert_eq!(result.downcast_ref::<&str>(), Some(&"second"));
    assert_eq!(result.hit().id, 1);
    assert_eq!(result.hit().index, 0);
    assert_eq!(result.hit().kind, PickKind(7));
}

#[test]
fn test_pick_on_empty_pixels_is_no_hit() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);

    let result = agent.perform_pick(&mut scene, PickKind::default(), (5, 60)).unwrap();
    assert!(result.is_none());

    // Outside the viewport nothing is rendered at all.
    scene.passes.clear();
    let result = agent.perform_pick(&mut scene, PickKind::default(), (64, 0)).unwrap();
    assert!(result.is_none());
    assert!(scene.passes.is_empty());
}

/// Calls back into the agent from inside a pass.
struct NestedScene {
    agent: Rc<RenderAgent>,
    device: Arc<SoftwareDevice>,
    nested: Option<Result<(), RenderError>>,
}

impl SceneRenderer for NestedScene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        if ctx.pass == PassKind::Normal && self.nested.is_none() {
            let mut inner = TestScene::new(&self.device);
            self.nested = Some(self.agent.paint(&mut inner).map(|_| ()));
        }
        Ok(())
    }
}

#[test]
fn test_nested_paint_is_rejected() {
    let (device, agent) = setup(RenderSettings::default());
    let agent = Rc::new(agent);
    let mut scene = NestedScene {
        agent: Rc::clone(&agent),
        device: Arc::clone(&device),
        nested: None,
    };

    let report = agent.paint(&mut scene).unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(scene.nested, Some(Err(RenderError::Reentrant)));

    // The guard is released once the outer paint returns.
    let mut plain = TestScene::new(&device);
    assert!(agent.paint(&mut plain).is_ok());
}

/// Queries the agent from inside a pass.
struct QueryScene {
    agent: Rc<RenderAgent>,
    levels: Option<Result<u32, RenderError>>,
    viewport: Option<Result<Rect, RenderError>>,
}

impl SceneRenderer for QueryScene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        if ctx.pass == PassKind::Normal {
            self.levels = Some(self.agent.rendered_light_levels());
            self.viewport = Some(self.agent.viewport());
        }
        Ok(())
    }
}

#[test]
fn test_queries_during_paint_report_reentrant() {
    let (_device, agent) = setup(RenderSettings::default());
    let agent = Rc::new(agent);
    let mut scene = QueryScene {
        agent: Rc::clone(&agent),
        levels: None,
        viewport: None,
    };

    let report = agent.paint(&mut scene).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(scene.levels, Some(Err(RenderError::Reentrant)));
    assert_eq!(scene.viewport, Some(Err(RenderError::Reentrant)));

    // Outside a paint the same queries answer.
    assert_eq!(agent.viewport().unwrap(), Rect::new(0, 0, 64, 64));
    assert_eq!(agent.frame_count().unwrap(), 1);
    assert!(agent.is_initialized().unwrap());
}

#[derive(Debug, Default)]
struct CountingEffect {
    calls: AtomicUsize,
}

impl PostProcess for CountingEffect {
    fn name(&self) -> &str {
        "counting"
    }

    fn render(&self, _ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_post_process_steps_are_owned() {
    let (device, agent) = setup(RenderSettings::default());
    let effect = Arc::new(CountingEffect::default());
    let owner: Arc<dyn PostProcess> = effect.clone();
    let custom = StepKind::Custom(CustomPassId::new(1).unwrap());
    agent
        .add_post_process(Arc::clone(&owner), StepKind::FinishDrawTarget, &[custom])
        .unwrap();

    let mut scene = TestScene::new(&device);
    agent.paint(&mut scene).unwrap();
    assert_eq!(effect.calls.load(Ordering::Relaxed), 1);
    assert!(!scene
        .passes
        .iter()
        .any(|pass| matches!(pass, PassKind::Custom(_))));

    assert_eq!(agent.remove_post_process(&owner).unwrap(), 1);
    agent.paint(&mut scene).unwrap();
    assert_eq!(effect.calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_invalidate_then_release() {
    let (device, agent) = setup(RenderSettings::default());
    let mut scene = TestScene::new(&device);
    agent.paint(&mut scene).unwrap();
    let live = device.stats();
    assert!(live.framebuffers > 0);

    // Context loss: handles are forgotten, nothing is destroyed.
    agent.invalidate_buffers().unwrap();
    assert_eq!(device.stats().framebuffers, live.framebuffers);

    // A new frame reallocates; release destroys what the agent owns.
    agent.paint(&mut scene).unwrap();
    agent.release().unwrap();
    assert!(!agent.is_initialized().unwrap());
    assert_eq!(device.stats().framebuffers, live.framebuffers);
    assert!(device.take_errors().is_empty());
}
