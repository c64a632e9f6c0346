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

//! Integration tests of the time-boxed light pass.

use prism_core::math::{Rect, Vec3};
use prism_core::renderer::{
    DirectionalLight, GraphicsDevice, LightType, PassContext, PassKind, RenderSettings,
    SceneLight, SceneRenderer, SpotLight,
};
use prism_infra::SoftwareDevice;
use prism_lanes::{FramebufferPool, LightBudgetScheduler, RenderPassSequencer};
use std::sync::Arc;
use std::time::Duration;

const HUGE: Duration = Duration::from_secs(3600);

/// Records the (light, level) units it is asked to render.
#[derive(Default)]
struct ShadowScene {
    units: Vec<(usize, u32)>,
    viewports: Vec<Rect>,
    skip_lights: bool,
}

impl SceneRenderer for ShadowScene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        if let Some(info) = ctx.light {
            assert_eq!(ctx.pass, PassKind::Light);
            self.units.push((info.light_index, info.level));
            self.viewports.push(ctx.viewport);
        }
        Ok(())
    }

    fn wants_pass(&self, pass: PassKind) -> bool {
        !(self.skip_lights && pass == PassKind::Light)
    }
}

fn spot(x: f32) -> SceneLight {
    SceneLight::new(LightType::Spot(SpotLight::default()), Vec3::new(x, 5.0, 0.0))
}

fn sun() -> SceneLight {
    SceneLight::new(LightType::Directional(DirectionalLight::default()), Vec3::ZERO)
}

fn setup() -> (Arc<SoftwareDevice>, FramebufferPool, LightBudgetScheduler) {
    let device = Arc::new(SoftwareDevice::new(64, 64));
    let pool = FramebufferPool::new(Arc::clone(&device) as Arc<dyn GraphicsDevice>);
    let mut scheduler = LightBudgetScheduler::new();
    scheduler.set_texture_size(32);
    (device, pool, scheduler)
}

#[test]
fn test_zero_budget_renders_one_level_per_pass() {
    let (_device, mut pool, mut scheduler) = setup();
    assert!(scheduler.configure(&mut pool, &[spot(0.0)], 3));
    let mut scene = ShadowScene::default();

    let outcome = scheduler.run_light_pass(&mut pool, &mut scene, Duration::ZERO);
    assert_eq!(outcome.units_rendered, 1);
    assert_eq!(outcome.levels_rendered, 1);
    assert!(outcome.more_remaining);
    assert_eq!(scheduler.rendered_levels(), 1);

    scheduler.run_light_pass(&mut pool, &mut scene, Duration::ZERO);
    let outcome = scheduler.run_light_pass(&mut pool, &mut scene, Duration::ZERO);
    assert!(!outcome.more_remaining);
    assert_eq!(scene.units, vec![(0, 0), (0, 1), (0, 2)]);
    assert!(scheduler.is_complete());
    assert_eq!(scene.viewports[0], Rect::new(0, 0, 32, 32));
}

#[test]
fn test_huge_budget_completes_in_one_pass() {
    let (device, mut pool, mut scheduler) = setup();
    scheduler.configure(&mut pool, &[spot(0.0), spot(2.0)], 4);
    let mut scene = ShadowScene::default();

    let outcome = scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert_eq!(outcome.units_rendered, 8);
    assert_eq!(outcome.levels_rendered, 4);
    assert!(!outcome.more_remaining);
    assert_eq!(scheduler.rendered_levels(), 4);

    // A complete pass holds until the configuration changes.
    let outcome = scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert_eq!(outcome.units_rendered, 0);
    assert_eq!(scene.units.len(), 8);
    assert!(device.take_errors().is_empty());
}

#[test]
fn test_levels_are_rendered_whole() {
    let (_device, mut pool, mut scheduler) = setup();
    scheduler.configure(&mut pool, &[spot(0.0), spot(1.0), spot(2.0)], 2);
    let mut scene = ShadowScene::default();

    scheduler.run_light_pass(&mut pool, &mut scene, Duration::ZERO);
    assert_eq!(scene.units, vec![(0, 0), (1, 0), (2, 0)]);
}

#[test]
fn test_only_spot_lights_use_cascades() {
    let (_device, mut pool, mut scheduler) = setup();
    scheduler.configure(&mut pool, &[sun(), spot(0.0)], 3);
    assert_eq!(scheduler.total_levels(), 3);
    let mut scene = ShadowScene::default();

    scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert_eq!(scene.units, vec![(0, 0), (1, 0), (1, 1), (1, 2)]);
    assert!(scheduler.depth_texture(0, 0).is_some());
    assert!(scheduler.depth_texture(0, 1).is_none());
    assert!(scheduler.depth_texture(1, 2).is_some());
    assert!(scheduler.world_to_texture(1, 2).is_some());
    assert!(scheduler.world_to_texture(0, 1).is_none());
}

#[test]
fn test_non_casting_lights_get_no_buffers() {
    let (device, mut pool, mut scheduler) = setup();
    let mut quiet = spot(0.0);
    quiet.casts_shadows = false;
    scheduler.configure(&mut pool, &[quiet], 4);
    assert_eq!(scheduler.total_levels(), 0);
    assert!(scheduler.is_complete());

    let mut scene = ShadowScene::default();
    scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert!(scene.units.is_empty());
    assert_eq!(device.stats().framebuffers, 0);
}

#[test]
fn test_configuration_changes_reset_the_counter() {
    let (device, mut pool, mut scheduler) = setup();
    let mut scene = ShadowScene::default();
    scheduler.configure(&mut pool, &[spot(0.0), spot(1.0)], 2);
    scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert!(scheduler.is_complete());

    // Moving a light keeps the counter.
    assert!(!scheduler.configure(&mut pool, &[spot(5.0), spot(1.0)], 2));
    assert!(scheduler.is_complete());

    // A change of type resets it.
    assert!(scheduler.configure(&mut pool, &[sun(), spot(1.0)], 2));
    assert_eq!(scheduler.rendered_levels(), 0);

    // Dropping a light deletes its buffers.
    scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    let before = device.stats().framebuffers;
    assert!(scheduler.configure(&mut pool, &[sun()], 2));
    assert_eq!(device.stats().framebuffers, before - 2);

    // So does a change of the level count.
    assert!(scheduler.set_max_levels(&mut pool, 1));
    assert_eq!(scheduler.rendered_levels(), 0);
}

#[test]
fn test_scene_may_skip_the_light_pass() {
    let (_device, mut pool, mut scheduler) = setup();
    scheduler.configure(&mut pool, &[spot(0.0)], 2);
    let mut scene = ShadowScene {
        skip_lights: true,
        ..Default::default()
    };
    let outcome = scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert_eq!(outcome.units_rendered, 0);
    assert_eq!(scheduler.rendered_levels(), 0);
}

#[test]
fn test_release_and_invalidate() {
    let (device, mut pool, mut scheduler) = setup();
    let mut scene = ShadowScene::default();
    scheduler.configure(&mut pool, &[spot(0.0)], 2);
    scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    assert_eq!(device.stats().framebuffers, 2);

    scheduler.invalidate(&pool);
    assert_eq!(scheduler.rendered_levels(), 0);
    assert!(scheduler.depth_texture(0, 0).is_none());
    assert_eq!(device.stats().framebuffers, 2);

    scheduler.run_light_pass(&mut pool, &mut scene, HUGE);
    scheduler.release(&mut pool);
    assert_eq!(device.stats().framebuffers, 2);
    assert!(scheduler.depth_texture(0, 0).is_none());
}

#[test]
fn test_sequencer_requests_more_lights() {
    let device = Arc::new(SoftwareDevice::new(64, 64));
    let mut sequencer = RenderPassSequencer::new(Arc::clone(&device) as Arc<dyn GraphicsDevice>);
    sequencer.configure(&RenderSettings {
        light_budget_ms: 0.0,
        light_texture_size: 16,
        max_light_levels: 3,
        ..Default::default()
    });
    sequencer.set_viewport(Rect::new(0, 0, 64, 64));
    sequencer.set_lights(&[spot(0.0)]);

    let mut scene = ShadowScene::default();
    let report = sequencer.run_frame(&mut scene);
    assert!(report.more_lights_requested);
    assert_eq!(report.light_pass.map(|o| o.units_rendered), Some(1));
    let light_stage = sequencer.step_index_of(prism_core::renderer::StepKind::LightPass);
    assert_eq!(sequencer.pending_stage(), light_stage);

    sequencer.run_frame(&mut scene);
    let report = sequencer.run_frame(&mut scene);
    assert!(!report.more_lights_requested);
    assert!(!sequencer.needs_redraw());
    assert_eq!(sequencer.lights().rendered_levels(), 3);
}
