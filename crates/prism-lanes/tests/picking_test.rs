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

//! Integration tests of GPU picking against the software device.

use prism_core::math::Rect;
use prism_core::renderer::{
    encode_pick_id, FramebufferBinding, GraphicsDevice, PassContext, PassKind, PickKind,
    SceneRenderer,
};
use prism_infra::SoftwareDevice;
use prism_lanes::{Framebuffer, FramebufferRequest, PickingEngine, RenderPassSequencer};
use std::any::Any;
use std::sync::Arc;

/// Registers `ranges` in order and paints `rects` (device rows, bottom-up)
/// with their IDs.
struct PickScene {
    device: Arc<SoftwareDevice>,
    ranges: Vec<(u32, u32, &'static str)>,
    rects: Vec<(Rect, u32)>,
    calls: usize,
    position: Option<(i32, i32)>,
}

impl PickScene {
    fn new(device: &Arc<SoftwareDevice>) -> Self {
        Self {
            device: Arc::clone(device),
            ranges: Vec::new(),
            rects: Vec::new(),
            calls: 0,
            position: None,
        }
    }
}

impl SceneRenderer for PickScene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        assert_eq!(ctx.pass, PassKind::Picking);
        self.calls += 1;
        let picking = ctx
            .picking
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("picking pass without registry"))?;
        self.position = Some(picking.position);
        for &(base, count, label) in &self.ranges {
            picking.registry.register(base, count, move |hit| {
                (label != "filtered").then(|| Box::new((label, hit.index)) as Box<dyn Any>)
            })?;
        }
        for &(rect, id) in &self.rects {
            let color = encode_pick_id(id).map(|b| b as f32 / 255.0);
            self.device.fill_rect(rect, color, 0.5)?;
        }
        Ok(())
    }
}

fn setup(width: u32, height: u32) -> (Arc<SoftwareDevice>, RenderPassSequencer) {
    let device = Arc::new(SoftwareDevice::new(width, height));
    let mut sequencer = RenderPassSequencer::new(Arc::clone(&device) as Arc<dyn GraphicsDevice>);
    sequencer.set_viewport(Rect::new(0, 0, width, height));
    (device, sequencer)
}

fn label_of(result: &prism_core::renderer::PickResult) -> (&'static str, u32) {
    *result.downcast_ref::<(&'static str, u32)>().unwrap()
}

#[test]
fn test_adjacent_ranges_resolve_to_the_right_registration() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(0, 1, "first"), (1, 1, "second")];
    scene.rects = vec![(Rect::new(0, 0, 64, 64), 1)];

    let result = engine
        .perform_pick(&mut sequencer, &mut scene, PickKind(2), (32, 32))
        .unwrap();
    assert_eq!(label_of(&result), ("second", 0));
    assert_eq!(result.hit().id, 1);
    assert_eq!(result.hit().kind, PickKind(2));
    assert_eq!(scene.position, Some((32, 32)));
    assert_eq!(scene.calls, 1);
}

#[test]
fn test_empty_pixels_are_no_hit() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(0, 1, "first"), (1, 1, "second")];

    assert!(engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (32, 32))
        .is_none());
    assert_eq!(scene.calls, 1);
}

#[test]
fn test_nearest_ring_wins() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(1, 10, "object")];
    // Click at (20, 20) is device row 43.
    scene.rects = vec![
        (Rect::new(17, 43, 1, 1), 4),
        (Rect::new(22, 44, 1, 1), 7),
    ];

    let result = engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (20, 20))
        .unwrap();
    assert_eq!(label_of(&result), ("object", 6));
}

#[test]
fn test_center_pixel_wins() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(1, 3, "object")];
    // The surrounding rectangle loses the depth test on the centre pixel.
    scene.rects = vec![(Rect::new(20, 43, 1, 1), 3), (Rect::new(10, 35, 20, 20), 1)];

    let result = engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (20, 20))
        .unwrap();
    assert_eq!(result.hit().id, 3);
    assert_eq!(result.hit().index, 2);
}

#[test]
fn test_window_is_clamped_at_the_corner() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(1, 1, "corner")];
    // Top-left window pixel is device row 63.
    scene.rects = vec![(Rect::new(0, 63, 1, 1), 1)];

    let result = engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (0, 0))
        .unwrap();
    assert_eq!(label_of(&result), ("corner", 0));
}

#[test]
fn test_rejections_do_no_device_work() {
    let (device, mut sequencer) = setup(8, 8);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    device.clear_journal();

    assert!(engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (4, 4))
        .is_none());
    assert_eq!(scene.calls, 0);
    assert!(device.journal().is_empty());

    let (device, mut sequencer) = setup(64, 64);
    let mut scene = PickScene::new(&device);
    for position in [(-1, 5), (5, -1), (64, 5), (5, 64)] {
        assert!(engine
            .perform_pick(&mut sequencer, &mut scene, PickKind::default(), position)
            .is_none());
    }
    assert_eq!(scene.calls, 0);
    assert!(engine.target().is_empty());
}

#[test]
fn test_filtered_and_unregistered_ids_are_no_hit() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(1, 1, "filtered")];
    scene.rects = vec![(Rect::new(0, 0, 64, 64), 1)];
    assert!(engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (10, 10))
        .is_none());

    scene.rects = vec![(Rect::new(0, 0, 64, 64), 42)];
    assert!(engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (10, 10))
        .is_none());
}

#[test]
fn test_filtered_center_ends_the_search() {
    let (device, mut sequencer) = setup(64, 64);
    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(1, 1, "filtered"), (2, 1, "valid")];
    // Window (10, 10) is device pixel (10, 53); the valid ID sits right next to it.
    scene.rects = vec![(Rect::new(10, 53, 1, 1), 1), (Rect::new(11, 53, 1, 1), 2)];
    assert!(engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (10, 10))
        .is_none());

    // Without the filtered pixel the neighbour is found from the same position.
    scene.rects = vec![(Rect::new(11, 53, 1, 1), 2)];
    let result = engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (10, 10))
        .unwrap();
    assert_eq!(label_of(&result), ("valid", 0));
}

#[test]
fn test_device_state_is_restored() {
    let (device, mut sequencer) = setup(64, 64);
    let mut other = Framebuffer::default();
    assert!(sequencer
        .pool_mut()
        .prepare(&mut other, &FramebufferRequest::new(16, 16)));
    device
        .bind_framebuffer(FramebufferBinding::Draw, other.frame)
        .unwrap();
    device.set_viewport(Rect::new(1, 2, 3, 4));

    let mut engine = PickingEngine::new();
    let mut scene = PickScene::new(&device);
    scene.ranges = vec![(1, 1, "object")];
    scene.rects = vec![(Rect::new(0, 0, 64, 64), 1)];
    assert!(engine
        .perform_pick(&mut sequencer, &mut scene, PickKind::default(), (5, 5))
        .is_some());

    assert_eq!(device.bound_framebuffer(FramebufferBinding::Draw), other.frame);
    assert_eq!(device.bound_framebuffer(FramebufferBinding::Read), None);
    assert_eq!(device.viewport(), Rect::new(1, 2, 3, 4));

    // The target is reused by the next pick and freed on release.
    let target = engine.target().frame;
    engine.perform_pick(&mut sequencer, &mut scene, PickKind::default(), (5, 5));
    assert_eq!(engine.target().frame, target);
    engine.release(&mut sequencer);
    assert!(engine.target().is_empty());
    assert!(device.take_errors().is_empty());
}
