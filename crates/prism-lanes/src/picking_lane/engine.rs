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

use super::spiral::{PICK_WINDOW, SPIRAL_ORDER};
use crate::render_lane::{DeviceStateGuard, Framebuffer, FramebufferRequest, RenderPassSequencer};
use prism_core::math::Rect;
use prism_core::renderer::{
    decode_pick_id, AttachmentPoint, FramebufferBinding, GraphicsDevice, PickHit, PickKind,
    PickResult, PickingPass, PickingRegistry, PixelFormat, ResourceError, SceneRenderer, StepKind,
    NO_HIT,
};
use std::sync::Arc;

const HALF: i32 = (PICK_WINDOW / 2) as i32;

/// Renders a picking pass and decodes the drawable under a window position.
///
/// The engine owns its own colour and depth target, sized to the viewport
/// and never multisampled, so picking never disturbs the frame buffers.
#[derive(Debug, Default)]
pub struct PickingEngine {
    target: Framebuffer,
}

impl PickingEngine {
    /// Creates an engine without any target allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// The picking target.
    pub fn target(&self) -> &Framebuffer {
        &self.target
    }

    /// Returns the drawable rendered closest to `position`, searching a 9x9
    /// window around it.
    ///
    /// `position` is relative to the top-left corner of the viewport.
    /// Viewports smaller than the window and positions outside the viewport
    /// return `None` without any device work. The previous bindings,
    /// viewport and render state are restored on every path.
    pub fn perform_pick(
        &mut self,
        sequencer: &mut RenderPassSequencer,
        scene: &mut dyn SceneRenderer,
        kind: PickKind,
        position: (i32, i32),
    ) -> Option<PickResult> {
        let viewport = sequencer.viewport();
        let (width, height) = (viewport.width, viewport.height);
        if width < PICK_WINDOW || height < PICK_WINDOW {
            log::warn!("Viewport {width}x{height} is too small to pick from");
            return None;
        }
        let (x, y) = position;
        if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
            log::debug!("Pick position {position:?} is outside the {width}x{height} viewport");
            return None;
        }

        let device = Arc::clone(sequencer.device());
        let _restore = DeviceStateGuard::new(device.as_ref());

        let request = FramebufferRequest::new(width, height);
        if !sequencer.pool_mut().prepare(&mut self.target, &request) {
            log::error!("Picking target unavailable");
            return None;
        }
        if let Err(err) = sequencer.pool().clear_with(&self.target, [0.0; 4]) {
            log::error!("Failed to clear the picking target: {err}");
            return None;
        }

        let mut registry = PickingRegistry::new();
        let pass = PickingPass {
            registry: &mut registry,
            kind,
            position,
        };
        if let Err(err) = sequencer.run_single_pass(StepKind::Picking, scene, Some(pass)) {
            log::error!("Picking pass failed: {err}");
            return None;
        }

        let device_y = height as i32 - 1 - y;
        let origin_x = (x - HALF).clamp(0, (width - PICK_WINDOW) as i32);
        let origin_y = (device_y - HALF).clamp(0, (height - PICK_WINDOW) as i32);
        let pixels = match self.read_window(device.as_ref(), origin_x, origin_y) {
            Ok(pixels) => pixels,
            Err(err) => {
                log::error!("Failed to read back the picking window: {err}");
                return None;
            }
        };

        let center = (x - origin_x, device_y - origin_y);
        let id = first_hit(&pixels, center)?;
        let Some(registration) = registry.find(id) else {
            log::warn!("Picked ID {id} belongs to no registration");
            return None;
        };
        let hit = PickHit {
            id,
            index: id - registration.base,
            kind,
            position,
        };
        log::trace!("Picked {hit:?}");
        registration
            .build(&hit)
            .map(|value| PickResult::new(hit, value))
    }

    fn read_window(&self, device: &dyn GraphicsDevice, x: i32, y: i32) -> Result<Vec<u8>, ResourceError> {
        let frame = self.target.frame.ok_or(ResourceError::InvalidHandle)?;
        device.bind_framebuffer(FramebufferBinding::Read, Some(frame))?;
        device.read_pixels(
            Rect::new(x, y, PICK_WINDOW, PICK_WINDOW),
            AttachmentPoint::COLOR0,
            PixelFormat::Rgba8,
        )
    }

    /// Forgets the picking target without device calls.
    pub fn invalidate(&mut self, sequencer: &RenderPassSequencer) {
        sequencer.pool().invalidate(&mut self.target);
    }

    /// Destroys the picking target.
    pub fn release(&mut self, sequencer: &mut RenderPassSequencer) {
        sequencer.pool_mut().delete_buffer(&mut self.target);
    }
}

/// Scans `pixels` (a bottom-up RGBA8 window) in spiral order from `center`
/// and returns the first ID that is not [`NO_HIT`].
fn first_hit(pixels: &[u8], center: (i32, i32)) -> Option<u32> {
    let size = PICK_WINDOW as i32;
    SPIRAL_ORDER.iter().find_map(|&(dx, dy)| {
        let (px, py) = (center.0 + dx, center.1 + dy);
        if px < 0 || py < 0 || px >= size || py >= size {
            return None;
        }
        let offset = ((py * size + px) * 4) as usize;
        let pixel = pixels.get(offset..offset + 4)?;
        let id = decode_pick_id([pixel[0], pixel[1], pixel[2], pixel[3]]);
        (id != NO_HIT).then_some(id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::encode_pick_id;

    fn window_with(cells: &[((i32, i32), u32)]) -> Vec<u8> {
        let mut pixels = vec![0u8; (PICK_WINDOW * PICK_WINDOW * 4) as usize];
        for &((x, y), id) in cells {
            let offset = ((y * PICK_WINDOW as i32 + x) * 4) as usize;
            pixels[offset..offset + 4].copy_from_slice(&encode_pick_id(id));
        }
        pixels
    }

    #[test]
    fn test_center_wins_over_neighbours() {
        let pixels = window_with(&[((4, 4), 7), ((5, 4), 3)]);
        assert_eq!(first_hit(&pixels, (4, 4)), Some(7));
    }

    #[test]
    fn test_nearest_ring_wins() {
        let pixels = window_with(&[((8, 8), 9), ((3, 5), 2)]);
        assert_eq!(first_hit(&pixels, (4, 4)), Some(2));
    }

    #[test]
    fn test_empty_window_is_no_hit() {
        let pixels = window_with(&[]);
        assert_eq!(first_hit(&pixels, (4, 4)), None);
    }

    #[test]
    fn test_off_center_search_skips_outside_cells() {
        let pixels = window_with(&[((0, 8), 5)]);
        assert_eq!(first_hit(&pixels, (0, 0)), None);
        assert_eq!(first_hit(&pixels, (0, 4)), Some(5));
    }
}
