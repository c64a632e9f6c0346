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

use prism_core::math::Rect;
use prism_core::renderer::{FramebufferBinding, FramebufferId, GraphicsDevice, RenderState};

/// Snapshot of the device bindings, restored when dropped.
///
/// Covers the read and draw framebuffers, the viewport and the render state,
/// so every exit path of a pick or a capture leaves the device as it found it.
pub struct DeviceStateGuard<'a> {
    device: &'a dyn GraphicsDevice,
    read: Option<FramebufferId>,
    draw: Option<FramebufferId>,
    viewport: Rect,
    state: RenderState,
}

impl<'a> DeviceStateGuard<'a> {
    /// Captures the current state of `device`.
    pub fn new(device: &'a dyn GraphicsDevice) -> Self {
        Self {
            device,
            read: device.bound_framebuffer(FramebufferBinding::Read),
            draw: device.bound_framebuffer(FramebufferBinding::Draw),
            viewport: device.viewport(),
            state: device.render_state(),
        }
    }

    /// The captured viewport.
    pub fn viewport(&self) -> Rect {
        self.viewport
    }
}

impl Drop for DeviceStateGuard<'_> {
    fn drop(&mut self) {
        for (binding, framebuffer) in [
            (FramebufferBinding::Read, self.read),
            (FramebufferBinding::Draw, self.draw),
        ] {
            if let Err(err) = self.device.bind_framebuffer(binding, framebuffer) {
                log::warn!("Failed to restore {binding:?} binding to {framebuffer:?}: {err}");
            }
        }
        self.device.set_viewport(self.viewport);
        self.device.set_render_state(&self.state);
    }
}
