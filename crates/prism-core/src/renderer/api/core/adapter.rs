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

//! Device capabilities.

/// Backend-agnostic limits and quirks reported by a [`GraphicsDevice`].
///
/// [`GraphicsDevice`]: crate::renderer::GraphicsDevice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// The largest sample count the device grants for renderbuffers.
    pub max_samples: u32,
    /// Whether every framebuffer needs a colour attachment to be complete.
    ///
    /// Some embedded profiles reject depth-only framebuffers.
    pub requires_color_attachment: bool,
    /// The largest texture dimension, in pixels.
    pub max_texture_size: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_samples: 4,
            requires_color_attachment: false,
            max_texture_size: 8192,
        }
    }
}

impl DeviceCapabilities {
    /// Clamps a requested sample count to what the device grants.
    ///
    /// The result is always at least 1.
    pub fn clamp_samples(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_samples.max(1))
    }
}
