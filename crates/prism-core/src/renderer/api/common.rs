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

//! Common enums shared by the texture, framebuffer and readback APIs.

use serde::{Deserialize, Serialize};

/// The memory format of texels in a texture or renderbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// Four 8-bit unsigned normalized components (RGBA).
    Rgba8Unorm,
    /// Four 16-bit float components. Used for HDR colour buffers.
    Rgba16Float,
    /// Four 32-bit float components.
    Rgba32Float,
    /// A 24-bit unsigned normalized depth format.
    Depth24Plus,
    /// A 32-bit float depth format.
    Depth32Float,
}

impl TextureFormat {
    /// Returns the size in bytes of a single pixel for this format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
            TextureFormat::Depth24Plus => 4,
            TextureFormat::Depth32Float => 4,
        }
    }

    /// Returns `true` for depth formats.
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24Plus | TextureFormat::Depth32Float)
    }

    /// Returns `true` for floating point colour formats.
    pub fn is_float_color(&self) -> bool {
        matches!(self, TextureFormat::Rgba16Float | TextureFormat::Rgba32Float)
    }

    /// The colour format used for a buffer with the given HDR flag.
    pub fn color_for(hdr: bool) -> Self {
        if hdr {
            TextureFormat::Rgba16Float
        } else {
            TextureFormat::Rgba8Unorm
        }
    }
}

/// The pixel layout returned by readbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Four 8-bit channels per pixel.
    Rgba8,
    /// Four little-endian `f32` channels per pixel.
    Rgba32Float,
}

impl PixelFormat {
    /// Returns the size in bytes of a single pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba32Float => 16,
        }
    }

    /// Returns `true` if the format carries values outside `[0, 1]`.
    pub fn is_hdr(&self) -> bool {
        matches!(self, PixelFormat::Rgba32Float)
    }
}

/// Defines the filtering mode used when a copy scales its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Point sampling. Returns the value of the nearest texel.
    Nearest,
    /// Linear interpolation between the nearest texels.
    Linear,
}
