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

use prism_core::renderer::{BlendMode, TextureFormat};

/// Backing store of a texture, a renderbuffer or the surface.
///
/// Every format is stored as `[f32; 4]` texels; depth lives in the first
/// component. Writes to `Rgba8Unorm` images are quantized to 8 bits, so
/// readbacks see exactly what a GPU would.
#[derive(Debug, Clone)]
pub(crate) struct Image {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: u32,
    texels: Vec<[f32; 4]>,
}

impl Image {
    pub fn new(width: u32, height: u32, format: TextureFormat, samples: u32) -> Self {
        let fill = if format.is_depth() {
            [1.0, 0.0, 0.0, 0.0]
        } else {
            [0.0; 4]
        };
        Self {
            width,
            height,
            format,
            samples,
            texels: vec![fill; width as usize * height as usize],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<[f32; 4]> {
        self.index(x, y).map(|i| self.texels[i])
    }

    pub fn set(&mut self, x: i32, y: i32, value: [f32; 4]) {
        let value = if self.format == TextureFormat::Rgba8Unorm {
            value.map(quantize)
        } else {
            value
        };
        if let Some(i) = self.index(x, y) {
            self.texels[i] = value;
        }
    }

    pub fn blend(&mut self, x: i32, y: i32, src: [f32; 4], mode: BlendMode) {
        let Some(dst) = self.get(x, y) else {
            return;
        };
        let a = src[3];
        let out = match mode {
            BlendMode::Opaque => src,
            BlendMode::Alpha => [
                src[0] * a + dst[0] * (1.0 - a),
                src[1] * a + dst[1] * (1.0 - a),
                src[2] * a + dst[2] * (1.0 - a),
                a + dst[3] * (1.0 - a),
            ],
            BlendMode::Additive => [
                src[0] * a + dst[0],
                src[1] * a + dst[1],
                src[2] * a + dst[2],
                dst[3],
            ],
        };
        self.set(x, y, out);
    }

    pub fn fill(&mut self, value: [f32; 4]) {
        let value = if self.format == TextureFormat::Rgba8Unorm {
            value.map(quantize)
        } else {
            value
        };
        self.texels.fill(value);
    }

    /// Samples at normalized coordinates with bilinear filtering.
    pub fn sample_linear(&self, u: f32, v: f32) -> [f32; 4] {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let (x0, y0) = (fx.floor(), fy.floor());
        let (tx, ty) = (fx - x0, fy - y0);
        let clamped = |x: f32, y: f32| {
            let x = (x as i32).clamp(0, self.width as i32 - 1);
            let y = (y as i32).clamp(0, self.height as i32 - 1);
            self.get(x, y).unwrap_or_default()
        };
        let (a, b) = (clamped(x0, y0), clamped(x0 + 1.0, y0));
        let (c, d) = (clamped(x0, y0 + 1.0), clamped(x0 + 1.0, y0 + 1.0));
        std::array::from_fn(|i| {
            let top = a[i] + (b[i] - a[i]) * tx;
            let bottom = c[i] + (d[i] - c[i]) * tx;
            top + (bottom - top) * ty
        })
    }
}

fn quantize(value: f32) -> f32 {
    (value.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

/// Converts a normalized colour to 8-bit channels.
pub(crate) fn to_unorm8(value: [f32; 4]) -> [u8; 4] {
    value.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}
