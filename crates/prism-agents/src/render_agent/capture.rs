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

use prism_core::renderer::PixelFormat;

/// Pixels read back by [`RenderAgent::render_to_image`](super::RenderAgent::render_to_image).
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// The layout of `pixels`.
    pub format: PixelFormat,
    /// Tightly packed rows, bottom-up unless the capture was flipped.
    pub pixels: Vec<u8>,
}

impl CapturedImage {
    /// Bytes of one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Reverses the row order in place.
    pub fn flip_vertically(&mut self) {
        let row = self.row_bytes();
        if row == 0 {
            return;
        }
        let rows = self.pixels.len() / row;
        for y in 0..rows / 2 {
            let (top, bottom) = self.pixels.split_at_mut((rows - 1 - y) * row);
            top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
    }

    /// Returns one pixel as raw bytes, addressing rows in storage order.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let size = self.format.bytes_per_pixel();
        let offset = y as usize * self.row_bytes() + x as usize * size;
        self.pixels.get(offset..offset + size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_reverses_rows() {
        let mut image = CapturedImage {
            width: 1,
            height: 3,
            format: PixelFormat::Rgba8,
            pixels: vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3],
        };
        image.flip_vertically();
        assert_eq!(image.pixels, vec![3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
        assert_eq!(image.pixel(0, 0), Some(&[3u8, 3, 3, 3][..]));
        assert!(image.pixel(1, 0).is_none());
    }
}
