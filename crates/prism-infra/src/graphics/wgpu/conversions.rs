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

use prism_core::renderer::{BlendMode, FilterMode, TextureFormat};

/// A trait for converting Prism types into their `wgpu` equivalents.
pub(crate) trait IntoWgpu<T> {
    fn into_wgpu(self) -> T;
}

impl IntoWgpu<wgpu::TextureFormat> for TextureFormat {
    fn into_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            // Depth24Plus cannot be copied or read back; 32-bit float depth can.
            TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

impl IntoWgpu<wgpu::FilterMode> for FilterMode {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl IntoWgpu<Option<wgpu::BlendState>> for BlendMode {
    fn into_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            }),
        }
    }
}

/// Bytes per texel as stored on the GPU.
pub(crate) fn texel_size(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgba8Unorm => 4,
        TextureFormat::Rgba16Float => 8,
        TextureFormat::Rgba32Float => 16,
        TextureFormat::Depth24Plus | TextureFormat::Depth32Float => 4,
    }
}

/// Decodes one texel of `format` into normalized floats. Depth lands in the
/// first component.
pub(crate) fn decode_texel(format: TextureFormat, bytes: &[u8]) -> [f32; 4] {
    match format {
        TextureFormat::Rgba8Unorm => std::array::from_fn(|i| bytes[i] as f32 / 255.0),
        TextureFormat::Rgba16Float => std::array::from_fn(|i| {
            half::f16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]).to_f32()
        }),
        TextureFormat::Rgba32Float => std::array::from_fn(|i| {
            bytemuck::pod_read_unaligned::<f32>(&bytes[4 * i..4 * i + 4])
        }),
        TextureFormat::Depth24Plus | TextureFormat::Depth32Float => {
            [bytemuck::pod_read_unaligned::<f32>(&bytes[..4]), 0.0, 0.0, 0.0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_half_float_texel() {
        let mut bytes = Vec::new();
        for value in [1.5f32, -2.0, 0.25, 1.0] {
            bytes.extend_from_slice(&half::f16::from_f32(value).to_le_bytes());
        }
        assert_eq!(
            decode_texel(TextureFormat::Rgba16Float, &bytes),
            [1.5, -2.0, 0.25, 1.0]
        );
    }

    #[test]
    fn test_depth_is_backed_by_float_storage() {
        let format: wgpu::TextureFormat = TextureFormat::Depth24Plus.into_wgpu();
        assert_eq!(format, wgpu::TextureFormat::Depth32Float);
        assert_eq!(decode_texel(TextureFormat::Depth24Plus, &0.5f32.to_le_bytes())[0], 0.5);
    }
}
