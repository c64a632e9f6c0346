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

//! Defines data structures related to sampleable textures and multisampled renderbuffers.

use crate::renderer::TextureFormat;
use std::borrow::Cow;

/// A descriptor used to create a [`TextureId`].
///
/// Textures are always single-sampled and can be sampled by shaders after
/// rendering into them.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// The format of the texels in the texture.
    pub format: TextureFormat,
}

/// A descriptor used to create a [`RenderbufferId`].
///
/// Renderbuffers are render-only storage, the only kind that may be multisampled.
#[derive(Debug, Clone)]
pub struct RenderbufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// The format of the storage.
    pub format: TextureFormat,
    /// The number of samples per pixel.
    pub samples: u32,
}

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// An opaque handle to a GPU renderbuffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferId(pub usize);
