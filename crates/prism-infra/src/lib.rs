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

//! Concrete [`GraphicsDevice`](prism_core::renderer::GraphicsDevice) backends.
//!
//! - [`SoftwareDevice`]: a CPU reference implementation of the framebuffer
//!   model, used by tests and headless tools.
//! - [`WgpuDevice`]: the same model mapped onto `wgpu` textures and passes
//!   (feature `wgpu`).

pub mod graphics;

pub use graphics::software::{DeviceEvent, SoftwareDevice};
#[cfg(feature = "wgpu")]
pub use graphics::wgpu::WgpuDevice;
