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

//! Data structures of the rendering API: handles, descriptors, state and pass steps.

pub mod common;
pub mod core;
pub mod framebuffer;
pub mod pass;
pub mod picking;
pub mod state;
pub mod texture;

pub use self::common::*;
pub use self::core::*;
pub use self::framebuffer::*;
pub use self::pass::*;
pub use self::picking::*;
pub use self::state::*;
pub use self::texture::*;
