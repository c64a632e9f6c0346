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

//! Hot-path algorithms of the Prism frame pipeline.
//!
//! - [`render_lane`]: the framebuffer pool and the pass sequencer.
//! - [`shadow_lane`]: the time-boxed light pass and the cascade matrices.
//! - [`picking_lane`]: GPU object picking.

#![warn(missing_docs)]

pub mod error;
pub mod picking_lane;
pub mod render_lane;
pub mod shadow_lane;

pub use error::PassError;
pub use picking_lane::PickingEngine;
pub use render_lane::{
    Framebuffer, FramebufferFlags, FramebufferPool, FramebufferRequest, FrameReport,
    RenderPassSequencer,
};
pub use shadow_lane::{LightBudgetScheduler, LightPassOutcome};
