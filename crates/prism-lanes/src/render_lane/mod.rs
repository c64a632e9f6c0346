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

//! Render lane: off-screen targets and the per-frame step sequencer.

mod framebuffer;
mod framebuffer_pool;
mod invoke;
mod sequencer;
mod state_guard;

pub(crate) use invoke::invoke_guarded;
pub use framebuffer::{Framebuffer, FramebufferFlags, FramebufferRequest, MultisampleCompanion};
pub use framebuffer_pool::{FramebufferPool, PoolStats};
pub use sequencer::{render_state_for, DrawTarget, FrameReport, RenderPassSequencer, StepFailure};
pub use state_guard::DeviceStateGuard;
