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

//! Errors raised by individual steps of a frame.
//!
//! A failing step is logged and skipped; the rest of the frame still runs.

use prism_core::renderer::{BufferSlot, ResourceError};
use thiserror::Error;

/// The reason a step of the frame was skipped.
#[derive(Error, Debug)]
pub enum PassError {
    /// The pool could not prepare an intermediate buffer.
    #[error("intermediate buffer {slot} could not be prepared")]
    TargetUnavailable {
        /// The slot that failed.
        slot: BufferSlot,
    },

    /// A swap would draw into the buffer currently used as read buffer.
    #[error("swap to {slot} would alias the current read buffer")]
    AliasedSwap {
        /// The requested draw slot.
        slot: BufferSlot,
    },

    /// A shadow depth buffer could not be prepared.
    #[error("depth buffer of light {light} level {level} could not be prepared")]
    LightTargetUnavailable {
        /// Index of the light.
        light: usize,
        /// The cascade level.
        level: u32,
    },

    /// A blit source holds no colour texture.
    #[error("intermediate buffer {slot} holds no colour image")]
    EmptySource {
        /// The source slot.
        slot: BufferSlot,
    },

    /// A device call failed.
    #[error("device error: {0}")]
    Device(#[from] ResourceError),

    /// The scene or a post-process returned an error.
    #[error("render callback failed: {0:#}")]
    Callback(anyhow::Error),

    /// The scene or a post-process panicked.
    #[error("render callback panicked: {0}")]
    Panicked(String),
}
