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

//! Frame objects and the completeness rules shared by every backend.

use prism_core::renderer::{AttachmentPoint, AttachmentTarget, FramebufferStatus, TextureFormat};
use std::collections::BTreeMap;

/// What the completeness query needs to know about an attached image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttachmentInfo {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

/// A framebuffer object: attachments plus the active draw buffers.
#[derive(Debug)]
pub(crate) struct FrameObject {
    pub attachments: BTreeMap<AttachmentPoint, AttachmentTarget>,
    pub draw_buffers: Vec<AttachmentPoint>,
}

impl Default for FrameObject {
    fn default() -> Self {
        Self {
            attachments: BTreeMap::new(),
            draw_buffers: vec![AttachmentPoint::COLOR0],
        }
    }
}

impl FrameObject {
    /// Runs the completeness query. `lookup` resolves attached handles;
    /// `None` means the handle was destroyed.
    pub fn status<F>(&self, requires_color: bool, lookup: F) -> FramebufferStatus
    where
        F: Fn(AttachmentTarget) -> Option<AttachmentInfo>,
    {
        if self.attachments.is_empty() {
            return FramebufferStatus::MissingAttachment;
        }

        let mut extent = None;
        let mut samples = None;
        for (point, target) in &self.attachments {
            let Some(info) = lookup(*target) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            if point.is_color() == info.format.is_depth() {
                return FramebufferStatus::IncompleteAttachment;
            }
            match extent {
                None => extent = Some((info.width, info.height)),
                Some(e) if e != (info.width, info.height) => {
                    return FramebufferStatus::IncompleteDimensions
                }
                Some(_) => {}
            }
            match samples {
                None => samples = Some(info.samples),
                Some(s) if s != info.samples => return FramebufferStatus::IncompleteMultisample,
                Some(_) => {}
            }
        }
        if self
            .draw_buffers
            .iter()
            .any(|point| !self.attachments.contains_key(point))
        {
            return FramebufferStatus::IncompleteDrawBuffer;
        }
        if requires_color && !self.attachments.keys().any(|point| point.is_color()) {
            return FramebufferStatus::Unsupported;
        }
        FramebufferStatus::Complete
    }
}
