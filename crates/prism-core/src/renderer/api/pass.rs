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

//! Defines the steps a frame is made of.
//!
//! A frame is an ordered list of [`RenderPassStep`]s. Some steps only move
//! intermediate buffers around ([`StepKind::PrepareDrawTarget`],
//! [`StepKind::SwapToBuffer`], ...), the others hand control to the scene for
//! one [`PassKind`].

use crate::renderer::traits::PostProcess;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One of the six preallocated intermediate buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BufferSlot {
    /// Slot 0, the multisampled scene buffer.
    Main,
    /// Slot 1.
    Ping,
    /// Slot 2.
    Pong,
    /// Slot 3.
    Extra1,
    /// Slot 4.
    Extra2,
    /// Slot 5.
    Extra3,
}

impl BufferSlot {
    /// The number of slots.
    pub const COUNT: usize = 6;

    /// All slots in index order.
    pub const ALL: [BufferSlot; BufferSlot::COUNT] = [
        BufferSlot::Main,
        BufferSlot::Ping,
        BufferSlot::Pong,
        BufferSlot::Extra1,
        BufferSlot::Extra2,
        BufferSlot::Extra3,
    ];

    /// The index of the slot in the pool arena.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The slot at `index`, if in range.
    pub fn from_index(index: usize) -> Option<BufferSlot> {
        BufferSlot::ALL.get(index).copied()
    }

    /// Only the main slot is ever multisampled.
    pub fn is_multisampled(self) -> bool {
        self == BufferSlot::Main
    }
}

impl fmt::Display for BufferSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.index())
    }
}

/// Identifier of a custom pass, in `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CustomPassId(u8);

impl CustomPassId {
    /// The lowest valid id.
    pub const MIN: u8 = 1;
    /// The highest valid id.
    pub const MAX: u8 = 8;

    /// Creates an id, returning `None` outside `1..=8`.
    pub fn new(id: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&id).then_some(Self(id))
    }

    /// The raw id.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CustomPassId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CustomPassId::new(value).ok_or_else(|| {
            format!(
                "custom pass id {value} outside {}..={}",
                CustomPassId::MIN,
                CustomPassId::MAX
            )
        })
    }
}

impl From<CustomPassId> for u8 {
    fn from(id: CustomPassId) -> Self {
        id.0
    }
}

/// The kind of content a scene is asked to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Called once at the start of a frame, before any target is bound.
    PreRender,
    /// Depth-only rendering of one light level.
    Light,
    /// Background (sky, gradients). No depth.
    Background,
    /// Opaque geometry.
    Normal,
    /// Blended geometry.
    Transparency,
    /// Text overlays.
    Text,
    /// Immediate GUI, scissored to the viewport.
    Gui,
    /// Unique-ID rendering for picking.
    Picking,
    /// A custom pass.
    Custom(CustomPassId),
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::PreRender => write!(f, "PreRender"),
            PassKind::Light => write!(f, "Light"),
            PassKind::Background => write!(f, "Background"),
            PassKind::Normal => write!(f, "Normal"),
            PassKind::Transparency => write!(f, "Transparency"),
            PassKind::Text => write!(f, "Text"),
            PassKind::Gui => write!(f, "GUI"),
            PassKind::Picking => write!(f, "Picking"),
            PassKind::Custom(id) => write!(f, "Custom{}", id.get()),
        }
    }
}

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Scene pre-render hook.
    PreRender,
    /// Time-boxed shadow map rendering.
    LightPass,
    /// Prepares slot 0 as read and draw target.
    PrepareDrawTarget,
    /// Demotes the draw target to read and draws into `slot`.
    SwapToBuffer {
        /// The new draw target.
        slot: BufferSlot,
        /// Whether the new draw target is cleared.
        clear: bool,
    },
    /// Copies `slot` into the current draw target.
    BlitFromBuffer {
        /// The source slot.
        slot: BufferSlot,
    },
    /// Background content.
    Background,
    /// Opaque content.
    Normal,
    /// Blended content.
    Transparency,
    /// Resolves the draw target and copies it to the output target.
    FinishDrawTarget,
    /// Text overlays on the output target.
    Text,
    /// GUI on the output target.
    Gui,
    /// Picking content; only executed by picking requests.
    Picking,
    /// A custom content pass.
    Custom(CustomPassId),
}

impl StepKind {
    /// The default frame.
    pub const DEFAULT_PIPELINE: [StepKind; 9] = [
        StepKind::PreRender,
        StepKind::LightPass,
        StepKind::PrepareDrawTarget,
        StepKind::Background,
        StepKind::Normal,
        StepKind::Transparency,
        StepKind::FinishDrawTarget,
        StepKind::Text,
        StepKind::Gui,
    ];

    /// The content pass this step renders, if any.
    pub fn pass_kind(&self) -> Option<PassKind> {
        match self {
            StepKind::PreRender => Some(PassKind::PreRender),
            StepKind::Background => Some(PassKind::Background),
            StepKind::Normal => Some(PassKind::Normal),
            StepKind::Transparency => Some(PassKind::Transparency),
            StepKind::Text => Some(PassKind::Text),
            StepKind::Gui => Some(PassKind::Gui),
            StepKind::Picking => Some(PassKind::Picking),
            StepKind::Custom(id) => Some(PassKind::Custom(*id)),
            StepKind::LightPass
            | StepKind::PrepareDrawTarget
            | StepKind::SwapToBuffer { .. }
            | StepKind::BlitFromBuffer { .. }
            | StepKind::FinishDrawTarget => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::PreRender => write!(f, "PreRender"),
            StepKind::LightPass => write!(f, "LightPass"),
            StepKind::PrepareDrawTarget => write!(f, "PrepareDrawTarget"),
            StepKind::SwapToBuffer { slot, clear } => {
                write!(f, "SwapToBuffer({slot}, clear={clear})")
            }
            StepKind::BlitFromBuffer { slot } => write!(f, "BlitFromBuffer({slot})"),
            StepKind::Background => write!(f, "Background"),
            StepKind::Normal => write!(f, "Normal"),
            StepKind::Transparency => write!(f, "Transparency"),
            StepKind::FinishDrawTarget => write!(f, "FinishDrawTarget"),
            StepKind::Text => write!(f, "Text"),
            StepKind::Gui => write!(f, "GUI"),
            StepKind::Picking => write!(f, "Picking"),
            StepKind::Custom(id) => write!(f, "Custom{}", id.get()),
        }
    }
}

/// One configured step of the frame.
#[derive(Debug, Clone)]
pub struct RenderPassStep {
    /// What the step does.
    pub kind: StepKind,
    /// Optional name, used in logs and passed to the scene.
    pub name: Option<String>,
    /// The post-process that inserted this step, if any. Owned steps are
    /// rendered by their owner instead of the scene.
    pub owner: Option<Arc<dyn PostProcess>>,
}

impl RenderPassStep {
    /// Creates an unnamed, unowned step.
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            name: None,
            owner: None,
        }
    }

    /// Sets the name tag.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the owning post-process.
    pub fn owned_by(mut self, owner: Arc<dyn PostProcess>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Returns `true` if `owner` inserted this step.
    pub fn is_owned_by(&self, owner: &Arc<dyn PostProcess>) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|o| Arc::ptr_eq(o, owner))
    }

    /// The steps of [`StepKind::DEFAULT_PIPELINE`].
    pub fn default_pipeline() -> Vec<RenderPassStep> {
        StepKind::DEFAULT_PIPELINE
            .iter()
            .copied()
            .map(RenderPassStep::new)
            .collect()
    }
}

impl fmt::Display for RenderPassStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} '{}'", self.kind, name),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl From<StepKind> for RenderPassStep {
    fn from(kind: StepKind) -> Self {
        RenderPassStep::new(kind)
    }
}
