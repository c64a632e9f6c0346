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

//! Defines the hierarchy of error types for the frame pipeline.

use crate::renderer::api::framebuffer::{FramebufferId, FramebufferStatus};
use std::fmt;

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A resource could not be found.
    NotFound,
    /// The handle used to reference a resource is invalid or was destroyed.
    InvalidHandle,
    /// A descriptor was rejected (zero size, unsupported format...).
    InvalidDescriptor(String),
    /// An access fell outside the bounds of a resource.
    OutOfBounds,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound => write!(f, "Resource not found."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle."),
            ResourceError::InvalidDescriptor(msg) => {
                write!(f, "Invalid resource descriptor: {msg}")
            }
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// An error raised while assembling a framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferError {
    /// The completeness query failed.
    Incomplete {
        /// The framebuffer that was checked.
        id: FramebufferId,
        /// The status reported by the device.
        status: FramebufferStatus,
    },
    /// A texture or renderbuffer could not be created.
    Resource(ResourceError),
}

impl fmt::Display for FramebufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramebufferError::Incomplete { id, status } => {
                write!(f, "Framebuffer {id:?} is incomplete: {status:?}")
            }
            FramebufferError::Resource(err) => write!(f, "Framebuffer resource error: {err}"),
        }
    }
}

impl std::error::Error for FramebufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FramebufferError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for FramebufferError {
    fn from(err: ResourceError) -> Self {
        FramebufferError::Resource(err)
    }
}

/// A high-level error returned by the pipeline entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A pipeline entry point was called while another one was running.
    Reentrant,
    /// The pipeline was used before `initialize` or after `release`.
    NotInitialized,
    /// The requested output size is zero or exceeds the device limits.
    InvalidSize {
        /// The requested width.
        width: u32,
        /// The requested height.
        height: u32,
    },
    /// An off-screen target could not be prepared.
    Framebuffer(FramebufferError),
    /// A resource operation failed.
    Resource(ResourceError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Reentrant => {
                write!(f, "Nested pipeline invocation rejected.")
            }
            RenderError::NotInitialized => write!(f, "The pipeline is not initialized."),
            RenderError::InvalidSize { width, height } => {
                write!(f, "Invalid output size {width}x{height}.")
            }
            RenderError::Framebuffer(err) => write!(f, "Framebuffer error: {err}"),
            RenderError::Resource(err) => write!(f, "Resource error: {err}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Framebuffer(err) => Some(err),
            RenderError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FramebufferError> for RenderError {
    fn from(err: FramebufferError) -> Self {
        RenderError::Framebuffer(err)
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::Resource(err)
    }
}

/// An error raised while registering picking ID ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickingError {
    /// A registration asked for zero IDs.
    EmptyRange {
        /// The base ID of the rejected range.
        base: u32,
    },
    /// A range starts before the end of the previous one.
    OverlappingRange {
        /// The base ID of the rejected range.
        base: u32,
        /// One past the last ID of the previous range.
        previous_end: u32,
    },
    /// The 24-bit ID space cannot hold the range.
    IdSpaceExhausted {
        /// The number of IDs requested.
        requested: u32,
        /// The number of IDs left.
        available: u32,
    },
}

impl fmt::Display for PickingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickingError::EmptyRange { base } => {
                write!(f, "Empty picking range at ID {base}")
            }
            PickingError::OverlappingRange { base, previous_end } => {
                write!(
                    f,
                    "Picking range at ID {base} overlaps the previous range ending at {previous_end}"
                )
            }
            PickingError::IdSpaceExhausted {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Picking ID space exhausted: {requested} requested, {available} available"
                )
            }
        }
    }
}

impl std::error::Error for PickingError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_render_error_wraps_sources() {
        let err: RenderError = FramebufferError::from(ResourceError::OutOfBounds).into();
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Framebuffer error: Framebuffer resource error: Resource access out of bounds."
        );
        assert!(RenderError::Reentrant.source().is_none());
    }
}
