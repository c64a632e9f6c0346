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

//! Global settings for the frame pipeline.

use crate::renderer::api::pass::StepKind;
use serde::{Deserialize, Serialize};

/// Programmatic configuration of the frame pipeline.
///
/// Every field has a sensible default; partial JSON documents deserialize
/// with the remaining fields defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Requested multisample count for the main draw target.
    pub samples: u32,
    /// Whether colour targets use a floating-point format.
    pub hdr: bool,
    /// Whether colour targets carry normals and specular attachments.
    pub extended: bool,
    /// Edge length of the square shadow depth textures.
    pub light_texture_size: u32,
    /// Number of cascade levels rendered for spot lights.
    pub max_light_levels: u32,
    /// Time allotted to the light pass per frame, in milliseconds.
    pub light_budget_ms: f64,
    /// Colour the main target is cleared to.
    pub clear_color: [f32; 4],
    /// The ordered pass list.
    pub passes: Vec<StepKind>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            samples: 4,
            hdr: false,
            extended: false,
            light_texture_size: 1024,
            max_light_levels: 4,
            light_budget_ms: 30.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            passes: StepKind::DEFAULT_PIPELINE.to_vec(),
        }
    }
}

impl RenderSettings {
    /// Returns `true` if multisampling is requested.
    pub fn wants_multisample(&self) -> bool {
        self.samples > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_is_used() {
        let settings = RenderSettings::default();
        assert_eq!(settings.passes, StepKind::DEFAULT_PIPELINE.to_vec());
        assert!(settings.wants_multisample());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "hdr": true, "samples": 1 }"#).unwrap();
        assert!(settings.hdr);
        assert!(!settings.wants_multisample());
        assert_eq!(settings.max_light_levels, 4);
        assert_eq!(settings.passes.len(), StepKind::DEFAULT_PIPELINE.len());
    }
}
