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

//! Defines light types for the frame pipeline.
//!
//! Only the data the shadow pass needs lives here: the light shape, its
//! placement and whether it casts shadows. Shading itself belongs to the
//! scene.

use crate::math::Vec3;

/// A directional light source that illuminates from a uniform direction.
///
/// Directional lights simulate infinitely distant light sources like the sun.
/// They have no position, only a direction, and cast parallel rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// The direction the light is pointing (normalized).
    pub direction: Vec3,
    /// The colour of the light in linear RGB space.
    pub color: Vec3,
    /// The intensity multiplier for the light.
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// A point light source that emits light in all directions from a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// The colour of the light in linear RGB space.
    pub color: Vec3,
    /// The intensity of the light.
    pub intensity: f32,
    /// The maximum range of the light in world units.
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 100.0,
            range: 10.0,
        }
    }
}

/// A spot light source that emits light in a cone from a single point.
///
/// Spot lights are the only lights rendered with several cascade levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// The direction the spotlight is pointing (normalized).
    pub direction: Vec3,
    /// The colour of the light in linear RGB space.
    pub color: Vec3,
    /// The intensity of the light.
    pub intensity: f32,
    /// The maximum range of the light in world units.
    pub range: f32,
    /// The angle in radians at which the light begins to fall off.
    pub inner_cone_angle: f32,
    /// The angle in radians at which the light is fully attenuated.
    pub outer_cone_angle: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::ONE,
            intensity: 200.0,
            range: 15.0,
            inner_cone_angle: 20.0_f32.to_radians(),
            outer_cone_angle: 35.0_f32.to_radians(),
        }
    }
}

/// An enumeration of all supported light types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightType {
    /// A directional light (sun-like, infinite distance, no falloff).
    Directional(DirectionalLight),
    /// A point light (omni-directional with distance falloff).
    Point(PointLight),
    /// A spotlight (cone-shaped with distance and angular falloff).
    Spot(SpotLight),
}

impl Default for LightType {
    fn default() -> Self {
        LightType::Directional(DirectionalLight::default())
    }
}

impl LightType {
    /// The discriminant of the light, without its parameters.
    pub fn kind(&self) -> LightKind {
        match self {
            LightType::Directional(_) => LightKind::Directional,
            LightType::Point(_) => LightKind::Point,
            LightType::Spot(_) => LightKind::Spot,
        }
    }
}

/// The shape of a light, used to detect configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// See [`DirectionalLight`].
    Directional,
    /// See [`PointLight`].
    Point,
    /// See [`SpotLight`].
    Spot,
}

impl LightKind {
    /// Number of cascade levels this kind of light uses when `max_levels` are configured.
    ///
    /// Only spot lights are split into cascades; every other light renders level 0 only.
    pub fn levels(&self, max_levels: u32) -> u32 {
        match self {
            LightKind::Spot => max_levels,
            _ => max_levels.min(1),
        }
    }
}

/// A light placed in the scene, as handed to the shadow pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SceneLight {
    /// The light parameters.
    pub light: LightType,
    /// World-space position. Ignored for directional lights.
    pub position: Vec3,
    /// Whether the light needs depth textures at all.
    pub casts_shadows: bool,
}

impl SceneLight {
    /// A shadow-casting light at `position`.
    pub fn new(light: LightType, position: Vec3) -> Self {
        Self {
            light,
            position,
            casts_shadows: true,
        }
    }

    /// Shortcut for `self.light.kind()`.
    pub fn kind(&self) -> LightKind {
        self.light.kind()
    }
}

/// A bounding sphere of the shadow casters, used to fit directional shadows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBounds {
    /// The centre of the sphere.
    pub center: Vec3,
    /// The radius of the sphere.
    pub radius: f32,
}

impl Default for SceneBounds {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_directional_light_default() {
        let light = DirectionalLight::default();
        assert_eq!(light.color, Vec3::ONE);
        assert_relative_eq!(light.direction.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_spot_light_default() {
        let light = SpotLight::default();
        assert!(light.inner_cone_angle < light.outer_cone_angle);
        assert_relative_eq!(light.direction.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_only_spot_lights_use_cascades() {
        assert_eq!(LightKind::Spot.levels(4), 4);
        assert_eq!(LightKind::Point.levels(4), 1);
        assert_eq!(LightKind::Directional.levels(4), 1);
        assert_eq!(LightKind::Directional.levels(0), 0);
    }

    #[test]
    fn test_scene_light_kind() {
        let light = SceneLight::new(LightType::Spot(SpotLight::default()), Vec3::Y);
        assert_eq!(light.kind(), LightKind::Spot);
        assert!(light.casts_shadows);
        assert_eq!(SceneLight::default().kind(), LightKind::Directional);
    }
}
