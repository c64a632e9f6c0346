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

//! Light-space projections for shadow depth buffers.
//!
//! Spot lights split their range into cascade levels with the practical
//! split scheme, a blend of logarithmic and uniform splits. Directional lights
//! fit an orthographic box around the scene bounds. Point lights render a
//! single downward-facing level.

use glam::{Mat4, Vec3};
use prism_core::renderer::{LightType, SceneBounds, SceneLight};
use std::f32::consts::{FRAC_PI_2, PI};

/// Blend factor between logarithmic (1.0) and uniform (0.0) splits.
pub const SPLIT_LAMBDA: f32 = 0.5;

const MIN_NEAR: f32 = 0.05;

/// Distances splitting `[near, far]` into `levels` cascades.
///
/// Returns `levels + 1` increasing distances, the first being `near` and the
/// last `far`.
pub fn cascade_splits(near: f32, far: f32, levels: u32, lambda: f32) -> Vec<f32> {
    let levels = levels.max(1);
    (0..=levels)
        .map(|i| {
            let t = i as f32 / levels as f32;
            let logarithmic = near * (far / near).powf(t);
            let uniform = near + (far - near) * t;
            lambda * logarithmic + (1.0 - lambda) * uniform
        })
        .collect()
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

fn direction_or_down(direction: Vec3) -> Vec3 {
    let direction = direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        Vec3::NEG_Y
    } else {
        direction
    }
}

/// The projection used to render `level` of `light`, out of `levels`.
pub fn light_view_projection(
    light: &SceneLight,
    level: u32,
    levels: u32,
    bounds: &SceneBounds,
) -> Mat4 {
    match light.light {
        LightType::Directional(directional) => {
            let direction = direction_or_down(directional.direction);
            let radius = bounds.radius.max(MIN_NEAR);
            let eye = bounds.center - direction * (2.0 * radius);
            let view = Mat4::look_at_rh(eye, bounds.center, up_for(direction));
            let projection =
                Mat4::orthographic_rh(-radius, radius, -radius, radius, radius, 3.0 * radius);
            projection * view
        }
        LightType::Point(point) => {
            let view = Mat4::look_at_rh(
                light.position,
                light.position + Vec3::NEG_Y,
                up_for(Vec3::NEG_Y),
            );
            let far = point.range.max(2.0 * MIN_NEAR);
            Mat4::perspective_rh(FRAC_PI_2, 1.0, MIN_NEAR, far) * view
        }
        LightType::Spot(spot) => {
            let direction = direction_or_down(spot.direction);
            let far = spot.range.max(2.0 * MIN_NEAR);
            let near = (far * 0.01).max(MIN_NEAR);
            let levels = levels.max(1);
            let splits = cascade_splits(near, far, levels, SPLIT_LAMBDA);
            let level = level.min(levels - 1) as usize;
            let fov = (2.0 * spot.outer_cone_angle).clamp(0.01, PI - 0.01);

            let view = Mat4::look_at_rh(
                light.position,
                light.position + direction,
                up_for(direction),
            );
            Mat4::perspective_rh(fov, 1.0, splits[level], splits[level + 1]) * view
        }
    }
}

/// Maps clip space to depth-texture space: `x` and `y` from `[-1, 1]` to `[0, 1]`.
pub fn clip_to_texture() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, 0.5, 1.0))
}

/// The world-to-texture transform of a light projection.
pub fn world_to_texture(view_projection: Mat4) -> Mat4 {
    clip_to_texture() * view_projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use prism_core::renderer::{DirectionalLight, SpotLight};

    #[test]
    fn test_splits_span_the_range() {
        let splits = cascade_splits(0.1, 100.0, 4, SPLIT_LAMBDA);
        assert_eq!(splits.len(), 5);
        assert_relative_eq!(splits[0], 0.1, epsilon = 1e-4);
        assert_relative_eq!(splits[4], 100.0, epsilon = 1e-3);
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_directional_maps_scene_center_to_texture_center() {
        let light = SceneLight::new(
            LightType::Directional(DirectionalLight {
                direction: Vec3::NEG_Y,
                ..Default::default()
            }),
            Vec3::ZERO,
        );
        let bounds = SceneBounds {
            center: Vec3::new(1.0, 2.0, 3.0),
            radius: 10.0,
        };
        let matrix = world_to_texture(light_view_projection(&light, 0, 1, &bounds));
        let p = matrix.project_point3(bounds.center);
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-5);
        assert_relative_eq!(p.z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_spot_levels_tile_the_range() {
        let spot = SpotLight {
            direction: Vec3::NEG_Z,
            range: 20.0,
            ..Default::default()
        };
        let light = SceneLight::new(LightType::Spot(spot), Vec3::ZERO);
        let bounds = SceneBounds::default();
        let splits = cascade_splits(0.2, 20.0, 3, SPLIT_LAMBDA);
        let boundary = Vec3::new(0.0, 0.0, -splits[1]);

        let level0 = light_view_projection(&light, 0, 3, &bounds).project_point3(boundary);
        let level1 = light_view_projection(&light, 1, 3, &bounds).project_point3(boundary);
        assert_relative_eq!(level0.z, 1.0, epsilon = 1e-4);
        assert_relative_eq!(level1.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(level0.x, 0.0, epsilon = 1e-5);
    }
}
