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

//! Drives the Prism pipeline without a window: paints until the light pass
//! settles, captures the frame to a PNG and picks a few positions.
//!
//! Usage: `headless [settings.json] [output.png]`

mod scene;

use anyhow::{Context, Result};
use prism_agents::RenderAgent;
use prism_core::math::Vec3;
use prism_core::renderer::{
    GraphicsDevice, LightType, PickKind, PixelFormat, RenderSettings, SceneLight, SpotLight,
};
use prism_infra::SoftwareDevice;
use scene::TileScene;
use std::sync::Arc;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 192;

fn load_settings(path: Option<&str>) -> Result<RenderSettings> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid settings in {path}"))
        }
        None => Ok(RenderSettings {
            light_texture_size: 256,
            ..Default::default()
        }),
    }
}

#[cfg(not(feature = "wgpu"))]
fn create_device() -> Result<(Arc<dyn GraphicsDevice>, Option<Arc<SoftwareDevice>>)> {
    let device = Arc::new(SoftwareDevice::new(WIDTH, HEIGHT));
    Ok((device.clone(), Some(device)))
}

#[cfg(feature = "wgpu")]
fn create_device() -> Result<(Arc<dyn GraphicsDevice>, Option<Arc<SoftwareDevice>>)> {
    let device = prism_infra::WgpuDevice::headless(WIDTH, HEIGHT)?;
    Ok((Arc::new(device), None))
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = load_settings(args.first().map(String::as_str))?;
    let output = args.get(1).map_or("prism_frame.png", String::as_str);
    log::info!("Settings: {}", serde_json::to_string_pretty(&settings)?);

    let (device, software) = create_device()?;
    let agent = RenderAgent::new(device, settings);
    agent.initialize()?;
    agent.resize(WIDTH, HEIGHT)?;
    let spot = LightType::Spot(SpotLight::default());
    agent.set_lights(&[
        SceneLight::new(spot, Vec3::new(-2.0, 6.0, 1.0)),
        SceneLight::new(spot, Vec3::new(3.0, 5.0, -1.0)),
    ])?;

    let mut scene = TileScene::new(software);
    let mut frames = 0;
    while agent.needs_redraw() && frames < 32 {
        let report = agent.paint(&mut scene)?;
        frames += 1;
        log::info!(
            "Frame {frames}: started at stage {}, {} steps run, {} failed, light levels {}",
            report.start_stage,
            report.executed,
            report.failures.len(),
            agent.rendered_light_levels()?
        );
    }
    log::info!(
        "Pipeline settled after {frames} frames and {} light units",
        scene.light_units
    );

    let capture = agent.render_to_image(&mut scene, WIDTH, HEIGHT, PixelFormat::Rgba8, true)?;
    image::RgbaImage::from_raw(capture.width, capture.height, capture.pixels)
        .context("Captured buffer does not match its dimensions")?
        .save(output)
        .with_context(|| format!("Failed to write {output}"))?;
    log::info!("Wrote {output}");

    for position in [(40, 40), (120, 100), (200, 160), (240, 10)] {
        match agent.perform_pick(&mut scene, PickKind::default(), position)? {
            Some(result) => log::info!(
                "Pick at {position:?}: '{}' (ID {})",
                result.downcast_ref::<&str>().copied().unwrap_or("?"),
                result.hit().id
            ),
            None => log::info!("Pick at {position:?}: nothing"),
        }
    }

    agent.release()?;
    Ok(())
}
