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

//! A flat scene of coloured rectangles, drawn with the software rasterizer.

use prism_core::math::Rect;
use prism_core::renderer::{encode_pick_id, PassContext, PassKind, SceneRenderer};
use prism_infra::SoftwareDevice;
use std::any::Any;
use std::sync::Arc;

/// A rectangle of the demo scene, in window pixels (origin top-left).
#[derive(Debug, Clone)]
pub struct Tile {
    pub name: &'static str,
    pub rect: Rect,
    pub color: [f32; 4],
    pub depth: f32,
}

/// The demo scene. Without a software device it draws nothing and only
/// exercises the pipeline.
#[derive(Debug)]
pub struct TileScene {
    device: Option<Arc<SoftwareDevice>>,
    tiles: Vec<Tile>,
    pub light_units: usize,
}

impl TileScene {
    pub fn new(device: Option<Arc<SoftwareDevice>>) -> Self {
        let tiles = vec![
            Tile {
                name: "red",
                rect: Rect::new(16, 16, 96, 64),
                color: [0.9, 0.2, 0.2, 1.0],
                depth: 0.5,
            },
            Tile {
                name: "green",
                rect: Rect::new(80, 48, 96, 96),
                color: [0.2, 0.8, 0.3, 1.0],
                depth: 0.4,
            },
            Tile {
                name: "blue",
                rect: Rect::new(160, 120, 64, 80),
                color: [0.2, 0.4, 0.9, 1.0],
                depth: 0.6,
            },
        ];
        Self {
            device,
            tiles,
            light_units: 0,
        }
    }

    /// Converts a top-down window rectangle to device rows.
    fn to_device(rect: Rect, viewport: Rect) -> Rect {
        let y = viewport.top() - rect.top();
        Rect::new(rect.x + viewport.x, y, rect.width, rect.height)
    }
}

impl SceneRenderer for TileScene {
    fn render(&mut self, ctx: &mut PassContext<'_>) -> anyhow::Result<()> {
        if ctx.pass == PassKind::Light {
            self.light_units += 1;
            return Ok(());
        }
        let Some(device) = &self.device else {
            return Ok(());
        };
        match ctx.pass {
            PassKind::Background => {
                device.fill_rect(ctx.viewport, [0.1, 0.1, 0.15, 1.0], 1.0)?;
            }
            PassKind::Normal => {
                for tile in &self.tiles {
                    let rect = Self::to_device(tile.rect, ctx.viewport);
                    device.fill_rect(rect, tile.color, tile.depth)?;
                }
            }
            PassKind::Picking => {
                let Some(picking) = ctx.picking.as_mut() else {
                    return Ok(());
                };
                for tile in &self.tiles {
                    let name = tile.name;
                    let id = picking
                        .registry
                        .allocate(1, move |_| Some(Box::new(name) as Box<dyn Any>))?;
                    let color = encode_pick_id(id).map(|b| b as f32 / 255.0);
                    let rect = Self::to_device(tile.rect, ctx.viewport);
                    device.fill_rect(rect, color, tile.depth)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
