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

//! Picking identifiers and the per-pass registration table.
//!
//! During a picking pass every drawable asks the [`PickingRegistry`] for a
//! contiguous range of IDs and renders them packed into the RGB channels
//! (see [`encode_pick_id`]). The registration remembers how to turn an ID of
//! its range back into a typed result.

use crate::renderer::error::PickingError;
use std::any::Any;
use std::fmt;

/// Number of bits available for picking IDs.
pub const PICK_ID_BITS: u32 = 24;

/// The largest encodable picking ID.
pub const MAX_PICK_ID: u32 = (1 << PICK_ID_BITS) - 1;

/// The ID of pixels no drawable covered.
pub const NO_HIT: u32 = 0;

/// Packs `id` into an RGBA8 pixel: R holds bits 0-7, G bits 8-15, B bits 16-23.
pub fn encode_pick_id(id: u32) -> [u8; 4] {
    [
        (id & 0xFF) as u8,
        ((id >> 8) & 0xFF) as u8,
        ((id >> 16) & 0xFF) as u8,
        0xFF,
    ]
}

/// Unpacks an ID written with [`encode_pick_id`]. Alpha is ignored.
pub fn decode_pick_id(pixel: [u8; 4]) -> u32 {
    pixel[0] as u32 | (pixel[1] as u32) << 8 | (pixel[2] as u32) << 16
}

/// Caller-defined category of a pick request, forwarded to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PickKind(pub u32);

/// A decoded pixel of the picking buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickHit {
    /// The decoded ID.
    pub id: u32,
    /// Offset of the ID inside its registration range.
    pub index: u32,
    /// The kind of the request.
    pub kind: PickKind,
    /// The requested position, in window coordinates.
    pub position: (i32, i32),
}

/// Builds a typed result out of a raw hit; `None` filters the hit out.
pub type PickFactory = Box<dyn Fn(&PickHit) -> Option<Box<dyn Any>>>;

/// A typed picking result.
pub struct PickResult {
    hit: PickHit,
    value: Box<dyn Any>,
}

impl PickResult {
    /// Wraps a factory output.
    pub fn new(hit: PickHit, value: Box<dyn Any>) -> Self {
        Self { hit, value }
    }

    /// The raw hit the result was built from.
    pub fn hit(&self) -> &PickHit {
        &self.hit
    }

    /// Returns `true` if the result holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the result as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Takes the result as a `T`, giving `self` back on mismatch.
    pub fn downcast<T: Any>(self) -> Result<Box<T>, Self> {
        let hit = self.hit;
        self.value
            .downcast::<T>()
            .map_err(|value| PickResult { hit, value })
    }
}

impl fmt::Debug for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickResult")
            .field("hit", &self.hit)
            .finish_non_exhaustive()
    }
}

/// One contiguous ID range of a picking pass.
pub struct PickingRegistration {
    /// The first ID of the range.
    pub base: u32,
    /// The number of IDs.
    pub count: u32,
    factory: PickFactory,
}

impl PickingRegistration {
    /// One past the last ID of the range.
    pub fn end(&self) -> u32 {
        self.base + self.count
    }

    /// Returns `true` if `id` belongs to the range.
    pub fn contains(&self, id: u32) -> bool {
        id >= self.base && id < self.end()
    }

    /// Runs the factory for `hit`.
    pub fn build(&self, hit: &PickHit) -> Option<Box<dyn Any>> {
        (self.factory)(hit)
    }
}

impl fmt::Debug for PickingRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickingRegistration")
            .field("base", &self.base)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

/// Registrations of a single picking pass.
///
/// IDs are handed out sequentially, starting at 1, while the pass runs.
/// Ranges are strictly increasing and never overlap.
#[derive(Debug)]
pub struct PickingRegistry {
    registrations: Vec<PickingRegistration>,
    next_id: u32,
}

impl Default for PickingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PickingRegistry {
    /// Creates an empty registry whose first allocation starts at 1.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            next_id: NO_HIT + 1,
        }
    }

    /// Allocates the next `count` IDs for one drawable and returns the base ID.
    pub fn allocate<F>(&mut self, count: u32, factory: F) -> Result<u32, PickingError>
    where
        F: Fn(&PickHit) -> Option<Box<dyn Any>> + 'static,
    {
        let base = self.next_id;
        self.register(base, count, factory)?;
        Ok(base)
    }

    /// Records an explicit range `[base, base + count)`.
    ///
    /// The range must start at or after the end of the previous one and fit
    /// the 24-bit ID space.
    pub fn register<F>(&mut self, base: u32, count: u32, factory: F) -> Result<(), PickingError>
    where
        F: Fn(&PickHit) -> Option<Box<dyn Any>> + 'static,
    {
        if count == 0 {
            return Err(PickingError::EmptyRange { base });
        }
        if let Some(previous) = self.registrations.last() {
            if base < previous.end() {
                return Err(PickingError::OverlappingRange {
                    base,
                    previous_end: previous.end(),
                });
            }
        }
        let end = base as u64 + count as u64;
        if end > MAX_PICK_ID as u64 + 1 {
            return Err(PickingError::IdSpaceExhausted {
                requested: count,
                available: (MAX_PICK_ID + 1).saturating_sub(base),
            });
        }

        self.registrations.push(PickingRegistration {
            base,
            count,
            factory: Box::new(factory),
        });
        self.next_id = end as u32;
        Ok(())
    }

    /// Finds the registration owning `id` by linear scan.
    pub fn find(&self, id: u32) -> Option<&PickingRegistration> {
        if id == NO_HIT {
            return None;
        }
        self.registrations.iter().find(|r| r.contains(id))
    }

    /// The next ID [`allocate`](Self::allocate) would hand out.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// All registrations in ID order.
    pub fn registrations(&self) -> &[PickingRegistration] {
        &self.registrations
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Forgets every registration and restarts allocation at 1.
    pub fn clear(&mut self) {
        self.registrations.clear();
        self.next_id = NO_HIT + 1;
    }
}
