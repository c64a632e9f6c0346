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

//! The order in which the cells of the readback window are searched.

/// Edge length of the square readback window, in pixels.
pub const PICK_WINDOW: u32 = 9;

const HALF: i32 = (PICK_WINDOW / 2) as i32;
const CELLS: usize = (PICK_WINDOW * PICK_WINDOW) as usize;

/// Offsets from the centre of the window, in square-spiral order.
///
/// The spiral turns after legs of 1, 1, 2, 2, 3, 3, ... cells, which covers
/// the whole window exactly once.
pub const SPIRAL_ORDER: [(i32, i32); CELLS] = spiral();

const fn spiral() -> [(i32, i32); CELLS] {
    const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

    let mut cells = [(0, 0); CELLS];
    let (mut x, mut y) = (0, 0);
    let mut filled = 1;
    let mut leg = 1;
    let mut turn = 0;
    while filled < CELLS {
        let (dx, dy) = DIRECTIONS[turn % 4];
        let mut step = 0;
        while step < leg && filled < CELLS {
            x += dx;
            y += dy;
            if x >= -HALF && x <= HALF && y >= -HALF && y <= HALF {
                cells[filled] = (x, y);
                filled += 1;
            }
            step += 1;
        }
        turn += 1;
        if turn % 2 == 0 {
            leg += 1;
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_spiral_starts_at_center() {
        assert_eq!(SPIRAL_ORDER[0], (0, 0));
        assert_eq!(SPIRAL_ORDER[1], (1, 0));
        assert_eq!(SPIRAL_ORDER[2], (1, 1));
    }

    #[test]
    fn test_spiral_visits_each_cell_once() {
        assert_eq!(SPIRAL_ORDER.len(), 81);
        let unique: HashSet<_> = SPIRAL_ORDER.iter().collect();
        assert_eq!(unique.len(), 81);
        assert!(SPIRAL_ORDER
            .iter()
            .all(|&(x, y)| x.abs() <= HALF && y.abs() <= HALF));
    }

    #[test]
    fn test_spiral_distance_never_decreases_by_ring() {
        let ring = |&(x, y): &(i32, i32)| x.abs().max(y.abs());
        assert!(SPIRAL_ORDER.windows(2).all(|w| ring(&w[1]) >= ring(&w[0])));
    }
}
