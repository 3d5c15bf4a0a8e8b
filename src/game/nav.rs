//! Navigation Grid
//!
//! Blocked/open grid over the square play area, baked once from static
//! obstacle footprints inflated by the crowd radius. Crowd agents sample
//! random open cells as wander targets and A* between cells.
//!
//! ```text
//!   -half                                  +half   (X →)
//!     ┌────┬────┬────┬────┐
//!     │ 0,0│ 1,0│ 2,0│ ...│   cell (col, row) covers
//!     ├────┼────┼────┼────┤   [-half + col*size, -half + (col+1)*size)
//!     │ 0,1│ ## │ ## │    │   on X, likewise row on Z
//!     └────┴────┴────┴────┘
//! ```
//!
//! The grid never observes dynamic obstacles moving; agents may path
//! through a crate's current position and rely on collision instead.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use glam::Vec3;

use crate::core::constants::{CROWD_RADIUS, NAV_CELL_SIZE, RANDOM_OPEN_ATTEMPTS};
use crate::core::rng::DeterministicRng;
use crate::game::collision::Aabb;

/// Grid cell as (column, row).
pub type Cell = (usize, usize);

/// Static blocked-cell grid.
#[derive(Clone, Debug)]
pub struct NavGrid {
    half_extent: f32,
    cell_size: f32,
    /// Cells per side
    dim: usize,
    /// Row-major, `dim * dim`
    blocked: Vec<bool>,
}

impl NavGrid {
    /// Bake a grid from obstacle footprints.
    ///
    /// A cell is blocked when its rectangle overlaps any footprint grown
    /// by the crowd radius. Bad dimensions fall back to a single cell or
    /// the default cell size.
    pub fn build<I>(half_extent: f32, cell_size: f32, footprints: I) -> Self
    where
        I: IntoIterator<Item = Aabb>,
    {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            NAV_CELL_SIZE
        };
        let half_extent = if half_extent.is_finite() && half_extent > 0.0 {
            half_extent
        } else {
            cell_size * 0.5
        };
        let dim = ((2.0 * half_extent / cell_size).ceil() as usize).max(1);

        let mut grid = Self {
            half_extent,
            cell_size,
            dim,
            blocked: vec![false; dim * dim],
        };

        for footprint in footprints {
            grid.block_footprint(&footprint.inflate_xz(CROWD_RADIUS));
        }

        grid
    }

    /// Grid with no blocked cells.
    pub fn open(half_extent: f32, cell_size: f32) -> Self {
        Self::build(half_extent, cell_size, std::iter::empty())
    }

    fn block_footprint(&mut self, footprint: &Aabb) {
        let (min_col, min_row) = self.world_to_cell(footprint.min.x, footprint.min.z);
        let (max_col, max_row) = self.world_to_cell(footprint.max.x, footprint.max.z);

        for row in min_row..=max_row {
            for col in min_col..=max_col {
                if self.cell_rect(col, row).overlaps_xz(footprint) {
                    self.blocked[row * self.dim + col] = true;
                }
            }
        }
    }

    fn cell_rect(&self, col: usize, row: usize) -> Aabb {
        let min_x = -self.half_extent + col as f32 * self.cell_size;
        let min_z = -self.half_extent + row as f32 * self.cell_size;
        Aabb {
            min: Vec3::new(min_x, 0.0, min_z),
            max: Vec3::new(min_x + self.cell_size, 0.0, min_z + self.cell_size),
        }
    }

    /// Cells per side.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Cell edge length.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Cell containing a world point, clamped to the grid.
    pub fn world_to_cell(&self, x: f32, z: f32) -> Cell {
        let max = (self.dim - 1) as f32;
        // NaN casts to 0
        let col = ((x + self.half_extent) / self.cell_size).floor().max(0.0).min(max) as usize;
        let row = ((z + self.half_extent) / self.cell_size).floor().max(0.0).min(max) as usize;
        (col, row)
    }

    /// World-space centre of a cell (y = 0).
    pub fn cell_center(&self, (col, row): Cell) -> Vec3 {
        Vec3::new(
            -self.half_extent + (col as f32 + 0.5) * self.cell_size,
            0.0,
            -self.half_extent + (row as f32 + 0.5) * self.cell_size,
        )
    }

    /// Whether a cell is blocked. Out-of-range cells count as blocked.
    pub fn is_blocked(&self, (col, row): Cell) -> bool {
        if col >= self.dim || row >= self.dim {
            return true;
        }
        self.blocked[row * self.dim + col]
    }

    /// Number of blocked cells.
    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|b| **b).count()
    }

    /// Centre of a random open cell, or None if every sampled cell was blocked.
    ///
    /// Tries a fixed number of cells; it does not search exhaustively.
    pub fn random_open(&self, rng: &mut DeterministicRng) -> Option<Vec3> {
        for _ in 0..RANDOM_OPEN_ATTEMPTS {
            let col = rng.next_int(self.dim as u32) as usize;
            let row = rng.next_int(self.dim as u32) as usize;
            if !self.is_blocked((col, row)) {
                return Some(self.cell_center((col, row)));
            }
        }
        None
    }

    /// A* between the cells containing the two world points.
    ///
    /// Returns cell centres from start to goal inclusive, or None if the
    /// goal cell is blocked or unreachable. The start cell is always the
    /// first element even if it is blocked.
    pub fn find_path(&self, start_x: f32, start_z: f32, goal_x: f32, goal_z: f32) -> Option<Vec<Vec3>> {
        let start = self.world_to_cell(start_x, start_z);
        let goal = self.world_to_cell(goal_x, goal_z);
        let cells = self.find_cell_path(start, goal)?;
        Some(cells.into_iter().map(|cell| self.cell_center(cell)).collect())
    }

    /// A* over cells with a Manhattan heuristic and 4-connected moves.
    ///
    /// Equal f-scores pop lower h first, then earlier insertion.
    pub fn find_cell_path(&self, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
        if self.is_blocked(goal) || start.0 >= self.dim || start.1 >= self.dim {
            return None;
        }

        let index = |(col, row): Cell| row * self.dim + col;
        let heuristic = |(col, row): Cell| (col.abs_diff(goal.0) + row.abs_diff(goal.1)) as u32;

        let total = self.dim * self.dim;
        let mut g_score = vec![u32::MAX; total];
        let mut came_from: Vec<Option<usize>> = vec![None; total];
        let mut closed = vec![false; total];
        let mut open = BinaryHeap::new();
        let mut counter: u64 = 0;

        g_score[index(start)] = 0;
        open.push(Reverse((heuristic(start), heuristic(start), counter, index(start))));

        while let Some(Reverse((_, _, _, current))) = open.pop() {
            if closed[current] {
                continue;
            }
            closed[current] = true;

            let cell = (current % self.dim, current / self.dim);
            if cell == goal {
                return Some(self.reconstruct(&came_from, current));
            }

            let next_g = g_score[current].saturating_add(1);
            for neighbor in self.neighbors(cell) {
                let n = index(neighbor);
                if closed[n] || self.blocked[n] || next_g >= g_score[n] {
                    continue;
                }
                g_score[n] = next_g;
                came_from[n] = Some(current);
                counter += 1;
                let h = heuristic(neighbor);
                open.push(Reverse((next_g + h, h, counter, n)));
            }
        }

        None
    }

    fn neighbors(&self, (col, row): Cell) -> impl Iterator<Item = Cell> {
        let dim = self.dim;
        let up = row.checked_sub(1).map(|r| (col, r));
        let down = (row + 1 < dim).then_some((col, row + 1));
        let left = col.checked_sub(1).map(|c| (c, row));
        let right = (col + 1 < dim).then_some((col + 1, row));
        [up, right, down, left].into_iter().flatten()
    }

    fn reconstruct(&self, came_from: &[Option<usize>], end: usize) -> Vec<Cell> {
        let mut path = vec![(end % self.dim, end / self.dim)];
        let mut current = end;
        while let Some(prev) = came_from[current] {
            path.push((prev % self.dim, prev / self.dim));
            current = prev;
        }
        path.reverse();
        path
    }
}

// =============================================================================
// TESTS
// =============================================================================
