//! Spiral allocator for non-overlapping arena placements

use std::collections::HashSet;
use std::ops::Add;

use parking_lot::Mutex;
use serde::Serialize;

use crate::world::BlockPos;

/// A cell on the placement grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const ORIGIN: GridPos = GridPos { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World-space origin of the region this cell reserves
    pub fn region_origin(&self, spacing: i32) -> BlockPos {
        BlockPos::new(self.x * spacing + spacing, 0, self.y * spacing + spacing)
    }
}

impl Add for GridPos {
    type Output = GridPos;

    fn add(self, o: GridPos) -> GridPos {
        GridPos::new(self.x + o.x, self.y + o.y)
    }
}

/// Occupancy of the placement grid.
///
/// `next` walks a square spiral from the origin and returns the first open
/// cell within `max_radius` rings. Reservation is a separate `close` call.
#[derive(Debug)]
pub struct Grid {
    max_radius: u32,
    closed: Mutex<HashSet<GridPos>>,
}

impl Grid {
    pub fn new(max_radius: u32) -> Self {
        Self {
            max_radius,
            closed: Mutex::new(HashSet::new()),
        }
    }

    /// Number of cells the spiral may hand out
    pub fn capacity(&self) -> usize {
        let side = 2 * self.max_radius as usize + 1;
        side * side
    }

    pub fn occupied(&self) -> usize {
        self.closed.lock().len()
    }

    pub fn is_closed(&self, pos: GridPos) -> bool {
        self.closed.lock().contains(&pos)
    }

    /// First open cell in spiral order, `None` once every cell is closed
    pub fn next(&self) -> Option<GridPos> {
        let closed = self.closed.lock();
        self.first_open(&closed)
    }

    pub fn close(&self, pos: GridPos) {
        self.closed.lock().insert(pos);
    }

    pub fn open(&self, pos: GridPos) {
        self.closed.lock().remove(&pos);
    }

    /// Find and close the next open cell under a single lock
    pub fn reserve(&self) -> Option<GridPos> {
        let mut closed = self.closed.lock();
        let pos = self.first_open(&closed)?;
        closed.insert(pos);
        Some(pos)
    }

    fn first_open(&self, closed: &HashSet<GridPos>) -> Option<GridPos> {
        if closed.is_empty() {
            return Some(GridPos::ORIGIN);
        }

        let mut pos = GridPos::ORIGIN;
        let mut dir = GridPos::new(0, -1);
        // the first (2r+1)^2 spiral steps cover exactly [-r, r]^2
        for _ in 0..self.capacity() {
            if !closed.contains(&pos) {
                return Some(pos);
            }
            if pos.x == pos.y || (pos.x < 0 && pos.x == -pos.y) || (pos.x > 0 && pos.x == 1 - pos.y)
            {
                dir = GridPos::new(-dir.y, dir.x);
            }
            pos = pos + dir;
        }
        None
    }
}
