//! Spatial types and the contracts the core uses to touch the game world

use std::ops::{Add, Sub};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::combatant::Combatant;
use crate::game::arena::ArenaTemplate;

/// A point in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Length of the vector projected onto the horizontal plane
    pub fn horizontal_len(&self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

/// An integer block position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, d: Dimensions) -> BlockPos {
        BlockPos::new(self.x + d.x, self.y + d.y, self.z + d.z)
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

/// Size of a structure along each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// An axis-aligned region between two corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub min: BlockPos,
    pub max: BlockPos,
}

/// Something that can be stamped into the world at an origin
#[derive(Debug, Clone, Copy)]
pub enum Structure<'a> {
    /// An authored arena
    Arena(&'a ArenaTemplate),
    /// Void of the given size, used to wipe a region
    Empty(Dimensions),
}

impl Structure<'_> {
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Structure::Arena(t) => t.dimensions,
            Structure::Empty(d) => *d,
        }
    }
}

/// The shared world all arena instances are materialised into.
///
/// Implementations must not call back into a match or provider: they are
/// invoked while match state is locked.
pub trait ArenaWorld: Send + Sync {
    /// Stamp a structure with its minimum corner at `origin`
    fn build_structure(&self, origin: BlockPos, structure: Structure<'_>);

    /// Reset a single block to air
    fn clear_block(&self, pos: BlockPos);

    /// Remove every non-combatant entity inside the region
    fn remove_entities_within(&self, region: Region);

    /// Move a combatant into the arena world
    fn add_combatant(&self, combatant: &Arc<dyn Combatant>);
}

/// The neutral area combatants return to between fights
pub trait Lobby: Send + Sync {
    fn add(&self, combatant: &Arc<dyn Combatant>);
    fn remove(&self, combatant: &Arc<dyn Combatant>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(0.5, 0.5, 0.5);
        assert_eq!(a + b, Vec3::new(1.5, 2.5, 3.5));
        assert_eq!(a - b, Vec3::new(0.5, 1.5, 2.5));
        assert_eq!(Vec3::new(3.0, 10.0, 4.0).horizontal_len(), 5.0);
    }

    #[test]
    fn block_offset() {
        let origin = BlockPos::new(1000, 0, 2000);
        let max = origin.offset(Dimensions { x: 50, y: 20, z: 60 });
        assert_eq!(max, BlockPos::new(1050, 20, 2060));
    }
}
