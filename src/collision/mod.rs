//! Collision interface the motion core consumes, plus the deterministic
//! static-world implementation the crate ships.

mod world;

pub use world::{Brush, BrushWorld};

use bevy::math::DVec3;

/// Axis-aligned box in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half(center: DVec3, half: DVec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Minkowski expansion by a box half-extent.
    pub fn expanded(&self, half: DVec3) -> Self {
        Self {
            min: self.min - half,
            max: self.max + half,
        }
    }

    pub fn contains(&self, p: DVec3) -> bool {
        p.x > self.min.x
            && p.x < self.max.x
            && p.y > self.min.y
            && p.y < self.max.y
            && p.z > self.min.z
            && p.z < self.max.z
    }

    /// Closest point on the box surface/volume to `p`.
    pub fn clamp_point(&self, p: DVec3) -> DVec3 {
        p.clamp(self.min, self.max)
    }
}

/// First-hit result of a sweep or ray query.
///
/// `fraction` is 1.0 on a miss and never negative; `normal` is unit length
/// when `has_hit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub has_hit: bool,
    pub fraction: f64,
    pub normal: DVec3,
    pub position: Option<DVec3>,
}

impl Hit {
    pub fn miss() -> Self {
        Self {
            has_hit: false,
            fraction: 1.0,
            normal: DVec3::ZERO,
            position: None,
        }
    }

    pub fn at(fraction: f64, normal: DVec3, position: DVec3) -> Self {
        Self {
            has_hit: true,
            fraction: fraction.clamp(0.0, 1.0),
            normal,
            position: Some(position),
        }
    }
}

/// Sweep provider for the player volume.
///
/// Implementations must be deterministic: identical queries return identical
/// results, with no dependence on query history.
pub trait CollisionQuery {
    /// Closest hit sweeping the player volume from `from` to `to`.
    fn sweep_closest(&self, from: DVec3, to: DVec3) -> Hit;

    /// Closest hit for a zero-width ray; used by targeting-style tooling.
    fn ray_closest(&self, from: DVec3, to: DVec3) -> Hit;
}
