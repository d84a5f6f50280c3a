//! Shared vector helpers for the simulation core.
//!
//! The sim runs in Z-up world space on `f64` so that replay hashes and wire
//! formats stay bit-stable; the render layer converts at its own boundary.

use bevy::math::DVec3;

pub const EPSILON: f64 = 1e-12;

/// Horizontal (XY) part of a vector.
pub fn horizontal(v: DVec3) -> DVec3 {
    DVec3::new(v.x, v.y, 0.0)
}

/// Horizontal speed.
pub fn horizontal_speed(v: DVec3) -> f64 {
    (v.x * v.x + v.y * v.y).sqrt()
}

/// Unit vector along the horizontal part, or zero when degenerate.
pub fn horizontal_unit(v: DVec3) -> DVec3 {
    let h = horizontal(v);
    if h.length_squared() > EPSILON {
        h.normalize()
    } else {
        DVec3::ZERO
    }
}

/// Normalize, or zero when degenerate.
pub fn normalize_or_zero(v: DVec3) -> DVec3 {
    if v.length_squared() > EPSILON {
        v.normalize()
    } else {
        DVec3::ZERO
    }
}

/// Project onto the plane with the given normal and renormalize.
/// Returns the input unchanged when the normal is degenerate, zero when the
/// projection collapses.
pub fn project_to_plane_unit(v: DVec3, normal: DVec3) -> DVec3 {
    if normal.length_squared() <= EPSILON {
        return v;
    }
    let n = normal.normalize();
    normalize_or_zero(v - n * v.dot(n))
}

/// Quake-style velocity clip against a collision plane.
pub fn clip_velocity(vel: DVec3, normal: DVec3, overbounce: f64) -> DVec3 {
    let n = if normal.length_squared() > EPSILON {
        normal.normalize()
    } else {
        normal
    };
    let mut backoff = vel.dot(n);
    if backoff < 0.0 {
        backoff *= overbounce;
    } else {
        backoff /= overbounce;
    }
    let mut out = vel - n * backoff;
    // Kill sub-micro residue so repeated clips cannot oscillate.
    if out.x.abs() < 1e-6 {
        out.x = 0.0;
    }
    if out.y.abs() < 1e-6 {
        out.y = 0.0;
    }
    if out.z.abs() < 1e-6 {
        out.z = 0.0;
    }
    out
}

/// Minimum `n.z` for a walkable normal given the slope limit.
/// Matches Quake3's MIN_WALK_NORMAL (0.7) when the limit is ~45.57 degrees.
pub fn walkable_threshold_z(max_slope_deg: f64) -> f64 {
    max_slope_deg.to_radians().cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_removes_into_plane_component() {
        let v = clip_velocity(DVec3::new(-2.0, 0.0, 0.0), DVec3::X, 1.0);
        assert_eq!(v, DVec3::ZERO);
    }

    #[test]
    fn clip_keeps_tangential_component() {
        let v = clip_velocity(DVec3::new(-2.0, 3.0, 0.0), DVec3::X, 1.0);
        assert_eq!(v.y, 3.0);
        assert_eq!(v.x, 0.0);
    }

    #[test]
    fn horizontal_unit_of_vertical_is_zero() {
        assert_eq!(horizontal_unit(DVec3::new(0.0, 0.0, 9.0)), DVec3::ZERO);
    }
}
