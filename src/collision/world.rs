use bevy::math::DVec3;

use super::{Aabb, CollisionQuery, Hit};

/// Convex brush: intersection of half-spaces `normal · x <= dist`.
///
/// The map importer emits world geometry (including surf ramps) as convex
/// brushes; sloped faces carry the plane normals the controller classifies.
#[derive(Debug, Clone)]
pub struct Brush {
    planes: Vec<(DVec3, f64)>,
}

impl Brush {
    pub fn from_planes(planes: Vec<(DVec3, f64)>) -> Self {
        let planes = planes
            .into_iter()
            .filter(|(n, _)| n.length_squared() > 1e-12)
            .map(|(n, d)| {
                let len = n.length();
                (n / len, d / len)
            })
            .collect();
        Self { planes }
    }

    /// Axis-aligned box as six planes.
    pub fn from_aabb(b: Aabb) -> Self {
        Self {
            planes: vec![
                (DVec3::X, b.max.x),
                (DVec3::NEG_X, -b.min.x),
                (DVec3::Y, b.max.y),
                (DVec3::NEG_Y, -b.min.y),
                (DVec3::Z, b.max.z),
                (DVec3::NEG_Z, -b.min.z),
            ],
        }
    }

    /// Support distance of a centered box with the given half extents
    /// along the plane normal.
    fn support(normal: DVec3, half: DVec3) -> f64 {
        normal.x.abs() * half.x + normal.y.abs() * half.y + normal.z.abs() * half.z
    }

    /// Clips the segment `p0 → p0 + delta` against this brush expanded by
    /// `half`. Returns `(fraction, surface_normal)` of the entry, or None.
    fn clip_segment(&self, p0: DVec3, delta: DVec3, half: DVec3) -> Option<(f64, DVec3)> {
        if self.planes.is_empty() {
            return None;
        }
        let mut t_enter = -1.0_f64;
        let mut t_exit = 1.0_f64;
        let mut enter_normal = DVec3::ZERO;
        let mut starts_out = false;
        // Track the shallowest face for the start-inside push-out case.
        let mut best_inside = f64::NEG_INFINITY;
        let mut inside_normal = DVec3::ZERO;

        for &(n, d) in &self.planes {
            let d = d + Self::support(n, half);
            let dist0 = n.dot(p0) - d;
            let dist1 = n.dot(p0 + delta) - d;

            if dist0 > 0.0 {
                starts_out = true;
            }
            if dist0 > best_inside {
                best_inside = dist0;
                inside_normal = n;
            }

            if dist0 > 0.0 && dist1 > 0.0 {
                return None;
            }
            if dist0 <= 0.0 && dist1 <= 0.0 {
                continue;
            }
            let t = dist0 / (dist0 - dist1);
            if dist0 > 0.0 {
                if t > t_enter {
                    t_enter = t;
                    enter_normal = n;
                }
            } else if t < t_exit {
                t_exit = t;
            }
        }

        if !starts_out {
            // Start position overlaps the brush; report immediate contact
            // along the shallowest face so the mover can push out.
            return Some((0.0, inside_normal));
        }
        if t_enter < t_exit && (0.0..=1.0).contains(&t_enter) {
            return Some((t_enter.max(0.0), enter_normal));
        }
        None
    }
}

/// Deterministic static collision world: swept player box against an AABB
/// list and a convex-brush soup. Queries are pure functions of the inputs;
/// iteration order is the fixed insertion order of the geometry.
#[derive(Debug, Clone, Default)]
pub struct BrushWorld {
    half_extents: DVec3,
    aabbs: Vec<Aabb>,
    brushes: Vec<Brush>,
}

impl BrushWorld {
    /// `half_extents` is the swept player box:
    /// `(player_radius, player_radius, player_half_height)`.
    pub fn new(half_extents: DVec3) -> Self {
        Self {
            half_extents,
            aabbs: Vec::new(),
            brushes: Vec::new(),
        }
    }

    pub fn with_aabbs(mut self, aabbs: Vec<Aabb>) -> Self {
        self.aabbs = aabbs;
        self
    }

    pub fn with_brushes(mut self, brushes: Vec<Brush>) -> Self {
        self.brushes = brushes;
        self
    }

    pub fn push_aabb(&mut self, aabb: Aabb) {
        self.aabbs.push(aabb);
    }

    pub fn push_brush(&mut self, brush: Brush) {
        self.brushes.push(brush);
    }

    pub fn half_extents(&self) -> DVec3 {
        self.half_extents
    }

    fn sweep_with_half(&self, from: DVec3, to: DVec3, half: DVec3) -> Hit {
        if !from.is_finite() || !to.is_finite() {
            return Hit::miss();
        }
        let delta = to - from;
        let mut best: Option<(f64, DVec3, DVec3)> = None;

        for aabb in &self.aabbs {
            if let Some((frac, normal)) = sweep_segment_aabb(from, delta, aabb.expanded(half)) {
                let center = from + delta * frac;
                let contact = aabb.clamp_point(center);
                if best.is_none_or(|(f, _, _)| frac < f) {
                    best = Some((frac, normal, contact));
                }
            }
        }
        for brush in &self.brushes {
            if let Some((frac, normal)) = brush.clip_segment(from, delta, half) {
                let center = from + delta * frac;
                let contact = center - normal * Brush::support(normal, half);
                if best.is_none_or(|(f, _, _)| frac < f) {
                    best = Some((frac, normal, contact));
                }
            }
        }

        match best {
            Some((frac, normal, contact)) if frac.is_finite() && normal.is_finite() => {
                Hit::at(frac, normal, contact)
            }
            _ => Hit::miss(),
        }
    }
}

impl CollisionQuery for BrushWorld {
    fn sweep_closest(&self, from: DVec3, to: DVec3) -> Hit {
        self.sweep_with_half(from, to, self.half_extents)
    }

    fn ray_closest(&self, from: DVec3, to: DVec3) -> Hit {
        self.sweep_with_half(from, to, DVec3::ZERO)
    }
}

/// Segment vs box slab test. Returns the entry fraction and face normal,
/// or the minimum-penetration push-out when the segment starts inside.
fn sweep_segment_aabb(p0: DVec3, delta: DVec3, b: Aabb) -> Option<(f64, DVec3)> {
    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = f64::INFINITY;
    let mut enter_normal = DVec3::ZERO;

    for axis in 0..3 {
        let (o, d, lo, hi, pos_n, neg_n) = match axis {
            0 => (p0.x, delta.x, b.min.x, b.max.x, DVec3::X, DVec3::NEG_X),
            1 => (p0.y, delta.y, b.min.y, b.max.y, DVec3::Y, DVec3::NEG_Y),
            _ => (p0.z, delta.z, b.min.z, b.max.z, DVec3::Z, DVec3::NEG_Z),
        };
        if d.abs() < 1e-12 {
            if o <= lo || o >= hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (t_near, t_far, face_normal) = if inv >= 0.0 {
            ((lo - o) * inv, (hi - o) * inv, neg_n)
        } else {
            ((hi - o) * inv, (lo - o) * inv, pos_n)
        };
        if t_near > t_enter {
            t_enter = t_near;
            enter_normal = face_normal;
        }
        t_exit = t_exit.min(t_far);
        if t_enter > t_exit {
            return None;
        }
    }

    if t_exit <= 0.0 || t_enter > 1.0 {
        return None;
    }
    if t_enter < 0.0 {
        // Started inside: push out along the face with least penetration.
        let pens = [
            (p0.x - b.min.x, DVec3::NEG_X),
            (b.max.x - p0.x, DVec3::X),
            (p0.y - b.min.y, DVec3::NEG_Y),
            (b.max.y - p0.y, DVec3::Y),
            (p0.z - b.min.z, DVec3::NEG_Z),
            (b.max.z - p0.z, DVec3::Z),
        ];
        let mut best = pens[0];
        for pen in &pens[1..] {
            if pen.0 < best.0 {
                best = *pen;
            }
        }
        return Some((0.0, best.1));
    }
    Some((t_enter, enter_normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_world() -> BrushWorld {
        BrushWorld::new(DVec3::new(0.4, 0.4, 0.9)).with_aabbs(vec![Aabb::new(
            DVec3::new(-50.0, -50.0, -1.0),
            DVec3::new(50.0, 50.0, 0.0),
        )])
    }

    #[test]
    fn downward_sweep_hits_floor_with_up_normal() {
        let w = floor_world();
        let hit = w.sweep_closest(DVec3::new(0.0, 0.0, 2.0), DVec3::new(0.0, 0.0, 0.5));
        assert!(hit.has_hit);
        assert_eq!(hit.normal, DVec3::Z);
        // Box bottom reaches the floor when the center is at z = 0.9.
        let expected = (2.0 - 0.9) / 1.5;
        assert!((hit.fraction - expected).abs() < 1e-9);
    }

    #[test]
    fn clear_sweep_misses() {
        let w = floor_world();
        let hit = w.sweep_closest(DVec3::new(0.0, 0.0, 5.0), DVec3::new(3.0, 0.0, 5.0));
        assert!(!hit.has_hit);
        assert_eq!(hit.fraction, 1.0);
    }

    #[test]
    fn ray_ignores_player_extents() {
        let w = floor_world();
        let ray = w.ray_closest(DVec3::new(0.0, 0.0, 2.0), DVec3::new(0.0, 0.0, -1.0));
        // The ray only touches the floor surface itself, at z = 0.
        assert!(ray.has_hit);
        assert!((ray.fraction - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn brush_ramp_reports_sloped_normal() {
        // 45-degree ramp rising toward +y, expressed as a convex brush.
        let n = DVec3::new(0.0, -1.0, 1.0).normalize();
        let ramp = Brush::from_planes(vec![
            (n, 0.0),
            (DVec3::NEG_Z, 10.0),
            (DVec3::X, 20.0),
            (DVec3::NEG_X, 20.0),
            (DVec3::Y, 20.0),
            (DVec3::NEG_Y, 20.0),
        ]);
        let w = BrushWorld::new(DVec3::new(0.4, 0.4, 0.9)).with_brushes(vec![ramp]);
        let hit = w.sweep_closest(DVec3::new(0.0, -6.0, 2.0), DVec3::new(0.0, -6.0, -8.0));
        assert!(hit.has_hit);
        assert!((hit.normal - n).length() < 1e-9);
    }

    #[test]
    fn non_finite_query_is_a_miss() {
        let w = floor_world();
        let hit = w.sweep_closest(DVec3::new(f64::NAN, 0.0, 2.0), DVec3::ZERO);
        assert!(!hit.has_hit);
    }
}
