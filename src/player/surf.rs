use bevy::math::DVec3;

use crate::math;
use crate::motion::{MotionIntent, MotionWriteSource};

use super::controller::PlayerController;

/// Surf contact counts as a ridable surface for this long after last touch.
const SURF_SURFACE_WINDOW: f64 = 0.30;
/// Physics-rule freshness: redirect/plane-gravity only apply this close to
/// actual contact (in ticks' worth of dt).
const SURF_PHYSICS_FRESH_TICKS: f64 = 1.25;
/// Ramp-tangent blend rate for surf inertia redirect (per second).
const SURF_REDIRECT_BLEND_RATE: f64 = 7.0;
/// Largest same-tick horizontal reversal surf steering may cause, as a
/// fraction of the previous horizontal speed.
const SURF_MAX_REVERSAL_FRAC: f64 = 0.55;
/// Horizontal blend rate toward the wall tangent during a wallrun.
const WALLRUN_TANGENT_BLEND_RATE: f64 = 12.0;
/// Wall contact age still accepted for wallrun entry.
const WALLRUN_ENTRY_CONTACT_WINDOW: f64 = 0.10;
/// Wall probe reach past the capsule radius.
const WALL_PROBE_PAD: f64 = 0.06;

impl PlayerController {
    pub(super) fn is_surf_normal(&self, normal: DVec3) -> bool {
        if !self.tuning.surf_enabled {
            return false;
        }
        if normal.length_squared() <= math::EPSILON {
            return false;
        }
        let n = normal.normalize();
        let min_z = self.tuning.surf_min_normal_z.clamp(0.01, 0.95);
        let max_z = self.tuning.surf_max_normal_z.clamp(min_z, 0.98);
        (min_z..=max_z).contains(&n.z)
    }

    pub(super) fn set_surf_contact(&mut self, normal: DVec3) {
        self.surf_normal = math::normalize_or_zero(normal);
        self.surf_contact_age = 0.0;
    }

    pub(super) fn has_fresh_surf_contact(&self, dt: f64) -> bool {
        if !self.tuning.surf_enabled || self.surf_normal.length_squared() <= 0.01 {
            return false;
        }
        // Rules apply only while contact is fresh; no post-leave push/pull.
        self.surf_contact_age <= (dt * SURF_PHYSICS_FRESH_TICKS).max(0.0)
    }

    /// Looser window used for state naming and HUD purposes.
    pub(super) fn has_fresh_surf_contact_loose(&self) -> bool {
        self.tuning.surf_enabled
            && self.surf_contact_age <= SURF_SURFACE_WINDOW
            && self.surf_normal.length_squared() > 0.01
    }

    /// Redirects horizontal inertia along the ramp tangent, preserving
    /// |vel_h|. Write source: Solver.
    pub(super) fn redirect_surf_inertia(&mut self, dt: f64) {
        let horiz = math::horizontal(self.vel);
        let horiz_speed = horiz.length();
        if horiz_speed <= 1e-6 {
            return;
        }

        let tangent = math::project_to_plane_unit(horiz, self.surf_normal);
        if tangent.length_squared() <= math::EPSILON {
            return;
        }

        let desired = tangent * horiz_speed;
        let blend = (SURF_REDIRECT_BLEND_RATE * dt).clamp(0.0, 1.0);
        let v = self.vel + (desired - horiz) * blend;
        self.set_velocity(v, MotionWriteSource::Solver, "surf.redirect");
    }

    /// Input-driven surf acceleration: add-speed rule scaled to the
    /// horizontal share of the wish, uphill-only vertical, and an
    /// anti-reversal clamp so steering redirects momentum instead of
    /// hard-stopping it. Write source: Solver.
    pub(super) fn accelerate_surf_redirect(&mut self, wish_dir: DVec3, wish_speed: f64, accel: f64, dt: f64) {
        if wish_dir.length_squared() <= 0.0 {
            return;
        }
        let horiz_factor = math::horizontal_speed(wish_dir).min(1.0);
        if horiz_factor <= 1e-4 {
            return;
        }
        let effective_wish_speed = wish_speed * horiz_factor;
        let current_speed = self.vel.dot(wish_dir);
        let add_speed = effective_wish_speed - current_speed;
        if add_speed <= 0.0 {
            return;
        }

        let accel_speed = (accel * dt * effective_wish_speed).min(add_speed);
        if accel_speed <= 0.0 {
            return;
        }

        let mut delta = wish_dir * accel_speed;

        let pre_h = math::horizontal(self.vel);
        if pre_h.length_squared() > math::EPSILON {
            let post_h = DVec3::new(pre_h.x + delta.x, pre_h.y + delta.y, 0.0);
            if pre_h.dot(post_h) < 0.0 {
                let pre_len = pre_h.length();
                if pre_len > 1e-12 {
                    let pre_u = pre_h / pre_len;
                    let delta_along_pre = delta.x * pre_u.x + delta.y * pre_u.y;
                    let min_delta_along_pre = -(pre_len * SURF_MAX_REVERSAL_FRAC);
                    if delta_along_pre < min_delta_along_pre {
                        let correction = min_delta_along_pre - delta_along_pre;
                        delta.x += pre_u.x * correction;
                        delta.y += pre_u.y * correction;
                    }
                }
            }
        }

        // Steering may add uphill vertical but never extra downhill pull.
        if delta.z < 0.0 {
            delta.z = 0.0;
        }

        self.add_velocity(delta, MotionWriteSource::Solver, "surf.accel");
    }

    pub(super) fn set_wall_contact(&mut self, normal: DVec3, point: DVec3) {
        self.wall_normal = math::horizontal_unit(normal);
        self.wall_contact_point = point;
        self.wall_contact_age = 0.0;
    }

    /// Wall contacts below ankle height are steps and trims, not walls.
    pub(super) fn is_valid_wall_contact(&self, point: DVec3) -> bool {
        let feet_z = self.pos.z - self.player_half().z;
        let min_height = (self.tuning.step_height + 0.05).clamp(0.12, 0.65);
        point.z >= feet_z + min_height
    }

    pub(super) fn refresh_wall_contact_from_probe(&mut self) {
        if let Some((normal, point)) = self.probe_nearby_wall() {
            self.set_wall_contact(normal, point);
        }
    }

    /// Cardinal-direction probe for a near-vertical surface within reach.
    fn probe_nearby_wall(&mut self) -> Option<(DVec3, DVec3)> {
        if self.collision.is_none() {
            return None;
        }
        let probe_dist = (self.tuning.player_radius + WALL_PROBE_PAD).max(0.08);
        let directions = [DVec3::X, DVec3::NEG_X, DVec3::Y, DVec3::NEG_Y];
        let walkable_z = math::walkable_threshold_z(self.tuning.max_ground_slope_deg);

        for d in directions {
            let hit = self.sweep(self.pos, self.pos + d * probe_dist);
            if !hit.has_hit {
                continue;
            }
            let n = math::normalize_or_zero(hit.normal);
            // Near-vertical surfaces only.
            if n.z.abs() < walkable_z.max(0.65) {
                let wall_n = math::horizontal_unit(n);
                if wall_n.length_squared() > math::EPSILON {
                    let frac = hit.fraction.clamp(0.0, 1.0);
                    let p = hit.position.unwrap_or(self.pos + d * (probe_dist * frac));
                    if !self.is_valid_wall_contact(p) {
                        continue;
                    }
                    return Some((wall_n, p));
                }
            }
        }
        None
    }

    /// Wallrun entry gates: enabled, a fresh valid wall contact, enough
    /// entry speed, wish aligned with the wall tangent, and actual approach
    /// into the wall.
    pub(super) fn try_enter_wallrun(&mut self, intent: &MotionIntent) {
        if !self.tuning.wallrun_enabled || self.grounded {
            return;
        }
        if self.wall_contact_age > WALLRUN_ENTRY_CONTACT_WINDOW {
            // Contact must be recent; one probe refresh covers curved walls
            // whose slide-move contact happened a few ticks back.
            self.refresh_wall_contact_from_probe();
        }
        if self.wall_normal.length_squared() <= math::EPSILON
            || self.wall_contact_age > WALLRUN_ENTRY_CONTACT_WINDOW
        {
            return;
        }
        if !self.is_valid_wall_contact(self.wall_contact_point) {
            return;
        }

        let hspeed = math::horizontal_speed(self.vel);
        let entry_floor = self.tuning.max_ground_speed * self.tuning.wallrun_min_entry_speed_mult;
        if hspeed < entry_floor {
            return;
        }

        let vel_h = math::horizontal_unit(self.vel);
        if (-vel_h).dot(self.wall_normal) < self.tuning.wallrun_min_approach_dot {
            return;
        }

        let tangent = math::project_to_plane_unit(vel_h, self.wall_normal);
        if tangent.length_squared() <= math::EPSILON {
            return;
        }
        if intent.wish_dir.dot(tangent) < self.tuning.wallrun_min_parallel_dot {
            return;
        }

        self.wallrun_active = true;
    }

    /// Preserves horizontal speed while steering it along the wall tangent.
    /// Write source: Solver.
    pub(super) fn redirect_along_wall(&mut self, dt: f64) {
        let horiz = math::horizontal(self.vel);
        let horiz_speed = horiz.length();
        if horiz_speed <= 1e-6 {
            return;
        }
        let tangent = math::project_to_plane_unit(horiz, self.wall_normal);
        if tangent.length_squared() <= math::EPSILON {
            return;
        }
        let desired = tangent * horiz_speed;
        let blend = (WALLRUN_TANGENT_BLEND_RATE * dt).clamp(0.0, 1.0);
        let v = self.vel + (desired - horiz) * blend;
        self.set_velocity(v, MotionWriteSource::Solver, "wallrun.redirect");
    }
}
