use bevy::math::DVec3;

use crate::math;
use crate::motion::MotionWriteSource;

use super::controller::{PlayerController, SLIDE_EXIT_SPEED_FRAC};

/// Slide steering is camera-only; the direction chases camera forward at
/// this rate (per second).
const SLIDE_STEER_BLEND_RATE: f64 = 14.0;
/// Downhill acceleration fraction of gravity applied along the slide.
const SLIDE_SLOPE_ACCEL_FRAC: f64 = 0.70;
/// Minimum slide duration once started, even if the key is released.
const SLIDE_START_GRACE: f64 = 0.08;
/// Takeoff speed multiplier for a vault boost.
const VAULT_BOOST_MULT: f64 = 1.12;
/// Forward shove added by a vault, as a fraction of Vmax.
const VAULT_FORWARD_FRAC: f64 = 0.35;
/// Forward probe reach past the capsule radius for vault detection.
const VAULT_PROBE_REACH: f64 = 0.45;
/// Horizontal kick away from the wall on a wall jump, as a fraction of the
/// jump takeoff speed.
const WALLJUMP_KICK_FRAC: f64 = 0.65;

impl PlayerController {
    pub(super) fn record_velocity_write(&mut self, source: MotionWriteSource, reason: &str) {
        self.last_write_source = source;
        if self.last_write_reason != reason {
            self.last_write_reason = reason.to_owned();
        }
    }

    pub(super) fn set_velocity(&mut self, vel: DVec3, source: MotionWriteSource, reason: &str) {
        self.vel = vel;
        self.record_velocity_write(source, reason);
    }

    pub(super) fn set_horizontal_velocity(
        &mut self,
        x: f64,
        y: f64,
        source: MotionWriteSource,
        reason: &str,
    ) {
        self.vel.x = x;
        self.vel.y = y;
        self.record_velocity_write(source, reason);
    }

    pub(super) fn set_vertical_velocity(&mut self, z: f64, source: MotionWriteSource, reason: &str) {
        self.vel.z = z;
        self.record_velocity_write(source, reason);
    }

    pub(super) fn add_velocity(&mut self, delta: DVec3, source: MotionWriteSource, reason: &str) {
        self.vel += delta;
        self.record_velocity_write(source, reason);
    }

    /// True when a jump should fire this tick: an edge press, or a buffered
    /// press still inside its grace window. The edge latch is cleared on
    /// consume; the buffer is only cleared by an actual takeoff.
    pub(super) fn consume_jump_request(&mut self) -> bool {
        if self.jump_pressed {
            self.jump_pressed = false;
            return true;
        }
        if !self.tuning.coyote_buffer_enabled {
            return false;
        }
        self.jump_buffer_timer > 0.0
    }

    pub(super) fn can_coyote_jump(&self) -> bool {
        self.grounded || self.coyote_timer > 0.0
    }

    pub(super) fn apply_jump(&mut self) {
        let takeoff = self.solver.jump_takeoff_speed();
        self.set_vertical_velocity(takeoff, MotionWriteSource::Impulse, "jump.takeoff");
        self.jump_buffer_timer = 0.0;
        self.coyote_timer = 0.0;
        self.grounded = false;
        self.slide_active = false;
        self.wallrun_active = false;
        self.jumped_this_tick = true;
    }

    /// Jump consumed during a wallrun: full takeoff plus a horizontal kick
    /// away from the wall.
    pub(super) fn apply_wall_jump(&mut self) {
        let takeoff = self.solver.jump_takeoff_speed();
        let kick = math::horizontal_unit(self.wall_normal) * (takeoff * WALLJUMP_KICK_FRAC);
        let vel = DVec3::new(self.vel.x + kick.x, self.vel.y + kick.y, takeoff);
        self.set_velocity(vel, MotionWriteSource::Impulse, "walljump.kick");
        self.jump_buffer_timer = 0.0;
        self.coyote_timer = 0.0;
        self.grounded = false;
        self.wallrun_active = false;
        self.jumped_this_tick = true;
    }

    pub(super) fn start_slide(&mut self, yaw_deg: f64) {
        if !self.grounded || self.slide_active {
            return;
        }
        let mut slide_dir = math::horizontal_unit(self.vel);
        if slide_dir.length_squared() <= math::EPSILON {
            let h_rad = yaw_deg.to_radians();
            slide_dir = DVec3::new(-h_rad.sin(), h_rad.cos(), 0.0);
        }
        if slide_dir.length_squared() <= math::EPSILON {
            return;
        }
        let slide_dir = slide_dir.normalize();

        self.slide_dir = slide_dir;
        self.slide_active = true;
        self.slide_ground_grace_timer = self.slide_ground_grace_timer.max(SLIDE_START_GRACE);
        let hspeed = math::horizontal_speed(self.vel);
        self.set_horizontal_velocity(
            slide_dir.x * hspeed,
            slide_dir.y * hspeed,
            MotionWriteSource::Impulse,
            "slide.start",
        );
    }

    /// Slide owns horizontal velocity while active; keyboard strafing is
    /// ignored and steering follows the camera.
    pub(super) fn step_slide_mode(&mut self, dt: f64, yaw_deg: f64) {
        if self.slide_dir.length_squared() <= math::EPSILON {
            self.slide_dir = math::horizontal_unit(self.vel);
        }
        if self.slide_dir.length_squared() <= math::EPSILON {
            self.slide_active = false;
            return;
        }
        self.slide_dir = self.slide_dir.normalize();

        let h_rad = yaw_deg.to_radians();
        let cam_dir = DVec3::new(-h_rad.sin(), h_rad.cos(), 0.0);
        if cam_dir.length_squared() > math::EPSILON {
            let blend = (dt * SLIDE_STEER_BLEND_RATE).clamp(0.0, 1.0);
            let out = self.slide_dir * (1.0 - blend) + cam_dir.normalize() * blend;
            if out.length_squared() > math::EPSILON {
                self.slide_dir = out.normalize();
            }
        }

        let mut hspeed = math::horizontal_speed(self.vel);
        hspeed = self.solver.apply_slide_ground_damping(hspeed, dt);
        hspeed = (hspeed + self.slide_slope_speed_delta(dt)).max(0.0);
        self.set_horizontal_velocity(
            self.slide_dir.x * hspeed,
            self.slide_dir.y * hspeed,
            MotionWriteSource::Solver,
            "slide.solve",
        );
        let mut v = self.vel;
        self.solver.apply_gravity(&mut v, dt, 1.0);
        self.set_velocity(v, MotionWriteSource::Solver, "slide.gravity");

        if hspeed < self.tuning.max_ground_speed * SLIDE_EXIT_SPEED_FRAC {
            self.slide_active = false;
        }

        if self.consume_jump_request() && self.can_coyote_jump() {
            if self.tuning.vault_enabled && self.try_vault(yaw_deg) {
                return;
            }
            self.apply_jump();
        }
    }

    /// Signed speed change from sliding along a slope: accelerate downhill,
    /// bleed off uphill.
    fn slide_slope_speed_delta(&mut self, dt: f64) -> f64 {
        if !self.grounded {
            return 0.0;
        }
        let n = self.ground_normal;
        if n.length_squared() <= math::EPSILON {
            return 0.0;
        }
        let n = n.normalize();

        let gravity_dir = DVec3::new(0.0, 0.0, -1.0);
        let slope_vec = gravity_dir - n * gravity_dir.dot(n);
        let slope_h = math::horizontal(slope_vec);
        let slope_mag = slope_h.length();
        if slope_mag <= 1e-6 {
            return 0.0;
        }
        let slope_h = slope_h / slope_mag;

        let slide_h = math::horizontal_unit(self.slide_dir);
        if slide_h.length_squared() <= math::EPSILON {
            return 0.0;
        }

        let align = slide_h.dot(slope_h);
        if align.abs() <= 1e-6 {
            return 0.0;
        }

        let slope_accel = self.solver.gravity() * slope_mag * SLIDE_SLOPE_ACCEL_FRAC;
        slope_accel * align * dt.max(0.0)
    }

    /// Attempts a vault instead of a plain jump: a waist-height obstacle
    /// directly ahead with clear space above its lip converts the jump into
    /// an up-and-over boost.
    pub(super) fn try_vault(&mut self, yaw_deg: f64) -> bool {
        if self.collision.is_none() {
            return false;
        }
        let h_rad = yaw_deg.to_radians();
        let forward = DVec3::new(-h_rad.sin(), h_rad.cos(), 0.0);
        let reach = self.tuning.player_radius + VAULT_PROBE_REACH;

        let ahead = self.sweep(self.pos, self.pos + forward * reach);
        if !ahead.has_hit || ahead.normal.z.abs() >= 0.65 {
            return false;
        }

        // The lip must be within vault height, with room above it.
        let vault_height = self.tuning.player_half_height * 1.6;
        let over = self.pos + DVec3::new(0.0, 0.0, vault_height) + forward * reach;
        let down = self.sweep(over, over - DVec3::new(0.0, 0.0, vault_height * 0.9));
        if !down.has_hit || down.normal.z <= 0.65 {
            return false;
        }

        let takeoff = self.solver.jump_takeoff_speed() * VAULT_BOOST_MULT;
        let shove = forward * (self.tuning.max_ground_speed * VAULT_FORWARD_FRAC);
        let vel = DVec3::new(self.vel.x + shove.x, self.vel.y + shove.y, takeoff);
        self.set_velocity(vel, MotionWriteSource::Impulse, "vault.boost");
        self.jump_buffer_timer = 0.0;
        self.coyote_timer = 0.0;
        self.grounded = false;
        self.slide_active = false;
        self.jumped_this_tick = true;
        true
    }
}
