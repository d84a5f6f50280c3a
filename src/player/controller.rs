use bevy::math::DVec3;

use crate::collision::{Aabb, CollisionQuery, Hit};
use crate::math;
use crate::motion::{MotionIntent, MotionSolver, MotionState, MotionWriteSource};
use crate::tuning::PhysicsTuning;

/// Multiplier over Vmax for developer noclip flight.
const NOCLIP_SPEED_MULT: f64 = 2.5;
/// Slide ends when horizontal speed drops below this fraction of Vmax.
pub(super) const SLIDE_EXIT_SPEED_FRAC: f64 = 0.25;
/// Ticks' worth of wall-contact age still considered fresh for wallrun.
pub(super) const WALL_CONTACT_FRESH_TICKS: f64 = 2.5;
/// Wallrun disengages below this fraction of the entry speed requirement.
const WALLRUN_EXIT_SPEED_FRAC: f64 = 0.80;
/// Floor for the ascent speed above which ground classification is skipped.
const MIN_ASCENT_LIMIT: f64 = 3.5;

/// Pre/post snapshot of one fixed tick, consumed by the camera feedback
/// observer and the telemetry recorder. Read-only by construction.
#[derive(Debug, Clone, Copy)]
pub struct StepFrame {
    pub pre_grounded: bool,
    pub post_grounded: bool,
    pub pre_vel: DVec3,
    pub post_vel: DVec3,
}

/// Fixed-timestep kinematic character controller.
///
/// Holds position/velocity plus the motion state machine, and advances one
/// indivisible tick per [`step`](Self::step) call. Every velocity mutation
/// flows through the stamped setters in `kinematics.rs`, so
/// [`last_vel_write_source`](Self::last_vel_write_source) always names the
/// rule that last touched it.
pub struct PlayerController {
    pub(super) tuning: PhysicsTuning,
    pub(super) solver: MotionSolver,
    pub(super) collision: Option<Box<dyn CollisionQuery + Send + Sync>>,
    /// Fallback geometry for axis-resolve movement when no sweep provider
    /// is installed (the determinism harness runs this way).
    pub(super) aabbs: Vec<Aabb>,

    pub(super) pos: DVec3,
    pub(super) vel: DVec3,
    pub(super) grounded: bool,
    pub(super) ground_normal: DVec3,

    pub(super) wall_normal: DVec3,
    pub(super) wall_contact_point: DVec3,
    pub(super) wall_contact_age: f64,
    pub(super) surf_normal: DVec3,
    pub(super) surf_contact_age: f64,
    pub(super) wallrun_active: bool,

    pub(super) slide_active: bool,
    pub(super) slide_dir: DVec3,
    pub(super) slide_ground_grace_timer: f64,

    pub(super) jump_pressed: bool,
    pub(super) jump_buffer_timer: f64,
    pub(super) coyote_timer: f64,
    pub(super) jumped_this_tick: bool,

    pub(super) noclip: bool,
    pub(super) contact_count: u32,
    pub(super) last_write_source: MotionWriteSource,
    pub(super) last_write_reason: String,
}

impl PlayerController {
    pub fn new(tuning: PhysicsTuning, spawn_point: DVec3) -> Self {
        let tuning = tuning.clamped();
        let solver = MotionSolver::from_tuning(&tuning);
        Self {
            tuning,
            solver,
            collision: None,
            aabbs: Vec::new(),
            pos: spawn_point,
            vel: DVec3::ZERO,
            grounded: false,
            ground_normal: DVec3::Z,
            wall_normal: DVec3::ZERO,
            wall_contact_point: DVec3::ZERO,
            wall_contact_age: f64::INFINITY,
            surf_normal: DVec3::ZERO,
            surf_contact_age: f64::INFINITY,
            wallrun_active: false,
            slide_active: false,
            slide_dir: DVec3::ZERO,
            slide_ground_grace_timer: 0.0,
            jump_pressed: false,
            jump_buffer_timer: 0.0,
            coyote_timer: 0.0,
            jumped_this_tick: false,
            noclip: false,
            contact_count: 0,
            last_write_source: MotionWriteSource::External,
            last_write_reason: String::from("spawn"),
        }
    }

    pub fn with_collision(mut self, collision: Box<dyn CollisionQuery + Send + Sync>) -> Self {
        self.collision = Some(collision);
        self
    }

    pub fn with_aabbs(mut self, aabbs: Vec<Aabb>) -> Self {
        self.aabbs = aabbs;
        self
    }

    /// Swept player half extents `(radius, radius, half_height)`.
    pub fn player_half(&self) -> DVec3 {
        DVec3::new(
            self.tuning.player_radius,
            self.tuning.player_radius,
            self.tuning.player_half_height,
        )
    }

    pub fn tuning(&self) -> &PhysicsTuning {
        &self.tuning
    }

    /// Installs a new tuning snapshot and re-derives the motion config.
    /// Must only be called between ticks.
    pub fn apply_tuning(&mut self, tuning: PhysicsTuning) {
        self.tuning = tuning.clamped();
        self.solver.sync_from_tuning(&self.tuning);
    }

    // Inspectors.

    pub fn pos(&self) -> DVec3 {
        self.pos
    }

    pub fn vel(&self) -> DVec3 {
        self.vel
    }

    pub fn grounded(&self) -> bool {
        self.grounded
    }

    pub fn ground_normal(&self) -> DVec3 {
        self.ground_normal
    }

    pub fn contact_count(&self) -> u32 {
        self.contact_count
    }

    pub fn jump_buffer_left(&self) -> f64 {
        self.jump_buffer_timer.max(0.0)
    }

    pub fn coyote_left(&self) -> f64 {
        self.coyote_timer.max(0.0)
    }

    pub fn last_vel_write_source(&self) -> MotionWriteSource {
        self.last_write_source
    }

    pub fn last_vel_write_reason(&self) -> &str {
        &self.last_write_reason
    }

    pub fn is_sliding(&self) -> bool {
        self.slide_active
    }

    pub fn is_wallrunning(&self) -> bool {
        self.wallrun_active
    }

    pub fn noclip_enabled(&self) -> bool {
        self.noclip
    }

    /// Developer toggle; disables collision queries while active.
    pub fn toggle_noclip(&mut self) {
        self.noclip = !self.noclip;
        if self.noclip {
            self.grounded = false;
            self.slide_active = false;
            self.wallrun_active = false;
            self.jump_pressed = false;
            self.jump_buffer_timer = 0.0;
        }
    }

    pub fn motion_state(&self) -> MotionState {
        if self.noclip {
            MotionState::NoClip
        } else if self.wallrun_active {
            MotionState::Wallrunning
        } else if self.slide_active && self.grounded {
            MotionState::Sliding
        } else if self.grounded {
            MotionState::Grounded
        } else if self.has_fresh_surf_contact_loose() {
            MotionState::Surfing
        } else {
            MotionState::Airborne
        }
    }

    pub fn motion_state_name(&self) -> &'static str {
        self.motion_state().name()
    }

    /// Privileged host mutation path (transports, spawn points).
    pub fn set_external_velocity(&mut self, vel: DVec3, reason: &str) {
        self.set_velocity(vel, MotionWriteSource::External, reason);
        if vel.z > 1e-6 {
            self.grounded = false;
        }
    }

    pub fn set_position(&mut self, pos: DVec3) {
        self.pos = pos;
    }

    pub fn set_grounded(&mut self, grounded: bool) {
        self.grounded = grounded;
    }

    pub(super) fn sweep(&self, from: DVec3, to: DVec3) -> Hit {
        match &self.collision {
            Some(world) => {
                let hit = world.sweep_closest(from, to);
                // Defensive: a non-finite sweep is treated as no hit.
                if hit.has_hit && (!hit.fraction.is_finite() || !hit.normal.is_finite()) {
                    Hit::miss()
                } else {
                    hit
                }
            }
            None => Hit::miss(),
        }
    }

    /// Advances one fixed tick. The tick is indivisible: solver, collision,
    /// and state updates all happen inside this call in a fixed order.
    pub fn step(&mut self, dt: f64, intent: &MotionIntent, yaw_deg: f64, pitch_deg: f64) -> StepFrame {
        let _ = pitch_deg;
        let pre_grounded = self.grounded;
        let pre_vel = self.vel;
        self.jumped_this_tick = false;

        // 1. Ingest intent: latch jump press, age contact/grace timers.
        self.wall_contact_age += dt;
        self.surf_contact_age += dt;
        self.slide_ground_grace_timer = (self.slide_ground_grace_timer - dt).max(0.0);
        let hspeed = math::horizontal_speed(self.vel);
        if intent.jump_requested {
            self.jump_pressed = true;
            self.jump_buffer_timer = self.solver.grace_time_for_speed(hspeed);
        } else {
            self.jump_buffer_timer = (self.jump_buffer_timer - dt).max(0.0);
        }

        if self.noclip {
            self.step_noclip(dt, intent);
            return StepFrame {
                pre_grounded,
                post_grounded: self.grounded,
                pre_vel,
                post_vel: self.vel,
            };
        }

        // 2. Pre-move ground probe (sweep providers only; the axis-resolve
        //    fallback classifies ground during resolution instead). A fast
        //    ascent is never ground contact, no matter what the probe says;
        //    slope climbs stay under this limit.
        let ascent_limit = (self.solver.jump_takeoff_speed() * 0.5).max(MIN_ASCENT_LIMIT);
        if self.vel.z > ascent_limit {
            self.grounded = false;
        } else if self.collision.is_some() {
            self.trace_ground();
        }
        if self.grounded {
            self.coyote_timer = self.solver.grace_time_for_speed(hspeed);
        } else {
            self.coyote_timer = (self.coyote_timer - dt).max(0.0);
        }

        // Slide lifecycle.
        if self.tuning.slide_enabled {
            if intent.slide_requested && self.grounded && !self.slide_active {
                self.start_slide(yaw_deg);
            } else if self.slide_active
                && !intent.slide_requested
                && self.slide_ground_grace_timer <= 0.0
            {
                self.slide_active = false;
            }
        } else {
            self.slide_active = false;
        }

        // 3/4. Solver per state, consuming the jump request inside the mode.
        if self.slide_active && self.grounded {
            self.step_slide_mode(dt, yaw_deg);
        } else if self.grounded {
            self.step_ground_mode(dt, intent, yaw_deg);
        } else {
            if !self.wallrun_active {
                self.try_enter_wallrun(intent);
            }
            if self.wallrun_active {
                self.step_wallrun_mode(dt, intent);
            } else if self.has_fresh_surf_contact(dt) {
                self.step_surf_mode(dt, intent);
            } else {
                self.step_air_mode(dt, intent);
            }
        }

        // 5. Integrate and collide.
        let delta = self.vel * dt;
        if self.collision.is_some() {
            if self.grounded {
                self.step_slide_move(delta);
            } else {
                self.slide_move(delta);
            }
        } else {
            self.move_and_collide(delta);
        }

        // 6. Post-move ground snap (never right after a takeoff).
        if self.collision.is_some() && !self.jumped_this_tick {
            self.ground_snap();
        }

        StepFrame {
            pre_grounded,
            post_grounded: self.grounded,
            pre_vel,
            post_vel: self.vel,
        }
    }

    fn step_ground_mode(&mut self, dt: f64, intent: &MotionIntent, yaw_deg: f64) {
        if intent.wish_dir.length_squared() > math::EPSILON {
            let mut v = self.vel;
            self.solver.apply_ground_run(&mut v, intent.wish_dir, dt, 1.0);
            self.set_velocity(v, MotionWriteSource::Solver, "ground.run");
        } else if self.tuning.custom_friction_enabled {
            let mut v = self.vel;
            self.solver.apply_ground_coast_damping(&mut v, dt);
            self.set_velocity(v, MotionWriteSource::Solver, "ground.coast");
        }

        if self.consume_jump_request() && self.can_coyote_jump() {
            if self.tuning.vault_enabled && self.try_vault(yaw_deg) {
                return;
            }
            self.apply_jump();
        }
    }

    fn step_air_mode(&mut self, dt: f64, intent: &MotionIntent) {
        if intent.wish_dir.length_squared() > math::EPSILON {
            let mut v = self.vel;
            MotionSolver::apply_air_accel(
                &mut v,
                intent.wish_dir,
                dt,
                self.solver.air_speed(),
                self.solver.air_accel(),
            );
            self.set_velocity(v, MotionWriteSource::Solver, "air.accel");
        }
        let mut v = self.vel;
        self.solver.apply_gravity(&mut v, dt, 1.0);
        self.set_velocity(v, MotionWriteSource::Solver, "air.gravity");

        if self.consume_jump_request() && self.can_coyote_jump() {
            self.apply_jump();
        }
    }

    fn step_wallrun_mode(&mut self, dt: f64, intent: &MotionIntent) {
        self.refresh_wall_contact_from_probe();

        let entry_floor = self.tuning.max_ground_speed * self.tuning.wallrun_min_entry_speed_mult;
        let stale = self.wall_contact_age > dt * WALL_CONTACT_FRESH_TICKS;
        let too_slow = math::horizontal_speed(self.vel) < entry_floor * WALLRUN_EXIT_SPEED_FRAC;
        if stale || too_slow || self.grounded || !self.tuning.wallrun_enabled {
            self.wallrun_active = false;
            self.step_air_mode(dt, intent);
            return;
        }

        self.redirect_along_wall(dt);
        let mut v = self.vel;
        self.solver.apply_wallrun_sink(&mut v, dt);
        self.set_velocity(v, MotionWriteSource::Solver, "wallrun.sink");

        if self.consume_jump_request() {
            self.apply_wall_jump();
        }
    }

    fn step_surf_mode(&mut self, dt: f64, intent: &MotionIntent) {
        self.redirect_surf_inertia(dt);
        let wish = math::project_to_plane_unit(intent.wish_dir, self.surf_normal);
        if wish.length_squared() > math::EPSILON {
            self.accelerate_surf_redirect(wish, self.solver.air_speed(), self.solver.air_accel(), dt);
        }
        // Gravity pulls along the ramp plane; no extra downforce into it.
        let g_along = {
            let g = DVec3::new(0.0, 0.0, -self.solver.gravity());
            let n = math::normalize_or_zero(self.surf_normal);
            g - n * g.dot(n)
        };
        let mut v = self.vel;
        v += g_along * dt.max(0.0);
        self.set_velocity(v, MotionWriteSource::Solver, "surf.gravity");

        if self.consume_jump_request() && self.can_coyote_jump() {
            self.apply_jump();
        }
    }

    fn step_noclip(&mut self, dt: f64, intent: &MotionIntent) {
        let fly_speed = self.tuning.max_ground_speed * NOCLIP_SPEED_MULT;
        let mut target = intent.wish_dir * fly_speed;
        if intent.jump_requested {
            target.z += fly_speed;
        }
        if intent.slide_requested {
            target.z -= fly_speed;
        }
        let k = self.solver.config().derived.run_exp_k.max(0.0);
        let alpha = (1.0 - (-k * dt.max(0.0)).exp()).clamp(0.0, 1.0);
        let v = self.vel + (target - self.vel) * alpha;
        self.set_velocity(v, MotionWriteSource::Solver, "noclip.fly");
        self.pos += self.vel * dt;
        self.grounded = false;
        self.jump_pressed = false;
    }
}
