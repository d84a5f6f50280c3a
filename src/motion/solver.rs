use bevy::math::DVec3;

use crate::math;
use crate::tuning::{MotionConfig, PhysicsTuning, derive_motion_config};

/// Cap on how far the distance-based grace window may expand over the base.
const GRACE_MAX_EXPANSION: f64 = 2.20;
/// Floor fraction of Vmax used when converting grace distance to time.
const GRACE_MIN_SPEED_FRAC: f64 = 0.35;

/// Single authority for derived run/jump/slide/gravity responses.
///
/// These methods are the only code allowed to mutate velocity under write
/// source `Solver`; the controller stamps each call site.
#[derive(Debug, Clone)]
pub struct MotionSolver {
    config: MotionConfig,
}

impl MotionSolver {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }

    pub fn from_tuning(tuning: &PhysicsTuning) -> Self {
        Self::new(derive_motion_config(tuning))
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Re-derive after any tuning field change.
    pub fn sync_from_tuning(&mut self, tuning: &PhysicsTuning) {
        self.config = derive_motion_config(tuning);
    }

    pub fn gravity(&self) -> f64 {
        self.config.derived.gravity
    }

    pub fn jump_takeoff_speed(&self) -> f64 {
        self.config.derived.jump_takeoff_speed
    }

    pub fn air_speed(&self) -> f64 {
        self.config.derived.air_speed
    }

    pub fn air_accel(&self) -> f64 {
        self.config.derived.air_accel
    }

    pub fn ground_target_speed(&self, speed_scale: f64) -> f64 {
        (self.config.invariants.max_ground_speed * speed_scale.max(0.0)).max(0.0)
    }

    /// Distance-based leniency window shared by jump-buffer, coyote, and
    /// vault grace checks. Never less forgiving than the configured base
    /// period, never more than `GRACE_MAX_EXPANSION` times it.
    pub fn grace_time_for_speed(&self, horizontal_speed: f64) -> f64 {
        let base = self.config.invariants.grace_period.max(0.0);
        if base <= 0.0 {
            return 0.0;
        }
        let grace_dist = self.config.invariants.grace_distance.max(0.0);
        let vmax = self.config.invariants.max_ground_speed.max(0.01);
        let speed = horizontal_speed.abs().max(GRACE_MIN_SPEED_FRAC * vmax);
        let dist_t = if speed > 1e-9 { grace_dist / speed } else { base };
        dist_t.min(base * GRACE_MAX_EXPANSION).max(base)
    }

    /// Exponential run response toward `wish · Vmax·speed_scale`.
    /// Write source: Solver.
    pub fn apply_ground_run(&self, vel: &mut DVec3, wish_dir: DVec3, dt: f64, speed_scale: f64) {
        let wish = math::horizontal_unit(wish_dir);
        if wish.length_squared() <= math::EPSILON {
            return;
        }
        let target = wish * self.ground_target_speed(speed_scale);
        let current = math::horizontal(*vel);
        let k = self.config.derived.run_exp_k.max(0.0);
        let alpha = (1.0 - (-k * dt.max(0.0)).exp()).clamp(0.0, 1.0);
        let next = current + (target - current) * alpha;
        vel.x = next.x;
        vel.y = next.y;
    }

    /// Exponential ground slowdown derived from the stop-time invariant.
    /// Write source: Solver.
    pub fn apply_ground_coast_damping(&self, vel: &mut DVec3, dt: f64) {
        let k = self.config.derived.ground_damp_k.max(0.0);
        if k <= 1e-12 {
            return;
        }
        let damp = (-k * dt.max(0.0)).exp();
        vel.x *= damp;
        vel.y *= damp;
    }

    /// Quake add-speed rule: only the shortfall along the wish direction is
    /// granted, capped by `accel·dt·wish_speed`. Write source: Solver.
    pub fn apply_air_accel(vel: &mut DVec3, wish_dir: DVec3, dt: f64, wish_speed: f64, accel: f64) {
        if wish_dir.length_squared() <= 0.0 {
            return;
        }
        let current_speed = vel.dot(wish_dir);
        let add_speed = wish_speed - current_speed;
        if add_speed > 0.0 {
            let accel_speed = (accel * dt * wish_speed).min(add_speed);
            *vel += wish_dir * accel_speed;
        }
    }

    /// Write source: Solver.
    pub fn apply_gravity(&self, vel: &mut DVec3, dt: f64, gravity_scale: f64) {
        vel.z -= self.gravity() * gravity_scale.max(0.0) * dt.max(0.0);
    }

    /// Exponential slide slowdown; returns the damped horizontal speed.
    pub fn apply_slide_ground_damping(&self, speed: f64, dt: f64) -> f64 {
        let k = self.config.derived.slide_damp_k.max(0.0);
        if k <= 1e-12 {
            return speed.max(0.0);
        }
        (speed * (-k * dt.max(0.0)).exp()).max(0.0)
    }

    /// Drives descending vertical velocity toward the wallrun sink speed.
    /// Upward launch carry is preserved. Write source: Solver.
    pub fn apply_wallrun_sink(&self, vel: &mut DVec3, dt: f64) {
        if vel.z > 0.0 {
            return;
        }
        let k = self.config.derived.wallrun_sink_k.max(0.0);
        if k <= 1e-12 {
            return;
        }
        let alpha = (1.0 - (-k * dt.max(0.0)).exp()).clamp(0.0, 1.0);
        let sink = self.config.derived.wallrun_sink_speed;
        vel.z += (sink - vel.z) * alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> MotionSolver {
        MotionSolver::from_tuning(&PhysicsTuning::default())
    }

    #[test]
    fn ground_run_converges_to_vmax() {
        let s = solver();
        let mut vel = DVec3::ZERO;
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            s.apply_ground_run(&mut vel, DVec3::Y, dt, 1.0);
        }
        let vmax = s.config().invariants.max_ground_speed;
        assert!(vel.y > vmax * 0.99, "vel.y = {}", vel.y);
        assert!(vel.y <= vmax);
    }

    #[test]
    fn coast_damping_strictly_reduces_horizontal_speed() {
        let s = solver();
        let mut vel = DVec3::new(4.0, -2.0, 1.0);
        let before = math::horizontal_speed(vel);
        s.apply_ground_coast_damping(&mut vel, 1.0 / 60.0);
        assert!(math::horizontal_speed(vel) < before);
        assert_eq!(vel.z, 1.0);
    }

    #[test]
    fn air_accel_never_exceeds_wish_speed_projection() {
        let s = solver();
        let wish = DVec3::X;
        let cap = s.air_speed();
        let mut vel = DVec3::new(6.0, 0.0, 0.0);
        let mut last = vel.dot(wish);
        for _ in 0..10 {
            MotionSolver::apply_air_accel(&mut vel, wish, 1.0 / 60.0, cap, s.air_accel());
            let along = vel.dot(wish);
            assert!(along <= cap + 1e-9);
            assert!(along >= last - 1e-12);
            last = along;
        }
    }

    #[test]
    fn grace_window_is_bounded_by_base_and_cap() {
        let s = solver();
        let base = s.config().invariants.grace_period;
        for hspeed in [0.0, 0.5, 3.0, 6.6, 40.0, 500.0] {
            let w = s.grace_time_for_speed(hspeed);
            assert!(w >= base - 1e-12);
            assert!(w <= base * 2.20 + 1e-12);
        }
    }

    #[test]
    fn wallrun_sink_leaves_upward_velocity_alone() {
        let s = solver();
        let mut vel = DVec3::new(0.0, 0.0, 3.0);
        s.apply_wallrun_sink(&mut vel, 1.0 / 60.0);
        assert_eq!(vel.z, 3.0);
        let mut falling = DVec3::new(0.0, 0.0, -6.0);
        s.apply_wallrun_sink(&mut falling, 1.0 / 60.0);
        assert!(falling.z > -6.0);
        assert!(falling.z < 0.0);
    }
}
