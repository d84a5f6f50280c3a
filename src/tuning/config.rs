use serde::{Deserialize, Serialize};

use super::PhysicsTuning;

/// Floor for the apex time before it divides anything.
const MIN_APEX_TIME: f64 = 0.05;
/// Target vertical speed while a wallrun holds the player to the wall.
const WALLRUN_SINK_SPEED: f64 = -0.85;

/// Coefficients the solver actually consumes; recomputed whenever the
/// authored invariants change, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMotion {
    /// `2·jump_height / jump_apex_time²`.
    pub gravity: f64,
    /// `sqrt(2·gravity·jump_height)`.
    pub jump_takeoff_speed: f64,
    /// `ln(10) / run_t90`.
    pub run_exp_k: f64,
    /// `ln(10) / ground_stop_t90`.
    pub ground_damp_k: f64,
    /// `ln(10) / air_gain_t90`; doubles as the Quake accel coefficient.
    pub air_accel: f64,
    /// `Vmax · air_speed_mult`.
    pub air_speed: f64,
    /// `ln(10) / slide_stop_t90`.
    pub slide_damp_k: f64,
    /// `ln(10) / wallrun_sink_t90`.
    pub wallrun_sink_k: f64,
    pub wallrun_sink_speed: f64,
}

/// Immutable snapshot of invariants plus everything derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    pub invariants: PhysicsTuning,
    pub derived: DerivedMotion,
}

fn rate_for_t90(t90: f64) -> f64 {
    if t90 > 0.0 {
        std::f64::consts::LN_10 / t90
    } else {
        0.0
    }
}

/// Closed-form derivation; pure, total, deterministic.
pub fn derive_motion_config(tuning: &PhysicsTuning) -> MotionConfig {
    let invariants = tuning.clone().clamped();
    let apex = invariants.jump_apex_time.max(MIN_APEX_TIME);
    let gravity = 2.0 * invariants.jump_height / (apex * apex);
    let jump_takeoff_speed = (2.0 * gravity * invariants.jump_height).sqrt();
    let derived = DerivedMotion {
        gravity,
        jump_takeoff_speed,
        run_exp_k: rate_for_t90(invariants.run_t90),
        ground_damp_k: rate_for_t90(invariants.ground_stop_t90),
        air_accel: rate_for_t90(invariants.air_gain_t90),
        air_speed: (invariants.max_ground_speed * invariants.air_speed_mult).max(0.0),
        slide_damp_k: rate_for_t90(invariants.slide_stop_t90),
        wallrun_sink_k: rate_for_t90(invariants.wallrun_sink_t90),
        wallrun_sink_speed: WALLRUN_SINK_SPEED,
    };
    MotionConfig { invariants, derived }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_and_takeoff_match_closed_form() {
        let tuning = PhysicsTuning {
            jump_height: 1.48,
            jump_apex_time: 0.351,
            ..Default::default()
        };
        let config = derive_motion_config(&tuning);
        let g = 2.0 * 1.48 / (0.351 * 0.351);
        assert!((config.derived.gravity - g).abs() < 1e-12);
        assert!((config.derived.jump_takeoff_speed - (2.0 * g * 1.48).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn apex_time_is_floored_before_division() {
        let tuning = PhysicsTuning {
            jump_apex_time: 0.0,
            ..Default::default()
        };
        let config = derive_motion_config(&tuning);
        assert!(config.derived.gravity.is_finite());
    }
}
