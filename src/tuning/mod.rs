//! Authored movement invariants and their derived motion config.
//!
//! `PhysicsTuning` holds the human-facing invariants (Vmax, T90s, jump
//! height…). Everything the solver consumes is recomputed from them by
//! [`derive_motion_config`]; derived values are never stored back.

mod config;

pub mod backups;

pub use config::{DerivedMotion, MotionConfig, derive_motion_config};

use serde::{Deserialize, Serialize};

/// One authored tuning value; numeric fields and feature flags only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TuningValue {
    Flag(bool),
    Number(f64),
}

/// Authored invariants. Mutable only between ticks; every mutation must be
/// followed by a motion-config re-derivation before the next `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsTuning {
    /// Vmax: top ground speed under held input (units/s).
    pub max_ground_speed: f64,
    /// Seconds to reach 90% of target run speed from rest.
    pub run_t90: f64,
    /// Seconds to 90% coast-down with no input on ground.
    pub ground_stop_t90: f64,
    /// Cap multiplier over Vmax in air (bhop ceiling).
    pub air_speed_mult: f64,
    /// Exponential air-gain time-to-90%.
    pub air_gain_t90: f64,
    /// Jump apex height (units); derives gravity with `jump_apex_time`.
    pub jump_height: f64,
    /// Seconds from takeoff to apex.
    pub jump_apex_time: f64,
    pub slide_stop_t90: f64,
    pub wallrun_sink_t90: f64,
    /// Base jump-buffer / coyote window (seconds).
    pub grace_period: f64,
    /// Distance that scales the grace window with travel (units).
    pub grace_distance: f64,
    pub step_height: f64,
    pub ground_snap_dist: f64,
    pub max_ground_slope_deg: f64,
    pub player_radius: f64,
    pub player_half_height: f64,
    /// Degrees of look per input count (after look-scale division).
    pub mouse_sensitivity: f64,
    pub surf_min_normal_z: f64,
    pub surf_max_normal_z: f64,
    pub wallrun_min_entry_speed_mult: f64,
    pub wallrun_min_approach_dot: f64,
    pub wallrun_min_parallel_dot: f64,
    pub surf_enabled: bool,
    pub wallrun_enabled: bool,
    pub autojump_enabled: bool,
    pub coyote_buffer_enabled: bool,
    pub custom_friction_enabled: bool,
    pub slide_enabled: bool,
    pub vault_enabled: bool,
}

impl Default for PhysicsTuning {
    fn default() -> Self {
        Self {
            max_ground_speed: 6.6,
            run_t90: 0.18,
            ground_stop_t90: 0.22,
            air_speed_mult: 1.7,
            air_gain_t90: 0.24,
            jump_height: 1.48,
            jump_apex_time: 0.351,
            slide_stop_t90: 1.10,
            wallrun_sink_t90: 0.22,
            grace_period: 0.12,
            grace_distance: 0.85,
            step_height: 0.55,
            ground_snap_dist: 0.22,
            max_ground_slope_deg: 45.57,
            player_radius: 0.40,
            player_half_height: 0.90,
            mouse_sensitivity: 0.055,
            surf_min_normal_z: 0.20,
            surf_max_normal_z: 0.65,
            wallrun_min_entry_speed_mult: 0.45,
            wallrun_min_approach_dot: 0.08,
            wallrun_min_parallel_dot: 0.30,
            surf_enabled: true,
            wallrun_enabled: true,
            autojump_enabled: true,
            coyote_buffer_enabled: true,
            custom_friction_enabled: true,
            slide_enabled: true,
            vault_enabled: true,
        }
    }
}

/// (field, min, max) for every numeric invariant, in declaration order.
/// This is the complete adjustable set the autotune suggester may target.
pub const NUMERIC_FIELDS: &[(&str, f64, f64)] = &[
    ("max_ground_speed", 0.5, 30.0),
    ("run_t90", 0.01, 2.0),
    ("ground_stop_t90", 0.01, 3.0),
    ("air_speed_mult", 1.0, 4.0),
    ("air_gain_t90", 0.01, 2.0),
    ("jump_height", 0.2, 6.0),
    ("jump_apex_time", 0.05, 1.5),
    ("slide_stop_t90", 0.05, 6.0),
    ("wallrun_sink_t90", 0.05, 3.0),
    ("grace_period", 0.0, 0.5),
    ("grace_distance", 0.0, 5.0),
    ("step_height", 0.0, 1.2),
    ("ground_snap_dist", 0.0, 1.0),
    ("max_ground_slope_deg", 10.0, 80.0),
    ("player_radius", 0.1, 1.2),
    ("player_half_height", 0.3, 2.0),
    ("mouse_sensitivity", 0.001, 2.0),
    ("surf_min_normal_z", 0.01, 0.95),
    ("surf_max_normal_z", 0.01, 0.98),
    ("wallrun_min_entry_speed_mult", 0.0, 3.0),
    ("wallrun_min_approach_dot", 0.0, 1.0),
    ("wallrun_min_parallel_dot", 0.0, 1.0),
];

pub const FLAG_FIELDS: &[&str] = &[
    "surf_enabled",
    "wallrun_enabled",
    "autojump_enabled",
    "coyote_buffer_enabled",
    "custom_friction_enabled",
    "slide_enabled",
    "vault_enabled",
];

/// Clamp range for a numeric invariant, if it is one.
pub fn field_limits(field: &str) -> Option<(f64, f64)> {
    NUMERIC_FIELDS
        .iter()
        .find(|(name, _, _)| *name == field)
        .map(|(_, lo, hi)| (*lo, *hi))
}

fn sane(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

impl PhysicsTuning {
    /// Returns self with every numeric field finite and inside its range.
    pub fn clamped(mut self) -> Self {
        self.clamp_in_place();
        self
    }

    pub fn clamp_in_place(&mut self) {
        let defaults = PhysicsTuning::default();
        for (name, lo, hi) in NUMERIC_FIELDS {
            let fallback = match defaults.get(name) {
                Some(TuningValue::Number(v)) => v,
                _ => *lo,
            };
            if let Some(TuningValue::Number(v)) = self.get(name) {
                self.set(name, TuningValue::Number(sane(v, *lo, *hi, fallback)));
            }
        }
        // Keep the surf band well-formed.
        if self.surf_max_normal_z < self.surf_min_normal_z {
            self.surf_max_normal_z = self.surf_min_normal_z;
        }
    }

    pub fn get(&self, field: &str) -> Option<TuningValue> {
        let number = |v: f64| Some(TuningValue::Number(v));
        let flag = |v: bool| Some(TuningValue::Flag(v));
        match field {
            "max_ground_speed" => number(self.max_ground_speed),
            "run_t90" => number(self.run_t90),
            "ground_stop_t90" => number(self.ground_stop_t90),
            "air_speed_mult" => number(self.air_speed_mult),
            "air_gain_t90" => number(self.air_gain_t90),
            "jump_height" => number(self.jump_height),
            "jump_apex_time" => number(self.jump_apex_time),
            "slide_stop_t90" => number(self.slide_stop_t90),
            "wallrun_sink_t90" => number(self.wallrun_sink_t90),
            "grace_period" => number(self.grace_period),
            "grace_distance" => number(self.grace_distance),
            "step_height" => number(self.step_height),
            "ground_snap_dist" => number(self.ground_snap_dist),
            "max_ground_slope_deg" => number(self.max_ground_slope_deg),
            "player_radius" => number(self.player_radius),
            "player_half_height" => number(self.player_half_height),
            "mouse_sensitivity" => number(self.mouse_sensitivity),
            "surf_min_normal_z" => number(self.surf_min_normal_z),
            "surf_max_normal_z" => number(self.surf_max_normal_z),
            "wallrun_min_entry_speed_mult" => number(self.wallrun_min_entry_speed_mult),
            "wallrun_min_approach_dot" => number(self.wallrun_min_approach_dot),
            "wallrun_min_parallel_dot" => number(self.wallrun_min_parallel_dot),
            "surf_enabled" => flag(self.surf_enabled),
            "wallrun_enabled" => flag(self.wallrun_enabled),
            "autojump_enabled" => flag(self.autojump_enabled),
            "coyote_buffer_enabled" => flag(self.coyote_buffer_enabled),
            "custom_friction_enabled" => flag(self.custom_friction_enabled),
            "slide_enabled" => flag(self.slide_enabled),
            "vault_enabled" => flag(self.vault_enabled),
            _ => None,
        }
    }

    /// Writes one field by name. Numeric writes are clamped to the field
    /// range; unknown fields and type mismatches are ignored and return
    /// false.
    pub fn set(&mut self, field: &str, value: TuningValue) -> bool {
        match (field, value) {
            ("max_ground_speed", TuningValue::Number(v)) => self.max_ground_speed = v,
            ("run_t90", TuningValue::Number(v)) => self.run_t90 = v,
            ("ground_stop_t90", TuningValue::Number(v)) => self.ground_stop_t90 = v,
            ("air_speed_mult", TuningValue::Number(v)) => self.air_speed_mult = v,
            ("air_gain_t90", TuningValue::Number(v)) => self.air_gain_t90 = v,
            ("jump_height", TuningValue::Number(v)) => self.jump_height = v,
            ("jump_apex_time", TuningValue::Number(v)) => self.jump_apex_time = v,
            ("slide_stop_t90", TuningValue::Number(v)) => self.slide_stop_t90 = v,
            ("wallrun_sink_t90", TuningValue::Number(v)) => self.wallrun_sink_t90 = v,
            ("grace_period", TuningValue::Number(v)) => self.grace_period = v,
            ("grace_distance", TuningValue::Number(v)) => self.grace_distance = v,
            ("step_height", TuningValue::Number(v)) => self.step_height = v,
            ("ground_snap_dist", TuningValue::Number(v)) => self.ground_snap_dist = v,
            ("max_ground_slope_deg", TuningValue::Number(v)) => self.max_ground_slope_deg = v,
            ("player_radius", TuningValue::Number(v)) => self.player_radius = v,
            ("player_half_height", TuningValue::Number(v)) => self.player_half_height = v,
            ("mouse_sensitivity", TuningValue::Number(v)) => self.mouse_sensitivity = v,
            ("surf_min_normal_z", TuningValue::Number(v)) => self.surf_min_normal_z = v,
            ("surf_max_normal_z", TuningValue::Number(v)) => self.surf_max_normal_z = v,
            ("wallrun_min_entry_speed_mult", TuningValue::Number(v)) => {
                self.wallrun_min_entry_speed_mult = v
            }
            ("wallrun_min_approach_dot", TuningValue::Number(v)) => {
                self.wallrun_min_approach_dot = v
            }
            ("wallrun_min_parallel_dot", TuningValue::Number(v)) => {
                self.wallrun_min_parallel_dot = v
            }
            ("surf_enabled", TuningValue::Flag(v)) => self.surf_enabled = v,
            ("wallrun_enabled", TuningValue::Flag(v)) => self.wallrun_enabled = v,
            ("autojump_enabled", TuningValue::Flag(v)) => self.autojump_enabled = v,
            ("coyote_buffer_enabled", TuningValue::Flag(v)) => self.coyote_buffer_enabled = v,
            ("custom_friction_enabled", TuningValue::Flag(v)) => self.custom_friction_enabled = v,
            ("slide_enabled", TuningValue::Flag(v)) => self.slide_enabled = v,
            ("vault_enabled", TuningValue::Flag(v)) => self.vault_enabled = v,
            _ => return false,
        }
        if let Some((lo, hi)) = field_limits(field) {
            if let Some(TuningValue::Number(v)) = self.get(field) {
                let defaults = PhysicsTuning::default();
                let fallback = match defaults.get(field) {
                    Some(TuningValue::Number(d)) => d,
                    _ => lo,
                };
                let clamped = sane(v, lo, hi, fallback);
                if clamped != v {
                    // Re-store through the same match arm; terminates because
                    // the clamped value is already in range.
                    let _ = self.set_raw(field, clamped);
                }
            }
        }
        true
    }

    fn set_raw(&mut self, field: &str, v: f64) -> bool {
        match field {
            "max_ground_speed" => self.max_ground_speed = v,
            "run_t90" => self.run_t90 = v,
            "ground_stop_t90" => self.ground_stop_t90 = v,
            "air_speed_mult" => self.air_speed_mult = v,
            "air_gain_t90" => self.air_gain_t90 = v,
            "jump_height" => self.jump_height = v,
            "jump_apex_time" => self.jump_apex_time = v,
            "slide_stop_t90" => self.slide_stop_t90 = v,
            "wallrun_sink_t90" => self.wallrun_sink_t90 = v,
            "grace_period" => self.grace_period = v,
            "grace_distance" => self.grace_distance = v,
            "step_height" => self.step_height = v,
            "ground_snap_dist" => self.ground_snap_dist = v,
            "max_ground_slope_deg" => self.max_ground_slope_deg = v,
            "player_radius" => self.player_radius = v,
            "player_half_height" => self.player_half_height = v,
            "mouse_sensitivity" => self.mouse_sensitivity = v,
            "surf_min_normal_z" => self.surf_min_normal_z = v,
            "surf_max_normal_z" => self.surf_max_normal_z = v,
            "wallrun_min_entry_speed_mult" => self.wallrun_min_entry_speed_mult = v,
            "wallrun_min_approach_dot" => self.wallrun_min_approach_dot = v,
            "wallrun_min_parallel_dot" => self.wallrun_min_parallel_dot = v,
            _ => return false,
        }
        true
    }

    /// Applies a loosely-typed snapshot (demo metadata, backup contents).
    /// Unknown fields are ignored; the result is clamped.
    pub fn apply_snapshot(&mut self, snapshot: &serde_json::Map<String, serde_json::Value>) {
        for (field, value) in snapshot {
            match value {
                serde_json::Value::Bool(b) => {
                    self.set(field, TuningValue::Flag(*b));
                }
                serde_json::Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        self.set(field, TuningValue::Number(v));
                    }
                }
                _ => {}
            }
        }
        self.clamp_in_place();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_field() {
        let t = PhysicsTuning::default();
        for (name, _, _) in NUMERIC_FIELDS {
            assert!(matches!(t.get(name), Some(TuningValue::Number(_))), "{name}");
        }
        for name in FLAG_FIELDS {
            assert!(matches!(t.get(name), Some(TuningValue::Flag(_))), "{name}");
        }
    }

    #[test]
    fn set_clamps_to_range() {
        let mut t = PhysicsTuning::default();
        t.set("max_ground_speed", TuningValue::Number(1e9));
        assert_eq!(t.max_ground_speed, 30.0);
        t.set("jump_apex_time", TuningValue::Number(0.0));
        assert_eq!(t.jump_apex_time, 0.05);
    }

    #[test]
    fn non_finite_falls_back_to_default() {
        let mut t = PhysicsTuning::default();
        t.set("run_t90", TuningValue::Number(f64::NAN));
        assert_eq!(t.run_t90, PhysicsTuning::default().run_t90);
    }

    #[test]
    fn snapshot_round_trip_preserves_fields() {
        let mut t = PhysicsTuning::default();
        t.max_ground_speed = 7.25;
        t.surf_enabled = false;
        let json = serde_json::to_value(&t).unwrap();
        let map = json.as_object().unwrap();
        let mut restored = PhysicsTuning::default();
        restored.apply_snapshot(map);
        assert_eq!(restored, t);
    }
}
