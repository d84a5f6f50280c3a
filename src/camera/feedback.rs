use bevy::math::DVec3;

use crate::math;

/// Landing impact below this downward speed does not pulse the camera.
const LANDING_IMPACT_FLOOR: f64 = 1.3;
/// Downward speed span mapping a landing impact onto [0, 1].
const LANDING_IMPACT_SPAN: f64 = 7.0;
/// Speed-FOV: widening saturates by this multiple of Vmax.
const SPEED_FOV_SATURATION_RATIO: f64 = 9.0;
/// FOV smoothing rate (per second).
const FOV_SMOOTH_RATE: f64 = 9.0;
const EVENT_FOV_GAIN_DEG: f64 = 2.2;
const EVENT_PITCH_GAIN_DEG: f64 = -2.4;

/// One observed camera pose, fully derived; the observer never writes back
/// into the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFeedbackPose {
    pub fov_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub speed_ratio: f64,
    pub speed_t: f64,
    pub speed_fov_add_deg: f64,
    pub target_fov_deg: f64,
    pub event_name: &'static str,
    pub event_quality: f64,
    pub event_applied_amp: f64,
    pub event_blocked_reason: &'static str,
}

/// Read-only camera feedback layer: speed FOV plus landing/bhop event
/// pulses with an attack/release envelope.
///
/// `record_sim_tick` ingests the controller's pre/post tick snapshot;
/// `observe` advances the envelope and returns the pose for this frame.
#[derive(Debug, Clone)]
pub struct CameraFeedbackObserver {
    ready_fov: bool,
    fov_deg: f64,
    event_target: f64,
    event_env: f64,
    last_jump_press_time: f64,
    last_landing_time: f64,
    event_name: &'static str,
    event_quality: f64,
    event_blocked_reason: &'static str,
}

impl Default for CameraFeedbackObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraFeedbackObserver {
    pub fn new() -> Self {
        Self {
            ready_fov: false,
            fov_deg: 96.0,
            event_target: 0.0,
            event_env: 0.0,
            last_jump_press_time: -999.0,
            last_landing_time: -999.0,
            event_name: "none",
            event_quality: 0.0,
            event_blocked_reason: "none",
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn trigger_event(&mut self, name: &'static str, quality: f64) {
        let q = quality.clamp(0.0, 1.0);
        if q <= 0.0 {
            return;
        }
        self.event_target = self.event_target.max(q);
        self.event_name = name;
        self.event_quality = q;
        self.event_blocked_reason = "none";
    }

    /// Ingests one simulation tick. `now` is accumulated sim time, not wall
    /// clock. All classification (landing, bhop timing windows) happens
    /// here; nothing mutates the controller.
    #[allow(clippy::too_many_arguments)]
    pub fn record_sim_tick(
        &mut self,
        now: f64,
        jump_pressed: bool,
        jump_held: bool,
        autojump_enabled: bool,
        grace_period: f64,
        max_ground_speed: f64,
        pre_grounded: bool,
        post_grounded: bool,
        pre_vel: DVec3,
        post_vel: DVec3,
    ) {
        if jump_pressed || (autojump_enabled && jump_held && pre_grounded) {
            self.last_jump_press_time = now;
        }

        let landing = !pre_grounded && post_grounded;
        if landing {
            self.last_landing_time = now;
            let impact_down = (-pre_vel.z).max(0.0);
            let impact_norm =
                ((impact_down - LANDING_IMPACT_FLOOR) / LANDING_IMPACT_SPAN).clamp(0.0, 1.0);
            if impact_norm > 1e-5 {
                self.trigger_event("landing", impact_norm);
            } else {
                self.event_blocked_reason = "landing_soft";
            }
        }

        let takeoff = pre_grounded && !post_grounded && post_vel.z > 0.05;
        if !takeoff {
            return;
        }
        let window_s = (grace_period + 0.03).clamp(0.045, 0.35);
        let mut input_ok = (now - self.last_jump_press_time) <= window_s;
        // Autojump queues still count as successful timing windows.
        if autojump_enabled && jump_held {
            input_ok = true;
        }
        if !input_ok {
            self.event_blocked_reason = "bhop_timing";
            return;
        }

        let pre_hspeed = math::horizontal_speed(pre_vel);
        let speed_ok = pre_hspeed >= (max_ground_speed * 0.35).max(0.75);
        let recent_landing = (now - self.last_landing_time) <= (window_s * 1.15).max(0.035);
        if !(speed_ok || recent_landing) {
            self.event_blocked_reason = "bhop_speed";
            return;
        }
        let speed_ratio = pre_hspeed / max_ground_speed.max(1e-4);
        let speed_quality = ((speed_ratio - 0.35) / 1.8).clamp(0.0, 1.0);
        let timing_age = (now - self.last_jump_press_time).max(0.0);
        let timing_quality = (1.0 - timing_age / window_s.max(1e-4)).clamp(0.0, 1.0);
        let landing_bonus = if recent_landing { 0.20 } else { 0.0 };
        let quality =
            (0.35 + 0.45 * speed_quality + 0.20 * timing_quality + landing_bonus).clamp(0.0, 1.0);
        self.trigger_event("bhop", quality);
    }

    /// Speed-FOV widening in degrees for a horizontal speed: zero at or
    /// below Vmax, ease-out toward `max_add_deg` by 10× Vmax.
    pub fn speed_fov_add(horizontal_speed: f64, max_ground_speed: f64, max_add_deg: f64) -> f64 {
        let ratio = horizontal_speed / max_ground_speed.max(1e-4);
        if ratio <= 1.0 {
            return 0.0;
        }
        let raw = ((ratio - 1.0) / SPEED_FOV_SATURATION_RATIO).clamp(0.0, 1.0);
        let t = 1.0 - (1.0 - raw) * (1.0 - raw);
        max_add_deg.max(0.0) * t
    }

    /// Advances the event envelope and returns the frame's camera pose.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        dt: f64,
        horizontal_speed: f64,
        max_ground_speed: f64,
        enabled: bool,
        base_fov_deg: f64,
        speed_fov_max_add_deg: f64,
        event_gain: f64,
        event_attack_ms: f64,
        event_release_ms: f64,
    ) -> CameraFeedbackPose {
        let base_fov = base_fov_deg.clamp(60.0, 130.0);
        if !enabled {
            self.ready_fov = false;
            self.event_target = 0.0;
            self.event_env = 0.0;
            self.event_name = "none";
            self.event_quality = 0.0;
            self.event_blocked_reason = "none";
            return CameraFeedbackPose {
                fov_deg: base_fov,
                pitch_deg: 0.0,
                roll_deg: 0.0,
                speed_ratio: 0.0,
                speed_t: 0.0,
                speed_fov_add_deg: 0.0,
                target_fov_deg: base_fov,
                event_name: "none",
                event_quality: 0.0,
                event_applied_amp: 0.0,
                event_blocked_reason: "none",
            };
        }

        let frame_dt = dt.max(0.0);
        if frame_dt > 0.0 {
            let release_tau = (event_release_ms * 0.001).max(0.02);
            self.event_target *= (-frame_dt / release_tau).exp();
            let alpha = if self.event_target >= self.event_env {
                let attack_tau = (event_attack_ms * 0.001).max(0.01);
                1.0 - (-frame_dt / attack_tau).exp()
            } else {
                1.0 - (-frame_dt / release_tau).exp()
            };
            let alpha = alpha.clamp(0.0, 1.0);
            self.event_env += (self.event_target - self.event_env) * alpha;
            if self.event_target <= 1e-4 && self.event_env <= 1e-4 {
                self.event_name = "none";
                self.event_quality = 0.0;
            }
        }

        let speed_ratio = horizontal_speed / max_ground_speed.max(1e-4);
        let speed_over_t = if speed_ratio > 1.0 {
            let raw = ((speed_ratio - 1.0) / SPEED_FOV_SATURATION_RATIO).clamp(0.0, 1.0);
            1.0 - (1.0 - raw) * (1.0 - raw)
        } else {
            0.0
        };
        let speed_fov = speed_fov_max_add_deg.max(0.0) * speed_over_t;

        let event_amp = event_gain.max(0.0) * self.event_env.max(0.0);
        let event_fov = EVENT_FOV_GAIN_DEG * event_amp;
        let target_fov = (base_fov + speed_fov + event_fov).clamp(60.0, 140.0);
        if !self.ready_fov {
            self.fov_deg = target_fov;
            self.ready_fov = true;
        } else if frame_dt > 0.0 {
            let fov_alpha = (1.0 - (-FOV_SMOOTH_RATE * frame_dt).exp()).clamp(0.0, 1.0);
            self.fov_deg += (target_fov - self.fov_deg) * fov_alpha;
        }

        CameraFeedbackPose {
            fov_deg: self.fov_deg,
            pitch_deg: EVENT_PITCH_GAIN_DEG * event_amp,
            roll_deg: 0.0,
            speed_ratio,
            speed_t: speed_over_t,
            speed_fov_add_deg: speed_fov,
            target_fov_deg: target_fov,
            event_name: self.event_name,
            event_quality: self.event_quality,
            event_applied_amp: event_amp,
            event_blocked_reason: self.event_blocked_reason,
        }
    }
}
