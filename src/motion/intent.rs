use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::math;

/// Raw per-tick input, exactly what the demo format records.
///
/// Look deltas are scaled integers (counts); `look_scale` in the demo
/// metadata converts them back to degrees together with the mouse
/// sensitivity. Axis fields are −1/0/+1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputCommand {
    pub look_dx: i32,
    pub look_dy: i32,
    pub move_forward: i8,
    pub move_right: i8,
    pub jump_pressed: bool,
    pub jump_held: bool,
    pub slide_pressed: bool,
    pub slide_held: bool,
    pub grapple_pressed: bool,
    pub noclip_toggle_pressed: bool,
    pub key_w_held: bool,
    pub key_a_held: bool,
    pub key_s_held: bool,
    pub key_d_held: bool,
    pub arrow_up_held: bool,
    pub arrow_down_held: bool,
    pub arrow_left_held: bool,
    pub arrow_right_held: bool,
    pub mouse_left_held: bool,
    pub mouse_right_held: bool,
}

impl InputCommand {
    pub fn clamped(mut self) -> Self {
        self.move_forward = self.move_forward.clamp(-1, 1);
        self.move_right = self.move_right.clamp(-1, 1);
        self
    }
}

/// Typed per-tick intent consumed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionIntent {
    /// Horizontal wish direction, unit length or zero.
    pub wish_dir: DVec3,
    /// Edge-pressed jump OR a queued autojump.
    pub jump_requested: bool,
    pub slide_requested: bool,
}

impl MotionIntent {
    /// Builds the intent for one tick the same way live play and replay do.
    ///
    /// Autojump folds a held jump into `jump_requested` while grounded so
    /// that recorded and resimulated runs agree tick-for-tick.
    pub fn from_command(cmd: &InputCommand, yaw_deg: f64, grounded: bool, autojump_enabled: bool) -> Self {
        let mut jump_requested = cmd.jump_pressed;
        if autojump_enabled && cmd.jump_held && grounded {
            jump_requested = true;
        }
        MotionIntent {
            wish_dir: wish_direction_from_axes(yaw_deg, cmd.move_forward, cmd.move_right),
            jump_requested,
            slide_requested: cmd.slide_pressed || cmd.slide_held,
        }
    }
}

/// Horizontal wish direction from yaw and move axes.
///
/// `forward = (−sin yaw, cos yaw, 0)`, `right = (forward.y, −forward.x, 0)`;
/// zero when both axes are zero.
pub fn wish_direction_from_axes(yaw_deg: f64, move_forward: i8, move_right: i8) -> DVec3 {
    let h_rad = yaw_deg.to_radians();
    let forward = DVec3::new(-h_rad.sin(), h_rad.cos(), 0.0);
    let right = DVec3::new(forward.y, -forward.x, 0.0);

    let mut out = DVec3::ZERO;
    if move_forward > 0 {
        out += forward;
    } else if move_forward < 0 {
        out -= forward;
    }
    if move_right > 0 {
        out += right;
    } else if move_right < 0 {
        out -= right;
    }
    math::normalize_or_zero(out)
}
