pub mod autotune;
pub mod camera;
pub mod collision;
pub mod math;
pub mod motion;
pub mod player;
pub mod replays;
pub mod tuning;

pub use camera::CameraPlugin;
pub use player::PlayerPlugin;

use bevy::prelude::*;

/// Unified plugin that adds the movement core and camera systems.
pub struct IvanLocomotionPlugin;

impl Plugin for IvanLocomotionPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<PlayerPlugin>() {
            app.add_plugins(PlayerPlugin);
        }
        if !app.is_plugin_added::<CameraPlugin>() {
            app.add_plugins(CameraPlugin);
        }
    }
}

pub mod prelude {
    pub use crate::IvanLocomotionPlugin;
    pub use crate::camera::{CameraFeedback, CameraFeedbackObserver, CameraPlugin, FeedbackCamera};
    pub use crate::collision::{Aabb, Brush, BrushWorld, CollisionQuery, Hit};
    pub use crate::motion::{
        InputCommand, MotionIntent, MotionSolver, MotionState, MotionWriteSource,
    };
    pub use crate::player::{
        PlayerController, PlayerMotion, PlayerPlugin, StepFrame, spawn_player,
    };
    pub use crate::tuning::{MotionConfig, PhysicsTuning, derive_motion_config};
}
