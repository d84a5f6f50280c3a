use bevy::prelude::*;

use crate::player::{Player, PlayerMotion, ViewAngles};

/// Tags the rig entity that turns left/right; pitch nests under it.
#[derive(Component)]
pub struct CameraYaw;

/// Tags the nested entity that tilts up/down.
#[derive(Component)]
pub struct CameraPitch;

/// Rotates the yaw entity from the player's sim-space view angles.
///
/// Sim yaw 0 faces +Y (render −Z), so the render rotation is a plain
/// Y-axis turn by the same angle.
pub fn apply_view_angles(
    player_query: Query<&ViewAngles, With<Player>>,
    mut yaw_query: Query<&mut Transform, With<CameraYaw>>,
) {
    let Ok(view) = player_query.single() else {
        return;
    };

    if let Ok(mut yaw_transform) = yaw_query.single_mut() {
        yaw_transform.rotation = Quat::from_rotation_y(view.yaw_deg.to_radians() as f32);
    }
}

/// Parks the camera rig on the player's rendered position each frame; the
/// rig itself never reads controller state beyond that.
pub fn follow_player_position(
    player_query: Query<&PlayerMotion, With<Player>>,
    mut yaw_query: Query<&mut Transform, (With<CameraYaw>, Without<Player>)>,
) {
    let Ok(motion) = player_query.single() else {
        return;
    };

    if let Ok(mut yaw_transform) = yaw_query.single_mut() {
        yaw_transform.translation = super::plugin::render_position(motion);
    }
}
