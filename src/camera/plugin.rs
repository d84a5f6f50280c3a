use bevy::prelude::*;

use super::feedback::CameraFeedbackObserver;
use super::look::{CameraPitch, apply_view_angles, follow_player_position};
use crate::math;
use crate::player::{Player, PlayerMotion, ViewAngles, plugin::to_render};

/// Camera marker plus the per-camera FOV application state.
#[derive(Component, Default)]
pub struct FeedbackCamera;

/// The read-only feedback observer plus its presentation settings.
#[derive(Resource)]
pub struct CameraFeedback {
    pub observer: CameraFeedbackObserver,
    pub enabled: bool,
    /// Base FOV in degrees
    pub base_fov_deg: f64,
    /// Maximum speed-FOV widening in degrees
    pub speed_fov_max_add_deg: f64,
    /// Event pulse gain (1.0 = reference strength)
    pub event_gain: f64,
    pub event_attack_ms: f64,
    pub event_release_ms: f64,
}

impl Default for CameraFeedback {
    fn default() -> Self {
        Self {
            observer: CameraFeedbackObserver::new(),
            enabled: true,
            base_fov_deg: 96.0,
            speed_fov_max_add_deg: 10.0,
            event_gain: 1.0,
            event_attack_ms: 55.0,
            event_release_ms: 240.0,
        }
    }
}

/// Plugin for the feedback-driven first-person camera
pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraFeedback>();

        app.add_systems(
            Update,
            (follow_player_position, apply_view_angles, apply_feedback_pose).chain(),
        );
    }
}

pub(crate) fn render_position(motion: &PlayerMotion) -> Vec3 {
    to_render(motion.pos())
}

/// Advances the observer envelope and applies the resulting pose: FOV on
/// the camera projection, pitch pulse on the pitch entity.
pub fn apply_feedback_pose(
    player_query: Query<(&PlayerMotion, &ViewAngles), With<Player>>,
    mut feedback: ResMut<CameraFeedback>,
    mut camera_query: Query<&mut Projection, With<FeedbackCamera>>,
    mut pitch_query: Query<&mut Transform, With<CameraPitch>>,
    time: Res<Time>,
) {
    let Ok((motion, view)) = player_query.single() else {
        return;
    };

    let hspeed = math::horizontal_speed(motion.vel());
    let vmax = motion.tuning().max_ground_speed;
    let enabled = feedback.enabled;
    let base_fov_deg = feedback.base_fov_deg;
    let speed_fov_max_add_deg = feedback.speed_fov_max_add_deg;
    let event_gain = feedback.event_gain;
    let event_attack_ms = feedback.event_attack_ms;
    let event_release_ms = feedback.event_release_ms;
    let pose = feedback.observer.observe(
        time.delta_secs_f64(),
        hspeed,
        vmax,
        enabled,
        base_fov_deg,
        speed_fov_max_add_deg,
        event_gain,
        event_attack_ms,
        event_release_ms,
    );

    if let Ok(mut projection) = camera_query.single_mut() {
        if let Projection::Perspective(ref mut persp) = *projection {
            persp.fov = (pose.fov_deg as f32).to_radians();
        }
    }

    if let Ok(mut pitch_transform) = pitch_query.single_mut() {
        pitch_transform.rotation =
            Quat::from_rotation_x((view.pitch_deg + pose.pitch_deg).to_radians() as f32);
    }
}
