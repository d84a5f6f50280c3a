use bevy::math::DVec3;
use bevy::prelude::*;
use bevy_enhanced_input::prelude::*;

use super::controller::PlayerController;
use super::input::{
    ActionState, GrappleAction, JumpAction, LookAction, LookInput, MoveAction, MoveInput,
    NoClipAction, SlideAction, accumulate_look_delta, clear_move_axes, latch_action_press,
    read_move_axes, release_action_hold,
};
use crate::camera::{CameraFeedback, CameraPitch, CameraYaw, FeedbackCamera};
use crate::collision::{Aabb, BrushWorld};
use crate::motion::{InputCommand, MotionIntent};
use crate::replays::demo::{ActiveRecording, FrameTelemetry};
use crate::replays::determinism::controller_tick_hash;
use crate::tuning::PhysicsTuning;

/// Input counts per accumulated look unit; demos store integer deltas.
pub const LOOK_SCALE: i32 = 8;

/// Marker component for the player entity (also used as input context)
#[derive(Component, Default)]
pub struct Player;

/// The deterministic motion core, embedded as a component.
#[derive(Component, Deref, DerefMut)]
pub struct PlayerMotion(pub PlayerController);

/// Sim-space view angles in degrees; the camera renders from these.
#[derive(Component, Default, Clone, Copy)]
pub struct ViewAngles {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
}

/// Accumulated simulation time; never wall clock.
#[derive(Resource, Default)]
pub struct SimClock {
    pub now: f64,
}

/// Plugin for the first-person movement core
pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EnhancedInputPlugin);

        app.add_input_context::<Player>();

        app.add_observer(read_move_axes);
        app.add_observer(clear_move_axes);
        app.add_observer(accumulate_look_delta);
        app.add_observer(latch_action_press::<JumpAction>);
        app.add_observer(release_action_hold::<JumpAction>);
        app.add_observer(latch_action_press::<SlideAction>);
        app.add_observer(release_action_hold::<SlideAction>);
        app.add_observer(latch_action_press::<GrappleAction>);
        app.add_observer(latch_action_press::<NoClipAction>);

        app.init_resource::<SimClock>();
        app.init_resource::<CameraFeedback>();
        app.init_resource::<ActiveRecording>();

        app.add_systems(Startup, spawn_player);

        app.add_systems(
            FixedUpdate,
            (drive_player_motion, sync_player_transform).chain(),
        );
    }
}

/// Z-up simulation space to Y-up render space.
pub fn to_render(v: DVec3) -> Vec3 {
    Vec3::new(v.x as f32, v.z as f32, -v.y as f32)
}

/// Assembles the per-tick command, advances the controller one fixed tick,
/// and feeds the camera feedback observer plus the active demo recording.
#[allow(clippy::type_complexity)]
pub fn drive_player_motion(
    mut query: Query<(
        &mut PlayerMotion,
        &mut ViewAngles,
        &MoveInput,
        &mut LookInput,
        &mut ActionState<JumpAction>,
        &mut ActionState<SlideAction>,
        &mut ActionState<GrappleAction>,
        &mut ActionState<NoClipAction>,
    )>,
    time: Res<Time>,
    mut clock: ResMut<SimClock>,
    mut feedback: ResMut<CameraFeedback>,
    mut recording: ResMut<ActiveRecording>,
) {
    let dt = time.delta_secs_f64();
    if dt <= 0.0 {
        return;
    }

    for (mut motion, mut view, move_input, mut look, mut jump, mut slide, mut grapple, mut noclip) in
        &mut query
    {
        let cmd = InputCommand {
            look_dx: (look.x * LOOK_SCALE as f32).round() as i32,
            look_dy: (look.y * LOOK_SCALE as f32).round() as i32,
            move_forward: axis_sign(move_input.y),
            move_right: axis_sign(move_input.x),
            jump_pressed: jump.take_pressed(),
            jump_held: jump.held,
            slide_pressed: slide.take_pressed(),
            slide_held: slide.held,
            grapple_pressed: grapple.take_pressed(),
            noclip_toggle_pressed: noclip.take_pressed(),
            ..Default::default()
        }
        .clamped();
        look.0 = Vec2::ZERO;

        let tuning = motion.tuning();
        let sensitivity = tuning.mouse_sensitivity;
        let autojump = tuning.autojump_enabled;
        view.yaw_deg -= (cmd.look_dx as f64 / LOOK_SCALE as f64) * sensitivity;
        view.pitch_deg =
            (view.pitch_deg - (cmd.look_dy as f64 / LOOK_SCALE as f64) * sensitivity).clamp(-88.0, 88.0);

        if cmd.noclip_toggle_pressed {
            motion.toggle_noclip();
        }

        let intent = MotionIntent::from_command(&cmd, view.yaw_deg, motion.grounded(), autojump);
        let frame = motion.step(dt, &intent, view.yaw_deg, view.pitch_deg);
        clock.now += dt;

        let tuning = motion.tuning();
        feedback.observer.record_sim_tick(
            clock.now,
            cmd.jump_pressed,
            cmd.jump_held,
            tuning.autojump_enabled,
            tuning.grace_period,
            tuning.max_ground_speed,
            frame.pre_grounded,
            frame.post_grounded,
            frame.pre_vel,
            frame.post_vel,
        );

        if let Some(rec) = recording.0.as_mut() {
            let pos = motion.pos();
            let vel = motion.vel();
            let hs = crate::math::horizontal_speed(vel);
            let telemetry = FrameTelemetry {
                t: clock.now,
                x: pos.x,
                y: pos.y,
                z: pos.z,
                yaw: view.yaw_deg,
                pitch: view.pitch_deg,
                vx: vel.x,
                vy: vel.y,
                vz: vel.z,
                hs,
                sp: vel.length(),
                grounded: motion.grounded(),
                det_h: controller_tick_hash(&motion.0, view.yaw_deg, view.pitch_deg),
            };
            rec.push_frame(cmd, Some(telemetry));
        }
    }
}

fn axis_sign(value: f32) -> i8 {
    if value > 0.5 {
        1
    } else if value < -0.5 {
        -1
    } else {
        0
    }
}

/// Mirrors the sim position into the render transform.
pub fn sync_player_transform(mut query: Query<(&PlayerMotion, &mut Transform), With<Player>>) {
    for (motion, mut transform) in &mut query {
        transform.translation = to_render(motion.pos());
    }
}

/// Spawns the player entity with the motion core, a flat starter arena, and
/// the camera hierarchy.
pub fn spawn_player(mut commands: Commands) {
    let tuning = PhysicsTuning::default();
    let half = DVec3::new(
        tuning.player_radius,
        tuning.player_radius,
        tuning.player_half_height,
    );
    let arena = BrushWorld::new(half).with_aabbs(vec![Aabb::new(
        DVec3::new(-60.0, -60.0, -1.0),
        DVec3::new(60.0, 60.0, 0.0),
    )]);
    let controller = PlayerController::new(tuning, DVec3::new(0.0, 0.0, 1.2))
        .with_collision(Box::new(arena));

    // Yaw entity rotates for left/right look, pitch entity nests under it.
    let yaw_entity = commands
        .spawn((
            CameraYaw,
            Transform::from_translation(Vec3::new(0.0, 1.2, 0.0)),
            Visibility::default(),
        ))
        .id();

    let pitch_entity = commands
        .spawn((
            CameraPitch,
            Transform::from_translation(Vec3::new(0.0, 0.72, 0.0)),
            Visibility::default(),
        ))
        .id();

    let camera_entity = commands
        .spawn((
            FeedbackCamera::default(),
            Camera3d::default(),
            Projection::Perspective(PerspectiveProjection {
                fov: 96.0_f32.to_radians(),
                ..default()
            }),
            Transform::default(),
        ))
        .id();

    commands.entity(yaw_entity).add_child(pitch_entity);
    commands.entity(pitch_entity).add_child(camera_entity);

    commands
        .spawn((
            Player,
            PlayerMotion(controller),
            ViewAngles::default(),
            Transform::from_translation(Vec3::new(0.0, 1.2, 0.0)),
            Visibility::default(),
        ))
        .insert((
            MoveInput::default(),
            LookInput::default(),
            ActionState::<JumpAction>::default(),
            ActionState::<SlideAction>::default(),
            ActionState::<GrappleAction>::default(),
            ActionState::<NoClipAction>::default(),
        ))
        .insert(actions!(Player[
            (
                Action::<MoveAction>::new(),
                bindings![
                    (KeyCode::KeyW, SwizzleAxis::YXZ),
                    (KeyCode::KeyS, SwizzleAxis::YXZ, Negate::all()),
                    KeyCode::KeyD,
                    (KeyCode::KeyA, Negate::all()),
                ],
            ),
            (
                Action::<LookAction>::new(),
                bindings![
                    Binding::mouse_motion(),
                ],
            ),
            (
                Action::<JumpAction>::new(),
                bindings![KeyCode::Space, GamepadButton::South],
            ),
            (
                Action::<SlideAction>::new(),
                bindings![KeyCode::ControlLeft, GamepadButton::East],
            ),
            (
                Action::<GrappleAction>::new(),
                bindings![KeyCode::KeyE, GamepadButton::RightTrigger],
            ),
            (
                Action::<NoClipAction>::new(),
                bindings![KeyCode::KeyV],
            ),
        ]));
}
