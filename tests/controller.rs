//! End-to-end controller scenarios on a deterministic brush world.

use bevy::math::DVec3;
use ivan_locomotion::collision::{Aabb, Brush, BrushWorld};
use ivan_locomotion::motion::{MotionIntent, MotionWriteSource};
use ivan_locomotion::player::PlayerController;
use ivan_locomotion::tuning::{PhysicsTuning, derive_motion_config};

const DT: f64 = 1.0 / 60.0;

fn tuning() -> PhysicsTuning {
    PhysicsTuning {
        max_ground_speed: 6.6,
        run_t90: 0.18,
        jump_height: 1.48,
        jump_apex_time: 0.351,
        ..Default::default()
    }
}

fn half(t: &PhysicsTuning) -> DVec3 {
    DVec3::new(t.player_radius, t.player_radius, t.player_half_height)
}

fn floor_world(t: &PhysicsTuning) -> BrushWorld {
    BrushWorld::new(half(t)).with_aabbs(vec![Aabb::new(
        DVec3::new(-200.0, -200.0, -1.0),
        DVec3::new(200.0, 200.0, 0.0),
    )])
}

fn grounded_controller(t: &PhysicsTuning) -> PlayerController {
    let mut ctrl = PlayerController::new(t.clone(), DVec3::new(0.0, 0.0, 1.0))
        .with_collision(Box::new(floor_world(t)));
    // Settle onto the floor.
    for _ in 0..5 {
        ctrl.step(DT, &MotionIntent::default(), 0.0, 0.0);
    }
    assert!(ctrl.grounded());
    ctrl
}

fn forward() -> MotionIntent {
    MotionIntent {
        wish_dir: DVec3::Y,
        ..Default::default()
    }
}

#[test]
fn flat_ground_run_up_reaches_vmax_by_tick_30() {
    let t = tuning();
    let mut ctrl = grounded_controller(&t);
    for _ in 0..30 {
        ctrl.step(DT, &forward(), 0.0, 0.0);
    }
    let hspeed = ivan_locomotion::math::horizontal_speed(ctrl.vel());
    assert!(hspeed >= 6.5, "hspeed after 30 ticks = {hspeed}");
    assert!(hspeed <= t.max_ground_speed + 1e-9);
    assert!(ctrl.grounded());
}

#[test]
fn grounded_jump_leaves_at_derived_takeoff_speed() {
    let t = tuning();
    let config = derive_motion_config(&t);
    let mut ctrl = grounded_controller(&t);
    let intent = MotionIntent {
        jump_requested: true,
        ..Default::default()
    };
    // Vault probing is irrelevant on open ground but disable it anyway so
    // the takeoff path is unambiguous.
    let mut t2 = t.clone();
    t2.vault_enabled = false;
    ctrl.apply_tuning(t2);
    ctrl.step(DT, &intent, 0.0, 0.0);

    assert!(!ctrl.grounded());
    assert_eq!(ctrl.vel().z, config.derived.jump_takeoff_speed);
    assert_eq!(ctrl.last_vel_write_source(), MotionWriteSource::Impulse);
    assert_eq!(ctrl.last_vel_write_reason(), "jump.takeoff");
}

#[test]
fn wall_clip_preserves_upward_jump_velocity() {
    let mut t = tuning();
    t.surf_enabled = false;
    t.wallrun_enabled = false;
    // Leaning wall ahead of the player along +x: normal (-0.7, 0, 0.2),
    // placed so the swept volume reaches it within the first tick.
    let start = DVec3::new(0.0, 0.0, 6.0);
    let n = DVec3::new(-0.7, 0.0, 0.2).normalize();
    let support = n.x.abs() * t.player_radius + n.z.abs() * t.player_half_height;
    let d = n.dot(start) - support - 0.005;
    let wall = Brush::from_planes(vec![
        (n, d),
        (DVec3::X, 40.0),
        (DVec3::Y, 40.0),
        (DVec3::NEG_Y, 40.0),
        (DVec3::Z, 40.0),
        (DVec3::NEG_Z, 40.0),
    ]);
    let world = BrushWorld::new(half(&t)).with_brushes(vec![wall]);
    let mut ctrl = PlayerController::new(t.clone(), start).with_collision(Box::new(world));
    ctrl.set_external_velocity(DVec3::new(3.0, 0.0, 7.0), "test.launch");

    ctrl.step(DT, &MotionIntent::default(), 0.0, 0.0);

    // Air gravity ran before the move; the wall clip must not touch the
    // vertical component on a mostly-vertical surface.
    let g = derive_motion_config(&t).derived.gravity;
    let expected_z = 7.0 - g * DT;
    assert_eq!(ctrl.vel().z, expected_z);
    // Horizontal motion into the wall is gone.
    assert!(ctrl.vel().x.abs() < 1e-9, "vel.x = {}", ctrl.vel().x);
}

#[test]
fn grounded_state_does_not_flicker_at_rest() {
    let t = tuning();
    let mut ctrl = grounded_controller(&t);
    for tick in 0..120 {
        ctrl.step(DT, &MotionIntent::default(), 0.0, 0.0);
        assert!(ctrl.grounded(), "lost ground on tick {tick}");
        assert!(ctrl.vel().length() < 1e-6);
    }
}

#[test]
fn jump_buffer_fires_on_landing() {
    let t = tuning();
    let mut ctrl = PlayerController::new(t.clone(), DVec3::new(0.0, 0.0, 2.0))
        .with_collision(Box::new(floor_world(&t)));
    // One airborne press, then nothing: the buffer must carry it to the
    // landing tick.
    let press = MotionIntent {
        jump_requested: true,
        ..Default::default()
    };
    ctrl.step(DT, &press, 0.0, 0.0);
    assert!(!ctrl.grounded());
    assert!(ctrl.jump_buffer_left() > 0.0);

    let mut jumped = false;
    for _ in 0..40 {
        ctrl.step(DT, &MotionIntent::default(), 0.0, 0.0);
        if ctrl.vel().z > 1.0 {
            jumped = true;
            break;
        }
    }
    assert!(jumped, "buffered jump never fired");
    assert_eq!(ctrl.last_vel_write_reason(), "jump.takeoff");
}

#[test]
fn coyote_window_allows_jump_after_leaving_ledge() {
    let t = tuning();
    // Narrow platform; running forward walks off the edge.
    let world = BrushWorld::new(half(&t)).with_aabbs(vec![Aabb::new(
        DVec3::new(-2.0, -2.0, -1.0),
        DVec3::new(2.0, 2.0, 0.0),
    )]);
    let mut ctrl = PlayerController::new(t.clone(), DVec3::new(0.0, 0.0, 1.0))
        .with_collision(Box::new(world));
    for _ in 0..5 {
        ctrl.step(DT, &MotionIntent::default(), 0.0, 0.0);
    }
    assert!(ctrl.grounded());

    let mut left_ground_at = None;
    for tick in 0..200 {
        ctrl.step(DT, &forward(), 0.0, 0.0);
        if !ctrl.grounded() {
            left_ground_at = Some(tick);
            break;
        }
    }
    let _ = left_ground_at.expect("never ran off the platform");
    assert!(ctrl.coyote_left() > 0.0);

    let press = MotionIntent {
        wish_dir: DVec3::Y,
        jump_requested: true,
        ..Default::default()
    };
    ctrl.step(DT, &press, 0.0, 0.0);
    assert!(ctrl.vel().z > 1.0, "coyote jump did not fire");
}

#[test]
fn external_velocity_is_stamped_external() {
    let t = tuning();
    let mut ctrl = grounded_controller(&t);
    ctrl.set_external_velocity(DVec3::new(0.0, 12.0, 4.0), "transport.launch");
    assert_eq!(ctrl.last_vel_write_source(), MotionWriteSource::External);
    assert_eq!(ctrl.last_vel_write_reason(), "transport.launch");
    assert!(!ctrl.grounded());
}

#[test]
fn slide_redirects_and_decays_horizontal_speed() {
    let t = tuning();
    let mut ctrl = grounded_controller(&t);
    for _ in 0..30 {
        ctrl.step(DT, &forward(), 0.0, 0.0);
    }
    let entry_speed = ivan_locomotion::math::horizontal_speed(ctrl.vel());

    let slide = MotionIntent {
        wish_dir: DVec3::Y,
        slide_requested: true,
        ..Default::default()
    };
    ctrl.step(DT, &slide, 0.0, 0.0);
    assert_eq!(ctrl.motion_state_name(), "sliding");
    for _ in 0..20 {
        ctrl.step(DT, &slide, 0.0, 0.0);
    }
    let slide_speed = ivan_locomotion::math::horizontal_speed(ctrl.vel());
    assert!(slide_speed < entry_speed);
    assert!(slide_speed > 0.0);
}

#[test]
fn noclip_ignores_collision_and_reports_state() {
    let t = tuning();
    let mut ctrl = grounded_controller(&t);
    ctrl.toggle_noclip();
    assert_eq!(ctrl.motion_state_name(), "noclip");
    for _ in 0..60 {
        ctrl.step(DT, &forward(), 0.0, 0.0);
    }
    // Flying straight through where the floor probe would otherwise hold
    // the player; no gravity, no ground state.
    assert!(!ctrl.grounded());
    assert!(ctrl.pos().y > 1.0);
    assert_eq!(ctrl.vel().z, 0.0);
}

#[test]
fn surf_ramp_contact_redirects_without_floor_stop() {
    let t = tuning();
    // Steep ramp in the surf band: normal z ~0.45.
    let n = DVec3::new(-0.89, 0.0, 0.45).normalize();
    let ramp = Brush::from_planes(vec![
        (n, 0.0),
        (DVec3::X, 60.0),
        (DVec3::Y, 60.0),
        (DVec3::NEG_Y, 60.0),
        (DVec3::NEG_Z, 10.0),
    ]);
    let world = BrushWorld::new(half(&t)).with_brushes(vec![ramp]);
    let mut ctrl =
        PlayerController::new(t.clone(), DVec3::new(-6.0, 0.0, 4.0)).with_collision(Box::new(world));
    ctrl.set_external_velocity(DVec3::new(7.0, 0.0, -2.0), "test.launch");

    let mut touched_surf = false;
    for _ in 0..120 {
        ctrl.step(DT, &MotionIntent::default(), 0.0, 0.0);
        if ctrl.motion_state_name() == "surfing" {
            touched_surf = true;
        }
        assert!(!ctrl.grounded(), "surf ramp must not read as floor");
    }
    assert!(touched_surf, "never classified the ramp as surf");
}
