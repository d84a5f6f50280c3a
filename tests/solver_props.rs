//! Property checks over the solver's quantified invariants.

use bevy::math::DVec3;
use ivan_locomotion::motion::MotionSolver;
use ivan_locomotion::tuning::PhysicsTuning;
use proptest::prelude::*;

fn solver() -> MotionSolver {
    MotionSolver::from_tuning(&PhysicsTuning::default())
}

proptest! {
    #[test]
    fn grace_window_stays_within_documented_bounds(hspeed in 0.0f64..1e6) {
        let s = solver();
        let base = s.config().invariants.grace_period;
        let window = s.grace_time_for_speed(hspeed);
        prop_assert!(window >= base - 1e-12);
        prop_assert!(window <= base * 2.20 + 1e-12);
    }

    #[test]
    fn air_accel_respects_projected_cap(
        vx in -40.0f64..40.0,
        vy in -40.0f64..40.0,
        vz in -40.0f64..40.0,
        ticks in 1usize..120,
    ) {
        let s = solver();
        let wish = DVec3::X;
        let cap = s.air_speed();
        let mut vel = DVec3::new(vx, vy, vz);
        let start = vel.dot(wish);
        let mut last = start;
        for _ in 0..ticks {
            MotionSolver::apply_air_accel(&mut vel, wish, 1.0 / 60.0, cap, s.air_accel());
            let along = vel.dot(wish);
            // The add-speed rule may never push past the cap, nor reduce
            // the projection it is accelerating.
            prop_assert!(along <= cap.max(start) + 1e-9);
            prop_assert!(along >= last - 1e-12);
            last = along;
        }
    }

    #[test]
    fn coast_damping_is_strictly_monotonic(
        vx in -50.0f64..50.0,
        vy in -50.0f64..50.0,
        dt in 1e-4f64..0.1,
    ) {
        prop_assume!(vx.abs() > 1e-6 || vy.abs() > 1e-6);
        let s = solver();
        let mut vel = DVec3::new(vx, vy, 3.0);
        let before = ivan_locomotion::math::horizontal_speed(vel);
        s.apply_ground_coast_damping(&mut vel, dt);
        let after = ivan_locomotion::math::horizontal_speed(vel);
        prop_assert!(after < before);
        prop_assert_eq!(vel.z, 3.0);
    }

    #[test]
    fn clip_velocity_removes_all_motion_into_the_plane(
        vx in -30.0f64..30.0,
        vy in -30.0f64..30.0,
        vz in -30.0f64..30.0,
        nx in -1.0f64..1.0,
        ny in -1.0f64..1.0,
        nz in -1.0f64..1.0,
    ) {
        let n = DVec3::new(nx, ny, nz);
        prop_assume!(n.length_squared() > 1e-3);
        let n = n.normalize();
        let v = DVec3::new(vx, vy, vz);
        let clipped = ivan_locomotion::math::clip_velocity(v, n, 1.0);
        // Allow for the sub-micro residue truncation inside the clip.
        prop_assert!(clipped.dot(n) > -1e-5);
    }
}
