use std::fs;
use std::path::{Path, PathBuf};

use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use super::demo::{DemoRecording, demo_stem};
use super::{ReplayError, list_replays, load_replay};
use crate::motion::{MotionIntent, wish_direction_from_axes};
use crate::player::PlayerController;
use crate::tuning::PhysicsTuning;

/// Stable per-tick digest of the controller's observable state.
///
/// The encoding is fixed little-endian IEEE-754 bit patterns plus raw
/// counters; no string formatting touches the numbers, so the hash is
/// identical across platforms and locales.
#[allow(clippy::too_many_arguments)]
pub fn deterministic_state_hash(
    pos: DVec3,
    vel: DVec3,
    yaw_deg: f64,
    pitch_deg: f64,
    grounded: bool,
    state: &str,
    contact_count: u32,
    jump_buffer_left: f64,
    coyote_left: f64,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for v in [
        pos.x,
        pos.y,
        pos.z,
        vel.x,
        vel.y,
        vel.z,
        yaw_deg,
        pitch_deg,
        jump_buffer_left,
        coyote_left,
    ] {
        hasher.update(&v.to_bits().to_le_bytes());
    }
    hasher.update(&[grounded as u8]);
    hasher.update(&contact_count.to_le_bytes());
    hasher.update(state.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest.as_bytes()[..8])
}

/// Hash of a controller's current tick state.
pub fn controller_tick_hash(ctrl: &PlayerController, yaw_deg: f64, pitch_deg: f64) -> String {
    deterministic_state_hash(
        ctrl.pos(),
        ctrl.vel(),
        yaw_deg,
        pitch_deg,
        ctrl.grounded(),
        ctrl.motion_state_name(),
        ctrl.contact_count(),
        ctrl.jump_buffer_left(),
        ctrl.coyote_left(),
    )
}

/// Ordered per-tick hash trace with a whole-run digest.
#[derive(Debug, Clone, Default)]
pub struct DeterminismTrace {
    ticks: Vec<(f64, String)>,
}

impl DeterminismTrace {
    pub fn record(&mut self, t: f64, tick_hash: String) {
        self.ticks.push((t, tick_hash));
    }

    pub fn tick_hashes(&self) -> impl Iterator<Item = &str> {
        self.ticks.iter().map(|(_, h)| h.as_str())
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Digest over the ordered tick hashes.
    pub fn trace_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (_, h) in &self.ticks {
            hasher.update(h.as_bytes());
        }
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDeterminismReport {
    pub source_demo: PathBuf,
    pub report_path: PathBuf,
    pub runs: u32,
    pub tick_count: usize,
    pub stable: bool,
    pub baseline_trace_hash: String,
    pub divergence_runs: u32,
    pub recorded_hash_checked: u64,
    pub recorded_hash_mismatches: u64,
}

struct RunTrace {
    trace_hash: String,
    tick_hashes: Vec<String>,
    recorded_checked: u64,
    recorded_mismatches: u64,
}

fn initial_state(rec: &DemoRecording) -> (DVec3, f64, f64, DVec3, bool) {
    let mut spawn = DVec3::new(0.0, 0.0, 3.0);
    let mut yaw = 0.0;
    let mut pitch = 0.0;
    let mut vel = DVec3::ZERO;
    let mut grounded = false;
    if let Some(tm) = rec.frames.first().and_then(|f| f.telemetry.as_ref()) {
        spawn = DVec3::new(tm.x, tm.y, tm.z);
        yaw = tm.yaw;
        pitch = tm.pitch;
        vel = DVec3::new(tm.vx, tm.vy, tm.vz);
        grounded = tm.grounded;
    }
    (spawn, yaw, pitch, vel, grounded)
}

/// Re-executes a recorded demo tick-for-tick against a fresh controller.
pub fn simulate_replay_hashes(rec: &DemoRecording) -> Vec<String> {
    run_trace(rec).tick_hashes
}

fn run_trace(rec: &DemoRecording) -> RunTrace {
    let tuning: PhysicsTuning = rec.metadata.tuning.clone().clamped();
    let (spawn, mut yaw, mut pitch, vel, grounded) = initial_state(rec);
    let mut ctrl = PlayerController::new(tuning.clone(), spawn);
    ctrl.set_external_velocity(vel, "determinism.seed");
    ctrl.set_grounded(grounded);

    let tick_rate = rec.metadata.tick_rate.max(1);
    let dt = 1.0 / tick_rate as f64;
    let look_scale = rec.metadata.look_scale.max(1) as f64;

    let mut trace = DeterminismTrace::default();
    let mut hashes = Vec::with_capacity(rec.frames.len());
    let mut checked = 0u64;
    let mut mismatches = 0u64;

    for (i, frame) in rec.frames.iter().enumerate() {
        yaw -= (frame.look_dx as f64 / look_scale) * tuning.mouse_sensitivity;
        pitch = (pitch - (frame.look_dy as f64 / look_scale) * tuning.mouse_sensitivity)
            .clamp(-88.0, 88.0);

        let wish = wish_direction_from_axes(yaw, frame.move_forward, frame.move_right);
        let mut jump_requested = frame.jump_pressed;
        if tuning.autojump_enabled && frame.jump_held && ctrl.grounded() {
            jump_requested = true;
        }

        ctrl.step(
            dt,
            &MotionIntent {
                wish_dir: wish,
                jump_requested,
                slide_requested: frame.slide_pressed || frame.slide_held,
            },
            yaw,
            pitch,
        );

        let tick_hash = controller_tick_hash(&ctrl, yaw, pitch);
        trace.record((i + 1) as f64 * dt, tick_hash.clone());

        if let Some(expected) = frame
            .telemetry
            .as_ref()
            .map(|tm| tm.det_h.as_str())
            .filter(|h| !h.is_empty())
        {
            checked += 1;
            if expected != tick_hash {
                mismatches += 1;
            }
        }
        hashes.push(tick_hash);
    }

    RunTrace {
        trace_hash: trace.trace_hash(),
        tick_hashes: hashes,
        recorded_checked: checked,
        recorded_mismatches: mismatches,
    }
}

/// Resimulates a recorded demo `runs` times and reports whether every run
/// produced the identical per-tick hash sequence. Divergence is a data
/// finding in the report, never an error.
pub fn verify_replay_determinism(
    replay_path: &Path,
    runs: u32,
    out_dir: &Path,
    now_unix: f64,
) -> Result<ReplayDeterminismReport, ReplayError> {
    let rec = load_replay(replay_path)?;
    let run_count = runs.max(1);
    let traces: Vec<RunTrace> = (0..run_count).map(|_| run_trace(&rec)).collect();

    let baseline = &traces[0];
    let mut divergence_runs = 0u32;
    for tr in &traces[1..] {
        if tr.tick_hashes != baseline.tick_hashes {
            divergence_runs += 1;
        }
    }

    let stable = divergence_runs == 0;
    let checked: u64 = traces.iter().map(|t| t.recorded_checked).sum();
    let mismatches: u64 = traces.iter().map(|t| t.recorded_mismatches).sum();

    fs::create_dir_all(out_dir)?;
    let report_path = out_dir.join(format!("{}.determinism.json", demo_stem(replay_path)));
    let payload = serde_json::json!({
        "format_version": 1,
        "created_at_unix": now_unix,
        "source_demo": replay_path.display().to_string(),
        "runs": run_count,
        "tick_count": baseline.tick_hashes.len(),
        "stable": stable,
        "baseline_trace_hash": baseline.trace_hash,
        "divergence_runs": divergence_runs,
        "recorded_hash_checked": checked,
        "recorded_hash_mismatches": mismatches,
        "run_trace_hashes": traces.iter().map(|t| t.trace_hash.clone()).collect::<Vec<_>>(),
    });
    fs::write(&report_path, format!("{}\n", serde_json::to_string_pretty(&payload)?))?;

    Ok(ReplayDeterminismReport {
        source_demo: replay_path.to_path_buf(),
        report_path,
        runs: run_count,
        tick_count: baseline.tick_hashes.len(),
        stable,
        baseline_trace_hash: baseline.trace_hash.clone(),
        divergence_runs,
        recorded_hash_checked: checked,
        recorded_hash_mismatches: mismatches,
    })
}

/// Convenience wrapper over the newest demo in `replay_dir`.
pub fn verify_latest_replay_determinism(
    replay_dir: &Path,
    runs: u32,
    out_dir: &Path,
    now_unix: f64,
) -> Result<ReplayDeterminismReport, ReplayError> {
    let replays = list_replays(replay_dir);
    let latest = replays
        .first()
        .ok_or_else(|| ReplayError::NoReplays(replay_dir.to_path_buf()))?;
    verify_replay_determinism(latest, runs, out_dir, now_unix)
}
