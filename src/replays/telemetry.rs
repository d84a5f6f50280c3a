use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::demo::{DemoFrame, DemoRecording, demo_stem};
use super::{ReplayError, list_replays, load_replay};

/// How many grace ticks after a jump press may still count as the takeoff.
const JUMP_SUCCESS_LOOKAHEAD: usize = 6;
/// Cap on retained export-history entries in the summary file.
const EXPORT_HISTORY_CAP: usize = 200;
/// Cap on a stored export comment.
const EXPORT_COMMENT_CAP: usize = 800;

/// Frozen CSV column order; tools parse by position, so this list is part
/// of the external interface.
pub const CSV_BASE_COLUMNS: &[&str] = &[
    "tick",
    "look_dx",
    "look_dy",
    "move_forward",
    "move_right",
    "jump_pressed",
    "jump_held",
    "slide_pressed",
    "grapple_pressed",
    "noclip_toggle_pressed",
    "key_w_held",
    "key_a_held",
    "key_s_held",
    "key_d_held",
    "arrow_up_held",
    "arrow_down_held",
    "arrow_left_held",
    "arrow_right_held",
    "mouse_left_held",
    "mouse_right_held",
];

/// Telemetry columns appended after the base set, in sorted order.
pub const CSV_TM_COLUMNS: &[&str] = &[
    "tm_det_h",
    "tm_grounded",
    "tm_hs",
    "tm_pitch",
    "tm_sp",
    "tm_t",
    "tm_vx",
    "tm_vy",
    "tm_vz",
    "tm_x",
    "tm_y",
    "tm_yaw",
];

#[derive(Debug, Clone)]
pub struct ReplayTelemetryExport {
    pub source_demo: PathBuf,
    pub csv_path: PathBuf,
    pub summary_path: PathBuf,
    pub tick_count: usize,
    pub telemetry_tick_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JumpTakeoffStats {
    pub attempts: u64,
    pub success: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub horizontal_speed_avg: f64,
    pub horizontal_speed_max: f64,
    pub speed_avg: f64,
    pub speed_max: f64,
    pub grounded_ratio: f64,
    pub ground_flicker_count: u64,
    pub ground_flicker_per_min: f64,
    pub landing_count: u64,
    pub landing_speed_loss_avg: f64,
    pub landing_speed_loss_max: f64,
    pub landing_speed_retention_avg: f64,
    pub camera_lin_jerk_avg: f64,
    pub camera_lin_jerk_max: f64,
    pub camera_ang_jerk_avg: f64,
    pub camera_ang_jerk_max: f64,
    pub camera_jerk_samples: u64,
    pub det_hash_samples: u64,
    pub det_hash_last: String,
    pub jump_takeoff: JumpTakeoffStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryInputCounts {
    pub jump_pressed_ticks: u64,
    pub jump_held_ticks: u64,
    pub slide_pressed_ticks: u64,
    pub move_forward_pos_ticks: u64,
    pub move_forward_neg_ticks: u64,
    pub move_right_pos_ticks: u64,
    pub move_right_neg_ticks: u64,
    pub key_w_held_ticks: u64,
    pub key_a_held_ticks: u64,
    pub key_s_held_ticks: u64,
    pub key_d_held_ticks: u64,
    pub arrow_up_held_ticks: u64,
    pub arrow_down_held_ticks: u64,
    pub arrow_left_held_ticks: u64,
    pub arrow_right_held_ticks: u64,
    pub mouse_left_held_ticks: u64,
    pub mouse_right_held_ticks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportStamp {
    pub exported_at_unix: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max_or_zero(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

fn angle_delta_deg(a: f64, b: f64) -> f64 {
    let mut d = b - a;
    while d > 180.0 {
        d -= 360.0;
    }
    while d < -180.0 {
        d += 360.0;
    }
    d
}

fn compute_jump_success(grounded: &[bool], jump_pressed: &[bool]) -> JumpTakeoffStats {
    let mut attempts = 0u64;
    let mut success = 0u64;
    for (i, pressed) in jump_pressed.iter().enumerate() {
        if !pressed {
            continue;
        }
        attempts += 1;
        let window = &grounded[(i + 1).min(grounded.len())
            ..(i + 1 + JUMP_SUCCESS_LOOKAHEAD).min(grounded.len())];
        if window.iter().any(|g| !g) {
            success += 1;
        }
    }
    let success_rate = if attempts > 0 {
        success as f64 / attempts as f64
    } else {
        0.0
    };
    JumpTakeoffStats {
        attempts,
        success,
        success_rate,
    }
}

fn compute_ground_flicker(grounded: &[bool]) -> u64 {
    grounded.windows(2).filter(|w| w[0] != w[1]).count() as u64
}

struct LandingLoss {
    count: u64,
    loss_avg: f64,
    loss_max: f64,
    retention_avg: f64,
}

fn compute_landing_loss(frames: &[&super::demo::FrameTelemetry]) -> LandingLoss {
    let mut losses = Vec::new();
    let mut retentions = Vec::new();
    let mut prev: Option<(bool, f64)> = None;
    for tm in frames {
        if let Some((prev_g, prev_hs)) = prev {
            if !prev_g && tm.grounded {
                losses.push((prev_hs - tm.hs).max(0.0));
                if prev_hs > 1e-6 {
                    retentions.push(tm.hs / prev_hs);
                }
            }
        }
        prev = Some((tm.grounded, tm.hs));
    }
    LandingLoss {
        count: losses.len() as u64,
        loss_avg: mean(&losses),
        loss_max: max_or_zero(&losses),
        retention_avg: mean(&retentions),
    }
}

struct CameraJerk {
    samples: u64,
    lin_avg: f64,
    lin_max: f64,
    ang_avg: f64,
    ang_max: f64,
}

fn compute_camera_jerk(frames: &[&super::demo::FrameTelemetry], tick_rate: u32) -> CameraJerk {
    let fallback_dt = 1.0 / tick_rate.max(1) as f64;
    let mut lin_samples = Vec::new();
    let mut ang_samples = Vec::new();

    let mut last_pos: Option<(f64, f64, f64)> = None;
    let mut last_vel: Option<(f64, f64, f64)> = None;
    let mut last_yaw = 0.0;
    let mut last_pitch = 0.0;
    let mut last_rates: Option<(f64, f64)> = None;
    let mut last_t = 0.0;

    for tm in frames {
        let Some((lx, ly, lz)) = last_pos else {
            last_pos = Some((tm.x, tm.y, tm.z));
            last_yaw = tm.yaw;
            last_pitch = tm.pitch;
            last_t = tm.t;
            continue;
        };

        let mut dt = fallback_dt;
        if tm.t > last_t {
            dt = (tm.t - last_t).max(1e-6);
        }

        let vel = ((tm.x - lx) / dt, (tm.y - ly) / dt, (tm.z - lz) / dt);
        let yaw_rate = angle_delta_deg(last_yaw, tm.yaw) / dt;
        let pitch_rate = angle_delta_deg(last_pitch, tm.pitch) / dt;

        if let Some((lvx, lvy, lvz)) = last_vel {
            let lin_jerk = (((vel.0 - lvx) / dt).powi(2)
                + ((vel.1 - lvy) / dt).powi(2)
                + ((vel.2 - lvz) / dt).powi(2))
            .sqrt();
            lin_samples.push(lin_jerk);

            if let Some((lyr, lpr)) = last_rates {
                let ang_jerk =
                    (((yaw_rate - lyr) / dt).powi(2) + ((pitch_rate - lpr) / dt).powi(2)).sqrt();
                ang_samples.push(ang_jerk);
            }
        }

        last_pos = Some((tm.x, tm.y, tm.z));
        last_vel = Some(vel);
        last_yaw = tm.yaw;
        last_pitch = tm.pitch;
        last_rates = Some((yaw_rate, pitch_rate));
        last_t = tm.t;
    }

    CameraJerk {
        samples: lin_samples.len().max(ang_samples.len()) as u64,
        lin_avg: mean(&lin_samples),
        lin_max: max_or_zero(&lin_samples),
        ang_avg: mean(&ang_samples),
        ang_max: max_or_zero(&ang_samples),
    }
}

/// Aggregated metrics over one recorded run, as a JSON value so downstream
/// consumers (compare, autotune) address metrics by key path.
pub fn build_summary(rec: &DemoRecording) -> serde_json::Value {
    let frames = &rec.frames;
    let tm_frames: Vec<&super::demo::FrameTelemetry> =
        frames.iter().filter_map(|f| f.telemetry.as_ref()).collect();
    let tick_rate = rec.metadata.tick_rate.max(1);
    let duration_s = frames.len() as f64 / tick_rate as f64;

    let hs_values: Vec<f64> = tm_frames.iter().map(|tm| tm.hs).collect();
    let sp_values: Vec<f64> = tm_frames.iter().map(|tm| tm.sp).collect();
    let grounded_values: Vec<bool> = tm_frames.iter().map(|tm| tm.grounded).collect();
    let jump_pressed_values: Vec<bool> = frames.iter().map(|f| f.jump_pressed).collect();

    let count = |f: fn(&DemoFrame) -> bool| frames.iter().filter(|fr| f(fr)).count() as u64;
    let input_counts = SummaryInputCounts {
        jump_pressed_ticks: count(|f| f.jump_pressed),
        jump_held_ticks: count(|f| f.jump_held),
        slide_pressed_ticks: count(|f| f.slide_pressed),
        move_forward_pos_ticks: count(|f| f.move_forward > 0),
        move_forward_neg_ticks: count(|f| f.move_forward < 0),
        move_right_pos_ticks: count(|f| f.move_right > 0),
        move_right_neg_ticks: count(|f| f.move_right < 0),
        key_w_held_ticks: count(|f| f.key_w_held),
        key_a_held_ticks: count(|f| f.key_a_held),
        key_s_held_ticks: count(|f| f.key_s_held),
        key_d_held_ticks: count(|f| f.key_d_held),
        arrow_up_held_ticks: count(|f| f.arrow_up_held),
        arrow_down_held_ticks: count(|f| f.arrow_down_held),
        arrow_left_held_ticks: count(|f| f.arrow_left_held),
        arrow_right_held_ticks: count(|f| f.arrow_right_held),
        mouse_left_held_ticks: count(|f| f.mouse_left_held),
        mouse_right_held_ticks: count(|f| f.mouse_right_held),
    };

    let jump_takeoff = compute_jump_success(&grounded_values, &jump_pressed_values);
    let ground_flicker = compute_ground_flicker(&grounded_values);
    let landing = compute_landing_loss(&tm_frames);
    let jerk = compute_camera_jerk(&tm_frames, tick_rate);
    let det_hashes: Vec<&str> = tm_frames
        .iter()
        .map(|tm| tm.det_h.as_str())
        .filter(|h| !h.is_empty())
        .collect();

    let metrics = SummaryMetrics {
        horizontal_speed_avg: mean(&hs_values),
        horizontal_speed_max: max_or_zero(&hs_values),
        speed_avg: mean(&sp_values),
        speed_max: max_or_zero(&sp_values),
        grounded_ratio: mean(
            &grounded_values
                .iter()
                .map(|g| if *g { 1.0 } else { 0.0 })
                .collect::<Vec<_>>(),
        ),
        ground_flicker_count: ground_flicker,
        ground_flicker_per_min: (ground_flicker as f64 / duration_s.max(1e-6)) * 60.0,
        landing_count: landing.count,
        landing_speed_loss_avg: landing.loss_avg,
        landing_speed_loss_max: landing.loss_max,
        landing_speed_retention_avg: landing.retention_avg,
        camera_lin_jerk_avg: jerk.lin_avg,
        camera_lin_jerk_max: jerk.lin_max,
        camera_ang_jerk_avg: jerk.ang_avg,
        camera_ang_jerk_max: jerk.ang_max,
        camera_jerk_samples: jerk.samples,
        det_hash_samples: det_hashes.len() as u64,
        det_hash_last: det_hashes.last().map(|h| h.to_string()).unwrap_or_default(),
        jump_takeoff,
    };

    serde_json::json!({
        "format_version": 1,
        "demo": {
            "name": rec.metadata.demo_name,
            "map_id": rec.metadata.map_id,
            "tick_rate": tick_rate,
            "look_scale": rec.metadata.look_scale,
            "source_created_at_unix": rec.metadata.created_at_unix,
            "map_json": rec.metadata.map_json,
            "tuning": rec.metadata.tuning,
        },
        "ticks": {
            "total": frames.len(),
            "duration_s": duration_s,
            "with_telemetry": tm_frames.len(),
            "telemetry_coverage": if frames.is_empty() { 0.0 } else { tm_frames.len() as f64 / frames.len() as f64 },
        },
        "metrics": metrics,
        "input_counts": input_counts,
    })
}

fn csv_bool(v: bool) -> &'static str {
    if v { "1" } else { "0" }
}

fn frame_csv_row(tick: usize, frame: &DemoFrame) -> String {
    let mut cols: Vec<String> = vec![
        tick.to_string(),
        frame.look_dx.to_string(),
        frame.look_dy.to_string(),
        frame.move_forward.to_string(),
        frame.move_right.to_string(),
        csv_bool(frame.jump_pressed).into(),
        csv_bool(frame.jump_held).into(),
        csv_bool(frame.slide_pressed).into(),
        csv_bool(frame.grapple_pressed).into(),
        csv_bool(frame.noclip_toggle_pressed).into(),
        csv_bool(frame.key_w_held).into(),
        csv_bool(frame.key_a_held).into(),
        csv_bool(frame.key_s_held).into(),
        csv_bool(frame.key_d_held).into(),
        csv_bool(frame.arrow_up_held).into(),
        csv_bool(frame.arrow_down_held).into(),
        csv_bool(frame.arrow_left_held).into(),
        csv_bool(frame.arrow_right_held).into(),
        csv_bool(frame.mouse_left_held).into(),
        csv_bool(frame.mouse_right_held).into(),
    ];
    match &frame.telemetry {
        Some(tm) => {
            cols.push(tm.det_h.clone());
            cols.push(csv_bool(tm.grounded).into());
            for v in [tm.hs, tm.pitch, tm.sp, tm.t, tm.vx, tm.vy, tm.vz, tm.x, tm.y, tm.yaw] {
                cols.push(format!("{v}"));
            }
        }
        None => cols.extend(std::iter::repeat_n(String::new(), CSV_TM_COLUMNS.len())),
    }
    cols.join(",")
}

fn load_existing_history(summary_path: &Path) -> Vec<ExportStamp> {
    let Ok(text) = fs::read_to_string(summary_path) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
        return Vec::new();
    };
    value
        .get("export_history")
        .and_then(|h| serde_json::from_value::<Vec<ExportStamp>>(h.clone()).ok())
        .unwrap_or_default()
}

/// Exports one demo to a per-tick CSV and a summary JSON with metrics,
/// export metadata, and a capped export history.
pub fn export_replay_telemetry(
    replay_path: &Path,
    out_dir: &Path,
    route_tag: Option<&str>,
    comment: Option<&str>,
    now_unix: f64,
) -> Result<ReplayTelemetryExport, ReplayError> {
    let rec = load_replay(replay_path)?;
    fs::create_dir_all(out_dir)?;

    let stem = demo_stem(replay_path);
    let csv_path = out_dir.join(format!("{stem}.telemetry.csv"));
    let summary_path = out_dir.join(format!("{stem}.summary.json"));

    let mut csv = String::new();
    csv.push_str(&CSV_BASE_COLUMNS.join(","));
    csv.push(',');
    csv.push_str(&CSV_TM_COLUMNS.join(","));
    csv.push('\n');
    for (tick, frame) in rec.frames.iter().enumerate() {
        csv.push_str(&frame_csv_row(tick, frame));
        csv.push('\n');
    }
    fs::write(&csv_path, csv)?;

    let mut summary = build_summary(&rec);
    let stamp = ExportStamp {
        exported_at_unix: now_unix,
        route_tag: route_tag
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        comment: comment
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(EXPORT_COMMENT_CAP).collect()),
    };
    let mut history = load_existing_history(&summary_path);
    history.push(stamp.clone());
    let keep = history.len().saturating_sub(EXPORT_HISTORY_CAP);
    let history = &history[keep..];

    summary["export_metadata"] = serde_json::to_value(&stamp)?;
    summary["export_history"] = serde_json::to_value(history)?;
    fs::write(
        &summary_path,
        format!("{}\n", serde_json::to_string_pretty(&summary)?),
    )?;
    tracing::debug!(
        demo = %replay_path.display(),
        csv = %csv_path.display(),
        summary = %summary_path.display(),
        "exported replay telemetry"
    );

    let telemetry_tick_count = rec.frames.iter().filter(|f| f.telemetry.is_some()).count();
    Ok(ReplayTelemetryExport {
        source_demo: replay_path.to_path_buf(),
        csv_path,
        summary_path,
        tick_count: rec.frames.len(),
        telemetry_tick_count,
    })
}

/// Exports the newest demo in `replay_dir`.
pub fn export_latest_replay_telemetry(
    replay_dir: &Path,
    out_dir: &Path,
    route_tag: Option<&str>,
    comment: Option<&str>,
    now_unix: f64,
) -> Result<ReplayTelemetryExport, ReplayError> {
    let replays = list_replays(replay_dir);
    let latest = replays
        .first()
        .ok_or_else(|| ReplayError::NoReplays(replay_dir.to_path_buf()))?;
    export_replay_telemetry(latest, out_dir, route_tag, comment, now_unix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::InputCommand;
    use crate::replays::demo::{FrameTelemetry, new_recording, save_recording};
    use crate::tuning::PhysicsTuning;

    fn recording_with_run() -> DemoRecording {
        let mut rec = new_recording(60, 8, "gym", None, PhysicsTuning::default(), 1_700_000_000.0);
        for i in 0..120usize {
            let airborne = (40..52).contains(&i);
            let cmd = InputCommand {
                move_forward: 1,
                key_w_held: true,
                jump_pressed: i == 39,
                ..Default::default()
            };
            rec.push_frame(
                cmd,
                Some(FrameTelemetry {
                    t: (i + 1) as f64 / 60.0,
                    x: i as f64 * 0.1,
                    hs: 5.0 + (i as f64) * 0.01,
                    sp: 5.0 + (i as f64) * 0.01,
                    grounded: !airborne,
                    ..Default::default()
                }),
            );
        }
        rec
    }

    #[test]
    fn export_writes_csv_and_summary_with_frozen_columns() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recording_with_run();
        let demo_path = save_recording(&rec, dir.path()).unwrap();
        let export =
            export_replay_telemetry(&demo_path, dir.path(), Some("A"), None, 100.0).unwrap();

        let csv = std::fs::read_to_string(&export.csv_path).unwrap();
        let header = csv.lines().next().unwrap();
        let expected_header = format!(
            "{},{}",
            CSV_BASE_COLUMNS.join(","),
            CSV_TM_COLUMNS.join(",")
        );
        assert_eq!(header, expected_header);
        assert_eq!(csv.lines().count(), 121);

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export.summary_path).unwrap()).unwrap();
        assert_eq!(summary["format_version"], 1);
        assert_eq!(summary["ticks"]["total"], 120);
        assert_eq!(summary["export_metadata"]["route_tag"], "A");
        let rate = summary["metrics"]["jump_takeoff"]["success_rate"]
            .as_f64()
            .unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
        // One liftoff and one landing.
        assert_eq!(summary["metrics"]["ground_flicker_count"], 2);
    }

    #[test]
    fn export_history_accumulates_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recording_with_run();
        let demo_path = save_recording(&rec, dir.path()).unwrap();
        for i in 0..3 {
            export_replay_telemetry(&demo_path, dir.path(), Some("B"), None, 100.0 + i as f64)
                .unwrap();
        }
        let stem = demo_stem(&demo_path);
        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(format!("{stem}.summary.json"))).unwrap(),
        )
        .unwrap();
        let history = summary["export_history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2]["exported_at_unix"], 102.0);
    }

    #[test]
    fn landing_loss_detects_speed_drop() {
        let frames = [
            FrameTelemetry {
                grounded: false,
                hs: 8.0,
                ..Default::default()
            },
            FrameTelemetry {
                grounded: true,
                hs: 6.0,
                ..Default::default()
            },
        ];
        let refs: Vec<&FrameTelemetry> = frames.iter().collect();
        let loss = compute_landing_loss(&refs);
        assert_eq!(loss.count, 1);
        assert!((loss.loss_avg - 2.0).abs() < 1e-9);
        assert!((loss.retention_avg - 0.75).abs() < 1e-9);
    }
}
