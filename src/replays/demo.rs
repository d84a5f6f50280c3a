use std::fs;
use std::path::{Path, PathBuf};

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use super::{DEMO_EXT, DEMO_FORMAT_VERSION, ReplayError};
use crate::motion::InputCommand;
use crate::tuning::PhysicsTuning;

/// Per-tick observability sample stored alongside the input frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameTelemetry {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    /// Horizontal speed.
    pub hs: f64,
    /// Full speed.
    pub sp: f64,
    pub grounded: bool,
    /// Tick hash recorded at capture time; empty when hashing was off.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub det_h: String,
}

/// One recorded tick: the raw input command plus optional telemetry.
/// Field keys are the two-letter wire names of the demo format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoFrame {
    #[serde(rename = "dx")]
    pub look_dx: i32,
    #[serde(rename = "dy")]
    pub look_dy: i32,
    #[serde(rename = "mf")]
    pub move_forward: i8,
    #[serde(rename = "mr")]
    pub move_right: i8,
    #[serde(rename = "jp")]
    pub jump_pressed: bool,
    #[serde(rename = "jh")]
    pub jump_held: bool,
    #[serde(rename = "sp")]
    pub slide_pressed: bool,
    #[serde(rename = "sh")]
    pub slide_held: bool,
    #[serde(rename = "gp")]
    pub grapple_pressed: bool,
    #[serde(rename = "nt")]
    pub noclip_toggle_pressed: bool,
    #[serde(rename = "kw")]
    pub key_w_held: bool,
    #[serde(rename = "ka")]
    pub key_a_held: bool,
    #[serde(rename = "ks")]
    pub key_s_held: bool,
    #[serde(rename = "kd")]
    pub key_d_held: bool,
    #[serde(rename = "au")]
    pub arrow_up_held: bool,
    #[serde(rename = "ad")]
    pub arrow_down_held: bool,
    #[serde(rename = "al")]
    pub arrow_left_held: bool,
    #[serde(rename = "ar")]
    pub arrow_right_held: bool,
    #[serde(rename = "ml")]
    pub mouse_left_held: bool,
    #[serde(rename = "m2")]
    pub mouse_right_held: bool,
    #[serde(rename = "tm", skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<FrameTelemetry>,
}

impl DemoFrame {
    pub fn from_command(cmd: InputCommand, telemetry: Option<FrameTelemetry>) -> Self {
        Self {
            look_dx: cmd.look_dx,
            look_dy: cmd.look_dy,
            move_forward: cmd.move_forward.clamp(-1, 1),
            move_right: cmd.move_right.clamp(-1, 1),
            jump_pressed: cmd.jump_pressed,
            jump_held: cmd.jump_held,
            slide_pressed: cmd.slide_pressed,
            slide_held: cmd.slide_held,
            grapple_pressed: cmd.grapple_pressed,
            noclip_toggle_pressed: cmd.noclip_toggle_pressed,
            key_w_held: cmd.key_w_held,
            key_a_held: cmd.key_a_held,
            key_s_held: cmd.key_s_held,
            key_d_held: cmd.key_d_held,
            arrow_up_held: cmd.arrow_up_held,
            arrow_down_held: cmd.arrow_down_held,
            arrow_left_held: cmd.arrow_left_held,
            arrow_right_held: cmd.arrow_right_held,
            mouse_left_held: cmd.mouse_left_held,
            mouse_right_held: cmd.mouse_right_held,
            telemetry,
        }
    }

    pub fn command(&self) -> InputCommand {
        InputCommand {
            look_dx: self.look_dx,
            look_dy: self.look_dy,
            move_forward: self.move_forward.clamp(-1, 1),
            move_right: self.move_right.clamp(-1, 1),
            jump_pressed: self.jump_pressed,
            jump_held: self.jump_held,
            slide_pressed: self.slide_pressed,
            slide_held: self.slide_held,
            grapple_pressed: self.grapple_pressed,
            noclip_toggle_pressed: self.noclip_toggle_pressed,
            key_w_held: self.key_w_held,
            key_a_held: self.key_a_held,
            key_s_held: self.key_s_held,
            key_d_held: self.key_d_held,
            arrow_up_held: self.arrow_up_held,
            arrow_down_held: self.arrow_down_held,
            arrow_left_held: self.arrow_left_held,
            arrow_right_held: self.arrow_right_held,
            mouse_left_held: self.mouse_left_held,
            mouse_right_held: self.mouse_right_held,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoMetadata {
    pub demo_name: String,
    pub created_at_unix: f64,
    pub tick_rate: u32,
    pub look_scale: i32,
    pub map_id: String,
    pub map_json: Option<String>,
    pub tuning: PhysicsTuning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoRecording {
    pub metadata: DemoMetadata,
    pub frames: Vec<DemoFrame>,
}

impl DemoRecording {
    pub fn push_frame(&mut self, cmd: InputCommand, telemetry: Option<FrameTelemetry>) {
        self.frames.push(DemoFrame::from_command(cmd, telemetry));
    }
}

/// The demo currently being captured, if any. Frames are appended once per
/// fixed tick; the file is only written on an explicit save.
#[derive(Resource, Default)]
pub struct ActiveRecording(pub Option<DemoRecording>);

impl ActiveRecording {
    /// Begins capturing; any in-flight recording is discarded.
    pub fn start(&mut self, recording: DemoRecording) {
        self.0 = Some(recording);
    }

    /// Stops capturing and persists the demo, returning its path.
    pub fn stop_and_save(&mut self, dir: &Path) -> Result<Option<PathBuf>, ReplayError> {
        match self.0.take() {
            Some(rec) => Ok(Some(save_recording(&rec, dir)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DemoFile {
    format_version: u32,
    metadata: DemoMetadata,
    frames: Vec<DemoFrame>,
}

fn sanitize_name(text: &str) -> String {
    let source = if text.trim().is_empty() { "demo" } else { text };
    let mut out = String::new();
    for ch in source.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch == ' ' || ch == '.' {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() { "demo".into() } else { trimmed }
}

/// Starts a new recording. `created_at_unix` stamps both the metadata and
/// the generated demo name.
pub fn new_recording(
    tick_rate: u32,
    look_scale: i32,
    map_id: &str,
    map_json: Option<String>,
    tuning: PhysicsTuning,
    created_at_unix: f64,
) -> DemoRecording {
    let stamp = chrono::DateTime::from_timestamp(created_at_unix as i64, 0)
        .unwrap_or_default()
        .format("%Y%m%d_%H%M%S");
    let base = sanitize_name(if map_id.is_empty() { "map" } else { map_id });
    DemoRecording {
        metadata: DemoMetadata {
            demo_name: format!("{stamp}_{base}"),
            created_at_unix,
            tick_rate: tick_rate.max(1),
            look_scale: look_scale.max(1),
            map_id: map_id.to_owned(),
            map_json: map_json.filter(|s| !s.trim().is_empty()),
            tuning,
        },
        frames: Vec::new(),
    }
}

/// Persists a recording atomically: the payload lands under its final name
/// only after a complete temp-file write.
pub fn save_recording(rec: &DemoRecording, dir: &Path) -> Result<PathBuf, ReplayError> {
    fs::create_dir_all(dir)?;
    let out = dir.join(format!("{}{}", rec.metadata.demo_name, DEMO_EXT));
    let payload = DemoFile {
        format_version: DEMO_FORMAT_VERSION,
        metadata: rec.metadata.clone(),
        frames: rec.frames.clone(),
    };
    let mut text = serde_json::to_string(&payload)?;
    text.push('\n');
    let tmp = out.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, &out)?;
    tracing::debug!(path = %out.display(), frames = rec.frames.len(), "saved demo recording");
    Ok(out)
}

pub fn load_replay(path: &Path) -> Result<DemoRecording, ReplayError> {
    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let found = raw
        .get("format_version")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ReplayError::InvalidDemo("missing format_version".into()))?;
    if found != DEMO_FORMAT_VERSION as i64 {
        return Err(ReplayError::DemoFormatUnsupported {
            found,
            expected: DEMO_FORMAT_VERSION,
        });
    }
    let file: DemoFile = serde_json::from_value(raw)?;
    Ok(DemoRecording {
        metadata: file.metadata,
        frames: file.frames,
    })
}

/// Demo files in the directory, newest first by modification time.
pub fn list_replays(dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(DEMO_EXT) {
            continue;
        }
        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::UNIX_EPOCH);
        out.push((path, mtime));
    }
    // Stable tiebreak on the path itself keeps listing order deterministic.
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out.into_iter().map(|(p, _)| p).collect()
}

/// Strips the demo extension from a file name.
pub fn demo_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("demo");
    name.strip_suffix(DEMO_EXT).unwrap_or(name).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recording() -> DemoRecording {
        let mut rec = new_recording(60, 8, "gym", None, PhysicsTuning::default(), 1_700_000_000.0);
        for i in 0..5 {
            let cmd = InputCommand {
                move_forward: 1,
                jump_pressed: i == 3,
                look_dx: i * 2,
                ..Default::default()
            };
            rec.push_frame(
                cmd,
                Some(FrameTelemetry {
                    t: (i + 1) as f64 / 60.0,
                    hs: i as f64,
                    grounded: true,
                    ..Default::default()
                }),
            );
        }
        rec
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let rec = sample_recording();
        let path = save_recording(&rec, dir.path()).unwrap();
        let bytes1 = std::fs::read(&path).unwrap();

        let loaded = load_replay(&path).unwrap();
        assert_eq!(loaded, rec);
        let path2 = save_recording(&loaded, dir.path()).unwrap();
        assert_eq!(path, path2);
        let bytes2 = std::fs::read(&path2).unwrap();
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn wrong_format_version_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("old{DEMO_EXT}"));
        std::fs::write(&path, "{\"format_version\":1,\"metadata\":{},\"frames\":[]}\n").unwrap();
        match load_replay(&path) {
            Err(ReplayError::DemoFormatUnsupported { found, expected }) => {
                assert_eq!(found, 1);
                assert_eq!(expected, DEMO_FORMAT_VERSION);
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn sanitized_names_stay_filesystem_safe() {
        let rec = new_recording(60, 8, "Crash Site 9!.bsp", None, PhysicsTuning::default(), 0.0);
        assert!(rec.metadata.demo_name.ends_with("crash-site-9-bsp"));
    }

    #[test]
    fn listing_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let old = new_recording(60, 8, "a", None, PhysicsTuning::default(), 1.0);
        let new = new_recording(60, 8, "b", None, PhysicsTuning::default(), 2.0);
        let old_path = save_recording(&old, dir.path()).unwrap();
        let new_path = save_recording(&new, dir.path()).unwrap();
        filetime_sleep();
        std::fs::write(&new_path, std::fs::read(&new_path).unwrap()).unwrap();
        let listed = list_replays(dir.path());
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], new_path);
        assert_eq!(listed[1], old_path);
    }

    fn filetime_sleep() {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
}
