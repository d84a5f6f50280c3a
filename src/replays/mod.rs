//! Demo recording, telemetry export, comparison, and the determinism
//! harness. Everything here is offline: pure functions over files and
//! bytes, free to run on any thread.

pub mod compare;
pub mod demo;
pub mod determinism;
pub mod telemetry;

use std::path::PathBuf;

use thiserror::Error;

pub use compare::compare_exported_summaries;
pub use demo::{DemoFrame, DemoMetadata, DemoRecording, list_replays, load_replay, save_recording};
pub use determinism::{
    ReplayDeterminismReport, deterministic_state_hash, verify_replay_determinism,
};
pub use telemetry::{ReplayTelemetryExport, export_replay_telemetry};

pub const DEMO_FORMAT_VERSION: u32 = 3;
pub const DEMO_EXT: &str = ".ivan_demo.json";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unsupported demo format_version {found} (expected {expected})")]
    DemoFormatUnsupported { found: i64, expected: u32 },
    #[error("invalid demo payload: {0}")]
    InvalidDemo(String),
    #[error("no replay files found in {0}")]
    NoReplays(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Wall-clock seconds for file metadata. Never called from the tick path.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
