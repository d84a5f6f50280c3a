use serde::{Deserialize, Serialize};

/// Coarse motion state the controller reports each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Grounded,
    #[default]
    Airborne,
    Sliding,
    Wallrunning,
    Surfing,
    NoClip,
}

impl MotionState {
    /// Stable lowercase name used by telemetry and the tick hash.
    pub fn name(self) -> &'static str {
        match self {
            MotionState::Grounded => "grounded",
            MotionState::Airborne => "airborne",
            MotionState::Sliding => "sliding",
            MotionState::Wallrunning => "wallrunning",
            MotionState::Surfing => "surfing",
            MotionState::NoClip => "noclip",
        }
    }
}

/// Attribution tag stamped on every velocity mutation.
///
/// Only the motion solver writes `Solver`, only collision resolution writes
/// `Collision`, jump/slide/vault impulses write `Impulse`, and the host's
/// privileged path (transports, spawns) writes `External`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionWriteSource {
    Impulse,
    Solver,
    Collision,
    External,
}

impl MotionWriteSource {
    pub fn name(self) -> &'static str {
        match self {
            MotionWriteSource::Impulse => "impulse",
            MotionWriteSource::Solver => "solver",
            MotionWriteSource::Collision => "collision",
            MotionWriteSource::External => "external",
        }
    }
}
