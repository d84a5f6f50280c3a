mod collide;
mod controller;
mod kinematics;
mod surf;

pub mod input;
pub mod plugin;

pub use controller::{PlayerController, StepFrame};
pub use plugin::{Player, PlayerMotion, PlayerPlugin, SimClock, ViewAngles, spawn_player};
