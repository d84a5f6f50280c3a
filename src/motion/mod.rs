pub mod intent;
pub mod solver;
pub mod state;

pub use intent::{InputCommand, MotionIntent, wish_direction_from_axes};
pub use solver::MotionSolver;
pub use state::{MotionState, MotionWriteSource};
