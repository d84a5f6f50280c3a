mod feedback;
mod look;
mod plugin;

pub use feedback::{CameraFeedbackObserver, CameraFeedbackPose};
pub use look::*;
pub use plugin::{CameraFeedback, CameraPlugin, FeedbackCamera};
