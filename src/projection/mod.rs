//! Observer poses and anchor projection.

mod pose;
mod projector;

pub use pose::{ObserverPose, PoseSample, PoseSource, PoseTracker};
pub use projector::{PinholeProjection, ViewProjector};
