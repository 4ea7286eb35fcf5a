//! Error type shared by every stage of the pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the reconstruction and reprojection pipeline.
///
/// Only `InvalidConfig`, `Io`, `Image` and `Serialization` can surface to the
/// host; everything else is absorbed by the session layer and logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("All {capacity} anchor slots are already confirmed")]
    CapacityExceeded { capacity: usize },

    #[error("Anchor slot {0} has not been confirmed")]
    SlotNotSet(usize),

    #[error("Anchor slot {0} is out of range")]
    SlotOutOfRange(usize),

    #[error("Marker id {0} has no anchor slot")]
    UnknownMarker(i32),

    #[error("Rectification of face {face} failed: {reason}")]
    RectificationFailed { face: usize, reason: String },

    #[error("No cached capture available for face {face:?}")]
    NoCapturesAvailable { face: Option<usize> },

    #[error("No pose available at {timestamp:?}")]
    PoseUnavailable { timestamp: Duration },

    #[error("Anchor slot {slot} is behind the observer")]
    PointBehindObserver { slot: usize },

    #[error("Invalid camera frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
