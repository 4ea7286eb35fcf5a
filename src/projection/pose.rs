//! Observer poses and the pose-source collaborator.

use std::time::Duration;

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::error::{PipelineError, Result};

/// Camera-to-world pose of an observer.
///
/// Camera axes follow the pinhole convention: +X right, +Y down, +Z forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverPose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for ObserverPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl ObserverPose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Pose at `eye` looking at `target`, with `up` pointing up in the image.
    pub fn looking_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let down = forward.cross(right);
        let rotation = Quat::from_mat3(&Mat3::from_cols(right, down, forward));
        Self {
            position: eye,
            rotation,
        }
    }

    /// Pose from a device extrinsic transform (camera-to-world). Any scale in
    /// the matrix is discarded.
    pub fn from_camera_to_world(matrix: Mat4) -> Self {
        let (_scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            position: translation,
            rotation: rotation.normalize(),
        }
    }

    /// Express a world point in this observer's camera frame.
    pub fn world_to_camera(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    /// Image-up direction of this observer in world space.
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Y
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// World point `distance` along the observer's up axis.
    pub fn point_along_up(&self, distance: f32) -> Vec3 {
        self.position + self.up() * distance
    }
}

/// Device pose-tracking collaborator.
pub trait PoseSource {
    /// Camera pose at the capture timestamp, or `None` when tracking cannot answer.
    fn pose_at(&mut self, timestamp: Duration) -> Option<ObserverPose>;
}

/// A resolved pose, possibly reused from an earlier query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub pose: ObserverPose,
    pub stale: bool,
}

impl PoseSample {
    pub fn fresh(pose: ObserverPose) -> Self {
        Self { pose, stale: false }
    }
}

/// Remembers the last good pose so an unavailable answer degrades to reuse.
#[derive(Debug, Clone, Default)]
pub struct PoseTracker {
    last: Option<ObserverPose>,
    stale: bool,
}

impl PoseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a pose-source answer into a usable sample.
    pub fn resolve(
        &mut self,
        answer: Option<ObserverPose>,
        timestamp: Duration,
    ) -> Result<PoseSample> {
        match answer {
            Some(pose) => {
                if self.stale {
                    log::info!("Pose source recovered at {:?}", timestamp);
                }
                self.last = Some(pose);
                self.stale = false;
                Ok(PoseSample::fresh(pose))
            }
            None => {
                let pose = self
                    .last
                    .ok_or(PipelineError::PoseUnavailable { timestamp })?;
                log::warn!(
                    "Pose unavailable at {:?}, reusing last known pose",
                    timestamp
                );
                self.stale = true;
                Ok(PoseSample { pose, stale: true })
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.stale = false;
    }
}
