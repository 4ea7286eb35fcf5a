//! Pinhole projection of anchors into an observer's image.

use glam::{DVec2, Vec3};

use super::pose::ObserverPose;
use crate::config::{CameraIntrinsics, DisplayProjection};
use crate::error::{PipelineError, Result};

/// Minimum camera-space depth for a point to be considered in front of the observer.
const MIN_DEPTH: f64 = 1e-6;

/// Effective pinhole parameters in working-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeProjection {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeProjection {
    /// Project a camera-frame point. `None` when the point is not in front of the camera.
    pub fn project(&self, camera_point: Vec3) -> Option<DVec2> {
        let p = camera_point.as_dvec3();
        if p.z <= MIN_DEPTH {
            return None;
        }
        Some(DVec2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }
}

/// Projects world anchors for one kind of observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewProjector {
    projection: PinholeProjection,
}

impl ViewProjector {
    pub fn new(projection: PinholeProjection) -> Self {
        Self { projection }
    }

    /// Physical capture camera: device intrinsics rescaled from sensor
    /// resolution to the working image.
    pub fn capture(intrinsics: &CameraIntrinsics, working_width: u32, working_height: u32) -> Self {
        let sx = working_width as f64 / intrinsics.width as f64;
        let sy = working_height as f64 / intrinsics.height as f64;
        Self::new(PinholeProjection {
            fx: intrinsics.fx * sx,
            fy: intrinsics.fy * sy,
            cx: intrinsics.cx * sx,
            cy: intrinsics.cy * sy,
        })
    }

    /// Display viewpoint: a fixed virtual camera centred on the screen,
    /// divided by the scale-correction factor.
    pub fn display(display: &DisplayProjection) -> Self {
        let half_fov = display.vertical_fov_deg.to_radians() / 2.0;
        let focal = display.screen_height as f64 / 2.0 / half_fov.tan();
        let scale = display.scale_factor;
        Self::new(PinholeProjection {
            fx: focal / scale,
            fy: focal / scale,
            cx: display.screen_width as f64 / 2.0 / scale,
            cy: display.screen_height as f64 / 2.0 / scale,
        })
    }

    pub fn projection(&self) -> &PinholeProjection {
        &self.projection
    }

    /// Project one world point. The error carries the caller-supplied slot.
    pub fn project_point(&self, point: Vec3, pose: &ObserverPose, slot: usize) -> Result<DVec2> {
        self.projection
            .project(pose.world_to_camera(point))
            .ok_or(PipelineError::PointBehindObserver { slot })
    }

    /// Project world anchors into this observer's image, preserving order.
    pub fn project_anchors(&self, anchors: &[Vec3], pose: &ObserverPose) -> Result<Vec<DVec2>> {
        anchors
            .iter()
            .enumerate()
            .map(|(i, &p)| self.project_point(p, pose, i))
            .collect()
    }

    /// Project a face's four anchors. Errors name the anchor slot.
    pub fn project_quad(
        &self,
        anchors: &[Vec3; 4],
        slots: [usize; 4],
        pose: &ObserverPose,
    ) -> Result<[DVec2; 4]> {
        Ok([
            self.project_point(anchors[0], pose, slots[0])?,
            self.project_point(anchors[1], pose, slots[1])?,
            self.project_point(anchors[2], pose, slots[2])?,
            self.project_point(anchors[3], pose, slots[3])?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_point_on_axis() {
        let projector = ViewProjector::capture(&CameraIntrinsics::default(), 640, 360);
        let pose = ObserverPose::looking_at(Vec3::new(0.0, 0.0, -2.0), Vec3::ZERO, Vec3::Y);

        let p = projector.project_anchors(&[Vec3::ZERO], &pose).unwrap();
        assert!((p[0] - DVec2::new(320.0, 180.0)).length() < 1e-6);
    }

    #[test]
    fn test_capture_scaling() {
        let intrinsics = CameraIntrinsics::default();
        let projector = ViewProjector::capture(&intrinsics, 640, 360);
        let projection = projector.projection();
        assert!((projection.fx - 1400.0 / 3.0).abs() < 1e-9);
        assert!((projection.fy - 1400.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_display_projection() {
        let projector = ViewProjector::display(&DisplayProjection::default());
        let projection = projector.projection();
        let expected_focal = 540.0 / 30f64.to_radians().tan() / 3.0;

        assert!((projection.fy - expected_focal).abs() < 1e-9);
        assert!((projection.cx - 320.0).abs() < 1e-9);
        assert!((projection.cy - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_offsets_follow_image_axes() {
        let projector = ViewProjector::display(&DisplayProjection::default());
        let pose = ObserverPose::looking_at(Vec3::new(0.0, 0.0, -2.0), Vec3::ZERO, Vec3::Y);

        let right_of_center = pose.forward() * 2.0 + pose.position + pose.rotation * Vec3::X * 0.5;
        let points = projector
            .project_anchors(&[Vec3::new(0.0, 0.5, 0.0), right_of_center], &pose)
            .unwrap();
        // Up in the world is up (smaller row) in the image.
        assert!(points[0].y < 180.0);
        // Camera +X is image right.
        assert!(points[1].x > 320.0);
    }

    #[test]
    fn test_point_behind_observer() {
        let projector = ViewProjector::display(&DisplayProjection::default());
        let pose = ObserverPose::looking_at(Vec3::ZERO, Vec3::Z, Vec3::Y);

        let err = projector
            .project_anchors(&[Vec3::Z, Vec3::NEG_Z], &pose)
            .unwrap_err();
        assert!(matches!(err, PipelineError::PointBehindObserver { slot: 1 }));
    }
}
