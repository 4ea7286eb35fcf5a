//! Rectification of faces into the canonical rectangle and back.

use glam::DVec2;
use image::GrayImage;

use super::homography::Homography;
use super::warp::warp_perspective;
use crate::anchors::FaceId;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Corners of the canonical rectangle in (top-left, top-right, bottom-left,
/// bottom-right) order, matching the face topology.
///
/// The rectangle spans `[0, width] × [0, height]`, so pixel `(x, y)` of a
/// texture sits at that point and the last row and column reach the far edge.
/// [`sample_bilinear`](super::sample_bilinear) treats the same extent as inside.
pub fn canonical_corners(width: u32, height: u32) -> [DVec2; 4] {
    let (w, h) = (width as f64, height as f64);
    [
        DVec2::new(0.0, 0.0),
        DVec2::new(w, 0.0),
        DVec2::new(0.0, h),
        DVec2::new(w, h),
    ]
}

/// Maps face quads to and from the fixed-size canonical rectangle.
#[derive(Debug, Clone)]
pub struct SurfaceRectifier {
    width: u32,
    height: u32,
    corners: [DVec2; 4],
}

impl SurfaceRectifier {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            corners: canonical_corners(width, height),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.canonical_width, config.canonical_height)
    }

    pub fn canonical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Homography taking the projected face corners onto the canonical corners.
    pub fn rectifying_homography(
        &self,
        face: FaceId,
        projected: &[DVec2; 4],
    ) -> Result<Homography> {
        Homography::from_correspondences(projected, &self.corners).map_err(|e| {
            PipelineError::RectificationFailed {
                face: face.index(),
                reason: e.to_string(),
            }
        })
    }

    /// Warp the face region of `source` into a canonical-size texture.
    pub fn rectify(
        &self,
        face: FaceId,
        source: &GrayImage,
        projected: &[DVec2; 4],
    ) -> Result<GrayImage> {
        let h = self.rectifying_homography(face, projected)?;
        warp_perspective(source, &h, self.width, self.height).ok_or_else(|| {
            PipelineError::RectificationFailed {
                face: face.index(),
                reason: "homography is not invertible".to_string(),
            }
        })
    }

    /// Warp a canonical texture onto `target_quad` in a `width`×`height` frame.
    /// Pixels outside the quad are zero.
    pub fn reproject(
        &self,
        face: FaceId,
        texture: &GrayImage,
        target_quad: &[DVec2; 4],
        width: u32,
        height: u32,
    ) -> Result<GrayImage> {
        let h = Homography::from_correspondences(&self.corners, target_quad).map_err(|e| {
            PipelineError::RectificationFailed {
                face: face.index(),
                reason: e.to_string(),
            }
        })?;
        warp_perspective(texture, &h, width, height).ok_or_else(|| {
            PipelineError::RectificationFailed {
                face: face.index(),
                reason: "homography is not invertible".to_string(),
            }
        })
    }
}
