//! Synthetic box scene used by the demo binary, tests and benches.
//!
//! Seven anchors sit on the corners of an axis-aligned box so that the front,
//! top and one side face are all visible from the default viewpoints. Each
//! face is painted a single gray level.

use std::time::Duration;

use glam::{DVec2, Vec2, Vec3};
use image::{GrayImage, Luma};

use crate::anchors::{AnchorStore, FaceId, ANCHOR_COUNT, FACE_COUNT};
use crate::error::Result;
use crate::markers::{corner_index, slot_to_marker, MarkerDetection, MarkerDetector};
use crate::projection::{ObserverPose, PoseSource, ViewProjector};

/// Half-size of the drawn marker squares, in pixels.
const MARKER_HALF_SIZE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxScene {
    pub half_extents: Vec3,
    pub face_values: [u8; FACE_COUNT],
    pub background: u8,
    pub capture_eye: Vec3,
    pub display_eye: Vec3,
}

impl Default for BoxScene {
    fn default() -> Self {
        Self {
            half_extents: Vec3::new(0.15, 0.1, 0.15),
            face_values: [60, 120, 180],
            background: 25,
            capture_eye: Vec3::new(-0.45, 0.4, -0.9),
            display_eye: Vec3::new(-0.35, 0.35, -0.85),
        }
    }
}

impl BoxScene {
    /// Anchor positions in slot order.
    pub fn anchors(&self) -> [Vec3; ANCHOR_COUNT] {
        let Vec3 { x: a, y: b, z: c } = self.half_extents;
        [
            Vec3::new(a, b, c),
            Vec3::new(-a, b, c),
            Vec3::new(-a, -b, c),
            Vec3::new(a, b, -c),
            Vec3::new(a, -b, -c),
            Vec3::new(-a, -b, -c),
            Vec3::new(-a, b, -c),
        ]
    }

    /// Store with every anchor confirmed.
    pub fn anchor_store(&self) -> Result<AnchorStore> {
        let mut store = AnchorStore::new();
        for point in self.anchors() {
            store.confirm_next_anchor(point)?;
        }
        Ok(store)
    }

    pub fn capture_pose(&self) -> ObserverPose {
        ObserverPose::looking_at(self.capture_eye, Vec3::ZERO, Vec3::Y)
    }

    pub fn display_pose(&self) -> ObserverPose {
        ObserverPose::looking_at(self.display_eye, Vec3::ZERO, Vec3::Y)
    }

    /// Rasterize the visible faces as seen through `projector` from `pose`.
    pub fn render(
        &self,
        projector: &ViewProjector,
        pose: &ObserverPose,
        width: u32,
        height: u32,
    ) -> Result<GrayImage> {
        let points = projector.project_anchors(&self.anchors(), pose)?;
        let mut image = GrayImage::from_pixel(width, height, Luma([self.background]));

        for face in FaceId::all() {
            let [tl, tr, bl, br] = face.slots().map(|slot| points[slot]);
            let polygon = [tl, tr, br, bl];
            let value = self.face_values[face.index()];
            fill_convex(&mut image, &polygon, value);
        }
        Ok(image)
    }

    /// Marker detections a perfect detector would report for this view.
    pub fn detections(
        &self,
        projector: &ViewProjector,
        pose: &ObserverPose,
    ) -> Result<Vec<MarkerDetection>> {
        let points = projector.project_anchors(&self.anchors(), pose)?;
        points
            .iter()
            .enumerate()
            .map(|(slot, p)| -> Result<MarkerDetection> {
                let marker_id = slot_to_marker(slot)?;
                let anchor = Vec2::new(p.x as f32, p.y as f32);
                let offsets = [
                    Vec2::new(-1.0, -1.0),
                    Vec2::new(1.0, -1.0),
                    Vec2::new(1.0, 1.0),
                    Vec2::new(-1.0, 1.0),
                ];
                // Place the square so its designated corner is the anchor.
                let shift = anchor - offsets[corner_index(marker_id)] * MARKER_HALF_SIZE;
                let corners = offsets.map(|o| shift + o * MARKER_HALF_SIZE);
                Ok(MarkerDetection { marker_id, corners })
            })
            .collect()
    }
}

/// Set every pixel whose integer coordinate lies inside `polygon`.
fn fill_convex(image: &mut GrayImage, polygon: &[DVec2; 4], value: u8) {
    let min = polygon.iter().copied().reduce(DVec2::min).unwrap_or(DVec2::ZERO);
    let max = polygon.iter().copied().reduce(DVec2::max).unwrap_or(DVec2::ZERO);

    let x0 = min.x.floor().max(0.0) as u32;
    let y0 = min.y.floor().max(0.0) as u32;
    let x1 = (max.x.ceil() as i64).clamp(0, image.width() as i64 - 1) as u32;
    let y1 = (max.y.ceil() as i64).clamp(0, image.height() as i64 - 1) as u32;

    for y in y0..=y1 {
        for x in x0..=x1 {
            if contains(polygon, DVec2::new(x as f64, y as f64)) {
                image.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

fn contains(polygon: &[DVec2; 4], p: DVec2) -> bool {
    let mut sign = 0.0f64;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let cross = (b - a).perp_dot(p - a);
        if cross != 0.0 {
            if sign != 0.0 && cross.signum() != sign {
                return false;
            }
            sign = cross.signum();
        }
    }
    true
}

/// Detector that replays a fixed set of detections.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    pub detections: Vec<MarkerDetection>,
}

impl MarkerDetector for ScriptedDetector {
    fn detect(&mut self, _image: &GrayImage) -> Vec<MarkerDetection> {
        self.detections.clone()
    }
}

/// Pose source that answers with one pose, or not at all when `None`.
#[derive(Debug, Clone, Default)]
pub struct FixedPoseSource {
    pub pose: Option<ObserverPose>,
}

impl PoseSource for FixedPoseSource {
    fn pose_at(&mut self, _timestamp: Duration) -> Option<ObserverPose> {
        self.pose
    }
}
