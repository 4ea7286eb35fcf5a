//! Fiducial marker to anchor-slot correspondence.
//!
//! The printed marker ids are not contiguous with the anchor slot numbering:
//! markers 7, 6 and 10 sit on slots 4, 5 and 6. Each marker contributes one of
//! its four corners, selected by `marker_id mod 4`.

use glam::Vec2;

use crate::anchors::ANCHOR_COUNT;
use crate::error::{PipelineError, Result};

/// One marker reported by a detector: id plus its four corners in the
/// detector's fixed winding order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerDetection {
    pub marker_id: i32,
    pub corners: [Vec2; 4],
}

/// Planar fiducial detector collaborator.
pub trait MarkerDetector {
    /// Detect markers in a working-resolution image.
    fn detect(&mut self, image: &image::GrayImage) -> Vec<MarkerDetection>;
}

/// Map a raw marker id onto its anchor slot.
pub fn map_marker_to_slot(marker_id: i32) -> Result<usize> {
    match marker_id {
        7 => Ok(4),
        6 => Ok(5),
        10 => Ok(6),
        0..=5 => Ok(marker_id as usize),
        _ => Err(PipelineError::UnknownMarker(marker_id)),
    }
}

/// Marker id printed for an anchor slot.
pub fn slot_to_marker(slot: usize) -> Result<i32> {
    match slot {
        4 => Ok(7),
        5 => Ok(6),
        6 => Ok(10),
        0..=3 => Ok(slot as i32),
        _ => Err(PipelineError::SlotOutOfRange(slot)),
    }
}

/// Which of the marker's corners marks the anchor.
pub fn corner_index(marker_id: i32) -> usize {
    marker_id.rem_euclid(4) as usize
}

/// Detected image position of each anchor slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlotObservations {
    points: [Option<Vec2>; ANCHOR_COUNT],
}

impl SlotObservations {
    /// Collect slot positions from detector output. Unknown markers are skipped;
    /// a later detection of the same slot replaces an earlier one.
    pub fn from_detections(detections: &[MarkerDetection]) -> Self {
        let mut observations = Self::default();

        for detection in detections {
            match map_marker_to_slot(detection.marker_id) {
                Ok(slot) => {
                    let corner = detection.corners[corner_index(detection.marker_id)];
                    observations.points[slot] = Some(corner);
                }
                Err(e) => log::warn!("Ignoring detection: {}", e),
            }
        }

        observations
    }

    pub fn get(&self, slot: usize) -> Option<Vec2> {
        self.points.get(slot).copied().flatten()
    }

    pub fn count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Vec2)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| p.map(|p| (slot, p)))
    }
}
