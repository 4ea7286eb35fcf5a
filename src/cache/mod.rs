//! Ring buffer of rectified captures.
//!
//! Every capture event advances one monotonically increasing counter and
//! writes slot `counter mod capacity`. Within that slot each face is written
//! independently: stored when rectified, cleared when the face was incomplete,
//! and left as it was when rectification failed. A slot's recorded position
//! always follows the newest texture it holds, so a capture that stores
//! nothing leaves the slot describing its older textures.

mod selector;

use glam::Vec3;
use image::GrayImage;

use crate::anchors::{FaceId, FACE_COUNT};
use crate::error::{PipelineError, Result};

pub use selector::{nearest_capture, ViewQuery};

/// A rectified canonical texture and where it was seen from.
#[derive(Debug, Clone)]
pub struct FaceTexture {
    pub image: GrayImage,
    pub observer_position: Vec3,
    /// Capture counter value of the event that produced this texture.
    pub sequence: u64,
}

/// One ring-buffer entry.
#[derive(Debug, Clone)]
pub struct CapturedView {
    /// Sequence of the newest texture in this slot.
    pub sequence: u64,
    /// Observer position of the newest texture in this slot.
    pub observer_position: Vec3,
    pub faces: [Option<FaceTexture>; FACE_COUNT],
}

impl CapturedView {
    fn new(sequence: u64, observer_position: Vec3) -> Self {
        Self {
            sequence,
            observer_position,
            faces: Default::default(),
        }
    }

    pub fn face(&self, face: FaceId) -> Option<&FaceTexture> {
        self.faces[face.index()].as_ref()
    }

    pub fn has_any_face(&self) -> bool {
        self.faces.iter().any(Option::is_some)
    }

    /// Point the slot metadata at the newest remaining texture. Returns false
    /// when no texture is left.
    fn refresh(&mut self) -> bool {
        let newest = self
            .faces
            .iter()
            .flatten()
            .max_by_key(|t| t.sequence)
            .map(|t| (t.sequence, t.observer_position));
        match newest {
            Some((sequence, position)) => {
                self.sequence = sequence;
                self.observer_position = position;
                true
            }
            None => false,
        }
    }
}

/// Write handle for one capture event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSlot {
    pub index: usize,
    pub sequence: u64,
    pub observer_position: Vec3,
}

/// Fixed-capacity, overwrite-oldest store of captured views.
#[derive(Debug, Clone)]
pub struct CaptureCache {
    views: Vec<Option<CapturedView>>,
    counter: u64,
}

impl CaptureCache {
    /// Create an empty cache. Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        Self {
            views: vec![None; capacity.max(1)],
            counter: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.views.len()
    }

    /// Number of capture events since creation or the last reset.
    pub fn capture_count(&self) -> u64 {
        self.counter
    }

    /// Claim the next ring-buffer slot for a capture taken at `observer_position`.
    /// The slot itself is untouched until a face is stored or cleared.
    pub fn begin_capture(&mut self, observer_position: Vec3) -> CaptureSlot {
        let sequence = self.counter;
        let index = (sequence % self.views.len() as u64) as usize;
        self.counter += 1;

        log::debug!("Capture #{} writes cache slot {}", sequence, index);
        CaptureSlot {
            index,
            sequence,
            observer_position,
        }
    }

    /// Store a rectified texture for `face` in the slot claimed by `slot`.
    pub fn store_face(&mut self, slot: CaptureSlot, face: FaceId, image: GrayImage) {
        let texture = FaceTexture {
            image,
            observer_position: slot.observer_position,
            sequence: slot.sequence,
        };
        let view = self.views[slot.index]
            .get_or_insert_with(|| CapturedView::new(slot.sequence, slot.observer_position));
        view.faces[face.index()] = Some(texture);
        view.refresh();
    }

    /// Mark `face` absent in the slot claimed by `slot`. A slot left with no
    /// textures becomes empty.
    pub fn clear_face(&mut self, slot: CaptureSlot, face: FaceId) {
        let entry = &mut self.views[slot.index];
        if let Some(view) = entry.as_mut() {
            view.faces[face.index()] = None;
            if !view.refresh() {
                *entry = None;
            }
        }
    }

    /// Empty every slot and restart the counter.
    pub fn reset(&mut self) {
        self.views.iter_mut().for_each(|v| *v = None);
        self.counter = 0;
    }

    pub fn view(&self, index: usize) -> Option<&CapturedView> {
        self.views.get(index).and_then(Option::as_ref)
    }

    pub fn views(&self) -> impl Iterator<Item = (usize, &CapturedView)> {
        self.views
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    pub fn face_texture(&self, index: usize, face: FaceId) -> Result<&FaceTexture> {
        self.view(index)
            .and_then(|v| v.face(face))
            .ok_or(PipelineError::NoCapturesAvailable {
                face: Some(face.index()),
            })
    }

    /// Number of slots holding at least one face texture.
    pub fn occupied(&self) -> usize {
        self.views().filter(|(_, v)| v.has_any_face()).count()
    }

    /// Most recently captured texture of `face`, if any.
    pub fn latest(&self, face: FaceId) -> Option<&FaceTexture> {
        self.views()
            .filter_map(|(_, v)| v.face(face))
            .max_by_key(|t| t.sequence)
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn face(index: usize) -> FaceId {
        FaceId::new(index).unwrap()
    }

    fn texture(value: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, Luma([value]))
    }

    #[test]
    fn test_slots_wrap_around() {
        let mut cache = CaptureCache::new(3);
        let indices: Vec<usize> = (0..7)
            .map(|i| cache.begin_capture(Vec3::splat(i as f32)).index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(cache.capture_count(), 7);
    }

    #[test]
    fn test_oldest_entry_overwritten() {
        let mut cache = CaptureCache::new(2);
        for value in [10u8, 20, 30] {
            let slot = cache.begin_capture(Vec3::splat(value as f32));
            cache.store_face(slot, face(0), texture(value));
        }

        let first = cache.face_texture(0, face(0)).unwrap();
        assert_eq!(first.image.get_pixel(0, 0)[0], 30);
        assert_eq!(first.observer_position, Vec3::splat(30.0));
        assert_eq!(first.sequence, 2);
        assert_eq!(cache.latest(face(0)).unwrap().sequence, 2);
    }

    #[test]
    fn test_incomplete_face_is_absent_not_stale() {
        let mut cache = CaptureCache::new(1);
        let slot = cache.begin_capture(Vec3::ZERO);
        cache.store_face(slot, face(1), texture(50));

        let slot = cache.begin_capture(Vec3::X);
        cache.clear_face(slot, face(1));
        assert!(cache.face_texture(0, face(1)).is_err());
        assert_eq!(cache.occupied(), 0);
    }

    #[test]
    fn test_failed_face_keeps_previous_entry() {
        let mut cache = CaptureCache::new(1);
        let slot = cache.begin_capture(Vec3::ZERO);
        cache.store_face(slot, face(2), texture(50));

        // Second capture rectifies face 0 only; face 2 failed and is not touched.
        let slot = cache.begin_capture(Vec3::X);
        cache.store_face(slot, face(0), texture(90));

        let kept = cache.face_texture(0, face(2)).unwrap();
        assert_eq!(kept.sequence, 0);
        assert_eq!(kept.observer_position, Vec3::ZERO);
        assert_eq!(cache.view(0).unwrap().observer_position, Vec3::X);
    }

    #[test]
    fn test_capture_storing_nothing_keeps_slot_position() {
        let near = Vec3::new(-0.45, 0.4, -0.9);
        let far = Vec3::new(-0.45, 0.4, -3.0);
        let mut cache = CaptureCache::new(2);
        for position in [near, far] {
            let slot = cache.begin_capture(position);
            for f in 0..FACE_COUNT {
                cache.store_face(slot, face(f), texture(40));
            }
        }

        // Every face of this capture failed, so nothing is written to slot 0.
        let slot = cache.begin_capture(Vec3::new(-0.45, 0.4, -3.01));
        assert_eq!(slot.index, 0);

        let view = cache.view(0).unwrap();
        assert_eq!(view.observer_position, near);
        assert_eq!(view.sequence, 0);
        assert_eq!(view.face(face(0)).unwrap().observer_position, near);

        let query = Vec3::new(-0.45, 0.4, -3.01);
        assert_eq!(nearest_capture(&cache, ViewQuery::Any, query).unwrap(), 1);
        assert_eq!(
            nearest_capture(&cache, ViewQuery::Face(face(0)), query).unwrap(),
            1
        );
    }

    #[test]
    fn test_clearing_newest_face_falls_back_to_older_texture() {
        let mut cache = CaptureCache::new(1);
        let slot = cache.begin_capture(Vec3::ZERO);
        cache.store_face(slot, face(0), texture(10));
        cache.store_face(slot, face(1), texture(10));

        // Second capture stores face 1 and finds face 0 incomplete.
        let slot = cache.begin_capture(Vec3::X);
        cache.store_face(slot, face(1), texture(20));
        assert_eq!(cache.view(0).unwrap().observer_position, Vec3::X);

        // Third capture: face 1 incomplete, face 0 failed.
        let slot = cache.begin_capture(Vec3::Y);
        cache.clear_face(slot, face(1));
        let view = cache.view(0).unwrap();
        assert_eq!(view.observer_position, Vec3::ZERO);
        assert_eq!(view.sequence, 0);

        cache.clear_face(slot, face(0));
        assert!(cache.view(0).is_none());
    }

    #[test]
    fn test_reset_empties_and_rewinds() {
        let mut cache = CaptureCache::new(3);
        for _ in 0..2 {
            let slot = cache.begin_capture(Vec3::ZERO);
            cache.store_face(slot, face(0), texture(1));
        }
        cache.reset();

        assert!(cache.is_empty());
        assert_eq!(cache.capture_count(), 0);
        assert_eq!(cache.begin_capture(Vec3::ZERO).index, 0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(CaptureCache::new(0).capacity(), 1);
    }
}
