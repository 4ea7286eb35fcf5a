//! Static face definitions over the anchor slots.

use std::fmt;

use glam::Vec3;

use super::store::AnchorStore;
use crate::error::Result;

/// Number of planar faces reconstructed.
pub const FACE_COUNT: usize = 3;

/// Anchor slots of each face in (top-left, top-right, bottom-left, bottom-right) order.
pub const FACE_TOPOLOGY: [[usize; 4]; FACE_COUNT] = [[3, 6, 4, 5], [0, 1, 3, 6], [6, 1, 5, 2]];

/// Index of a face in [`FACE_TOPOLOGY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(usize);

impl FaceId {
    pub fn new(index: usize) -> Option<Self> {
        (index < FACE_COUNT).then_some(Self(index))
    }

    pub fn all() -> impl Iterator<Item = FaceId> {
        (0..FACE_COUNT).map(FaceId)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// Anchor slots of this face, in corner order.
    pub fn slots(self) -> [usize; 4] {
        FACE_TOPOLOGY[self.0]
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face {}", self.0)
    }
}

/// True iff every anchor slot of `face` is confirmed.
pub fn is_complete(face: FaceId, store: &AnchorStore) -> bool {
    face.slots().iter().all(|&slot| store.is_slot_set(slot))
}

/// Faces whose anchors are all confirmed, in index order.
pub fn complete_faces(store: &AnchorStore) -> Vec<FaceId> {
    FaceId::all().filter(|&face| is_complete(face, store)).collect()
}

/// The four anchors of `face`, in corner order.
pub fn face_anchors(face: FaceId, store: &AnchorStore) -> Result<[Vec3; 4]> {
    let [a, b, c, d] = face.slots();
    Ok([
        store.anchor(a)?,
        store.anchor(b)?,
        store.anchor(c)?,
        store.anchor(d)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::ANCHOR_COUNT;
    use crate::error::PipelineError;

    #[test]
    fn test_completeness_over_all_occupancies() {
        for mask in 0u8..(1 << ANCHOR_COUNT) {
            let store = AnchorStore::from_mask(mask, Vec3::ONE);
            for face in FaceId::all() {
                let expected = face.slots().iter().all(|&s| mask & (1 << s) != 0);
                assert_eq!(
                    is_complete(face, &store),
                    expected,
                    "mask {:07b}, {}",
                    mask,
                    face
                );
            }
        }
    }

    #[test]
    fn test_shared_slots() {
        let [f0, f1, f2] = FACE_TOPOLOGY;
        assert!(f0.contains(&3) && f1.contains(&3));
        assert!(f0.contains(&6) && f1.contains(&6));
        assert!(f1.contains(&1) && f2.contains(&1));
        assert!(f2.contains(&6));
    }

    #[test]
    fn test_face_anchors_order() {
        let mut store = AnchorStore::new();
        for i in 0..ANCHOR_COUNT {
            store.confirm_next_anchor(Vec3::splat(i as f32)).unwrap();
        }
        let face = FaceId::new(2).unwrap();
        let anchors = face_anchors(face, &store).unwrap();
        assert_eq!(
            anchors,
            [
                Vec3::splat(6.0),
                Vec3::splat(1.0),
                Vec3::splat(5.0),
                Vec3::splat(2.0)
            ]
        );
    }

    #[test]
    fn test_face_anchors_incomplete() {
        let store = AnchorStore::from_mask(0b011_1111, Vec3::ZERO);
        let face = FaceId::new(0).unwrap();
        assert!(matches!(
            face_anchors(face, &store),
            Err(PipelineError::SlotNotSet(6))
        ));
        assert!(complete_faces(&store).is_empty());
    }

    #[test]
    fn test_face_id_bounds() {
        assert!(FaceId::new(2).is_some());
        assert!(FaceId::new(FACE_COUNT).is_none());
    }
}
