//! Nearest-viewpoint selection over the capture cache.

use glam::Vec3;

use super::CaptureCache;
use crate::anchors::FaceId;
use crate::error::{PipelineError, Result};

/// What the nearest capture must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewQuery {
    /// Slots holding a texture of this face, ranked by that texture's position.
    Face(FaceId),
    /// Slots holding any face, ranked by the position of their newest texture.
    Any,
}

impl ViewQuery {
    fn face_index(self) -> Option<usize> {
        match self {
            ViewQuery::Face(face) => Some(face.index()),
            ViewQuery::Any => None,
        }
    }
}

/// Index of the cache slot whose recorded observer position is nearest to
/// `position`. Ties go to the lowest index.
pub fn nearest_capture(cache: &CaptureCache, query: ViewQuery, position: Vec3) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (index, view) in cache.views() {
        let recorded = match query {
            ViewQuery::Face(face) => match view.face(face) {
                Some(texture) => texture.observer_position,
                None => continue,
            },
            ViewQuery::Any if view.has_any_face() => view.observer_position,
            ViewQuery::Any => continue,
        };

        let distance = recorded.distance_squared(position);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((index, distance));
        }
    }

    best.map(|(index, _)| index)
        .ok_or(PipelineError::NoCapturesAvailable {
            face: query.face_index(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn face(index: usize) -> FaceId {
        FaceId::new(index).unwrap()
    }

    fn cache_with(positions: &[Vec3], faces: &[usize]) -> CaptureCache {
        let mut cache = CaptureCache::new(positions.len());
        for &p in positions {
            let slot = cache.begin_capture(p);
            for &f in faces {
                cache.store_face(slot, face(f), GrayImage::from_pixel(2, 2, Luma([1])));
            }
        }
        cache
    }

    #[test]
    fn test_empty_cache() {
        let cache = CaptureCache::new(5);
        assert!(matches!(
            nearest_capture(&cache, ViewQuery::Any, Vec3::ZERO),
            Err(PipelineError::NoCapturesAvailable { face: None })
        ));
        assert!(matches!(
            nearest_capture(&cache, ViewQuery::Face(face(1)), Vec3::ZERO),
            Err(PipelineError::NoCapturesAvailable { face: Some(1) })
        ));
    }

    #[test]
    fn test_picks_minimum_distance() {
        let cache = cache_with(
            &[
                Vec3::new(5.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-3.0, 0.0, 0.0),
            ],
            &[0],
        );
        let nearest = nearest_capture(&cache, ViewQuery::Face(face(0)), Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(nearest.unwrap(), 1);
        let nearest = nearest_capture(&cache, ViewQuery::Any, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(nearest.unwrap(), 2);
    }

    #[test]
    fn test_ties_prefer_lowest_index() {
        let cache = cache_with(
            &[
                Vec3::new(3.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            &[0, 2],
        );
        assert_eq!(
            nearest_capture(&cache, ViewQuery::Face(face(2)), Vec3::ZERO).unwrap(),
            1
        );
        assert_eq!(nearest_capture(&cache, ViewQuery::Any, Vec3::ZERO).unwrap(), 1);
    }

    #[test]
    fn test_face_query_skips_slots_without_face() {
        let mut cache = CaptureCache::new(2);
        let near = cache.begin_capture(Vec3::ZERO);
        cache.store_face(near, face(0), GrayImage::new(2, 2));
        let far = cache.begin_capture(Vec3::splat(10.0));
        cache.store_face(far, face(1), GrayImage::new(2, 2));

        assert_eq!(
            nearest_capture(&cache, ViewQuery::Face(face(1)), Vec3::ZERO).unwrap(),
            1
        );
        assert_eq!(nearest_capture(&cache, ViewQuery::Any, Vec3::ZERO).unwrap(), 0);
    }
}
