//! Per-frame reprojection of cached face textures into one image.

use glam::DVec2;
use image::GrayImage;

use crate::anchors::{complete_faces, face_anchors, AnchorStore, FaceId, FACE_COUNT};
use crate::cache::{nearest_capture, CaptureCache, ViewQuery};
use crate::error::{PipelineError, Result};
use crate::projection::{ObserverPose, ViewProjector};
use crate::rectify::SurfaceRectifier;

/// Add `image` into `acc` pixel by pixel, clamping at 255.
pub fn saturating_accumulate(acc: &mut GrayImage, image: &GrayImage) -> Result<()> {
    if acc.dimensions() != image.dimensions() {
        return Err(PipelineError::InvalidFrame(format!(
            "cannot add a {:?} image into a {:?} image",
            image.dimensions(),
            acc.dimensions()
        )));
    }
    for (a, b) in acc.iter_mut().zip(image.iter()) {
        *a = a.saturating_add(*b);
    }
    Ok(())
}

/// Saturating per-pixel sum of equally sized images. An empty input gives
/// an all-zero image.
pub fn saturating_sum<'a>(
    images: impl IntoIterator<Item = &'a GrayImage>,
    width: u32,
    height: u32,
) -> Result<GrayImage> {
    let mut sum = GrayImage::new(width, height);
    for image in images {
        saturating_accumulate(&mut sum, image)?;
    }
    Ok(sum)
}

/// Where one face landed in a composite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceReprojection {
    /// Cache slot the texture was taken from.
    pub cache_slot: usize,
    /// Face corners in the output image, in topology order.
    pub target_quad: [DVec2; 4],
}

/// One composited output frame.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub image: GrayImage,
    pub faces: [Option<FaceReprojection>; FACE_COUNT],
}

impl CompositeFrame {
    pub fn contributing_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.is_some()).count()
    }
}

/// Warps the nearest cached texture of each complete face onto the current
/// view and sums the results.
#[derive(Debug, Clone)]
pub struct ReprojectionCompositor {
    rectifier: SurfaceRectifier,
}

impl ReprojectionCompositor {
    pub fn new(rectifier: SurfaceRectifier) -> Self {
        Self { rectifier }
    }

    /// Output resolution, equal to the canonical rectangle.
    pub fn output_size(&self) -> (u32, u32) {
        self.rectifier.canonical_size()
    }

    /// Warp one face's nearest cached texture onto its quad as seen from `pose`.
    pub fn reproject_face(
        &self,
        face: FaceId,
        store: &AnchorStore,
        cache: &CaptureCache,
        projector: &ViewProjector,
        pose: &ObserverPose,
    ) -> Result<(GrayImage, FaceReprojection)> {
        let anchors = face_anchors(face, store)?;
        let target_quad = projector.project_quad(&anchors, face.slots(), pose)?;

        let cache_slot = nearest_capture(cache, ViewQuery::Face(face), pose.position)?;
        let texture = cache.face_texture(cache_slot, face)?;

        let (width, height) = self.output_size();
        let warped = self
            .rectifier
            .reproject(face, &texture.image, &target_quad, width, height)?;

        Ok((
            warped,
            FaceReprojection {
                cache_slot,
                target_quad,
            },
        ))
    }

    /// Composite every complete face for the observer at `pose`. Faces that
    /// cannot be reprojected contribute nothing.
    pub fn composite(
        &self,
        store: &AnchorStore,
        cache: &CaptureCache,
        projector: &ViewProjector,
        pose: &ObserverPose,
    ) -> CompositeFrame {
        let (width, height) = self.output_size();
        let mut image = GrayImage::new(width, height);
        let mut faces: [Option<FaceReprojection>; FACE_COUNT] = Default::default();

        for face in complete_faces(store) {
            let reprojected = self
                .reproject_face(face, store, cache, projector, pose)
                .and_then(|(warped, reprojection)| {
                    saturating_accumulate(&mut image, &warped)?;
                    Ok(reprojection)
                });

            match reprojected {
                Ok(reprojection) => faces[face.index()] = Some(reprojection),
                Err(e) => log::debug!("Skipping {} this frame: {}", face, e),
            }
        }

        CompositeFrame { image, faces }
    }
}
