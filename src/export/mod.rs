//! PNG export of composites and cached face textures.

use std::path::{Path, PathBuf};

use glam::DVec2;
use image::{GrayImage, Luma};

use crate::anchors::FaceId;
use crate::cache::CaptureCache;
use crate::composite::CompositeFrame;
use crate::error::Result;
use crate::markers::SlotObservations;

/// Half-size of the overlay marks, in pixels.
const MARK_RADIUS: i64 = 3;

/// Writes pipeline images to disk.
pub struct TextureExporter;

impl TextureExporter {
    /// Export an 8-bit grayscale image as PNG.
    pub fn export_image(image: &GrayImage, path: &Path) -> Result<()> {
        image.save(path)?;
        Ok(())
    }

    /// Export a composite frame as `composite_<index>.png` in `output_dir`.
    pub fn export_composite(
        frame: &CompositeFrame,
        output_dir: &Path,
        index: usize,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("composite_{:04}.png", index));
        Self::export_image(&frame.image, &path)?;
        log::info!("Exported composite: {}", path.display());
        Ok(path)
    }

    /// Export every cached face texture as `face<f>_slot<s>.png`.
    pub fn export_face_textures(cache: &CaptureCache, output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;

        let mut written = Vec::new();
        for (slot, view) in cache.views() {
            for face in FaceId::all() {
                if let Some(texture) = view.face(face) {
                    let filename = format!("face{}_slot{}.png", face.index(), slot);
                    let path = output_dir.join(&filename);
                    Self::export_image(&texture.image, &path)?;
                    log::info!("Exported face texture: {}", filename);
                    written.push(path);
                }
            }
        }

        Ok(written)
    }

    /// Export a marker overlay as `overlay_<index>.png` in `output_dir`.
    pub fn export_marker_overlay(
        overlay: &GrayImage,
        output_dir: &Path,
        index: usize,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("overlay_{:04}.png", index));
        Self::export_image(overlay, &path)?;
        log::info!("Exported marker overlay: {}", path.display());
        Ok(path)
    }
}

/// Copy of `image` with detected anchor corners drawn as white squares and
/// projected anchors as black crosses.
pub fn marker_overlay(
    image: &GrayImage,
    observations: &SlotObservations,
    projected: &[Option<DVec2>],
) -> GrayImage {
    let mut overlay = image.clone();

    for (_, observed) in observations.iter() {
        let center = observed.as_dvec2();
        for dy in -MARK_RADIUS..=MARK_RADIUS {
            for dx in -MARK_RADIUS..=MARK_RADIUS {
                put(&mut overlay, center, dx, dy, 255);
            }
        }
    }

    for center in projected.iter().flatten() {
        for d in -MARK_RADIUS..=MARK_RADIUS {
            put(&mut overlay, *center, d, 0, 0);
            put(&mut overlay, *center, 0, d, 0);
        }
    }

    overlay
}

fn put(image: &mut GrayImage, center: DVec2, dx: i64, dy: i64, value: u8) {
    let x = center.x.round() as i64 + dx;
    let y = center.y.round() as i64 + dy;
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, Luma([value]));
    }
}
