//! Perspective warp of grayscale images.

use glam::DVec2;
use image::{GrayImage, Luma};

use super::homography::Homography;

/// Slack on the image extent so corners that round-trip through a homography
/// still land inside.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Warp `src` into a `width`×`height` image through `transform` (source to
/// destination pixel coordinates).
///
/// Each destination pixel is inverse-mapped into the source and sampled
/// bilinearly; samples that fall outside the source read as zero. Returns
/// `None` if `transform` cannot be inverted.
pub fn warp_perspective(
    src: &GrayImage,
    transform: &Homography,
    width: u32,
    height: u32,
) -> Option<GrayImage> {
    let inverse = transform.inverse()?;
    let mut dst = GrayImage::new(width, height);
    warp_with_inverse(src, &inverse, &mut dst);
    Some(dst)
}

/// Fill `dst` by sampling `src` at `inverse(x, y)` for every destination pixel.
pub fn warp_with_inverse(src: &GrayImage, inverse: &Homography, dst: &mut GrayImage) {
    let m = inverse.matrix();
    let width = dst.width();

    for (i, pixel) in dst.pixels_mut().enumerate() {
        let x = (i as u32 % width) as f64;
        let y = (i as u32 / width) as f64;

        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() < f64::EPSILON {
            *pixel = Luma([0]);
            continue;
        }
        let sx = (m[0][0] * x + m[0][1] * y + m[0][2]) / w;
        let sy = (m[1][0] * x + m[1][1] * y + m[1][2]) / w;

        *pixel = Luma([sample_bilinear(src, DVec2::new(sx, sy))]);
    }
}

/// Bilinear sample of `src` at `p`.
///
/// The image covers the continuous rectangle `[0, width] × [0, height]`, the
/// same extent the canonical corners use. Inside it the lookup clamps to the
/// edge pixels; outside it the sample is zero.
pub fn sample_bilinear(src: &GrayImage, p: DVec2) -> u8 {
    let (w, h) = (src.width() as i64, src.height() as i64);
    if !p.is_finite()
        || p.x < -EDGE_TOLERANCE
        || p.y < -EDGE_TOLERANCE
        || p.x > w as f64 + EDGE_TOLERANCE
        || p.y > h as f64 + EDGE_TOLERANCE
    {
        return 0;
    }

    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let fx = p.x - x0;
    let fy = p.y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let raw = src.as_raw();
    let at = |x: i64, y: i64| -> f64 {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        raw[(y * w + x) as usize] as f64
    };

    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
    let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
    let value = top * (1.0 - fy) + bottom * fy;

    value.round().clamp(0.0, 255.0) as u8
}
