//! Planar rectification: four-point homographies and perspective warps.

mod homography;
mod rectifier;
mod warp;

pub use homography::{DegenerateQuad, Homography};
pub use rectifier::{canonical_corners, SurfaceRectifier};
pub use warp::{sample_bilinear, warp_perspective, warp_with_inverse};
