//! Exact four-point homography.
//!
//! The input is always exactly four correspondences (the corners of one face),
//! so the transform is solved directly from the 8×8 DLT system with `h33 = 1`.
//! There is no outlier rejection: a corrupted corner produces a distorted, but
//! still exact, mapping.

use glam::DVec2;
use nalgebra::{Matrix3, SMatrix, SVector};
use thiserror::Error;

/// Smallest corner-triangle area, relative to the squared quad extent, still
/// treated as non-collinear.
const MIN_RELATIVE_AREA: f64 = 1e-6;

/// Maximum corner reprojection error, relative to the target extent.
const MAX_RELATIVE_RESIDUAL: f64 = 1e-6;

/// Smallest homogeneous weight treated as finite when mapping points.
const MIN_WEIGHT: f64 = 1e-12;

/// Why a four-point configuration has no usable homography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DegenerateQuad {
    #[error("three or more corners are collinear or coincident")]
    Collinear,
    #[error("linear system is singular or ill-conditioned")]
    IllConditioned,
    #[error("corner coordinates are not finite")]
    NonFinite,
}

/// 3×3 projective transform acting on image points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Build from a row-major matrix.
    pub fn from_matrix(rows: [[f64; 3]; 3]) -> Self {
        Self {
            matrix: Matrix3::new(
                rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
                rows[2][1], rows[2][2],
            ),
        }
    }

    /// Row-major matrix.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Solve the homography mapping each `src[i]` onto `dst[i]`.
    pub fn from_correspondences(
        src: &[DVec2; 4],
        dst: &[DVec2; 4],
    ) -> Result<Self, DegenerateQuad> {
        check_quad(src)?;
        check_quad(dst)?;

        let (src_n, t_src) = normalize(src);
        let (dst_n, t_dst) = normalize(dst);

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for i in 0..4 {
            let (x, y) = (src_n[i].x, src_n[i].y);
            let (u, v) = (dst_n[i].x, dst_n[i].y);

            let r0 = 2 * i;
            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -x * u;
            a[(r0, 7)] = -y * u;
            b[r0] = u;

            let r1 = 2 * i + 1;
            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -x * v;
            a[(r1, 7)] = -y * v;
            b[r1] = v;
        }

        let h = a.lu().solve(&b).ok_or(DegenerateQuad::IllConditioned)?;
        if h.iter().any(|v| !v.is_finite()) {
            return Err(DegenerateQuad::IllConditioned);
        }

        let h_n = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let t_dst_inv = t_dst.try_inverse().ok_or(DegenerateQuad::IllConditioned)?;
        let mut matrix = t_dst_inv * h_n * t_src;

        let scale = matrix[(2, 2)];
        if scale.abs() > f64::EPSILON {
            matrix /= scale;
        }

        let homography = Self { matrix };
        homography.verify(src, dst)?;
        Ok(homography)
    }

    /// Map a point. `None` when it lands on the line at infinity.
    pub fn transform_point(&self, p: DVec2) -> Option<DVec2> {
        let m = &self.matrix;
        let w = m[(2, 0)] * p.x + m[(2, 1)] * p.y + m[(2, 2)];
        if w.abs() < MIN_WEIGHT {
            return None;
        }
        Some(DVec2::new(
            (m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)]) / w,
            (m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)]) / w,
        ))
    }

    /// Inverse transform, if the matrix is invertible.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// Every source corner must land on its target within tolerance.
    fn verify(&self, src: &[DVec2; 4], dst: &[DVec2; 4]) -> Result<(), DegenerateQuad> {
        let tolerance = MAX_RELATIVE_RESIDUAL * extent(dst).max(1.0);
        for (s, d) in src.iter().zip(dst.iter()) {
            let mapped = self
                .transform_point(*s)
                .ok_or(DegenerateQuad::IllConditioned)?;
            if !mapped.is_finite() || mapped.distance(*d) > tolerance {
                return Err(DegenerateQuad::IllConditioned);
            }
        }
        Ok(())
    }
}

/// Reject quads with non-finite, coincident or collinear corners.
fn check_quad(points: &[DVec2; 4]) -> Result<(), DegenerateQuad> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(DegenerateQuad::NonFinite);
    }

    let extent = extent(points);
    if extent <= f64::EPSILON {
        return Err(DegenerateQuad::Collinear);
    }

    let min_area = MIN_RELATIVE_AREA * extent * extent;
    for skip in 0..4 {
        let mut triple = points.iter().enumerate().filter(|(i, _)| *i != skip).map(|(_, p)| *p);
        let (Some(a), Some(b), Some(c)) = (triple.next(), triple.next(), triple.next()) else {
            continue;
        };
        let area = 0.5 * (b - a).perp_dot(c - a).abs();
        if area < min_area {
            return Err(DegenerateQuad::Collinear);
        }
    }

    Ok(())
}

/// Largest distance between two corners.
fn extent(points: &[DVec2; 4]) -> f64 {
    let mut max = 0.0f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            max = max.max(points[i].distance(points[j]));
        }
    }
    max
}

/// Hartley normalization: centroid to the origin, mean distance sqrt(2).
fn normalize(points: &[DVec2; 4]) -> ([DVec2; 4], Matrix3<f64>) {
    let centroid = points.iter().copied().sum::<DVec2>() / 4.0;
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / 4.0;
    let s = std::f64::consts::SQRT_2 / mean_dist;

    let transform = Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    (points.map(|p| (p - centroid) * s), transform)
}
