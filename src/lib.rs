//! Planar Surface Reprojector
//!
//! Reconstructs the planar faces of a physical object from fiducial-marker
//! anchors, caches rectified textures of each face, and reprojects them every
//! frame into the current observer's view:
//! - Marker-id to anchor-slot correspondence
//! - Exact four-point homographies and perspective warps
//! - Ring-buffer capture cache with nearest-view selection
//! - Saturating additive compositing

pub mod anchors;
pub mod cache;
pub mod camera;
pub mod composite;
pub mod config;
pub mod error;
pub mod export;
pub mod markers;
pub mod projection;
pub mod rectify;
pub mod session;
pub mod synthetic;

pub use error::{PipelineError, Result};
