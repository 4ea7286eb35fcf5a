//! Anchor points and the fixed face topology built on them.

mod store;
mod topology;

pub use store::{AnchorStore, ANCHOR_COUNT};
pub use topology::{complete_faces, face_anchors, is_complete, FaceId, FACE_COUNT, FACE_TOPOLOGY};
