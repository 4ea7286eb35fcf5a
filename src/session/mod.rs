//! Pipeline controller: anchor collection, capture caching and per-frame
//! reprojection, plus the event-serialising driver around it.

mod driver;

use std::fmt;

use glam::{DVec2, Vec3};
use image::GrayImage;

use crate::anchors::{
    complete_faces, face_anchors, is_complete, AnchorStore, FaceId, ANCHOR_COUNT, FACE_COUNT,
};
use crate::cache::{CaptureCache, FaceTexture};
use crate::composite::{CompositeFrame, ReprojectionCompositor};
use crate::config::{ObserverMode, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::markers::SlotObservations;
use crate::projection::{ObserverPose, PoseSample, ViewProjector};
use crate::rectify::SurfaceRectifier;

pub use driver::{DisplaySink, SessionDriver, SessionEvent, SessionHandle, TickSummary};

/// State of the pipeline, derived from the anchor store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No anchors confirmed.
    Idle,
    /// Some anchors confirmed, no face complete yet.
    Collecting { confirmed: usize },
    /// At least one face complete; capture and reprojection are enabled.
    Active { complete_faces: usize },
}

impl PipelineState {
    pub fn from_store(store: &AnchorStore) -> Self {
        let complete = complete_faces(store).len();
        let confirmed = store.confirmed_count();
        if complete > 0 {
            PipelineState::Active {
                complete_faces: complete,
            }
        } else if confirmed > 0 {
            PipelineState::Collecting { confirmed }
        } else {
            PipelineState::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PipelineState::Active { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Collecting { confirmed } => {
                write!(f, "Collecting ({}/{})", confirmed, ANCHOR_COUNT)
            }
            PipelineState::Active { complete_faces } => {
                write!(f, "Active ({}/{} faces)", complete_faces, FACE_COUNT)
            }
        }
    }
}

/// What a capture did with one face.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceOutcome {
    /// Rectified and written to the cache.
    Stored,
    /// Not complete at capture time; the slot's entry is now absent.
    Incomplete,
    /// Rectification failed; the slot's previous entry was kept.
    Failed(String),
}

/// Result of one capture event.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    /// Cache slot written.
    pub slot: usize,
    /// Capture counter value.
    pub sequence: u64,
    pub faces: [FaceOutcome; FACE_COUNT],
    /// Mean distance in pixels between detected marker corners and the
    /// projected anchors, over slots with both.
    pub marker_residual: Option<f64>,
    /// The capture pose was reused from an earlier query.
    pub stale_pose: bool,
}

impl CaptureReport {
    pub fn stored_count(&self) -> usize {
        self.faces
            .iter()
            .filter(|o| matches!(o, FaceOutcome::Stored))
            .count()
    }
}

/// Poses available to drive the display view this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoses {
    pub head: ObserverPose,
    pub controller: Option<ObserverPose>,
}

impl DisplayPoses {
    pub fn head_only(head: ObserverPose) -> Self {
        Self {
            head,
            controller: None,
        }
    }

    /// Viewpoint for `mode`. Handheld falls back to the head without a controller pose.
    pub fn viewpoint(&self, mode: ObserverMode) -> ObserverPose {
        match mode {
            ObserverMode::Handheld => self.controller.unwrap_or(self.head),
            ObserverMode::HeadUp => self.head,
        }
    }
}

/// Owns the session state: the anchor store and the capture cache.
pub struct Pipeline {
    config: PipelineConfig,
    anchors: AnchorStore,
    cache: CaptureCache,
    rectifier: SurfaceRectifier,
    compositor: ReprojectionCompositor,
    capture_projector: ViewProjector,
    display_projector: ViewProjector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let rectifier = SurfaceRectifier::from_config(&config);
        let capture_projector = ViewProjector::capture(
            &config.capture_camera,
            config.canonical_width,
            config.canonical_height,
        );
        let display_projector = ViewProjector::display(&config.display);

        log::info!(
            "Pipeline ready: canonical {}x{}, {} cache slots, {:?} display",
            config.canonical_width,
            config.canonical_height,
            config.cache_count,
            config.observer_mode
        );

        Ok(Self {
            anchors: AnchorStore::new(),
            cache: CaptureCache::new(config.cache_count),
            compositor: ReprojectionCompositor::new(rectifier.clone()),
            rectifier,
            capture_projector,
            display_projector,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }

    pub fn cache(&self) -> &CaptureCache {
        &self.cache
    }

    pub fn capture_projector(&self) -> &ViewProjector {
        &self.capture_projector
    }

    pub fn display_projector(&self) -> &ViewProjector {
        &self.display_projector
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_store(&self.anchors)
    }

    /// Confirm the next anchor at a world point.
    pub fn confirm_anchor(&mut self, point: Vec3) -> Result<usize> {
        let before = self.state();
        let slot = self.anchors.confirm_next_anchor(point)?;
        log::info!("Anchor {} confirmed at {:?}", slot, point);

        let after = self.state();
        if after != before {
            log::info!("Pipeline state: {} -> {}", before, after);
        }
        Ok(slot)
    }

    /// Confirm the next anchor at the pointer tip of a hand-held controller.
    pub fn confirm_at_pointer(&mut self, controller: &ObserverPose) -> Result<usize> {
        self.confirm_anchor(controller.point_along_up(self.config.cursor_offset))
    }

    /// Rectify every complete face of a working-resolution capture into the
    /// next cache slot. Returns `None` when the pipeline is not active.
    pub fn capture(
        &mut self,
        image: &GrayImage,
        observations: &SlotObservations,
        sample: PoseSample,
    ) -> Result<Option<CaptureReport>> {
        if !self.state().is_active() {
            log::debug!("Ignoring capture while {}", self.state());
            return Ok(None);
        }

        let expected = self.rectifier.canonical_size();
        if image.dimensions() != expected {
            return Err(PipelineError::InvalidFrame(format!(
                "capture is {:?}, working resolution is {:?}",
                image.dimensions(),
                expected
            )));
        }

        let pose = sample.pose;
        let slot = self.cache.begin_capture(pose.position);
        let mut faces: [FaceOutcome; FACE_COUNT] =
            std::array::from_fn(|_| FaceOutcome::Incomplete);

        for face in FaceId::all() {
            if !is_complete(face, &self.anchors) {
                self.cache.clear_face(slot, face);
                continue;
            }

            match self.rectify_face(face, image, &pose) {
                Ok(texture) => {
                    self.cache.store_face(slot, face, texture);
                    faces[face.index()] = FaceOutcome::Stored;
                }
                Err(e) => {
                    log::warn!("Keeping previous texture of {}: {}", face, e);
                    faces[face.index()] = FaceOutcome::Failed(e.to_string());
                }
            }
        }

        let report = CaptureReport {
            slot: slot.index,
            sequence: slot.sequence,
            faces,
            marker_residual: self.marker_residual(observations, &pose),
            stale_pose: sample.stale,
        };

        log::info!(
            "Capture #{} into slot {}: {} face(s) stored{}",
            report.sequence,
            report.slot,
            report.stored_count(),
            if report.stale_pose { " (stale pose)" } else { "" }
        );
        if let Some(residual) = report.marker_residual {
            log::debug!("Marker residual {:.2}px", residual);
        }

        Ok(Some(report))
    }

    fn rectify_face(
        &self,
        face: FaceId,
        image: &GrayImage,
        pose: &ObserverPose,
    ) -> Result<GrayImage> {
        let anchors = face_anchors(face, &self.anchors)?;
        let corners = self
            .capture_projector
            .project_quad(&anchors, face.slots(), pose)
            .map_err(|e| PipelineError::RectificationFailed {
                face: face.index(),
                reason: e.to_string(),
            })?;
        self.rectifier.rectify(face, image, &corners)
    }

    /// Confirmed anchors projected into the working image from `pose`, by
    /// slot. `None` for unset slots and points behind the camera.
    pub fn projected_anchors(&self, pose: &ObserverPose) -> [Option<DVec2>; ANCHOR_COUNT] {
        std::array::from_fn(|slot| {
            let anchor = self.anchors.anchor(slot).ok()?;
            self.capture_projector.project_point(anchor, pose, slot).ok()
        })
    }

    /// Mean pixel distance between observed marker corners and projected anchors.
    fn marker_residual(
        &self,
        observations: &SlotObservations,
        pose: &ObserverPose,
    ) -> Option<f64> {
        let projected = self.projected_anchors(pose);
        let distances: Vec<f64> = observations
            .iter()
            .filter_map(|(slot, observed)| {
                let p = projected.get(slot).copied().flatten()?;
                Some(p.distance(observed.as_dvec2()))
            })
            .collect();

        if distances.is_empty() {
            None
        } else {
            Some(distances.iter().sum::<f64>() / distances.len() as f64)
        }
    }

    /// Composite the cached faces for this frame's viewpoint. `None` unless active.
    pub fn frame(&self, poses: &DisplayPoses) -> Option<CompositeFrame> {
        if !self.state().is_active() {
            return None;
        }
        let pose = poses.viewpoint(self.config.observer_mode);
        Some(
            self.compositor
                .composite(&self.anchors, &self.cache, &self.display_projector, &pose),
        )
    }

    /// Forget every anchor and cached capture.
    pub fn tracking_lost(&mut self) {
        let before = self.state();
        self.anchors.reset();
        self.cache.reset();
        log::info!("Tracking lost: pipeline state {} -> {}", before, self.state());
    }

    /// Most recently rectified texture of `face`.
    pub fn latest_texture(&self, face: FaceId) -> Option<&FaceTexture> {
        self.cache.latest(face)
    }
}
