//! Single-threaded driver that serialises external events into the pipeline.
//!
//! Producers on any thread push events through a [`SessionHandle`]. The
//! driver drains the queue in arrival order at the start of each tick and
//! then composites, so anchor confirmation, capture and reprojection never
//! interleave.

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use image::GrayImage;

use super::{CaptureReport, DisplayPoses, Pipeline, PipelineState};
use crate::camera::{normalize_frame, LumaFrame};
use crate::composite::CompositeFrame;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::export::marker_overlay;
use crate::markers::{MarkerDetector, SlotObservations};
use crate::projection::{ObserverPose, PoseSource, PoseTracker};

/// Output side of the pipeline.
pub trait DisplaySink {
    fn present(&mut self, frame: &CompositeFrame);
}

/// External input to the pipeline.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A world point was confirmed as the next anchor.
    AnchorConfirmed(Vec3),
    /// The user confirmed at the controller's pointer tip.
    PointerConfirmed(ObserverPose),
    /// The capture camera delivered a frame.
    FrameCaptured(LumaFrame),
    /// The pose collaborator lost tracking.
    TrackingLost,
}

/// Cloneable producer side of the event queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: Sender<SessionEvent>,
}

impl SessionHandle {
    /// Queue an event. Returns false if the driver has been dropped.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn confirm_anchor(&self, point: Vec3) -> bool {
        self.send(SessionEvent::AnchorConfirmed(point))
    }

    pub fn confirm_at_pointer(&self, controller: ObserverPose) -> bool {
        self.send(SessionEvent::PointerConfirmed(controller))
    }

    pub fn frame_captured(&self, frame: LumaFrame) -> bool {
        self.send(SessionEvent::FrameCaptured(frame))
    }

    pub fn tracking_lost(&self) -> bool {
        self.send(SessionEvent::TrackingLost)
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    /// Events drained from the queue.
    pub events: usize,
    /// Captures that wrote a cache slot.
    pub captures: usize,
    /// A composite was handed to the display sink.
    pub presented: bool,
    pub state: PipelineState,
}

/// Owns the pipeline and its collaborators.
pub struct SessionDriver<D, P, S> {
    pipeline: Pipeline,
    detector: D,
    poses: P,
    sink: S,
    tracker: PoseTracker,
    sender: Sender<SessionEvent>,
    receiver: Receiver<SessionEvent>,
    last_capture: Option<CaptureReport>,
    last_overlay: Option<GrayImage>,
}

impl<D, P, S> SessionDriver<D, P, S>
where
    D: MarkerDetector,
    P: PoseSource,
    S: DisplaySink,
{
    pub fn new(config: PipelineConfig, detector: D, poses: P, sink: S) -> Result<Self> {
        let pipeline = Pipeline::new(config)?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        Ok(Self {
            pipeline,
            detector,
            poses,
            sink,
            tracker: PoseTracker::new(),
            sender,
            receiver,
            last_capture: None,
            last_overlay: None,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn poses_mut(&mut self) -> &mut P {
        &mut self.poses
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Report of the most recent capture that wrote a cache slot.
    pub fn last_capture(&self) -> Option<&CaptureReport> {
        self.last_capture.as_ref()
    }

    /// Marker overlay of the most recent capture, kept when `debug_overlay` is set.
    pub fn last_overlay(&self) -> Option<&GrayImage> {
        self.last_overlay.as_ref()
    }

    /// Drain queued events in arrival order, then composite and present.
    pub fn tick(&mut self, display: &DisplayPoses) -> TickSummary {
        let mut events = 0;
        let mut captures = 0;

        while let Ok(event) = self.receiver.try_recv() {
            events += 1;
            if self.handle_event(event) {
                captures += 1;
            }
        }

        let presented = match self.pipeline.frame(display) {
            Some(frame) => {
                log::debug!(
                    "Presenting composite with {} face(s)",
                    frame.contributing_faces()
                );
                self.sink.present(&frame);
                true
            }
            None => false,
        };

        TickSummary {
            events,
            captures,
            presented,
            state: self.pipeline.state(),
        }
    }

    /// Apply one event. Failures are logged and never escape. Returns true
    /// if a capture was written.
    fn handle_event(&mut self, event: SessionEvent) -> bool {
        let result = match event {
            SessionEvent::AnchorConfirmed(point) => {
                self.pipeline.confirm_anchor(point).map(|_| false)
            }
            SessionEvent::PointerConfirmed(controller) => {
                self.pipeline.confirm_at_pointer(&controller).map(|_| false)
            }
            SessionEvent::FrameCaptured(frame) => self.process_frame(&frame),
            SessionEvent::TrackingLost => {
                self.pipeline.tracking_lost();
                self.tracker.reset();
                self.last_capture = None;
                self.last_overlay = None;
                Ok(false)
            }
        };

        result.unwrap_or_else(|e| {
            log::warn!("Event dropped: {}", e);
            false
        })
    }

    fn process_frame(&mut self, frame: &LumaFrame) -> Result<bool> {
        if !self.pipeline.state().is_active() {
            log::debug!(
                "Frame at {:?} ignored while {}",
                frame.timestamp,
                self.pipeline.state()
            );
            return Ok(false);
        }

        let config = self.pipeline.config();
        let working = normalize_frame(
            frame,
            config.canonical_width,
            config.canonical_height,
            config.normalize_contrast,
        )?;

        let detections = self.detector.detect(&working);
        let observations = SlotObservations::from_detections(&detections);

        let answer = self.poses.pose_at(frame.timestamp);
        let sample = self.tracker.resolve(answer, frame.timestamp)?;

        match self.pipeline.capture(&working, &observations, sample)? {
            Some(report) => {
                if self.pipeline.config().debug_overlay {
                    let projected = self.pipeline.projected_anchors(&sample.pose);
                    self.last_overlay = Some(marker_overlay(&working, &observations, &projected));
                }
                self.last_capture = Some(report);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::anchors::FaceId;
    use crate::synthetic::{BoxScene, FixedPoseSource, ScriptedDetector};

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<CompositeFrame>,
    }

    impl DisplaySink for RecordingSink {
        fn present(&mut self, frame: &CompositeFrame) {
            self.frames.push(frame.clone());
        }
    }

    type TestDriver = SessionDriver<ScriptedDetector, FixedPoseSource, RecordingSink>;

    fn driver(scene: &BoxScene) -> TestDriver {
        SessionDriver::new(
            PipelineConfig::default(),
            ScriptedDetector::default(),
            FixedPoseSource {
                pose: Some(scene.capture_pose()),
            },
            RecordingSink::default(),
        )
        .unwrap()
    }

    fn captured_frame(driver: &TestDriver, scene: &BoxScene, millis: u64) -> LumaFrame {
        let projector = *driver.pipeline().capture_projector();
        let image = scene
            .render(&projector, &scene.capture_pose(), 640, 360)
            .unwrap();
        LumaFrame::packed(image.into_raw(), 640, 360, Duration::from_millis(millis))
    }

    #[test]
    fn test_events_apply_in_order() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        let handle = driver.handle();
        let display = DisplayPoses::head_only(scene.display_pose());

        for point in scene.anchors() {
            assert!(handle.confirm_anchor(point));
        }
        // Queued behind the anchors, so it runs once the pipeline is active.
        handle.frame_captured(captured_frame(&driver, &scene, 10));

        let summary = driver.tick(&display);
        assert_eq!(summary.events, 8);
        assert_eq!(summary.captures, 1);
        assert!(summary.presented);
        assert_eq!(summary.state, PipelineState::Active { complete_faces: 3 });
        assert_eq!(driver.last_capture().unwrap().stored_count(), 3);
        assert_eq!(driver.sink().frames.len(), 1);
    }

    #[test]
    fn test_capture_before_active_is_ignored() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        let handle = driver.handle();

        handle.frame_captured(captured_frame(&driver, &scene, 0));
        handle.confirm_anchor(Vec3::ZERO);

        let summary = driver.tick(&DisplayPoses::head_only(scene.display_pose()));
        assert_eq!(summary.captures, 0);
        assert!(!summary.presented);
        assert_eq!(summary.state, PipelineState::Collecting { confirmed: 1 });
    }

    #[test]
    fn test_tracking_lost_resets_session() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        let handle = driver.handle();
        let display = DisplayPoses::head_only(scene.display_pose());

        for point in scene.anchors() {
            handle.confirm_anchor(point);
        }
        handle.frame_captured(captured_frame(&driver, &scene, 5));
        driver.tick(&display);

        handle.tracking_lost();
        let summary = driver.tick(&display);
        assert_eq!(summary.state, PipelineState::Idle);
        assert!(!summary.presented);
        assert!(driver.pipeline().cache().is_empty());
        assert!(driver.last_capture().is_none());
    }

    #[test]
    fn test_stale_pose_is_reused() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        let handle = driver.handle();
        let display = DisplayPoses::head_only(scene.display_pose());

        for point in scene.anchors() {
            handle.confirm_anchor(point);
        }
        handle.frame_captured(captured_frame(&driver, &scene, 5));
        driver.tick(&display);

        driver.poses_mut().pose = None;
        handle.frame_captured(captured_frame(&driver, &scene, 40));
        let summary = driver.tick(&display);

        assert_eq!(summary.captures, 1);
        let report = driver.last_capture().unwrap();
        assert!(report.stale_pose);
        assert_eq!(report.sequence, 1);
        let texture = driver
            .pipeline()
            .latest_texture(FaceId::new(0).unwrap())
            .unwrap();
        assert_eq!(texture.observer_position, scene.capture_eye);
    }

    #[test]
    fn test_pose_never_seen_drops_capture() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        driver.poses_mut().pose = None;
        let handle = driver.handle();

        for point in scene.anchors() {
            handle.confirm_anchor(point);
        }
        handle.frame_captured(captured_frame(&driver, &scene, 5));
        let summary = driver.tick(&DisplayPoses::head_only(scene.display_pose()));

        assert_eq!(summary.captures, 0);
        assert!(driver.pipeline().cache().is_empty());
        // Active with an empty cache still presents a black composite.
        assert!(summary.presented);
        assert!(driver.sink().frames[0].image.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_handles_work_across_threads() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        let handle = driver.handle();
        let anchors = scene.anchors();

        std::thread::spawn(move || {
            for point in anchors {
                handle.confirm_anchor(point);
            }
        })
        .join()
        .unwrap();

        let summary = driver.tick(&DisplayPoses::head_only(scene.display_pose()));
        assert_eq!(summary.events, 7);
        assert!(driver.pipeline().anchors().is_full());
    }

    #[test]
    fn test_debug_overlay_kept_when_enabled() {
        let scene = BoxScene::default();
        let config = PipelineConfig {
            debug_overlay: true,
            ..PipelineConfig::default()
        };
        let projector = *Pipeline::new(config.clone()).unwrap().capture_projector();
        let detector = ScriptedDetector {
            detections: scene.detections(&projector, &scene.capture_pose()).unwrap(),
        };
        let mut driver = SessionDriver::new(
            config,
            detector,
            FixedPoseSource {
                pose: Some(scene.capture_pose()),
            },
            RecordingSink::default(),
        )
        .unwrap();
        let handle = driver.handle();
        let display = DisplayPoses::head_only(scene.display_pose());

        for point in scene.anchors() {
            handle.confirm_anchor(point);
        }
        driver.tick(&display);
        assert!(driver.last_overlay().is_none());

        handle.frame_captured(captured_frame(&driver, &scene, 10));
        driver.tick(&display);

        let overlay = driver.last_overlay().unwrap();
        assert_eq!(overlay.dimensions(), (640, 360));
        let anchor = projector
            .project_anchors(&scene.anchors(), &scene.capture_pose())
            .unwrap()[0];
        // The projected cross is drawn over the detected square at the same point.
        assert_eq!(
            overlay.get_pixel(anchor.x.round() as u32, anchor.y.round() as u32)[0],
            0
        );

        handle.tracking_lost();
        driver.tick(&display);
        assert!(driver.last_overlay().is_none());
    }

    #[test]
    fn test_debug_overlay_off_by_default() {
        let scene = BoxScene::default();
        let mut driver = driver(&scene);
        let handle = driver.handle();
        for point in scene.anchors() {
            handle.confirm_anchor(point);
        }
        handle.frame_captured(captured_frame(&driver, &scene, 10));
        driver.tick(&DisplayPoses::head_only(scene.display_pose()));

        assert!(driver.last_capture().is_some());
        assert!(driver.last_overlay().is_none());
    }
}
