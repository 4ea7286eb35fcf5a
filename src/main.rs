//! Planar Surface Reprojector demo
//!
//! Runs the synthetic box scene through a session driver and writes the
//! composites and cached face textures as PNGs.
//!
//! Usage: `surface-reprojector [config.json|config.xml] [output-dir]`

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glam::{Quat, Vec3};
use surface_reprojector::camera::LumaFrame;
use surface_reprojector::composite::CompositeFrame;
use surface_reprojector::config::{load_config, PipelineConfig};
use surface_reprojector::export::TextureExporter;
use surface_reprojector::projection::{ObserverPose, ViewProjector};
use surface_reprojector::session::{DisplayPoses, DisplaySink, SessionDriver};
use surface_reprojector::synthetic::{BoxScene, FixedPoseSource, ScriptedDetector};
use surface_reprojector::Result;

/// Number of display frames rendered while orbiting the box.
const ORBIT_FRAMES: usize = 12;

/// Display sink that writes every composite to disk.
struct PngSink {
    output_dir: PathBuf,
    written: usize,
}

impl DisplaySink for PngSink {
    fn present(&mut self, frame: &CompositeFrame) {
        match TextureExporter::export_composite(frame, &self.output_dir, self.written) {
            Ok(_) => self.written += 1,
            Err(e) => log::error!("Failed to write composite: {}", e),
        }
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Surface Reprojector starting...");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("output"));

    if let Err(e) = run(config_path.as_deref(), &output_dir) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }

    log::info!("Surface Reprojector exiting");
}

fn run(config_path: Option<&Path>, output_dir: &Path) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            load_config(path)?
        }
        None => PipelineConfig::default(),
    };
    config.validate()?;

    let scene = BoxScene::default();
    let capture_pose = scene.capture_pose();

    // The camera delivers sensor-resolution frames; the detector sees the
    // normalized working image.
    let sensor = ViewProjector::capture(
        &config.capture_camera,
        config.capture_camera.width,
        config.capture_camera.height,
    );
    let working = ViewProjector::capture(
        &config.capture_camera,
        config.canonical_width,
        config.canonical_height,
    );
    let detector = ScriptedDetector {
        detections: scene.detections(&working, &capture_pose)?,
    };
    let poses = FixedPoseSource {
        pose: Some(capture_pose),
    };
    let sink = PngSink {
        output_dir: output_dir.to_path_buf(),
        written: 0,
    };

    let mut driver = SessionDriver::new(config.clone(), detector, poses, sink)?;
    let handle = driver.handle();

    for point in scene.anchors() {
        handle.confirm_anchor(point);
    }

    let image = scene.render(
        &sensor,
        &capture_pose,
        config.capture_camera.width,
        config.capture_camera.height,
    )?;
    handle.frame_captured(LumaFrame::packed(
        image.into_raw(),
        config.capture_camera.width,
        config.capture_camera.height,
        Duration::from_millis(33),
    ));

    for i in 0..ORBIT_FRAMES {
        let angle = (i as f32 / ORBIT_FRAMES as f32 - 0.5) * TAU / 6.0;
        let eye = Quat::from_rotation_y(angle) * scene.display_eye;
        let controller = ObserverPose::looking_at(eye, Vec3::ZERO, Vec3::Y);
        let poses = DisplayPoses {
            head: scene.display_pose(),
            controller: Some(controller),
        };

        let summary = driver.tick(&poses);
        log::info!(
            "Frame {}: {} event(s), {} capture(s), state {}",
            i,
            summary.events,
            summary.captures,
            summary.state
        );
    }

    if let Some(report) = driver.last_capture() {
        log::info!(
            "Last capture #{}: {} face(s) stored, marker residual {:?}",
            report.sequence,
            report.stored_count(),
            report.marker_residual
        );
    }

    if let Some(overlay) = driver.last_overlay() {
        TextureExporter::export_marker_overlay(overlay, output_dir, 0)?;
    }

    let textures = TextureExporter::export_face_textures(driver.pipeline().cache(), output_dir)?;
    log::info!(
        "Wrote {} composite(s) and {} face texture(s) to {}",
        driver.sink().written,
        textures.len(),
        output_dir.display()
    );

    Ok(())
}
