//! Pipeline configuration and serialization.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Canonical rectangle width. Also the working and composite image width.
    pub canonical_width: u32,
    /// Canonical rectangle height.
    pub canonical_height: u32,
    /// Number of capture slots in the ring buffer.
    pub cache_count: usize,
    /// Which viewpoint drives the displayed composite.
    pub observer_mode: ObserverMode,
    /// Physical capture camera intrinsics at sensor resolution.
    pub capture_camera: CameraIntrinsics,
    /// Virtual camera used for the display viewpoint.
    pub display: DisplayProjection,
    /// Stretch the working image to the full 0..=255 range before rectifying.
    pub normalize_contrast: bool,
    /// Distance along the controller's up axis where pointer anchors land (meters).
    pub cursor_offset: f32,
    /// Keep a marker overlay of the latest capture for export.
    pub debug_overlay: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canonical_width: 640,
            canonical_height: 360,
            cache_count: 5,
            observer_mode: ObserverMode::default(),
            capture_camera: CameraIntrinsics::default(),
            display: DisplayProjection::default(),
            normalize_contrast: true,
            cursor_offset: 0.25,
            debug_overlay: false,
        }
    }
}

impl PipelineConfig {
    /// Check that every size and scale is usable.
    pub fn validate(&self) -> Result<()> {
        if self.canonical_width == 0 || self.canonical_height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "canonical rectangle must be non-empty, got {}x{}",
                self.canonical_width, self.canonical_height
            )));
        }
        if self.cache_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "cache_count must be at least 1".to_string(),
            ));
        }
        self.capture_camera.validate()?;
        self.display.validate()?;
        if !self.cursor_offset.is_finite() {
            return Err(PipelineError::InvalidConfig(
                "cursor_offset must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Display target the composite is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObserverMode {
    /// Display attached to the hand-held controller; the controller pose is the viewpoint.
    #[default]
    Handheld,
    /// Head-up display; the head pose is the viewpoint.
    HeadUp,
}

/// Pinhole intrinsics of the physical capture camera, in sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fx: 1400.0,
            fy: 1400.0,
            cx: 960.0,
            cy: 540.0,
        }
    }
}

impl CameraIntrinsics {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidConfig(
                "capture camera resolution must be non-empty".to_string(),
            ));
        }
        if !(self.fx > 0.0 && self.fy > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "capture camera focal lengths must be positive, got ({}, {})",
                self.fx, self.fy
            )));
        }
        Ok(())
    }
}

/// Virtual camera of the display viewpoint.
///
/// Only the pose changes per frame; the projection is derived from the screen
/// size and field of view, then divided by `scale_factor` to land in working
/// image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayProjection {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Vertical field of view in degrees.
    pub vertical_fov_deg: f64,
    /// Screen-to-working-image downscale.
    pub scale_factor: f64,
}

impl Default for DisplayProjection {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            vertical_fov_deg: 60.0,
            scale_factor: 3.0,
        }
    }
}

impl DisplayProjection {
    fn validate(&self) -> Result<()> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(PipelineError::InvalidConfig(
                "display screen must be non-empty".to_string(),
            ));
        }
        if !(self.vertical_fov_deg > 0.0 && self.vertical_fov_deg < 180.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "display field of view must be in (0, 180) degrees, got {}",
                self.vertical_fov_deg
            )));
        }
        if !(self.scale_factor > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "display scale factor must be positive, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

/// Load a configuration. `.json` files are read as JSON, anything else as XML.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)?;

    let config: PipelineConfig = if is_json(path) {
        serde_json::from_str(&contents)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?
    } else {
        quick_xml::de::from_str(&contents)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?
    };

    config.validate()?;
    log::info!("Loaded pipeline configuration from {}", path.display());
    Ok(config)
}

/// Save a configuration, choosing the format from the extension like [`load_config`].
pub fn save_config(config: &PipelineConfig, path: &Path) -> Result<()> {
    let text = if is_json(path) {
        serde_json::to_string_pretty(config)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?
    } else {
        quick_xml::se::to_string(config)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?
    };

    std::fs::write(path, text)?;
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}
