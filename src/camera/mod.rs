//! Camera frame input and normalization to the working resolution.

use std::time::Duration;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::error::{PipelineError, Result};

/// A raw 8-bit luma frame from the capture camera.
///
/// Uses `Bytes` so frames can be handed between threads without copying.
#[derive(Debug, Clone)]
pub struct LumaFrame {
    /// Raw luma samples, `stride` bytes per row.
    pub data: Bytes,
    /// Frame width in pixels.
    pub width: u32,
    /// Bytes per row (at least `width`).
    pub stride: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Capture time, used to query the pose source.
    pub timestamp: Duration,
}

impl LumaFrame {
    /// Tightly packed frame (`stride == width`).
    pub fn packed(data: impl Into<Bytes>, width: u32, height: u32, timestamp: Duration) -> Self {
        Self {
            data: data.into(),
            width,
            stride: width,
            height,
            timestamp,
        }
    }

    /// Copy the visible pixels into a packed image, dropping row padding.
    pub fn to_gray_image(&self) -> Result<GrayImage> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        if self.stride < self.width {
            return Err(PipelineError::InvalidFrame(format!(
                "stride {} is smaller than width {}",
                self.stride, self.width
            )));
        }

        let width = self.width as usize;
        let stride = self.stride as usize;
        let height = self.height as usize;
        let needed = stride * (height - 1) + width;
        if self.data.len() < needed {
            return Err(PipelineError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} with stride {} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.stride,
                needed
            )));
        }

        let mut packed = Vec::with_capacity(width * height);
        for row in 0..height {
            let start = row * stride;
            packed.extend_from_slice(&self.data[start..start + width]);
        }

        GrayImage::from_raw(self.width, self.height, packed)
            .ok_or_else(|| PipelineError::InvalidFrame("pixel buffer size mismatch".to_string()))
    }
}

/// Resize a frame to the working resolution and optionally stretch its
/// contrast to the full 0..=255 range.
pub fn normalize_frame(
    frame: &LumaFrame,
    working_width: u32,
    working_height: u32,
    stretch: bool,
) -> Result<GrayImage> {
    let image = frame.to_gray_image()?;
    let mut working = if image.dimensions() == (working_width, working_height) {
        image
    } else {
        imageops::resize(&image, working_width, working_height, FilterType::Triangle)
    };

    if stretch {
        stretch_contrast(&mut working);
    }
    Ok(working)
}

/// Linearly map the image's min..max onto 0..=255. Constant images are left as is.
pub fn stretch_contrast(image: &mut GrayImage) {
    let (min, max) = image
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return;
    }

    let range = (max - min) as f32;
    for v in image.iter_mut() {
        *v = (((*v - min) as f32 * 255.0 / range).round()).clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_padding_dropped() {
        // 3x2 frame with one padding byte per row.
        let data = vec![1u8, 2, 3, 99, 4, 5, 6, 99];
        let frame = LumaFrame {
            data: Bytes::from(data),
            width: 3,
            stride: 4,
            height: 2,
            timestamp: Duration::ZERO,
        };
        let image = frame.to_gray_image().unwrap();
        assert_eq!(image.as_raw(), &vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_last_row_may_be_unpadded() {
        let frame = LumaFrame {
            data: Bytes::from(vec![1u8, 2, 0, 3, 4]),
            width: 2,
            stride: 3,
            height: 2,
            timestamp: Duration::ZERO,
        };
        assert_eq!(frame.to_gray_image().unwrap().as_raw(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let frame = LumaFrame::packed(vec![0u8; 10], 4, 4, Duration::ZERO);
        assert!(matches!(
            frame.to_gray_image(),
            Err(PipelineError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_bad_stride_rejected() {
        let frame = LumaFrame {
            data: Bytes::from(vec![0u8; 64]),
            width: 8,
            stride: 4,
            height: 2,
            timestamp: Duration::ZERO,
        };
        assert!(frame.to_gray_image().is_err());
    }

    #[test]
    fn test_normalize_resizes_and_stretches() {
        let data: Vec<u8> = (0..2048u32 * 1080)
            .map(|i| 100 + ((i % 2048) * 50 / 2048) as u8)
            .collect();
        let frame = LumaFrame::packed(data, 2048, 1080, Duration::from_millis(16));

        let working = normalize_frame(&frame, 640, 360, true).unwrap();
        assert_eq!(working.dimensions(), (640, 360));
        assert_eq!(working.iter().min(), Some(&0));
        assert_eq!(working.iter().max(), Some(&255));
    }

    #[test]
    fn test_constant_frame_unchanged() {
        let frame = LumaFrame::packed(vec![77u8; 16], 4, 4, Duration::ZERO);
        let working = normalize_frame(&frame, 4, 4, true).unwrap();
        assert!(working.iter().all(|&v| v == 77));
    }
}
