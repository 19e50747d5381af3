//! Video frame types and processing

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::CameraError;

/// Raw RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            data,
            width,
            height,
            captured_at,
        }
    }

    /// Check that the buffer holds exactly width * height RGB pixels
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Unreadable(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(CameraError::Unreadable(format!(
                "buffer holds {} bytes, expected {} for {}x{}",
                self.data.len(),
                expected,
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Resize frame (nearest neighbour)
    pub fn resize(&self, new_width: u32, new_height: u32) -> VideoFrame {
        if new_width == self.width && new_height == self.height {
            return self.clone();
        }

        let mut resized = Vec::with_capacity((new_width * new_height * 3) as usize);

        let x_ratio = self.width as f32 / new_width as f32;
        let y_ratio = self.height as f32 / new_height as f32;

        for y in 0..new_height {
            for x in 0..new_width {
                let x0 = (x as f32 * x_ratio).floor() as u32;
                let y0 = (y as f32 * y_ratio).floor() as u32;

                match self.get_pixel(
                    x0.min(self.width.saturating_sub(1)),
                    y0.min(self.height.saturating_sub(1)),
                ) {
                    Some(pixel) => resized.extend_from_slice(&pixel),
                    None => resized.extend_from_slice(&[0, 0, 0]),
                }
            }
        }

        VideoFrame {
            data: resized,
            width: new_width,
            height: new_height,
            captured_at: self.captured_at,
        }
    }

    /// Encode as baseline JPEG
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        self.validate()?;

        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(buf)
    }
}
