use crate::error::{Result, VigilError};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Frame format enumeration for the pixel payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3, // 3 bytes per pixel
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// A single captured frame: pixel payload plus metadata.
///
/// Pixel data is shared behind an `Arc` so clones are cheap; the payload is
/// never mutated once the frame exists.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic frame identifier within one capture run
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl Frame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected payload size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate payload size against the declared dimensions
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true, // Compressed formats have variable size
        }
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Decode the payload into a grayscale image.
    ///
    /// RGB24 uses the standard luma weights; MJPEG goes through a full
    /// decode first.
    pub fn to_gray(&self) -> Result<GrayImage> {
        match self.format {
            FrameFormat::Mjpeg => {
                let dynamic_image = image::load_from_memory(&self.data)
                    .map_err(|e| VigilError::source(format!("MJPEG decode failed: {}", e)))?;
                Ok(dynamic_image.to_luma8())
            }
            FrameFormat::Rgb24 => self.rgb24_to_gray(),
        }
    }

    /// Decode the payload into an RGB image for resizing and encoding
    pub fn to_rgb(&self) -> Result<RgbImage> {
        match self.format {
            FrameFormat::Mjpeg => {
                let dynamic_image = image::load_from_memory(&self.data)
                    .map_err(|e| VigilError::source(format!("MJPEG decode failed: {}", e)))?;
                Ok(dynamic_image.to_rgb8())
            }
            FrameFormat::Rgb24 => {
                RgbImage::from_raw(self.width, self.height, self.data.to_vec()).ok_or_else(|| {
                    VigilError::source("Failed to create RGB image from raw data".to_string())
                })
            }
        }
    }

    fn rgb24_to_gray(&self) -> Result<GrayImage> {
        let rgb_image = self.to_rgb()?;
        let mut gray_image = GrayImage::new(self.width, self.height);
        for (x, y, rgb) in rgb_image.enumerate_pixels() {
            let gray_value =
                (0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32) as u8;
            gray_image.put_pixel(x, y, Luma([gray_value]));
        }
        Ok(gray_image)
    }
}
