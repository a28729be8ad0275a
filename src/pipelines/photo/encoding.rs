// SPDX-License-Identifier: GPL-3.0-only

//! Still image encoding
//!
//! [`StillEncoder`] is the boundary a capture session encodes through;
//! [`PhotoEncoder`] implements it with the `image` crate (JPEG with quality
//! control, or lossless PNG).

use crate::backends::camera::format_converters;
use crate::backends::camera::types::PixelLayout;
use crate::config::PhotoOutputFormat;
use crate::errors::{BackendError, BackendResult};
use image::{ImageFormat, RgbImage};
use tracing::debug;

/// Turns packed 4-byte pixels into encoded image bytes
pub trait StillEncoder: Send + Sync {
    /// File extension of the produced bytes
    fn extension(&self) -> &'static str;

    fn encode_still(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> BackendResult<Vec<u8>>;
}

/// Encoding quality settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingQuality {
    Low,
    Medium,
    High,
    Maximum,
    /// Explicit JPEG quality (1-100)
    Custom(u8),
}

impl EncodingQuality {
    /// Get JPEG quality value (1-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodingQuality::Low => 60,
            EncodingQuality::Medium => 80,
            EncodingQuality::High => 92,
            EncodingQuality::Maximum => 98,
            EncodingQuality::Custom(q) => (*q).clamp(1, 100),
        }
    }
}

/// `image`-crate encoder
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    format: PhotoOutputFormat,
    quality: EncodingQuality,
}

impl Default for PhotoEncoder {
    fn default() -> Self {
        Self::new(PhotoOutputFormat::Jpeg, EncodingQuality::High)
    }
}

impl PhotoEncoder {
    pub fn new(format: PhotoOutputFormat, quality: EncodingQuality) -> Self {
        Self { format, quality }
    }

    fn encode_jpeg(&self, image: &RgbImage) -> BackendResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut buffer,
            self.quality.jpeg_quality(),
        );
        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| BackendError::Encoding(format!("JPEG encoding failed: {}", e)))?;
        Ok(buffer)
    }

    fn encode_png(&self, image: &RgbImage) -> BackendResult<Vec<u8>> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| BackendError::Encoding(format!("PNG encoding failed: {}", e)))?;
        Ok(buffer)
    }
}

impl StillEncoder for PhotoEncoder {
    fn extension(&self) -> &'static str {
        self.format.extension()
    }

    fn encode_still(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> BackendResult<Vec<u8>> {
        let rgb = format_converters::to_rgb(pixels, layout);
        let image = RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
            BackendError::Encoding(format!(
                "{} bytes do not hold a {}x{} frame",
                pixels.len(),
                width,
                height
            ))
        })?;

        let data = match self.format {
            PhotoOutputFormat::Jpeg => self.encode_jpeg(&image)?,
            PhotoOutputFormat::Png => self.encode_png(&image)?,
        };
        debug!(width, height, size = data.len(), format = ?self.format, "Encoded still");
        Ok(data)
    }
}
