// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage - either owned bytes or a mapped GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until the
/// frame is dropped, so the device source hands frames over without copying.
#[derive(Clone)]
pub enum FrameData {
    /// Owned bytes (synthetic sources, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(bytes: Vec<u8>) -> Self {
        FrameData::Copied(Arc::from(bytes))
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// Byte order of a 4-byte-per-pixel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// R, G, B, A
    #[default]
    Rgba,
    /// B, G, R, A
    Bgra,
}

impl PixelLayout {
    pub const BYTES_PER_PIXEL: u32 = 4;

    /// Tag stored in the stream export header (0 = BGRA, 1 = RGBA)
    pub fn tag(&self) -> u32 {
        match self {
            PixelLayout::Bgra => 0,
            PixelLayout::Rgba => 1,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(PixelLayout::Bgra),
            1 => Some(PixelLayout::Rgba),
            _ => None,
        }
    }

    /// GStreamer video format name
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            PixelLayout::Rgba => "RGBA",
            PixelLayout::Bgra => "BGRA",
        }
    }

    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" | "RGBx" => Some(PixelLayout::Rgba),
            "BGRA" | "BGRx" => Some(PixelLayout::Bgra),
            _ => None,
        }
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }

    /// Duration of one frame in nanoseconds
    pub fn frame_duration_ns(&self) -> u64 {
        if self.num == 0 {
            return 0;
        }
        1_000_000_000u64 * u64::from(self.denom) / u64::from(self.num)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// A capture mode offered by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
    /// FourCC code (e.g., "MJPG", "YUYV")
    pub pixel_format: String,
}

impl std::fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(fps) = &self.framerate {
            write!(f, "{}x{} @ {}fps", self.width, self.height, fps)
        } else {
            write!(f, "{}x{}", self.width, self.height)
        }
    }
}

/// A single frame from a device source
///
/// Owned by the producer thread for one loop iteration. Consumers that need
/// the pixels beyond that copy them out.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row in `data`, may include padding
    pub stride: u32,
    pub layout: PixelLayout,
    pub data: FrameData,
    /// Per-source monotonically increasing counter
    pub sequence: u64,
    /// When the frame was handed over by the device
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Tightly packed row length in bytes
    pub fn row_bytes(&self) -> usize {
        self.width as usize * PixelLayout::BYTES_PER_PIXEL as usize
    }

    /// Size of the frame once padding is removed
    pub fn packed_len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Whether `data` has no row padding
    pub fn is_packed(&self) -> bool {
        self.stride as usize == self.row_bytes()
    }

    /// Check that `data` is large enough for the declared geometry
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 || (self.stride as usize) < self.row_bytes() {
            return false;
        }
        let needed = self.stride as usize * (self.height as usize - 1) + self.row_bytes();
        self.data.len() >= needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, stride: u32, len: usize) -> CameraFrame {
        CameraFrame {
            width,
            height,
            stride,
            layout: PixelLayout::Rgba,
            data: vec![0u8; len].into(),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_layout_tags() {
        assert_eq!(PixelLayout::Bgra.tag(), 0);
        assert_eq!(PixelLayout::Rgba.tag(), 1);
        assert_eq!(PixelLayout::from_tag(1), Some(PixelLayout::Rgba));
        assert_eq!(PixelLayout::from_tag(7), None);
    }

    #[test]
    fn test_frame_duration() {
        assert_eq!(Framerate::from_int(25).frame_duration_ns(), 40_000_000);
        assert_eq!(Framerate::new(30, 0).denom, 1);
    }

    #[test]
    fn test_well_formed_with_padding() {
        // last row may omit its padding
        let f = frame(2, 2, 16, 16 + 8);
        assert!(f.is_well_formed());
        assert!(!f.is_packed());
        assert!(!frame(2, 2, 16, 16).is_well_formed());
        assert!(!frame(2, 2, 4, 64).is_well_formed());
    }
}
