// SPDX-License-Identifier: GPL-3.0-only

//! Encoder/muxer boundary
//!
//! A [`VideoWriter`] is exclusively owned by the encode worker from creation
//! until `finalize` returns.

use crate::backends::audio::{AudioConfig, AudioSample};
use crate::backends::camera::types::{Framerate, PixelLayout};
use crate::errors::BackendResult;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Video stream parameters for a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: Framerate,
    pub bitrate_kbps: u32,
    /// Byte order of the frames the worker writes
    pub layout: PixelLayout,
}

impl VideoConfig {
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * PixelLayout::BYTES_PER_PIXEL as usize
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(self.framerate.frame_duration_ns())
    }
}

/// Sequential sink for one recording
pub trait VideoWriter: Send {
    /// Encode one packed frame at `pts` (relative to recording start)
    fn write_video(&mut self, pixels: &[u8], pts: Duration) -> BackendResult<()>;

    /// Encode one audio chunk; `sample.pts` is recording-relative
    fn write_audio(&mut self, sample: &AudioSample) -> BackendResult<()>;

    /// Flush, write container trailers and close the file
    fn finalize(self: Box<Self>) -> BackendResult<PathBuf>;
}

/// Creates writers for new recordings
pub trait WriterFactory: Send + Sync {
    /// Container file extension
    fn extension(&self) -> &'static str;

    /// Whether writers produced here accept audio
    fn supports_audio(&self) -> bool;

    fn create_writer(
        &self,
        path: &Path,
        video: VideoConfig,
        audio: Option<AudioConfig>,
    ) -> BackendResult<Box<dyn VideoWriter>>;
}
