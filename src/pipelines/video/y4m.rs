// SPDX-License-Identifier: GPL-3.0-only

//! Uncompressed YUV4MPEG2 writer
//!
//! Needs no codec plugins, so recordings work anywhere. The stream header is
//! written at creation, which makes a recording with zero frames a valid
//! (empty) file. Audio is not supported by the container and is skipped.

use super::writer::{VideoConfig, VideoWriter, WriterFactory};
use crate::backends::audio::{AudioConfig, AudioSample};
use crate::backends::camera::format_converters;
use crate::errors::{BackendError, BackendResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Factory for [`Y4mWriter`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct Y4mWriterFactory;

impl WriterFactory for Y4mWriterFactory {
    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn supports_audio(&self) -> bool {
        false
    }

    fn create_writer(
        &self,
        path: &Path,
        video: VideoConfig,
        _audio: Option<AudioConfig>,
    ) -> BackendResult<Box<dyn VideoWriter>> {
        Ok(Box::new(Y4mWriter::create(path, video)?))
    }
}

pub struct Y4mWriter {
    out: BufWriter<File>,
    path: PathBuf,
    config: VideoConfig,
    frames: u64,
}

impl Y4mWriter {
    pub fn create(path: &Path, config: VideoConfig) -> BackendResult<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C420jpeg",
            config.width, config.height, config.framerate.num, config.framerate.denom
        )?;
        debug!(path = %path.display(), width = config.width, height = config.height, "Created y4m writer");
        Ok(Self {
            out,
            path: path.to_path_buf(),
            config,
            frames: 0,
        })
    }
}

impl VideoWriter for Y4mWriter {
    fn write_video(&mut self, pixels: &[u8], _pts: Duration) -> BackendResult<()> {
        if pixels.len() != self.config.frame_len() {
            return Err(BackendError::Encoding(format!(
                "frame of {} bytes does not match {}x{}",
                pixels.len(),
                self.config.width,
                self.config.height
            )));
        }
        let planes = format_converters::to_i420(
            pixels,
            self.config.width,
            self.config.height,
            self.config.layout,
        );
        self.out.write_all(b"FRAME\n")?;
        self.out.write_all(&planes)?;
        self.frames += 1;
        Ok(())
    }

    fn write_audio(&mut self, _sample: &AudioSample) -> BackendResult<()> {
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> BackendResult<PathBuf> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        info!(path = %self.path.display(), frames = self.frames, "Recording finalized");
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{Framerate, PixelLayout};

    fn config() -> VideoConfig {
        VideoConfig {
            width: 4,
            height: 2,
            framerate: Framerate::from_int(30),
            bitrate_kbps: 0,
            layout: PixelLayout::Rgba,
        }
    }

    #[test]
    fn test_empty_recording_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.y4m");
        let writer = Y4mWriterFactory
            .create_writer(&path, config(), None)
            .unwrap();
        let out = writer.finalize().unwrap();
        let text = std::fs::read_to_string(out).unwrap();
        assert_eq!(text, "YUV4MPEG2 W4 H2 F30:1 Ip A1:1 C420jpeg\n");
    }

    #[test]
    fn test_frames_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.y4m");
        let mut writer = Y4mWriterFactory
            .create_writer(&path, config(), None)
            .unwrap();
        writer.write_video(&[0; 32], Duration::ZERO).unwrap();
        writer.write_video(&[255; 32], Duration::from_millis(33)).unwrap();
        assert!(writer.write_video(&[0; 8], Duration::ZERO).is_err());
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = "YUV4MPEG2 W4 H2 F30:1 Ip A1:1 C420jpeg\n".len();
        // 4x2 luma + two 2x1 chroma planes
        let frame = b"FRAME\n".len() + 8 + 2 + 2;
        assert_eq!(bytes.len(), header + 2 * frame);
    }
}
