// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic frame source
//!
//! Produces frames without any hardware. Each frame carries its sequence
//! number in the first channel of every pixel (so tearing is detectable) and
//! horizontal/vertical gradients in the second and third channels (so
//! mirroring is detectable). Limits and failure injection make it usable for
//! exercising end-of-stream, device errors and startup timeouts.

use super::types::{CameraFormat, CameraFrame, FrameData, Framerate, PixelLayout};
use super::{CameraBackend, FrameRead, FrameSource};
use crate::errors::{BackendError, BackendResult};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Behavior knobs for the synthetic source
#[derive(Debug, Clone, Default)]
pub struct TestPatternOptions {
    /// Report end-of-stream after this many frames
    pub frame_limit: Option<u64>,
    /// Report a device error after this many frames
    pub fail_after: Option<u64>,
    /// Fail `open` with this message
    pub open_error: Option<String>,
    /// Block inside `open` this long, like a device that is slow to start
    pub open_delay: Duration,
    /// Produce nothing until this much time has passed since open
    pub startup_delay: Duration,
    /// Extra bytes of padding at the end of each row
    pub row_padding: u32,
    /// Byte order of produced frames
    pub layout: PixelLayout,
    /// Ignore the negotiated rate and deliver frames as fast as they are read
    pub unpaced: bool,
}

/// Backend handing out [`TestPatternSource`]s
#[derive(Debug, Clone, Default)]
pub struct TestPatternBackend {
    options: TestPatternOptions,
}

impl TestPatternBackend {
    pub fn with_options(options: TestPatternOptions) -> Self {
        Self { options }
    }
}

impl CameraBackend for TestPatternBackend {
    fn name(&self) -> &'static str {
        "test-pattern"
    }

    fn supported_formats(&self, _device: &str) -> Vec<CameraFormat> {
        [(320, 240), (640, 480), (1280, 720), (1920, 1080)]
            .into_iter()
            .map(|(width, height)| CameraFormat {
                width,
                height,
                framerate: Some(Framerate::from_int(30)),
                pixel_format: "RGBA".to_string(),
            })
            .collect()
    }

    fn open(&self, _device: &str, format: &CameraFormat) -> BackendResult<Box<dyn FrameSource>> {
        if !self.options.open_delay.is_zero() {
            thread::sleep(self.options.open_delay);
        }
        if let Some(msg) = &self.options.open_error {
            return Err(BackendError::InitializationFailed(msg.clone()));
        }
        if format.width == 0 || format.height == 0 {
            return Err(BackendError::FormatNotSupported(format.to_string()));
        }
        debug!(%format, "Opening test pattern source");
        Ok(Box::new(TestPatternSource::new(format.clone(), self.options.clone())))
    }
}

/// Open synthetic device
pub struct TestPatternSource {
    format: CameraFormat,
    options: TestPatternOptions,
    next_due: Instant,
    interval: Duration,
    produced: u64,
    closed: bool,
}

impl TestPatternSource {
    fn new(format: CameraFormat, options: TestPatternOptions) -> Self {
        let interval = if options.unpaced {
            Duration::ZERO
        } else {
            Duration::from_nanos(format.framerate.unwrap_or_default().frame_duration_ns())
        };
        let now = Instant::now();
        Self {
            format,
            next_due: now + options.startup_delay,
            options,
            interval,
            produced: 0,
            closed: false,
        }
    }

    fn render(&self, sequence: u64) -> CameraFrame {
        let (width, height) = (self.format.width, self.format.height);
        let stride = width * PixelLayout::BYTES_PER_PIXEL + self.options.row_padding;
        let mut data = vec![0u8; (stride * height) as usize];
        let tag = sequence as u8;

        for (y, row) in data.chunks_exact_mut(stride as usize).enumerate() {
            let v = (y as u32 * 255 / height.max(1)) as u8;
            for (x, px) in row[..(width * 4) as usize].chunks_exact_mut(4).enumerate() {
                let h = (x as u32 * 255 / width.max(1)) as u8;
                px.copy_from_slice(&[tag, h, v, 255]);
            }
        }

        CameraFrame {
            width,
            height,
            stride,
            layout: self.options.layout,
            data: FrameData::from(data),
            sequence,
            captured_at: Instant::now(),
        }
    }
}

impl FrameSource for TestPatternSource {
    fn format(&self) -> &CameraFormat {
        &self.format
    }

    fn read_frame(&mut self, timeout: Duration) -> BackendResult<FrameRead> {
        if self.closed {
            return Ok(FrameRead::EndOfStream);
        }
        if let Some(limit) = self.options.frame_limit
            && self.produced >= limit
        {
            return Ok(FrameRead::EndOfStream);
        }
        if let Some(after) = self.options.fail_after
            && self.produced >= after
        {
            return Err(BackendError::Stream("synthetic device failure".into()));
        }

        let now = Instant::now();
        if self.next_due > now {
            let wait = self.next_due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(FrameRead::Pending);
            }
            thread::sleep(wait);
        }

        let frame = self.render(self.produced);
        self.produced += 1;
        self.next_due = (self.next_due + self.interval).max(Instant::now());
        Ok(FrameRead::Frame(frame))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
