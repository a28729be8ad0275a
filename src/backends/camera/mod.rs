// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! A capture session only needs three things from a device: open it with a
//! negotiated format, read frames one at a time, and close it. Everything
//! else (enumeration, negotiation details, decoding) stays behind this
//! boundary.
//!
//! ```text
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← producer thread drives read_frame()
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  CameraBackend Trait│  ← open() returns a FrameSource
//! └──────────┬──────────┘
//!            │
//!       ┌────┴──────────┐
//!       ▼               ▼
//! ┌──────────┐   ┌─────────────┐
//! │GStreamer │   │ TestPattern │
//! │ (v4l2)   │   │ (synthetic) │
//! └──────────┘   └─────────────┘
//! ```

pub mod format_converters;
pub mod frame_loop;
pub mod gst_source;
pub mod test_pattern;
pub mod types;
pub mod v4l2_utils;

pub use types::*;

use crate::config::SessionConfig;
use crate::errors::BackendResult;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a single bounded device read
#[derive(Debug)]
pub enum FrameRead {
    /// A decoded frame
    Frame(CameraFrame),
    /// Nothing arrived within the timeout; the caller should poll again
    Pending,
    /// The device stopped producing frames
    EndOfStream,
}

/// An opened device, owned by the producer thread
pub trait FrameSource: Send {
    /// Format the device was opened with
    fn format(&self) -> &CameraFormat;

    /// Wait up to `timeout` for the next frame
    ///
    /// Must return within roughly `timeout` so the producer can observe stop
    /// requests. An `Err` is a device failure.
    fn read_frame(&mut self, timeout: Duration) -> BackendResult<FrameRead>;

    /// Release the device. Called once; dropping without calling it must also
    /// release the device.
    fn close(&mut self);
}

/// Factory for frame sources
pub trait CameraBackend: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &'static str;

    /// Formats the device offers; empty when unknown
    fn supported_formats(&self, device: &str) -> Vec<CameraFormat>;

    /// Open the device with an already negotiated format
    fn open(&self, device: &str, format: &CameraFormat) -> BackendResult<Box<dyn FrameSource>>;
}

/// Pick the capture format for a session
///
/// An explicit width/height in the config wins; otherwise the resolution
/// preset chooses among the formats the device reports. The requested frame
/// rate is applied either way.
pub fn negotiate_format(backend: &dyn CameraBackend, config: &SessionConfig) -> CameraFormat {
    let fps = Some(Framerate::from_int(config.fps));
    if let Some((width, height)) = config.explicit_size() {
        return CameraFormat {
            width,
            height,
            framerate: fps,
            pixel_format: String::new(),
        };
    }
    let formats = backend.supported_formats(&config.device);
    let mut chosen = config.resolution_preset.select(&formats);
    chosen.framerate = fps;
    chosen
}

/// Backend matching the configured device
pub fn backend_for(config: &SessionConfig) -> Arc<dyn CameraBackend> {
    if config.is_test_pattern() {
        Arc::new(test_pattern::TestPatternBackend::default())
    } else {
        Arc::new(gst_source::GStreamerBackend::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ResolutionPreset;

    struct FixedFormats(Vec<CameraFormat>);

    impl CameraBackend for FixedFormats {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn supported_formats(&self, _device: &str) -> Vec<CameraFormat> {
            self.0.clone()
        }
        fn open(&self, _: &str, _: &CameraFormat) -> BackendResult<Box<dyn FrameSource>> {
            Err(crate::errors::BackendError::NotAvailable("fixed".into()))
        }
    }

    #[test]
    fn test_negotiate_prefers_explicit_size() {
        let backend = FixedFormats(Vec::new());
        let mut config = SessionConfig::test_pattern(320, 200);
        config.fps = 15;
        let format = negotiate_format(&backend, &config);
        assert_eq!((format.width, format.height), (320, 200));
        assert_eq!(format.framerate, Some(Framerate::from_int(15)));
    }

    #[test]
    fn test_negotiate_uses_preset() {
        let backend = FixedFormats(vec![
            CameraFormat {
                width: 640,
                height: 480,
                framerate: Some(Framerate::from_int(30)),
                pixel_format: "YUYV".into(),
            },
            CameraFormat {
                width: 1920,
                height: 1080,
                framerate: Some(Framerate::from_int(30)),
                pixel_format: "MJPG".into(),
            },
        ]);
        let config = SessionConfig {
            resolution_preset: ResolutionPreset::Medium,
            ..SessionConfig::default()
        };
        let format = negotiate_format(&backend, &config);
        assert_eq!((format.width, format.height), (640, 480));
    }
}
