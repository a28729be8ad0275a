// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer device source
//!
//! `v4l2src → decodebin → videoconvert → videoscale → RGBA caps → appsink`.
//! Frames are pulled (not pushed through callbacks) so the producer thread
//! owns the read and can bound every wait with a timeout.

use super::types::{CameraFormat, CameraFrame, FrameData, PixelLayout};
use super::{CameraBackend, FrameRead, FrameSource, v4l2_utils};
use crate::constants::{pipeline, timing};
use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Backend opening V4L2 devices through GStreamer
#[derive(Debug, Default)]
pub struct GStreamerBackend;

impl GStreamerBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CameraBackend for GStreamerBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn supported_formats(&self, device: &str) -> Vec<CameraFormat> {
        v4l2_utils::enumerate_formats(device)
    }

    fn open(&self, device: &str, format: &CameraFormat) -> BackendResult<Box<dyn FrameSource>> {
        Ok(Box::new(GStreamerSource::open(device, format)?))
    }
}

/// A running capture pipeline
pub struct GStreamerSource {
    pipeline: gst::Pipeline,
    appsink: AppSink,
    format: CameraFormat,
    sequence: u64,
    closed: bool,
}

impl GStreamerSource {
    fn open(device: &str, format: &CameraFormat) -> BackendResult<Self> {
        gst::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;

        if !std::path::Path::new(device).exists() {
            return Err(BackendError::DeviceNotFound(device.to_string()));
        }

        let layout = PixelLayout::Rgba;
        let launch = format!(
            "v4l2src device={device} ! decodebin ! videoconvert n-threads={threads} ! videoscale ! \
             video/x-raw,format={fmt},width={w},height={h} ! \
             appsink name=sink max-buffers={max} drop=true sync=false",
            threads = pipeline::videoconvert_threads(),
            fmt = layout.to_gst_format_string(),
            w = format.width,
            h = format.height,
            max = pipeline::MAX_BUFFERS,
        );
        debug!(pipeline = %launch, "Creating capture pipeline");

        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".to_string()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| BackendError::InitializationFailed("Failed to cast appsink".to_string()))?;
        appsink.set_property("enable-last-sample", false);

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gst::State::Null);
            BackendError::InitializationFailed(format!("Failed to start pipeline: {}", e))
        })?;

        let (result, state, _) = pipeline.state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        if let Err(e) = result {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(BackendError::InitializationFailed(format!(
                "Pipeline did not reach {:?}: {}",
                gst::State::Playing,
                e
            )));
        }
        debug!(?state, "Capture pipeline state settled");

        info!(device, %format, "Capture pipeline started");

        Ok(Self {
            pipeline,
            appsink,
            format: format.clone(),
            sequence: 0,
            closed: false,
        })
    }

    /// First error posted on the bus, if any
    fn pending_bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                return Some(format!(
                    "{} ({})",
                    err.error(),
                    err.debug().map(|d| d.to_string()).unwrap_or_default()
                ));
            }
        }
        None
    }

    fn sample_to_frame(&mut self, sample: gst::Sample) -> BackendResult<CameraFrame> {
        let caps = sample
            .caps()
            .ok_or_else(|| BackendError::Stream("No caps in sample".to_string()))?;
        let info = VideoInfo::from_caps(caps).map_err(|e| BackendError::Stream(e.to_string()))?;
        let layout = PixelLayout::from_gst_format(info.format().to_str())
            .ok_or_else(|| BackendError::FormatNotSupported(info.format().to_string()))?;
        let stride = info.stride()[0] as u32;

        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| BackendError::Stream("No buffer in sample".to_string()))?;
        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| BackendError::Stream("Failed to map buffer".to_string()))?;

        let frame = CameraFrame {
            width: info.width(),
            height: info.height(),
            stride,
            layout,
            data: FrameData::from_mapped_buffer(mapped),
            sequence: self.sequence,
            captured_at: Instant::now(),
        };
        self.sequence += 1;
        Ok(frame)
    }
}

impl FrameSource for GStreamerSource {
    fn format(&self) -> &CameraFormat {
        &self.format
    }

    fn read_frame(&mut self, timeout: Duration) -> BackendResult<FrameRead> {
        if self.closed {
            return Ok(FrameRead::EndOfStream);
        }
        if let Some(err) = self.pending_bus_error() {
            return Err(BackendError::Stream(err));
        }

        let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        match self.appsink.try_pull_sample(wait) {
            Some(sample) => self.sample_to_frame(sample).map(FrameRead::Frame),
            None if self.appsink.is_eos() => Ok(FrameRead::EndOfStream),
            None => Ok(FrameRead::Pending),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop capture pipeline");
        }
        info!("Capture pipeline stopped");
    }
}

impl Drop for GStreamerSource {
    fn drop(&mut self) {
        self.close();
    }
}
