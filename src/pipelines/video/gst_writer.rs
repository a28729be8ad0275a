// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer H.264/MP4 writer
//!
//! ```text
//! appsrc(video) → videoconvert → x264enc|openh264enc → h264parse ─┐
//!                                                                  ├→ mp4mux → filesink
//! appsrc(audio) → audioconvert → audioresample → aac encoder ─────┘
//! ```
//!
//! Buffers carry explicit timestamps from the record queue. Finalizing sends
//! end-of-stream on every appsrc and waits for it on the bus, so the muxer
//! has written its index before the file is reported.

use super::writer::{VideoConfig, VideoWriter, WriterFactory};
use crate::backends::audio::{AudioConfig, AudioSample};
use crate::constants::timing;
use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Software H.264 encoders in preference order
const VIDEO_ENCODERS: &[&str] = &["x264enc", "openh264enc"];

/// AAC encoders in preference order
const AUDIO_ENCODERS: &[&str] = &["avenc_aac", "faac", "voaacenc"];

/// Launch fragment for an encoder, configured for live capture
fn video_encoder_fragment(name: &str, bitrate_kbps: u32) -> String {
    match name {
        // x264enc takes kbps
        "x264enc" => format!(
            "x264enc tune=zerolatency speed-preset=ultrafast bitrate={} key-int-max=60",
            bitrate_kbps
        ),
        // openh264enc takes bps
        "openh264enc" => format!(
            "openh264enc rate-control=bitrate bitrate={} usage-type=camera",
            bitrate_kbps * 1000
        ),
        other => other.to_string(),
    }
}

fn audio_encoder_fragment(name: &str, bitrate_kbps: u32) -> String {
    match name {
        "faac" => format!("faac bitrate={}", bitrate_kbps * 1000),
        other => format!("{} bitrate={}", other, bitrate_kbps * 1000),
    }
}

fn first_available(candidates: &[&'static str]) -> Option<&'static str> {
    candidates
        .iter()
        .copied()
        .find(|name| gst::ElementFactory::find(name).is_some())
}

/// Factory for [`GstVideoWriter`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct GstWriterFactory;

impl GstWriterFactory {
    /// Whether the plugins for an MP4 recording are installed
    pub fn is_available() -> bool {
        gst::init().is_ok()
            && first_available(VIDEO_ENCODERS).is_some()
            && ["h264parse", "mp4mux", "appsrc"]
                .iter()
                .all(|n| gst::ElementFactory::find(n).is_some())
    }
}

impl WriterFactory for GstWriterFactory {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn supports_audio(&self) -> bool {
        true
    }

    fn create_writer(
        &self,
        path: &Path,
        video: VideoConfig,
        audio: Option<AudioConfig>,
    ) -> BackendResult<Box<dyn VideoWriter>> {
        Ok(Box::new(GstVideoWriter::create(path, video, audio)?))
    }
}

pub struct GstVideoWriter {
    pipeline: gst::Pipeline,
    video_src: AppSrc,
    audio_src: Option<AppSrc>,
    path: PathBuf,
    frame_duration: Duration,
}

impl GstVideoWriter {
    pub fn create(path: &Path, video: VideoConfig, audio: Option<AudioConfig>) -> BackendResult<Self> {
        gst::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;

        let encoder = first_available(VIDEO_ENCODERS).ok_or_else(|| {
            BackendError::NotAvailable(
                "No H.264 encoder available (install x264enc or openh264enc)".to_string(),
            )
        })?;
        let location = path
            .to_str()
            .ok_or_else(|| BackendError::Io(format!("Non UTF-8 path: {}", path.display())))?;

        let mut launch = format!(
            "appsrc name=vsrc format=time is-live=true do-timestamp=false ! queue ! \
             videoconvert ! {} ! h264parse ! queue ! mp4mux name=mux faststart=true ! \
             filesink location=\"{}\"",
            video_encoder_fragment(encoder, video.bitrate_kbps),
            location.replace('"', "\\\"")
        );

        let audio_encoder = audio.and_then(|_| first_available(AUDIO_ENCODERS));
        if let (Some(config), Some(name)) = (audio, audio_encoder) {
            launch.push_str(&format!(
                " appsrc name=asrc format=time is-live=true do-timestamp=false ! queue ! \
                 audioconvert ! audioresample ! {} ! queue ! mux.",
                audio_encoder_fragment(name, config.bitrate_kbps)
            ));
        } else if audio.is_some() {
            warn!("No AAC encoder available, recording without audio");
        }

        debug!(pipeline = %launch, "Creating recording pipeline");
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Not a pipeline".to_string()))?;

        let video_src = app_src(&pipeline, "vsrc")?;
        let video_info = VideoInfo::builder(
            VideoFormat::from_string(video.layout.to_gst_format_string()),
            video.width,
            video.height,
        )
        .fps(gst::Fraction::new(
            video.framerate.num as i32,
            video.framerate.denom as i32,
        ))
        .build()
        .map_err(|e| BackendError::FormatNotSupported(e.to_string()))?;
        let video_caps = video_info
            .to_caps()
            .map_err(|e| BackendError::FormatNotSupported(e.to_string()))?;
        video_src.set_caps(Some(&video_caps));

        let audio_src = match (audio, audio_encoder) {
            (Some(config), Some(_)) => {
                let src = app_src(&pipeline, "asrc")?;
                let caps = gst::Caps::builder("audio/x-raw")
                    .field("format", "S16LE")
                    .field("layout", "interleaved")
                    .field("rate", config.sample_rate as i32)
                    .field("channels", config.channels as i32)
                    .build();
                src.set_caps(Some(&caps));
                Some(src)
            }
            _ => None,
        };

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gst::State::Null);
            BackendError::InitializationFailed(format!("Failed to start recording: {}", e))
        })?;

        info!(
            path = %path.display(),
            encoder,
            width = video.width,
            height = video.height,
            bitrate_kbps = video.bitrate_kbps,
            audio = audio_src.is_some(),
            "Recording pipeline started"
        );

        Ok(Self {
            pipeline,
            video_src,
            audio_src,
            path: path.to_path_buf(),
            frame_duration: video.frame_duration(),
        })
    }

    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }

    fn push(src: &AppSrc, data: &[u8], pts: Duration, duration: Duration) -> BackendResult<()> {
        let mut buffer = gst::Buffer::from_slice(data.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));
            buffer.set_duration(gst::ClockTime::from_nseconds(duration.as_nanos() as u64));
        }
        src.push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| BackendError::Encoding(format!("appsrc push failed: {:?}", e)))
    }
}

fn app_src(pipeline: &gst::Pipeline, name: &str) -> BackendResult<AppSrc> {
    pipeline
        .by_name(name)
        .and_then(|e| e.dynamic_cast::<AppSrc>().ok())
        .ok_or_else(|| BackendError::InitializationFailed(format!("Failed to get {}", name)))
}

impl VideoWriter for GstVideoWriter {
    fn write_video(&mut self, pixels: &[u8], pts: Duration) -> BackendResult<()> {
        if let Some(err) = self.bus_error() {
            return Err(BackendError::Encoding(err));
        }
        Self::push(&self.video_src, pixels, pts, self.frame_duration)
    }

    fn write_audio(&mut self, sample: &AudioSample) -> BackendResult<()> {
        match &self.audio_src {
            Some(src) => Self::push(src, &sample.data, sample.pts, sample.duration),
            None => Ok(()),
        }
    }

    fn finalize(self: Box<Self>) -> BackendResult<PathBuf> {
        let mut result = send_eos(&self.video_src, "video");
        if let Some(src) = &self.audio_src {
            result = result.and(send_eos(src, "audio"));
        }
        if result.is_ok() {
            result = eos_result(self.wait_for_eos());
        }

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| BackendError::Encoding(format!("Failed to stop pipeline: {}", e)))?;
        if let Err(e) = &result {
            warn!(path = %self.path.display(), error = %e, "Recording left incomplete");
        }
        result?;
        info!(path = %self.path.display(), "Recording saved");
        Ok(self.path.clone())
    }
}

/// How the wait for the muxer's end-of-stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum EosWait {
    Eos,
    Error(String),
    TimedOut,
    NoBus,
}

impl GstVideoWriter {
    fn wait_for_eos(&self) -> EosWait {
        let Some(bus) = self.pipeline.bus() else {
            return EosWait::NoBus;
        };
        match bus.timed_pop_filtered(
            gst::ClockTime::from_seconds(timing::FINALIZE_TIMEOUT_SECS),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Error(err) => EosWait::Error(err.error().to_string()),
                _ => EosWait::Eos,
            },
            None => EosWait::TimedOut,
        }
    }
}

fn send_eos(src: &AppSrc, branch: &str) -> BackendResult<()> {
    src.end_of_stream()
        .map(|_| ())
        .map_err(|e| BackendError::Encoding(format!("Failed to end {} stream: {:?}", branch, e)))
}

/// The muxer only writes its index on end-of-stream, so anything else is a
/// failed recording
fn eos_result(wait: EosWait) -> BackendResult<()> {
    match wait {
        EosWait::Eos => Ok(()),
        EosWait::Error(e) => Err(BackendError::Encoding(e)),
        EosWait::TimedOut => Err(BackendError::Encoding(format!(
            "No end-of-stream within {} s",
            timing::FINALIZE_TIMEOUT_SECS
        ))),
        EosWait::NoBus => Err(BackendError::Encoding("Recording pipeline has no bus".to_string())),
    }
}

impl Drop for GstVideoWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_fragments_use_native_units() {
        assert!(video_encoder_fragment("x264enc", 5_000).contains("bitrate=5000"));
        assert!(video_encoder_fragment("openh264enc", 5_000).contains("bitrate=5000000"));
        assert!(audio_encoder_fragment("avenc_aac", 128).contains("bitrate=128000"));
    }

    #[test]
    fn test_only_end_of_stream_finalizes() {
        assert_eq!(eos_result(EosWait::Eos), Ok(()));
        assert!(matches!(
            eos_result(EosWait::TimedOut),
            Err(BackendError::Encoding(ref msg)) if msg.contains("end-of-stream")
        ));
        assert_eq!(
            eos_result(EosWait::Error("mux failed".to_string())),
            Err(BackendError::Encoding("mux failed".to_string()))
        );
        assert!(eos_result(EosWait::NoBus).is_err());
    }
}
