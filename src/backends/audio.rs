// SPDX-License-Identifier: MPL-2.0

//! Audio capture for recordings
//!
//! Audio only flows while a recording is active. The recorder pulls samples
//! from an [`AudioSource`] on its own pump thread and feeds them into the
//! record queue; timestamps are re-anchored to the recording start there.

use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Interleaved S16LE capture parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u32,
    /// Encoder bitrate in kbps
    pub bitrate_kbps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            bitrate_kbps: crate::constants::recording::DEFAULT_AUDIO_BITRATE_KBPS,
        }
    }
}

impl AudioConfig {
    pub fn bytes_per_frame(&self) -> usize {
        2 * self.channels as usize
    }

    /// Duration covered by `len` bytes of interleaved samples
    pub fn duration_of(&self, len: usize) -> Duration {
        let frames = (len / self.bytes_per_frame().max(1)) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / u64::from(self.sample_rate.max(1)))
    }
}

/// A chunk of interleaved audio with its capture timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    pub data: Vec<u8>,
    /// Device timestamp, or recording-relative after re-anchoring
    pub pts: Duration,
    pub duration: Duration,
}

/// An opened audio input
pub trait AudioSource: Send {
    fn config(&self) -> AudioConfig;

    /// Wait up to `timeout` for the next chunk; `Ok(None)` when nothing arrived
    fn read_sample(&mut self, timeout: Duration) -> BackendResult<Option<AudioSample>>;

    fn close(&mut self);
}

/// Factory for audio sources
pub trait AudioBackend: Send + Sync {
    fn open(&self, config: AudioConfig) -> BackendResult<Box<dyn AudioSource>>;
}

/// Default system microphone through GStreamer's `autoaudiosrc`
#[derive(Debug, Default)]
pub struct GStreamerAudioBackend;

impl AudioBackend for GStreamerAudioBackend {
    fn open(&self, config: AudioConfig) -> BackendResult<Box<dyn AudioSource>> {
        gst::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;
        let launch = format!(
            "autoaudiosrc ! audioconvert ! audioresample ! \
             audio/x-raw,format=S16LE,layout=interleaved,rate={},channels={} ! \
             appsink name=sink max-buffers=64 drop=true sync=false",
            config.sample_rate, config.channels
        );
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Not a pipeline".to_string()))?;
        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.dynamic_cast::<AppSink>().ok())
            .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".to_string()))?;

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gst::State::Null);
            BackendError::InitializationFailed(format!("Failed to start audio: {}", e))
        })?;
        info!(rate = config.sample_rate, channels = config.channels, "Audio capture started");

        Ok(Box::new(GStreamerAudioSource {
            pipeline,
            appsink,
            config,
            closed: false,
        }))
    }
}

struct GStreamerAudioSource {
    pipeline: gst::Pipeline,
    appsink: AppSink,
    config: AudioConfig,
    closed: bool,
}

impl AudioSource for GStreamerAudioSource {
    fn config(&self) -> AudioConfig {
        self.config
    }

    fn read_sample(&mut self, timeout: Duration) -> BackendResult<Option<AudioSample>> {
        if self.closed {
            return Ok(None);
        }
        let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        let Some(sample) = self.appsink.try_pull_sample(wait) else {
            if self.appsink.is_eos() {
                return Err(BackendError::Stream("Audio stream ended".to_string()));
            }
            return Ok(None);
        };
        let buffer = sample
            .buffer()
            .ok_or_else(|| BackendError::Stream("No buffer in audio sample".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| BackendError::Stream("Failed to map audio buffer".to_string()))?;
        let data = map.as_slice().to_vec();
        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or_default();
        let duration = buffer
            .duration()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or_else(|| self.config.duration_of(data.len()));
        Ok(Some(AudioSample { data, pts, duration }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.pipeline.set_state(gst::State::Null);
            debug!("Audio capture stopped");
        }
    }
}

impl Drop for GStreamerAudioSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Silent input producing 10 ms chunks in real time
///
/// Stands in for a microphone on headless machines and in tests.
#[derive(Debug, Default)]
pub struct SilenceBackend;

impl AudioBackend for SilenceBackend {
    fn open(&self, config: AudioConfig) -> BackendResult<Box<dyn AudioSource>> {
        Ok(Box::new(SilenceSource {
            config,
            started: Instant::now(),
            emitted: Duration::ZERO,
            closed: false,
        }))
    }
}

struct SilenceSource {
    config: AudioConfig,
    started: Instant,
    emitted: Duration,
    closed: bool,
}

const SILENCE_CHUNK: Duration = Duration::from_millis(10);

impl AudioSource for SilenceSource {
    fn config(&self) -> AudioConfig {
        self.config
    }

    fn read_sample(&mut self, timeout: Duration) -> BackendResult<Option<AudioSample>> {
        if self.closed {
            return Ok(None);
        }
        let due = self.started + self.emitted + SILENCE_CHUNK;
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }
        let frames = (u64::from(self.config.sample_rate) * SILENCE_CHUNK.as_millis() as u64 / 1000) as usize;
        let sample = AudioSample {
            data: vec![0u8; frames * self.config.bytes_per_frame()],
            pts: self.emitted,
            duration: SILENCE_CHUNK,
        };
        self.emitted += SILENCE_CHUNK;
        Ok(Some(sample))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_of() {
        let config = AudioConfig::default();
        // 48000 frames * 4 bytes = one second
        assert_eq!(config.duration_of(48_000 * 4), Duration::from_secs(1));
    }

    #[test]
    fn test_silence_source_advances_pts() {
        let mut source = SilenceBackend.open(AudioConfig::default()).unwrap();
        let first = source.read_sample(Duration::from_millis(50)).unwrap().unwrap();
        let second = source.read_sample(Duration::from_millis(50)).unwrap().unwrap();
        assert_eq!(first.pts, Duration::ZERO);
        assert_eq!(second.pts, SILENCE_CHUNK);
        assert_eq!(first.data.len(), 480 * 4);
        assert!(first.data.iter().all(|&b| b == 0));
    }
}
