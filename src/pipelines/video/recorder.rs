// SPDX-License-Identifier: MPL-2.0

//! Recording lifecycle: queue, encode worker, audio pump, finalize
//!
//! ```text
//! start:  writer = factory.create_writer()  ──▶ worker thread owns writer
//!         audio source ──▶ pump thread ──▶ queue.push_audio (re-anchored pts)
//!         queue.open_gate()
//!
//! stop:   queue.close_and_mark_end()         (caller returns immediately)
//!         "recording-finalize" thread: stop pump → join worker → callback(path)
//! ```
//!
//! The worker drains the queue up to the end marker and always finalizes the
//! writer, so a recording stopped before its first frame is still a valid file.
//! [`VideoRecorder::abort`] discards the unconsumed tail instead of draining.

use super::queue::{PushOutcome, RecordEncodeQueue, RecordItem};
use super::writer::{VideoConfig, VideoWriter, WriterFactory};
use crate::backends::audio::{AudioBackend, AudioConfig, AudioSample, AudioSource};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::constants::timing;
use crate::errors::{BackendError, BackendResult, SessionError, SessionResult};
use arc_swap::ArcSwapOption;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Completion callback for an asynchronous stop
pub type FinishCallback = Box<dyn FnOnce(SessionResult<PathBuf>) + Send + 'static>;

struct ActiveRecording {
    queue: Arc<RecordEncodeQueue>,
    worker: JoinHandle<BackendResult<PathBuf>>,
    audio: Option<CaptureLoopController>,
    path: PathBuf,
}

/// Owns at most one recording at a time
pub struct VideoRecorder {
    /// Queue of the active recording, read lock-free by the producer
    queue: ArcSwapOption<RecordEncodeQueue>,
    active: Mutex<Option<ActiveRecording>>,
    max_video: usize,
    max_audio: usize,
}

impl VideoRecorder {
    pub fn new(max_video: usize, max_audio: usize) -> Self {
        Self {
            queue: ArcSwapOption::empty(),
            active: Mutex::new(None),
            max_video,
            max_audio,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveRecording>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_recording(&self) -> bool {
        (*self.queue.load()).as_ref().is_some_and(|q| q.is_open())
    }

    /// Start a recording into `path`
    ///
    /// Audio is best effort: if the input cannot be opened the recording
    /// continues video-only.
    pub fn start(
        &self,
        factory: &dyn WriterFactory,
        path: &Path,
        video: VideoConfig,
        audio_backend: Option<&dyn AudioBackend>,
        audio_config: AudioConfig,
    ) -> SessionResult<()> {
        let mut active = self.lock();
        if active.is_some() {
            return Err(SessionError::AlreadyRecording);
        }

        let audio_source = match audio_backend {
            Some(backend) if factory.supports_audio() => match backend.open(audio_config) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!(error = %e, "Audio unavailable, recording video only");
                    None
                }
            },
            _ => None,
        };

        let writer = factory
            .create_writer(path, video, audio_source.as_ref().map(|s| s.config()))
            .map_err(|e| SessionError::RecordingSetupFailed(e.to_string()))?;

        let queue = Arc::new(
            RecordEncodeQueue::new(self.max_video, self.max_audio, video.frame_duration())
                .with_frame_size(video.width, video.height),
        );

        let worker = {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name("recording-encode".to_string())
                .spawn(move || encode_loop(&queue, writer, video))
                .map_err(|e| SessionError::RecordingSetupFailed(format!("Failed to spawn encoder: {}", e)))?
        };

        let audio = match audio_source {
            Some(source) => match spawn_audio_pump(source, Arc::clone(&queue)) {
                Ok(pump) => Some(pump),
                Err(e) => {
                    warn!(error = %e, "Failed to start audio pump");
                    None
                }
            },
            None => None,
        };

        queue.open_gate();
        self.queue.store(Some(Arc::clone(&queue)));
        info!(
            path = %path.display(),
            width = video.width,
            height = video.height,
            fps = %video.framerate,
            audio = audio.is_some(),
            "Recording started"
        );

        *active = Some(ActiveRecording {
            queue,
            worker,
            audio,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Offer a packed frame to the active recording
    pub fn push_video(&self, pixels: &[u8], width: u32, height: u32) -> PushOutcome {
        match &*self.queue.load() {
            Some(queue) => queue.push_video(pixels, width, height),
            None => PushOutcome::GateClosed,
        }
    }

    pub fn push_audio(&self, sample: AudioSample) -> PushOutcome {
        match &*self.queue.load() {
            Some(queue) => queue.push_audio(sample),
            None => PushOutcome::GateClosed,
        }
    }

    /// Stop the active recording without blocking
    ///
    /// `on_finish` runs on the finalize thread with the output path once the
    /// file is complete, or with the error that prevented it.
    pub fn stop<F>(&self, on_finish: F) -> SessionResult<()>
    where
        F: FnOnce(SessionResult<PathBuf>) + Send + 'static,
    {
        let recording = self.lock().take().ok_or(SessionError::NotRecording)?;
        recording.queue.close_and_mark_end();
        self.queue.store(None);
        debug!(path = %recording.path.display(), "Recording stopping");
        spawn_finalize(recording, Box::new(on_finish))
    }

    /// Stop the active recording, dropping whatever is still queued
    ///
    /// Blocks until the file is finalized. Used during disposal.
    pub fn abort(&self) -> Option<SessionResult<PathBuf>> {
        let recording = self.lock().take()?;
        recording.queue.abort();
        self.queue.store(None);
        warn!(path = %recording.path.display(), "Recording aborted");
        Some(finish(recording))
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.abort() {
            error!(error = %e, "Recording finalize failed on drop");
        }
    }
}

fn spawn_finalize(recording: ActiveRecording, on_finish: FinishCallback) -> SessionResult<()> {
    // The closure owns the recording; if spawning fails it is dropped, which
    // stops the pump, and the worker finishes on its own after the end marker.
    thread::Builder::new()
        .name("recording-finalize".to_string())
        .spawn(move || on_finish(finish(recording)))
        .map(|_| ())
        .map_err(|e| SessionError::RecordingSetupFailed(format!("Failed to spawn finalize: {}", e)))
}

/// Stop the audio pump, then join the worker and collect its result
fn finish(mut recording: ActiveRecording) -> SessionResult<PathBuf> {
    if let Some(mut audio) = recording.audio.take() {
        audio.stop();
    }
    match recording.worker.join() {
        Ok(Ok(path)) => {
            info!(path = %path.display(), "Recording finalized");
            Ok(path)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Recording finalize failed");
            Err(SessionError::RecordingSetupFailed(e.to_string()))
        }
        Err(_) => Err(SessionError::RecordingSetupFailed(
            "Encoder thread panicked".to_string(),
        )),
    }
}

/// Worker body: exclusive owner of the writer until it is finalized
fn encode_loop(
    queue: &RecordEncodeQueue,
    mut writer: Box<dyn VideoWriter>,
    config: VideoConfig,
) -> BackendResult<PathBuf> {
    let mut written = 0u64;
    let mut skipped = 0u64;
    let mut failure: Option<BackendError> = None;

    while let Some(item) = queue.next_item() {
        match item {
            RecordItem::Video {
                pixels,
                width,
                height,
                pts,
            } => {
                if failure.is_some() {
                    continue;
                }
                if (width, height) != (config.width, config.height) {
                    skipped += 1;
                    continue;
                }
                match writer.write_video(&pixels, pts) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        error!(error = %e, "Video encode failed, finalizing early");
                        failure = Some(e);
                    }
                }
            }
            RecordItem::Audio(sample) => {
                if failure.is_none() {
                    if let Err(e) = writer.write_audio(&sample) {
                        warn!(error = %e, "Audio encode failed");
                    }
                }
            }
            RecordItem::EndOfStream => break,
        }
    }

    debug!(
        written,
        skipped,
        dropped = queue.dropped_video(),
        "Encode worker finalizing"
    );
    let finalized = writer.finalize();
    match failure {
        Some(e) => Err(e),
        None => finalized,
    }
}

/// Re-anchors device timestamps onto the recording timeline
///
/// The first chunk lands at the wall-clock offset since the recording
/// started. If the device clock jumps backwards the timeline is re-anchored
/// at the end of the last chunk.
struct PtsAnchor {
    started: Instant,
    anchor: Option<(Duration, Duration)>,
    next: Duration,
}

impl PtsAnchor {
    fn new(started: Instant) -> Self {
        Self {
            started,
            anchor: None,
            next: Duration::ZERO,
        }
    }

    fn rebase(&mut self, device_pts: Duration, duration: Duration) -> Duration {
        let (device_base, timeline_base) = match self.anchor {
            Some((device_base, timeline_base)) if device_pts >= device_base => {
                (device_base, timeline_base)
            }
            Some(_) => {
                debug!("Audio clock went backwards, re-anchoring");
                let anchor = (device_pts, self.next);
                self.anchor = Some(anchor);
                anchor
            }
            None => {
                let anchor = (device_pts, self.started.elapsed());
                self.anchor = Some(anchor);
                anchor
            }
        };
        let pts = timeline_base + (device_pts - device_base);
        self.next = pts + duration;
        pts
    }
}

struct AudioPump {
    source: Box<dyn AudioSource>,
    queue: Arc<RecordEncodeQueue>,
    anchor: PtsAnchor,
}

impl AudioPump {
    fn step(&mut self) -> LoopAction {
        match self.source.read_sample(timing::READ_POLL_TIMEOUT) {
            Ok(Some(mut sample)) => {
                sample.pts = self.anchor.rebase(sample.pts, sample.duration);
                if self.queue.push_audio(sample) == PushOutcome::GateClosed {
                    return LoopAction::Stop;
                }
                LoopAction::Continue
            }
            Ok(None) => LoopAction::Continue,
            Err(e) => {
                warn!(error = %e, "Audio capture failed, continuing without audio");
                LoopAction::Stop
            }
        }
    }
}

impl Drop for AudioPump {
    fn drop(&mut self) {
        self.source.close();
    }
}

fn spawn_audio_pump(
    source: Box<dyn AudioSource>,
    queue: Arc<RecordEncodeQueue>,
) -> std::io::Result<CaptureLoopController> {
    let started = Instant::now();
    CaptureLoopController::start_with_init(
        "recording-audio",
        move |_| {
            Ok::<_, String>(AudioPump {
                source,
                queue,
                anchor: PtsAnchor::new(started),
            })
        },
        AudioPump::step,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{Framerate, PixelLayout};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[derive(Default)]
    struct Log {
        frames: Mutex<Vec<Duration>>,
        finalized: AtomicUsize,
    }

    struct MemoryWriter {
        path: PathBuf,
        log: Arc<Log>,
        delay: Duration,
    }

    impl VideoWriter for MemoryWriter {
        fn write_video(&mut self, _pixels: &[u8], pts: Duration) -> BackendResult<()> {
            thread::sleep(self.delay);
            self.log.frames.lock().unwrap().push(pts);
            Ok(())
        }

        fn write_audio(&mut self, _sample: &AudioSample) -> BackendResult<()> {
            Ok(())
        }

        fn finalize(self: Box<Self>) -> BackendResult<PathBuf> {
            self.log.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(self.path.clone())
        }
    }

    struct MemoryFactory {
        log: Arc<Log>,
        delay: Duration,
        fail: bool,
    }

    impl WriterFactory for MemoryFactory {
        fn extension(&self) -> &'static str {
            "bin"
        }

        fn supports_audio(&self) -> bool {
            false
        }

        fn create_writer(
            &self,
            path: &Path,
            _video: VideoConfig,
            _audio: Option<AudioConfig>,
        ) -> BackendResult<Box<dyn VideoWriter>> {
            if self.fail {
                return Err(BackendError::Encoding("no encoder".to_string()));
            }
            Ok(Box::new(MemoryWriter {
                path: path.to_path_buf(),
                log: Arc::clone(&self.log),
                delay: self.delay,
            }))
        }
    }

    fn factory(delay: Duration) -> (MemoryFactory, Arc<Log>) {
        let log = Arc::new(Log::default());
        let factory = MemoryFactory {
            log: Arc::clone(&log),
            delay,
            fail: false,
        };
        (factory, log)
    }

    fn video() -> VideoConfig {
        VideoConfig {
            width: 2,
            height: 2,
            framerate: Framerate::from_int(25),
            bitrate_kbps: 1000,
            layout: PixelLayout::Rgba,
        }
    }

    fn stop_and_wait(recorder: &VideoRecorder) -> SessionResult<PathBuf> {
        let (tx, rx) = mpsc::channel();
        recorder
            .stop(move |result| {
                let _ = tx.send(result);
            })
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_stop_before_any_frame_still_finalizes() {
        let (factory, log) = factory(Duration::ZERO);
        let recorder = VideoRecorder::new(8, 64);
        recorder
            .start(&factory, Path::new("empty.bin"), video(), None, AudioConfig::default())
            .unwrap();
        assert!(recorder.is_recording());

        let path = stop_and_wait(&recorder).unwrap();
        assert_eq!(path, PathBuf::from("empty.bin"));
        assert_eq!(log.finalized.load(Ordering::SeqCst), 1);
        assert!(log.frames.lock().unwrap().is_empty());
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_illegal_transitions() {
        let (factory, _log) = factory(Duration::ZERO);
        let recorder = VideoRecorder::new(8, 64);
        assert_eq!(recorder.stop(|_| {}), Err(SessionError::NotRecording));

        recorder
            .start(&factory, Path::new("a.bin"), video(), None, AudioConfig::default())
            .unwrap();
        let again = recorder.start(&factory, Path::new("b.bin"), video(), None, AudioConfig::default());
        assert_eq!(again, Err(SessionError::AlreadyRecording));
        stop_and_wait(&recorder).unwrap();
    }

    #[test]
    fn test_setup_failure() {
        let (mut factory, _log) = factory(Duration::ZERO);
        factory.fail = true;
        let recorder = VideoRecorder::new(8, 64);
        let result = recorder.start(&factory, Path::new("x.bin"), video(), None, AudioConfig::default());
        assert!(matches!(result, Err(SessionError::RecordingSetupFailed(_))));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_stop_drains_queued_frames() {
        let (factory, log) = factory(Duration::from_millis(5));
        let recorder = VideoRecorder::new(8, 64);
        recorder
            .start(&factory, Path::new("drain.bin"), video(), None, AudioConfig::default())
            .unwrap();
        let mut enqueued = 0;
        for _ in 0..6 {
            if recorder.push_video(&[0; 16], 2, 2) == PushOutcome::Enqueued {
                enqueued += 1;
            }
        }
        assert_eq!(recorder.push_video(&[0; 4], 1, 1), PushOutcome::SizeMismatch);
        stop_and_wait(&recorder).unwrap();

        let frames = log.frames.lock().unwrap();
        assert_eq!(frames.len(), enqueued);
        let step = video().frame_duration();
        for (i, pts) in frames.iter().enumerate() {
            assert_eq!(*pts, step * i as u32);
        }
        assert_eq!(recorder.push_video(&[0; 16], 2, 2), PushOutcome::GateClosed);
    }

    #[test]
    fn test_abort_finalizes_without_draining() {
        let (factory, log) = factory(Duration::from_millis(50));
        let recorder = VideoRecorder::new(8, 64);
        recorder
            .start(&factory, Path::new("abort.bin"), video(), None, AudioConfig::default())
            .unwrap();
        for _ in 0..8 {
            recorder.push_video(&[0; 16], 2, 2);
        }
        assert!(recorder.abort().unwrap().is_ok());
        assert_eq!(log.finalized.load(Ordering::SeqCst), 1);
        assert!(log.frames.lock().unwrap().len() < 8);
        assert!(recorder.abort().is_none());
    }

    #[test]
    fn test_pts_anchor_rebases_and_reanchors() {
        let mut anchor = PtsAnchor::new(Instant::now());
        let ten = Duration::from_millis(10);
        let first = anchor.rebase(Duration::from_secs(100), ten);
        let second = anchor.rebase(Duration::from_secs(100) + ten, ten);
        assert_eq!(second - first, ten);

        // device clock reset
        let third = anchor.rebase(Duration::from_millis(5), ten);
        assert_eq!(third, second + ten);
    }
}
