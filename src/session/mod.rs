// SPDX-License-Identifier: GPL-3.0-only

//! Capture session
//!
//! A [`CaptureSession`] owns one producer thread reading a device and fans
//! every frame out to four consumers (snapshot, recording, preview, stream).
//!
//! ```text
//!   application thread                 producer thread ("capture-<id>")
//!   ──────────────────                 ────────────────────────────────
//!   initialize() ──spawn──────────────▶ open device
//!        │                              loop: read_frame(100 ms)
//!        │  ◀──first frame (CAS)──────      └─▶ FrameDistributor
//!        │  ◀──timeout task (CAS)
//!   dispose(): fail pending init → detach stream → stop + join producer
//!              → finalize recording → release buffers → Closing → Disposed
//! ```
//!
//! The first frame and the initialization timeout race through a single
//! compare-exchange on the state; whichever loses does nothing.

pub mod distributor;
pub mod events;
pub mod manager;
pub mod registry;
pub mod state;

pub use distributor::{Consumers, Distribution, FrameDistributor};
pub use events::{EventSink, EventStream, SessionEvent, SessionMessage};
pub use manager::{Command, PlatformCapabilities, Reply, SessionManager};
pub use state::SessionState;

use crate::backends::audio::{AudioBackend, AudioConfig, GStreamerAudioBackend};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::backends::camera::types::CameraFormat;
use crate::backends::camera::{self, CameraBackend, FrameRead, FrameSource};
use crate::config::SessionConfig;
use crate::constants::timing;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::photo::{EncodingQuality, PhotoEncoder, PhotoPipeline, StillEncoder};
use crate::pipelines::preview::TriplePreviewBuffer;
use crate::pipelines::stream::{PushedFrame, StreamExportChannel, StreamPushWorker};
use crate::pipelines::video::{self, VideoConfig, VideoRecorder, WriterFactory};
use crate::storage;
use serde::{Deserialize, Serialize};
use state::AtomicSessionState;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Opaque, process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collaborators a session drives
#[derive(Clone)]
pub struct SessionBackends {
    pub camera: Arc<dyn CameraBackend>,
    pub writer: Arc<dyn WriterFactory>,
    pub still: Arc<dyn StillEncoder>,
    /// Microphone used while recording, when audio is enabled
    pub audio: Option<Arc<dyn AudioBackend>>,
}

impl SessionBackends {
    /// Default collaborators for a config
    pub fn for_config(config: &SessionConfig) -> Self {
        Self {
            camera: camera::backend_for(config),
            writer: video::default_writer_factory(),
            still: Arc::new(PhotoEncoder::new(
                config.photo_format,
                EncodingQuality::Custom(config.jpeg_quality),
            )),
            audio: config
                .enable_audio
                .then(|| Arc::new(GStreamerAudioBackend) as Arc<dyn AudioBackend>),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type InitReply = oneshot::Sender<SessionResult<(u32, u32)>>;

/// State shared with the producer thread and the timeout task
struct Inner {
    id: SessionId,
    config: SessionConfig,
    state: AtomicSessionState,
    consumers: Arc<Consumers>,
    events: EventSink,
    format: Mutex<Option<CameraFormat>>,
    pending_init: Mutex<Option<InitReply>>,
    init_timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Also serializes starting and failing initialization
    producer: Mutex<Option<CaptureLoopController>>,
    stream_handle: Mutex<Option<i64>>,
    disposed: watch::Sender<bool>,
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        events::emit(&self.events, self.id, event);
    }

    fn cancel_init_timer(&self) {
        if let Some(timer) = lock(&self.init_timer).take() {
            timer.abort();
        }
    }

    /// Producer saw its first frame
    fn on_first_frame(&self, width: u32, height: u32) -> bool {
        if self
            .state
            .transition(SessionState::Initializing, SessionState::Running)
            .is_err()
        {
            return false;
        }
        self.cancel_init_timer();
        info!(session = %self.id, width, height, "Camera initialized");
        if let Some(reply) = lock(&self.pending_init).take() {
            let _ = reply.send(Ok((width, height)));
        }
        self.emit(SessionEvent::CameraInitialized { width, height });
        true
    }

    /// Back to `Created`, releasing the device; no-op unless still initializing
    fn fail_initialization(&self, error: SessionError) {
        let controller = {
            let mut producer = lock(&self.producer);
            if self
                .state
                .transition(SessionState::Initializing, SessionState::Created)
                .is_err()
            {
                return;
            }
            producer.take()
        };
        self.cancel_init_timer();
        warn!(session = %self.id, error = %error, "Camera initialization failed");
        // The producer may still be inside a device open, so reply before joining
        if let Some(reply) = lock(&self.pending_init).take() {
            let _ = reply.send(Err(error));
        }
        if let Some(mut controller) = controller {
            controller.stop();
        }
        self.consumers.release_buffers();
    }

    /// Device error or end-of-stream reported by the producer
    fn on_device_lost(&self, description: String) {
        match self.state.load() {
            SessionState::Initializing => {
                self.fail_initialization(SessionError::DeviceError(description))
            }
            SessionState::Running | SessionState::Paused => {
                error!(session = %self.id, %description, "Camera device lost");
                self.emit(SessionEvent::CameraError { description });
            }
            _ => debug!(session = %self.id, %description, "Device lost after shutdown began"),
        }
    }

    /// Ordered teardown; the caller already moved the state to `Disposing`
    fn shutdown(&self) {
        info!(session = %self.id, "Disposing capture session");
        self.cancel_init_timer();
        {
            // initialize() moves to Initializing and stores its reply under
            // the producer lock, so the reply is visible once we hold it
            let _producer = lock(&self.producer);
            self.fail_pending_init();
        }

        {
            let mut handle = lock(&self.stream_handle);
            if let Some(channel) = self.consumers.stream.swap(None) {
                channel.close();
            }
            let released = registry::release_session(self.id);
            if handle.take().is_some() || released > 0 {
                debug!(session = %self.id, released, "Image stream released");
            }
        }

        // Nothing below may run while the producer can still touch buffers
        let controller = lock(&self.producer).take();
        if let Some(mut controller) = controller {
            controller.stop();
        }

        match self.consumers.recorder.abort() {
            Some(Ok(path)) => info!(session = %self.id, path = %path.display(), "Recording finalized on dispose"),
            Some(Err(e)) => warn!(session = %self.id, error = %e, "Recording finalize failed on dispose"),
            None => {}
        }

        self.consumers.release_buffers();
        self.emit(SessionEvent::CameraClosing);
        self.mark_disposed();
        self.fail_pending_init();
        info!(session = %self.id, "Capture session disposed");
    }

    fn fail_pending_init(&self) {
        if let Some(reply) = lock(&self.pending_init).take() {
            let _ = reply.send(Err(SessionError::Disposed));
        }
    }

    fn mark_disposed(&self) {
        self.state.store(SessionState::Disposed);
        self.disposed.send_replace(true);
    }
}

/// Device reader running on the producer thread
struct Producer {
    source: Box<dyn FrameSource>,
    distributor: FrameDistributor,
    session: Weak<Inner>,
}

impl Producer {
    fn step(&mut self) -> LoopAction {
        match self.source.read_frame(timing::READ_POLL_TIMEOUT) {
            Ok(FrameRead::Frame(frame)) => {
                self.distributor.distribute(&frame);
                let count = self.distributor.frames_distributed();
                if count > 0 && count % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        frames = count,
                        latency_us = frame.captured_at.elapsed().as_micros() as u64,
                        "Capture progress"
                    );
                }
                LoopAction::Continue
            }
            Ok(FrameRead::Pending) => LoopAction::Continue,
            Ok(FrameRead::EndOfStream) => {
                self.device_lost("Camera stream ended".to_string());
                LoopAction::Stop
            }
            Err(e) => {
                self.device_lost(e.to_string());
                LoopAction::Stop
            }
        }
    }

    fn device_lost(&self, description: String) {
        if let Some(inner) = self.session.upgrade() {
            inner.on_device_lost(description);
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// One camera, its producer thread and its consumers
pub struct CaptureSession {
    inner: Arc<Inner>,
    backends: SessionBackends,
    photo: PhotoPipeline,
}

impl CaptureSession {
    /// Session with the default collaborators for `config`
    pub fn new(config: SessionConfig, events: EventSink) -> Self {
        let backends = SessionBackends::for_config(&config);
        Self::with_backends(config, backends, events)
    }

    pub fn with_backends(config: SessionConfig, backends: SessionBackends, events: EventSink) -> Self {
        let config = config.normalized();
        let id = SessionId::next();
        let recorder = VideoRecorder::new(config.max_video_queue, config.max_audio_queue);
        let consumers = Arc::new(Consumers::new(recorder, config.mirror, config.preview_format));
        let (disposed, _) = watch::channel(false);
        debug!(session = %id, device = %config.device, backend = backends.camera.name(), "Capture session created");

        Self {
            photo: PhotoPipeline::new(Arc::clone(&backends.still)),
            inner: Arc::new(Inner {
                id,
                config,
                state: AtomicSessionState::new(SessionState::Created),
                consumers,
                events,
                format: Mutex::new(None),
                pending_init: Mutex::new(None),
                init_timer: Mutex::new(None),
                producer: Mutex::new(None),
                stream_handle: Mutex::new(None),
                disposed,
            }),
            backends,
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Actual frame size once running
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner.consumers.dimensions()
    }

    /// Renderer side of the preview hand-off
    pub fn preview(&self) -> &TriplePreviewBuffer {
        &self.inner.consumers.preview
    }

    pub fn is_recording(&self) -> bool {
        self.inner.consumers.recorder.is_recording()
    }

    /// Handle of the active image stream
    pub fn stream_handle(&self) -> Option<i64> {
        *lock(&self.inner.stream_handle)
    }

    fn require_live(&self) -> SessionResult<()> {
        match self.state() {
            s if s.is_live() => Ok(()),
            s if s.is_terminal() => Err(SessionError::Disposed),
            _ => Err(SessionError::NotRunning),
        }
    }

    /// Open the device and wait for its first frame
    ///
    /// Resolves with the actual frame size, or fails with the device error,
    /// [`SessionError::InitializationTimeout`] or [`SessionError::Disposed`].
    pub async fn initialize(&self) -> SessionResult<(u32, u32)> {
        let inner = &self.inner;
        let (reply, result) = oneshot::channel();
        {
            let mut producer = lock(&inner.producer);
            match inner
                .state
                .transition(SessionState::Created, SessionState::Initializing)
            {
                Ok(()) => {}
                Err(s) if s.is_terminal() => return Err(SessionError::Disposed),
                Err(_) => return Err(SessionError::AlreadyInitialized),
            }
            *lock(&inner.pending_init) = Some(reply);

            let format = camera::negotiate_format(&*self.backends.camera, &inner.config);
            info!(
                session = %inner.id,
                device = %inner.config.device,
                backend = self.backends.camera.name(),
                %format,
                "Initializing camera"
            );
            *lock(&inner.format) = Some(format.clone());

            match self.spawn_producer(format) {
                Ok(controller) => *producer = Some(controller),
                Err(e) => {
                    drop(producer);
                    inner.fail_initialization(SessionError::DeviceError(format!(
                        "Failed to start capture thread: {}",
                        e
                    )));
                    return result.await.unwrap_or(Err(SessionError::Disposed));
                }
            }
        }

        let timeout = inner.config.init_timeout();
        let weak = Arc::downgrade(inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                let _ = tokio::task::spawn_blocking(move || {
                    inner.fail_initialization(SessionError::InitializationTimeout)
                })
                .await;
            }
        });
        *lock(&inner.init_timer) = Some(timer);
        if inner.state.load() != SessionState::Initializing {
            // first frame or disposal won before the timer was stored
            inner.cancel_init_timer();
        }

        result.await.unwrap_or(Err(SessionError::Disposed))
    }

    fn spawn_producer(&self, format: CameraFormat) -> std::io::Result<CaptureLoopController> {
        let camera = Arc::clone(&self.backends.camera);
        let device = self.inner.config.device.clone();
        let consumers = Arc::clone(&self.inner.consumers);
        let session = Arc::downgrade(&self.inner);

        CaptureLoopController::start_with_init(
            &format!("capture-{}", self.inner.id),
            move |_stop| match camera.open(&device, &format) {
                Ok(source) => {
                    let hook_session = session.clone();
                    let distributor = FrameDistributor::new(
                        consumers,
                        Box::new(move |width, height| {
                            hook_session
                                .upgrade()
                                .is_some_and(|inner| inner.on_first_frame(width, height))
                        }),
                    );
                    Ok(Producer {
                        source,
                        distributor,
                        session,
                    })
                }
                Err(e) => {
                    if let Some(inner) = session.upgrade() {
                        inner.fail_initialization(SessionError::DeviceError(e.to_string()));
                    }
                    Err(e)
                }
            },
            Producer::step,
        )
    }

    /// Stop forwarding frames to the preview
    pub fn pause_preview(&self) -> SessionResult<()> {
        match self
            .inner
            .state
            .transition(SessionState::Running, SessionState::Paused)
        {
            Ok(()) => {
                self.inner.consumers.set_paused(true);
                debug!(session = %self.inner.id, "Preview paused");
                Ok(())
            }
            Err(SessionState::Paused) => Ok(()),
            Err(s) if s.is_terminal() => Err(SessionError::Disposed),
            Err(_) => Err(SessionError::NotRunning),
        }
    }

    pub fn resume_preview(&self) -> SessionResult<()> {
        match self
            .inner
            .state
            .transition(SessionState::Paused, SessionState::Running)
        {
            Ok(()) => {
                self.inner.consumers.set_paused(false);
                debug!(session = %self.inner.id, "Preview resumed");
                Ok(())
            }
            Err(SessionState::Running) => Ok(()),
            Err(s) if s.is_terminal() => Err(SessionError::Disposed),
            Err(_) => Err(SessionError::NotRunning),
        }
    }

    /// Toggle horizontal mirroring for all consumers
    pub fn set_mirror(&self, mirror: bool) -> SessionResult<()> {
        if self.state().is_terminal() {
            return Err(SessionError::Disposed);
        }
        self.inner.consumers.set_mirror(mirror);
        Ok(())
    }

    /// Encode the most recent frame to a still image
    pub async fn take_picture(&self) -> SessionResult<PathBuf> {
        match self.state() {
            s if s.is_live() => {}
            SessionState::Initializing => return Err(SessionError::NoFrameAvailable),
            s if s.is_terminal() => return Err(SessionError::Disposed),
            _ => return Err(SessionError::NotRunning),
        }
        let snapshot = self
            .inner
            .consumers
            .snapshot
            .latest()
            .ok_or(SessionError::NoFrameAvailable)?;
        let path = storage::output_path(
            &self.inner.config.output_dir(),
            self.inner.id,
            self.photo.extension(),
        );
        debug!(session = %self.inner.id, sequence = snapshot.sequence, "Taking picture");
        self.photo.save(snapshot, path).await
    }

    /// Start recording at the actual frame size; resolves with the output path
    pub async fn start_video_recording(&self) -> SessionResult<PathBuf> {
        self.require_live()?;
        let inner = &self.inner;
        let (width, height) = inner.consumers.dimensions().ok_or(SessionError::NotRunning)?;
        let framerate = lock(&inner.format)
            .as_ref()
            .and_then(|f| f.framerate)
            .unwrap_or_default();
        let video = VideoConfig {
            width,
            height,
            framerate,
            bitrate_kbps: inner.config.video_bitrate_for(width, height),
            layout: inner.consumers.layout(),
        };
        let audio_config = AudioConfig {
            bitrate_kbps: inner.config.audio_bitrate_kbps,
            ..AudioConfig::default()
        };
        let audio = self
            .backends
            .audio
            .clone()
            .filter(|_| inner.config.enable_audio);
        let path = storage::output_path(&inner.config.output_dir(), inner.id, self.backends.writer.extension());

        let consumers = Arc::clone(&inner.consumers);
        let writer = Arc::clone(&self.backends.writer);
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| SessionError::RecordingSetupFailed(format!("{}: {}", dir.display(), e)))?;
            }
            consumers
                .recorder
                .start(&*writer, &target, video, audio.as_deref(), audio_config)
        })
        .await
        .map_err(|e| SessionError::RecordingSetupFailed(format!("Recording setup task error: {}", e)))??;

        if self.state().is_terminal() {
            // disposal began while the writer was being created
            let _ = inner.consumers.recorder.abort();
            return Err(SessionError::Disposed);
        }
        Ok(path)
    }

    /// Stop recording; resolves once the file is finalized
    ///
    /// The caller's task only awaits; joining and finalizing happen on a
    /// background thread.
    pub async fn stop_video_recording(&self) -> SessionResult<PathBuf> {
        if self.state().is_terminal() {
            return Err(SessionError::Disposed);
        }
        let (reply, result) = oneshot::channel();
        self.inner.consumers.recorder.stop(move |outcome| {
            let _ = reply.send(outcome);
        })?;
        result.await.map_err(|_| {
            SessionError::RecordingSetupFailed("Recording finalize was abandoned".to_string())
        })?
    }

    /// Start exporting frames; returns the stream handle
    ///
    /// Starting again while a stream is active returns the same handle.
    pub fn start_image_stream(&self) -> SessionResult<i64> {
        let inner = &self.inner;
        let mut current = lock(&inner.stream_handle);
        self.require_live()?;
        if let Some(handle) = *current {
            return Ok(handle);
        }

        let sink = inner.events.clone();
        let id = inner.id;
        let worker = StreamPushWorker::spawn(Box::new(move |frame: PushedFrame| {
            events::emit(
                &sink,
                id,
                SessionEvent::ImageStreamFrame {
                    width: frame.width,
                    height: frame.height,
                    bytes: frame.bytes,
                },
            );
        }))
        .map_err(|e| SessionError::CaptureFailed(format!("Failed to start stream delivery: {}", e)))?;

        let channel = Arc::new(StreamExportChannel::with_fallback(id, worker));
        let handle = registry::register(&channel);
        inner.consumers.stream.store(Some(channel));
        *current = Some(handle);
        info!(session = %id, handle, "Image stream started");
        Ok(handle)
    }

    pub fn stop_image_stream(&self, handle: i64) -> SessionResult<()> {
        let inner = &self.inner;
        let mut current = lock(&inner.stream_handle);
        if self.state().is_terminal() {
            return Err(SessionError::Disposed);
        }
        if *current != Some(handle) {
            return Err(SessionError::StreamNotFound(handle));
        }
        registry::unregister(inner.id, handle)?;
        *current = None;
        if let Some(channel) = inner.consumers.stream.swap(None) {
            channel.close();
        }
        info!(session = %inner.id, handle, "Image stream stopped");
        Ok(())
    }

    /// Claim disposal; `false` if another caller already did
    fn begin_dispose(&self) -> bool {
        loop {
            let current = self.state();
            if current.is_terminal() {
                return false;
            }
            if self
                .inner
                .state
                .transition(current, SessionState::Disposing)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Tear the session down
    ///
    /// Safe to call from several tasks at once: the first performs the
    /// disposal, every caller returns once the session is `Disposed`.
    pub async fn dispose(&self) {
        let mut disposed = self.inner.disposed.subscribe();
        if self.begin_dispose() {
            let inner = Arc::clone(&self.inner);
            if let Err(e) = tokio::task::spawn_blocking(move || inner.shutdown()).await {
                error!(session = %self.inner.id, error = %e, "Dispose task failed");
                self.inner.mark_disposed();
            }
        }
        let _ = disposed.wait_for(|done| *done).await;
    }

    /// Blocking variant of [`Self::dispose`] for non-async callers
    pub fn dispose_blocking(&self) {
        if self.begin_dispose() {
            self.inner.shutdown();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.dispose_blocking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::test_pattern::{TestPatternBackend, TestPatternOptions};
    use crate::pipelines::video::Y4mWriterFactory;
    use futures::StreamExt;
    use std::time::Duration;

    fn session(options: TestPatternOptions) -> (CaptureSession, EventStream) {
        let (sink, stream) = events::channel();
        let backends = SessionBackends {
            camera: Arc::new(TestPatternBackend::with_options(options)),
            writer: Arc::new(Y4mWriterFactory),
            still: Arc::new(PhotoEncoder::default()),
            audio: None,
        };
        (
            CaptureSession::with_backends(SessionConfig::test_pattern(64, 48), backends, sink),
            stream,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_failure_returns_to_created() {
        let (session, _events) = session(TestPatternOptions {
            open_error: Some("busy".to_string()),
            ..Default::default()
        });
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::DeviceError(ref msg) if msg.contains("busy")));
        assert_eq!(session.state(), SessionState::Created);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_and_resume() {
        let (session, _events) = session(TestPatternOptions::default());
        assert_eq!(session.pause_preview(), Err(SessionError::NotRunning));
        session.initialize().await.unwrap();

        session.pause_preview().unwrap();
        session.pause_preview().unwrap();
        assert_eq!(session.state(), SessionState::Paused);
        session.resume_preview().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        session.dispose().await;
        assert_eq!(session.resume_preview(), Err(SessionError::Disposed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_device_error_while_running_emits_event() {
        let (session, mut events) = session(TestPatternOptions {
            fail_after: Some(3),
            ..Default::default()
        });
        session.initialize().await.unwrap();

        let mut saw_error = false;
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(2), events.next()).await {
            if let SessionEvent::CameraError { .. } = msg.event {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        // the state only moves on dispose
        assert_eq!(session.state(), SessionState::Running);
        session.dispose().await;
        assert_eq!(session.state(), SessionState::Disposed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stream_fallback_pushes_events() {
        let (session, mut events) = session(TestPatternOptions::default());
        session.initialize().await.unwrap();
        let handle = session.start_image_stream().unwrap();
        assert_eq!(session.start_image_stream(), Ok(handle));

        let mut got_frame = false;
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(2), events.next()).await {
            if let SessionEvent::ImageStreamFrame { width, height, bytes } = msg.event {
                assert_eq!((width, height), (64, 48));
                assert_eq!(bytes.len(), 64 * 48 * 4);
                got_frame = true;
                break;
            }
        }
        assert!(got_frame);

        session.stop_image_stream(handle).unwrap();
        assert_eq!(
            session.stop_image_stream(handle),
            Err(SessionError::StreamNotFound(handle))
        );
        assert!(registry::lookup(handle).is_err());
        session.dispose().await;
    }
}
