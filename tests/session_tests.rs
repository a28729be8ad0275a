// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture session lifecycle

use camera_desktop::backends::camera::test_pattern::{TestPatternBackend, TestPatternOptions};
use camera_desktop::pipelines::photo::PhotoEncoder;
use camera_desktop::pipelines::video::Y4mWriterFactory;
use camera_desktop::session::{EventStream, events, registry};
use camera_desktop::{
    CaptureSession, SessionBackends, SessionConfig, SessionError, SessionEvent, SessionState,
};
use futures::{FutureExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn session_with(
    config: SessionConfig,
    options: TestPatternOptions,
    dir: &Path,
) -> (CaptureSession, EventStream) {
    let (sink, stream) = events::channel();
    let backends = SessionBackends {
        camera: Arc::new(TestPatternBackend::with_options(options)),
        writer: Arc::new(Y4mWriterFactory),
        still: Arc::new(PhotoEncoder::default()),
        audio: None,
    };
    let config = SessionConfig {
        output_dir: Some(dir.to_path_buf()),
        ..config
    };
    (CaptureSession::with_backends(config, backends, sink), stream)
}

/// Every event delivered so far
fn drain(events: &mut EventStream) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Some(Some(msg)) = events.next().now_or_never() {
        out.push(msg.event);
    }
    out
}

/// Number of frames in a y4m file of I420 frames
fn y4m_frame_count(path: &Path, width: usize, height: usize) -> usize {
    let data = std::fs::read(path).unwrap();
    let header_end = data.iter().position(|b| *b == b'\n').unwrap() + 1;
    let frame_len = b"FRAME\n".len() + width * height * 3 / 2;
    let body = data.len() - header_end;
    assert_eq!(body % frame_len, 0, "truncated frame in recording");
    body / frame_len
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initialize_reports_actual_size_once() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut events) = session_with(
        SessionConfig::test_pattern(1280, 720),
        TestPatternOptions::default(),
        dir.path(),
    );
    assert_eq!(session.state(), SessionState::Created);

    assert_eq!(session.initialize().await, Ok((1280, 720)));
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.dimensions(), Some((1280, 720)));
    assert_eq!(
        session.initialize().await,
        Err(SessionError::AlreadyInitialized)
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let initialized = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::CameraInitialized { .. }))
        .count();
    assert_eq!(initialized, 1);
    session.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_operations_before_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig::test_pattern(64, 48),
        TestPatternOptions::default(),
        dir.path(),
    );
    assert_eq!(session.pause_preview(), Err(SessionError::NotRunning));
    assert_eq!(session.resume_preview(), Err(SessionError::NotRunning));
    assert_eq!(session.take_picture().await, Err(SessionError::NotRunning));
    assert_eq!(
        session.start_video_recording().await,
        Err(SessionError::NotRunning)
    );
    assert_eq!(
        session.stop_video_recording().await,
        Err(SessionError::NotRecording)
    );
    assert_eq!(session.start_image_stream(), Err(SessionError::NotRunning));
    session.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_operations_after_dispose() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig::test_pattern(64, 48),
        TestPatternOptions::default(),
        dir.path(),
    );
    session.initialize().await.unwrap();
    session.dispose().await;

    assert_eq!(session.state(), SessionState::Disposed);
    assert_eq!(session.initialize().await, Err(SessionError::Disposed));
    assert_eq!(session.take_picture().await, Err(SessionError::Disposed));
    assert_eq!(session.pause_preview(), Err(SessionError::Disposed));
    assert_eq!(session.start_image_stream(), Err(SessionError::Disposed));
    assert_eq!(session.set_mirror(false), Err(SessionError::Disposed));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_take_picture_waits_for_first_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig::test_pattern(320, 240),
        TestPatternOptions {
            startup_delay: Duration::from_millis(600),
            ..Default::default()
        },
        dir.path(),
    );
    let session = Arc::new(session);

    let init = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.initialize().await }
    });
    while session.state() == SessionState::Created {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.state(), SessionState::Initializing);
    assert_eq!(
        session.take_picture().await,
        Err(SessionError::NoFrameAvailable)
    );

    assert_eq!(init.await.unwrap(), Ok((320, 240)));
    let photo = session.take_picture().await.unwrap();
    assert!(photo.starts_with(dir.path()));
    assert_eq!(image::image_dimensions(&photo).unwrap(), (320, 240));
    session.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initialization_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut events) = session_with(
        SessionConfig {
            init_timeout_ms: 300,
            ..SessionConfig::test_pattern(64, 48)
        },
        TestPatternOptions {
            startup_delay: Duration::from_secs(5),
            ..Default::default()
        },
        dir.path(),
    );

    assert_eq!(
        session.initialize().await,
        Err(SessionError::InitializationTimeout)
    );
    assert_eq!(session.state(), SessionState::Created);
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::CameraInitialized { .. }))
    );
    session.dispose().await;
    assert_eq!(session.state(), SessionState::Disposed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_record_start_stop_produces_file() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig::test_pattern(64, 48),
        TestPatternOptions::default(),
        dir.path(),
    );
    session.initialize().await.unwrap();

    let started = session.start_video_recording().await.unwrap();
    assert!(session.is_recording());
    assert_eq!(
        session.start_video_recording().await,
        Err(SessionError::AlreadyRecording)
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    let finished = session.stop_video_recording().await.unwrap();
    assert_eq!(started, finished);
    assert!(!session.is_recording());
    assert!(y4m_frame_count(&finished, 64, 48) > 0);
    let name = finished.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(&format!("camera_desktop_{}_", session.id())));
    assert!(name.ends_with(".y4m"));
    session.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispose_while_recording_finalizes() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig::test_pattern(64, 48),
        TestPatternOptions::default(),
        dir.path(),
    );
    session.initialize().await.unwrap();
    let path = session.start_video_recording().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    session.dispose().await;
    assert!(!session.is_recording());
    let header = std::fs::read(&path).unwrap();
    assert!(header.starts_with(b"YUV4MPEG2 W64 H48"));
    y4m_frame_count(&path, 64, 48);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_dispose_closes_once() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut events) = session_with(
        SessionConfig::test_pattern(64, 48),
        TestPatternOptions::default(),
        dir.path(),
    );
    session.initialize().await.unwrap();
    let handle = session.start_image_stream().unwrap();

    let session = Arc::new(session);
    let (a, b) = (Arc::clone(&session), Arc::clone(&session));
    let (first, second, ()) = tokio::join!(
        tokio::spawn(async move { a.dispose().await }),
        tokio::spawn(async move { b.dispose().await }),
        session.dispose(),
    );
    first.unwrap();
    second.unwrap();
    assert_eq!(session.state(), SessionState::Disposed);
    session.dispose().await;

    let closing = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::CameraClosing))
        .count();
    assert_eq!(closing, 1);
    assert!(registry::lookup(handle).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recording_and_stream_see_each_frame_once() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig::test_pattern(32, 16),
        TestPatternOptions {
            frame_limit: Some(40),
            ..Default::default()
        },
        dir.path(),
    );
    session.initialize().await.unwrap();
    let handle = session.start_image_stream().unwrap();
    let mut reader = registry::open_reader(handle).unwrap();
    let path = session.start_video_recording().await.unwrap();

    let mut sequences = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if let Some(frame) = reader.read() {
            assert_eq!((frame.header.width, frame.header.height), (32, 16));
            assert_eq!(frame.pixels.len(), 32 * 16 * 4);
            sequences.push(frame.header.sequence);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(!sequences.is_empty());
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    session.stop_video_recording().await.unwrap();
    let published = reader.last_seen();
    let recorded = y4m_frame_count(&path, 32, 16);
    assert!(recorded > 0);
    assert!(recorded as i64 <= published);
    session.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispose_racing_initialize_always_resolves() {
    let dir = tempfile::tempdir().unwrap();
    for round in 0..25u64 {
        let (session, _events) = session_with(
            SessionConfig::test_pattern(64, 48),
            TestPatternOptions {
                startup_delay: Duration::from_millis(200),
                ..Default::default()
            },
            dir.path(),
        );
        let session = Arc::new(session);

        let init = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.initialize().await }
        });
        let dispose = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                if round % 5 != 0 {
                    tokio::time::sleep(Duration::from_micros(round * 40)).await;
                }
                session.dispose().await;
            }
        });

        let result = tokio::time::timeout(Duration::from_secs(5), init)
            .await
            .expect("initialize hung while disposing")
            .unwrap();
        assert!(
            matches!(result, Ok(_) | Err(SessionError::Disposed)),
            "unexpected result {:?}",
            result
        );
        dispose.await.unwrap();
        assert_eq!(session.state(), SessionState::Disposed);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_reply_does_not_wait_for_slow_open() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session_with(
        SessionConfig {
            init_timeout_ms: 200,
            ..SessionConfig::test_pattern(64, 48)
        },
        TestPatternOptions {
            open_delay: Duration::from_secs(3),
            ..Default::default()
        },
        dir.path(),
    );

    let started = std::time::Instant::now();
    assert_eq!(
        session.initialize().await,
        Err(SessionError::InitializationTimeout)
    );
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(session.state(), SessionState::Created);
    session.dispose().await;
}
