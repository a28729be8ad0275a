// SPDX-License-Identifier: GPL-3.0-only

//! Command surface for a controlling application
//!
//! Sessions are addressed by [`SessionId`]; every command resolves the id
//! first and fails with [`SessionError::SessionNotFound`] for unknown or
//! already disposed sessions. All sessions report through one event sink.

use super::{CaptureSession, EventSink, SessionBackends, SessionId};
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A request addressed to one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Initialize,
    Dispose,
    PausePreview,
    ResumePreview,
    TakePicture,
    StartVideoRecording,
    StopVideoRecording,
    StartImageStream,
    StopImageStream { handle: i64 },
    SetMirror { enabled: bool },
    /// Answered without touching the session; any id is accepted
    PlatformCapabilities,
}

/// Runtime controls this platform honors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCapabilities {
    pub supports_mirror_control: bool,
    pub supports_video_fps_control: bool,
    pub supports_video_bitrate_control: bool,
}

impl PlatformCapabilities {
    pub fn current() -> Self {
        Self {
            supports_mirror_control: true,
            supports_video_fps_control: true,
            supports_video_bitrate_control: true,
        }
    }
}

/// Successful outcome of a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Initialized { width: u32, height: u32 },
    Done,
    Path(PathBuf),
    StreamHandle(i64),
    Capabilities(PlatformCapabilities),
}

type BackendSelector = Box<dyn Fn(&SessionConfig) -> SessionBackends + Send + Sync>;

pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<CaptureSession>>>,
    events: EventSink,
    backends: BackendSelector,
}

impl SessionManager {
    /// Manager creating sessions with the default collaborators
    pub fn new(events: EventSink) -> Self {
        Self::with_backends(events, SessionBackends::for_config)
    }

    /// Manager choosing collaborators per config
    pub fn with_backends<F>(events: EventSink, backends: F) -> Self
    where
        F: Fn(&SessionConfig) -> SessionBackends + Send + Sync + 'static,
    {
        Self {
            sessions: Mutex::new(HashMap::new()),
            events,
            backends: Box::new(backends),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<CaptureSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, config: SessionConfig) -> SessionId {
        let backends = (self.backends)(&config);
        let session = CaptureSession::with_backends(config, backends, self.events.clone());
        let id = session.id();
        self.sessions().insert(id, Arc::new(session));
        debug!(session = %id, "Session registered with manager");
        id
    }

    pub fn get(&self, id: SessionId) -> SessionResult<Arc<CaptureSession>> {
        self.sessions()
            .get(&id)
            .cloned()
            .ok_or(SessionError::SessionNotFound(id.0))
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn platform_capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::current()
    }

    /// Run one command against a session
    pub async fn execute(&self, id: SessionId, command: Command) -> SessionResult<Reply> {
        if command == Command::PlatformCapabilities {
            return Ok(Reply::Capabilities(self.platform_capabilities()));
        }
        let session = self.get(id)?;
        debug!(session = %id, ?command, "Executing command");
        match command {
            Command::Initialize => session
                .initialize()
                .await
                .map(|(width, height)| Reply::Initialized { width, height }),
            Command::Dispose => {
                session.dispose().await;
                self.sessions().remove(&id);
                Ok(Reply::Done)
            }
            Command::PausePreview => session.pause_preview().map(|_| Reply::Done),
            Command::ResumePreview => session.resume_preview().map(|_| Reply::Done),
            Command::TakePicture => session.take_picture().await.map(Reply::Path),
            Command::StartVideoRecording => session.start_video_recording().await.map(Reply::Path),
            Command::StopVideoRecording => session.stop_video_recording().await.map(Reply::Path),
            Command::StartImageStream => session.start_image_stream().map(Reply::StreamHandle),
            Command::StopImageStream { handle } => {
                session.stop_image_stream(handle).map(|_| Reply::Done)
            }
            Command::SetMirror { enabled } => session.set_mirror(enabled).map(|_| Reply::Done),
            Command::PlatformCapabilities => Ok(Reply::Capabilities(self.platform_capabilities())),
        }
    }

    /// Dispose every session
    pub async fn dispose_all(&self) {
        let sessions: Vec<_> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.dispose().await;
        }
    }
}
