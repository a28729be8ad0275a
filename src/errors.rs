// SPDX-License-Identifier: MPL-2.0

//! Error types for capture sessions and their collaborators
//!
//! [`SessionError`] is what the controlling application sees: every
//! lifecycle or capture call that can be rejected returns one of these.
//! [`BackendError`] is produced by device sources, audio sources and media
//! writers; it is folded into a [`SessionError`] at the session boundary.

use thiserror::Error;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for collaborator (device, audio, writer) operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced to the controlling application
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `initialize` called on a session that is not in `Created`
    #[error("Camera is already initialized")]
    AlreadyInitialized,
    /// Capture operation attempted while the session is not running
    #[error("Camera is not running")]
    NotRunning,
    /// `stop_video_recording` without an active recording
    #[error("No recording in progress")]
    NotRecording,
    /// `start_video_recording` while a recording is active
    #[error("Recording is already in progress")]
    AlreadyRecording,
    /// Photo requested before any frame was captured
    #[error("No frame available yet")]
    NoFrameAvailable,
    /// No frame arrived within the initialization deadline
    #[error("Camera initialization timed out, no frames received")]
    InitializationTimeout,
    /// Device source failure
    #[error("Device error: {0}")]
    DeviceError(String),
    /// Writer could not be created or the worker could not start
    #[error("Recording setup failed: {0}")]
    RecordingSetupFailed(String),
    /// Still image encode or write failure
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    /// Operation attempted after disposal
    #[error("Camera session has been disposed")]
    Disposed,
    /// Stream handle is unknown or already released
    #[error("Image stream {0} not found")]
    StreamNotFound(i64),
    /// Session id is unknown or already disposed
    #[error("Camera session {0} not found")]
    SessionNotFound(u64),
    /// Configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Stable machine-readable code, suitable for a message protocol
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::AlreadyInitialized => "already_initialized",
            SessionError::NotRunning => "not_running",
            SessionError::NotRecording => "not_recording",
            SessionError::AlreadyRecording => "already_recording",
            SessionError::NoFrameAvailable => "no_frame",
            SessionError::InitializationTimeout => "init_timeout",
            SessionError::DeviceError(_) => "device_error",
            SessionError::RecordingSetupFailed(_) => "recording_setup_failed",
            SessionError::CaptureFailed(_) => "capture_failed",
            SessionError::Disposed => "disposed",
            SessionError::StreamNotFound(_) => "stream_not_found",
            SessionError::SessionNotFound(_) => "camera_not_found",
            SessionError::Config(_) => "config_error",
        }
    }
}

/// Errors reported by device sources, audio sources and media writers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Backend is not available on this system
    #[error("Backend not available: {0}")]
    NotAvailable(String),
    /// Failed to open or start the device
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Format not supported
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),
    /// Device reported an error while streaming
    #[error("Stream error: {0}")]
    Stream(String),
    /// Encoding or muxing failed
    #[error("Encoding failed: {0}")]
    Encoding(String),
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        SessionError::DeviceError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_maps_to_device_error() {
        let err: SessionError = BackendError::DeviceNotFound("/dev/video9".into()).into();
        assert_eq!(
            err,
            SessionError::DeviceError("Device not found: /dev/video9".into())
        );
        assert_eq!(err.code(), "device_error");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SessionError::InitializationTimeout.to_string(),
            "Camera initialization timed out, no frames received"
        );
        assert_eq!(
            SessionError::CaptureFailed("disk full".into()).to_string(),
            "Capture failed: disk full"
        );
    }

    #[test]
    fn test_codes_are_unique() {
        let all = [
            SessionError::AlreadyInitialized,
            SessionError::NotRunning,
            SessionError::NotRecording,
            SessionError::AlreadyRecording,
            SessionError::NoFrameAvailable,
            SessionError::InitializationTimeout,
            SessionError::DeviceError(String::new()),
            SessionError::RecordingSetupFailed(String::new()),
            SessionError::CaptureFailed(String::new()),
            SessionError::Disposed,
            SessionError::StreamNotFound(1),
            SessionError::SessionNotFound(1),
            SessionError::Config(String::new()),
        ];
        let mut codes: Vec<_> = all.iter().map(SessionError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
