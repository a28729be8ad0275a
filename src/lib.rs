// SPDX-License-Identifier: MPL-2.0

//! Camera Desktop - capture sessions for desktop cameras
//!
//! A capture session reads frames from one device on a dedicated producer
//! thread and fans each frame out to four consumers: a snapshot for still
//! photos, a gated queue feeding a recording worker, a triple-buffered
//! preview hand-off for a renderer, and a double-buffered export channel for
//! external readers.
//!
//! # Architecture
//!
//! - [`session`]: `CaptureSession` state machine, frame distribution, events,
//!   stream handle registry and a command-level `SessionManager`
//! - [`backends`]: device and microphone boundaries with GStreamer and
//!   synthetic implementations
//! - [`pipelines`]: preview, photo, video and stream consumers
//! - [`config`]: session configuration
//! - [`storage`]: output file naming
//!
//! # Example
//!
//! ```ignore
//! let (events, _rx) = camera_desktop::session::events::channel();
//! let session = CaptureSession::new(SessionConfig::test_pattern(1280, 720), events);
//! let (width, height) = session.initialize().await?;
//! let photo = session.take_picture().await?;
//! session.dispose().await;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::SessionConfig;
pub use constants::{BitratePreset, ResolutionPreset};
pub use errors::{SessionError, SessionResult};
pub use session::{CaptureSession, SessionBackends, SessionEvent, SessionId, SessionManager, SessionState};
