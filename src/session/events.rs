// SPDX-License-Identifier: GPL-3.0-only

//! Asynchronous notifications to the controlling application

use super::SessionId;
use futures::channel::mpsc;
use serde::Serialize;

/// What a session reports outside of any call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    /// First frame arrived with these dimensions
    CameraInitialized { width: u32, height: u32 },
    /// The device failed or ended while live
    CameraError { description: String },
    /// Disposal completed; sent exactly once per session
    CameraClosing,
    /// Frame copy on the push fallback of an image stream
    ImageStreamFrame {
        width: u32,
        height: u32,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
}

/// An event tagged with its session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMessage {
    pub session: SessionId,
    #[serde(flatten)]
    pub event: SessionEvent,
}

pub type EventSink = mpsc::UnboundedSender<SessionMessage>;
pub type EventStream = mpsc::UnboundedReceiver<SessionMessage>;

/// New event channel
pub fn channel() -> (EventSink, EventStream) {
    mpsc::unbounded()
}

/// Send, ignoring a receiver that went away
pub(crate) fn emit(sink: &EventSink, session: SessionId, event: SessionEvent) {
    if sink.unbounded_send(SessionMessage { session, event }).is_err() {
        tracing::trace!(%session, "Event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_flat() {
        let msg = SessionMessage {
            session: SessionId(4),
            event: SessionEvent::CameraInitialized {
                width: 1280,
                height: 720,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "cameraInitialized");
        assert_eq!(json["session"], 4);
        assert_eq!(json["width"], 1280);
    }
}
