// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle state
//!
//! ```text
//! Created ──initialize──▶ Initializing ──first frame──▶ Running ⇄ Paused
//!    ▲                        │                            │        │
//!    └── timeout / failure ───┘                            ▼        ▼
//!                                       (any) ──dispose──▶ Disposing ──▶ Disposed
//! ```
//!
//! The state lives in an atomic so the producer thread, the timeout task and
//! the application thread can race on transitions; every transition is a
//! compare-exchange and the loser observes the winner's state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Initializing = 1,
    Running = 2,
    Paused = 3,
    Disposing = 4,
    Disposed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::Paused,
            4 => Self::Disposing,
            _ => Self::Disposed,
        }
    }

    /// Producing frames, with or without preview
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Disposal started or finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disposing | Self::Disposed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Disposing => "disposing",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Lock-free holder for a [`SessionState`]
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from → to`; on failure returns the state actually found
    pub fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_reports_current_state() {
        let state = AtomicSessionState::new(SessionState::Created);
        assert_eq!(state.transition(SessionState::Created, SessionState::Initializing), Ok(()));
        assert_eq!(
            state.transition(SessionState::Created, SessionState::Initializing),
            Err(SessionState::Initializing)
        );
        assert_eq!(state.load(), SessionState::Initializing);
    }

    #[test]
    fn test_state_classes() {
        assert!(SessionState::Paused.is_live());
        assert!(!SessionState::Initializing.is_live());
        assert!(SessionState::Disposing.is_terminal());
        assert_eq!(SessionState::Running.to_string(), "running");
    }
}
