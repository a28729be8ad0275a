// SPDX-License-Identifier: GPL-3.0-only

//! Gated, bounded queue between the producer and the encode worker
//!
//! ```text
//! producer ──push_video──┐
//!                        ├─▶ gate ─▶ [ bounded FIFO ] ─▶ next_item() ─▶ worker
//! audio pump ─push_audio─┘
//! ```
//!
//! The gate starts closed. Closing it and appending the end marker happen
//! under the queue lock, so the marker is ordered strictly after the last
//! item that passed the open gate.
//!
//! When the video bound is reached the newest frame is dropped and the frame
//! counter does not advance, keeping presentation times evenly spaced. Audio
//! over its bound is dropped outright. Frames whose size differs from the
//! recording's are refused before they are stamped, for the same reason.

use crate::backends::audio::AudioSample;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Work item for the encode worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordItem {
    Video {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        pts: Duration,
    },
    Audio(AudioSample),
    EndOfStream,
}

/// What happened to a pushed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Queue full, item shed
    Dropped,
    /// Recording not accepting data
    GateClosed,
    /// Frame size differs from the recording's
    SizeMismatch,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<RecordItem>,
    video_len: usize,
    audio_len: usize,
    frames_enqueued: u64,
    end_marked: bool,
    aborted: bool,
}

/// Bounded FIFO with a pass/drop gate in front of it
pub struct RecordEncodeQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    gate_open: AtomicBool,
    max_video: usize,
    max_audio: usize,
    frame_duration: Duration,
    frame_size: Option<(u32, u32)>,
    dropped_video: AtomicU64,
    dropped_audio: AtomicU64,
}

impl RecordEncodeQueue {
    /// New queue with the gate closed
    pub fn new(max_video: usize, max_audio: usize, frame_duration: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            gate_open: AtomicBool::new(false),
            max_video: max_video.max(1),
            max_audio: max_audio.max(1),
            frame_duration,
            frame_size: None,
            dropped_video: AtomicU64::new(0),
            dropped_audio: AtomicU64::new(0),
        }
    }

    /// Only accept frames of this size
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start passing data
    pub fn open_gate(&self) {
        let state = self.lock();
        if !state.end_marked && !state.aborted {
            self.gate_open.store(true, Ordering::Release);
        }
    }

    pub fn is_open(&self) -> bool {
        self.gate_open.load(Ordering::Acquire)
    }

    /// Copy a packed frame in, stamping it with the next constant-rate pts
    pub fn push_video(&self, pixels: &[u8], width: u32, height: u32) -> PushOutcome {
        if !self.is_open() {
            return PushOutcome::GateClosed;
        }
        if self.frame_size.is_some_and(|size| size != (width, height)) {
            self.dropped_video.fetch_add(1, Ordering::Relaxed);
            trace!(width, height, "Frame size differs from recording, dropping");
            return PushOutcome::SizeMismatch;
        }
        {
            let state = self.lock();
            if state.video_len >= self.max_video {
                drop(state);
                self.dropped_video.fetch_add(1, Ordering::Relaxed);
                trace!(width, height, "Record queue full, dropping newest frame");
                return PushOutcome::Dropped;
            }
        }

        // Only the producer pushes video, so the length can only have shrunk
        // while copying; the gate is rechecked below.
        let pixels = pixels.to_vec();

        let mut state = self.lock();
        if !self.is_open() {
            return PushOutcome::GateClosed;
        }
        let pts = Duration::from_nanos(self.frame_duration.as_nanos() as u64 * state.frames_enqueued);
        state.frames_enqueued += 1;
        state.video_len += 1;
        state.items.push_back(RecordItem::Video {
            pixels,
            width,
            height,
            pts,
        });
        drop(state);
        self.available.notify_one();
        PushOutcome::Enqueued
    }

    pub fn push_audio(&self, sample: AudioSample) -> PushOutcome {
        let mut state = self.lock();
        if !self.is_open() {
            return PushOutcome::GateClosed;
        }
        if state.audio_len >= self.max_audio {
            drop(state);
            self.dropped_audio.fetch_add(1, Ordering::Relaxed);
            trace!("Record queue full, dropping audio sample");
            return PushOutcome::Dropped;
        }
        state.audio_len += 1;
        state.items.push_back(RecordItem::Audio(sample));
        drop(state);
        self.available.notify_one();
        PushOutcome::Enqueued
    }

    /// Close the gate and append the end marker
    ///
    /// Returns `false` if the queue was already ended or aborted.
    pub fn close_and_mark_end(&self) -> bool {
        let mut state = self.lock();
        self.gate_open.store(false, Ordering::Release);
        if state.end_marked || state.aborted {
            return false;
        }
        state.end_marked = true;
        state.items.push_back(RecordItem::EndOfStream);
        drop(state);
        self.available.notify_all();
        true
    }

    /// Close the gate and discard everything still queued
    ///
    /// The worker's next `next_item` returns `None`.
    pub fn abort(&self) {
        let mut state = self.lock();
        self.gate_open.store(false, Ordering::Release);
        state.aborted = true;
        let discarded = state.items.len();
        state.items.clear();
        state.video_len = 0;
        state.audio_len = 0;
        drop(state);
        if discarded > 0 {
            trace!(discarded, "Discarded unconsumed record queue tail");
        }
        self.available.notify_all();
    }

    /// Block until an item is available
    ///
    /// `None` once the queue was aborted.
    pub fn next_item(&self) -> Option<RecordItem> {
        let mut state = self.lock();
        loop {
            if state.aborted {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                match item {
                    RecordItem::Video { .. } => state.video_len -= 1,
                    RecordItem::Audio(_) => state.audio_len -= 1,
                    RecordItem::EndOfStream => {}
                }
                return Some(item);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Video frames currently buffered
    pub fn video_len(&self) -> usize {
        self.lock().video_len
    }

    /// Frames that were stamped and enqueued
    pub fn frames_enqueued(&self) -> u64 {
        self.lock().frames_enqueued
    }

    pub fn dropped_video(&self) -> u64 {
        self.dropped_video.load(Ordering::Relaxed)
    }

    pub fn dropped_audio(&self) -> u64 {
        self.dropped_audio.load(Ordering::Relaxed)
    }
}
