// SPDX-License-Identifier: GPL-3.0-only

//! Double-buffered frame export for external readers
//!
//! ```text
//!            writer                          reader
//!   ┌──────────────────────┐
//!   │ back region          │  ready=false, fill header + payload,
//!   │  header | payload    │  ready=true (release), front = back
//!   └──────────────────────┘
//!   ┌──────────────────────┐        load front, ready (acquire),
//!   │ front region         │ ─────▶ skip unless sequence > last seen,
//!   │  header | payload    │        copy payload
//!   └──────────────────────┘
//! ```
//!
//! Each publish either notifies the registered callback with the session id,
//! so the owner of the callback pulls through a [`StreamReader`], or, when no
//! callback is registered, hands a copy to the [`StreamPushWorker`].

use crate::backends::camera::types::PixelLayout;
use crate::session::SessionId;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Called after every publish while registered
pub type FrameNotifier = Box<dyn Fn(SessionId) + Send + Sync>;

/// Receives frames on the push fallback path
pub type PushSink = Box<dyn Fn(PushedFrame) + Send + Sync>;

/// Fixed header preceding each region's payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamHeader {
    pub sequence: i64,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    /// [`PixelLayout::tag`] of the payload
    pub pixel_format: u32,
}

/// A frame copied out of the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub header: StreamHeader,
    pub pixels: Vec<u8>,
}

/// Copy delivered through the push fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedFrame {
    pub sequence: i64,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct RegionData {
    header: StreamHeader,
    payload: Vec<u8>,
}

#[derive(Default)]
struct Region {
    ready: AtomicBool,
    data: RwLock<RegionData>,
}

pub struct StreamExportChannel {
    session_id: SessionId,
    regions: [Region; 2],
    front: AtomicUsize,
    /// Serializes writers; the producer is the only one in practice
    writer: Mutex<i64>,
    callback: ArcSwapOption<FrameNotifier>,
    fallback: Option<StreamPushWorker>,
}

impl StreamExportChannel {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            regions: [Region::default(), Region::default()],
            front: AtomicUsize::new(0),
            writer: Mutex::new(0),
            callback: ArcSwapOption::empty(),
            fallback: None,
        }
    }

    /// Channel that pushes copies to `fallback` while no callback is registered
    pub fn with_fallback(session_id: SessionId, fallback: StreamPushWorker) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::new(session_id)
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn register_callback(&self, callback: FrameNotifier) {
        self.callback.store(Some(Arc::new(callback)));
        debug!(session = %self.session_id, "Stream callback registered");
    }

    pub fn unregister_callback(&self) {
        self.callback.store(None);
        debug!(session = %self.session_id, "Stream callback unregistered");
    }

    pub fn has_callback(&self) -> bool {
        self.callback.load().is_some()
    }

    /// Write a frame into the back region and make it the front
    ///
    /// Returns the sequence number assigned to the frame.
    pub fn publish(&self, pixels: &[u8], width: u32, height: u32, layout: PixelLayout) -> i64 {
        let mut last_sequence = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = *last_sequence + 1;
        *last_sequence = sequence;

        let back = 1 - self.front.load(Ordering::Acquire);
        let region = &self.regions[back];
        region.ready.store(false, Ordering::Release);
        {
            let mut data = region.data.write().unwrap_or_else(PoisonError::into_inner);
            data.payload.clear();
            data.payload.extend_from_slice(pixels);
            data.header = StreamHeader {
                sequence,
                width,
                height,
                bytes_per_row: width * PixelLayout::BYTES_PER_PIXEL,
                pixel_format: layout.tag(),
            };
        }
        region.ready.store(true, Ordering::Release);
        self.front.store(back, Ordering::Release);
        drop(last_sequence);

        // One load per publish; an unregister racing with this call only
        // affects the next frame.
        match self.callback.load_full() {
            Some(callback) => callback(self.session_id),
            None => {
                if let Some(fallback) = &self.fallback {
                    fallback.offer(PushedFrame {
                        sequence,
                        width,
                        height,
                        bytes: pixels.to_vec(),
                    });
                }
            }
        }
        trace!(sequence, width, height, "Stream frame published");
        sequence
    }

    /// Drop the callback and stop the push fallback
    ///
    /// Readers holding the channel can still read the last frame.
    pub fn close(&self) {
        self.callback.store(None);
        if let Some(fallback) = &self.fallback {
            fallback.shutdown();
        }
    }

    /// Sequence of the newest published frame, 0 before the first
    pub fn latest_sequence(&self) -> i64 {
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_after(&self, last_seen: i64) -> Option<StreamFrame> {
        let region = &self.regions[self.front.load(Ordering::Acquire)];
        if !region.ready.load(Ordering::Acquire) {
            return None;
        }
        let data = region.data.read().unwrap_or_else(PoisonError::into_inner);
        // The writer clears `ready` before it can take the write lock, so a
        // set flag seen under the read lock means the payload is complete.
        if !region.ready.load(Ordering::Acquire) || data.header.sequence <= last_seen {
            return None;
        }
        Some(StreamFrame {
            header: data.header,
            pixels: data.payload.clone(),
        })
    }
}

/// Non-owning consumer that tracks the last sequence it saw
pub struct StreamReader {
    channel: Arc<StreamExportChannel>,
    last_seen: i64,
}

impl StreamReader {
    pub fn new(channel: Arc<StreamExportChannel>) -> Self {
        Self {
            channel,
            last_seen: 0,
        }
    }

    /// Copy the front frame if it is newer than the last one read
    pub fn read(&mut self) -> Option<StreamFrame> {
        let frame = self.channel.read_after(self.last_seen)?;
        self.last_seen = frame.header.sequence;
        Some(frame)
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }
}

#[derive(Default)]
struct PushSlot {
    latest: Option<PushedFrame>,
    closed: bool,
}

struct PushShared {
    slot: Mutex<PushSlot>,
    available: Condvar,
    delivered: AtomicU64,
}

/// Delivery thread for the message-based fallback
///
/// Holds at most one pending frame; a newer frame replaces an undelivered
/// one so a slow sink never builds a backlog.
pub struct StreamPushWorker {
    shared: Arc<PushShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamPushWorker {
    pub fn spawn(sink: PushSink) -> std::io::Result<Self> {
        let shared = Arc::new(PushShared {
            slot: Mutex::new(PushSlot::default()),
            available: Condvar::new(),
            delivered: AtomicU64::new(0),
        });
        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("stream-push".to_string())
                .spawn(move || push_loop(&shared, &sink))?
        };
        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn offer(&self, frame: PushedFrame) {
        let mut slot = self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.closed {
            return;
        }
        if slot.latest.replace(frame).is_some() {
            trace!("Stream push sink behind, replacing pending frame");
        }
        drop(slot);
        self.shared.available.notify_one();
    }

    /// Frames handed to the sink so far
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Stop the delivery thread and wait for it
    pub fn shutdown(&self) {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.shared.available.notify_all();
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Stream push thread panicked");
            }
        }
    }
}

impl Drop for StreamPushWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn push_loop(shared: &PushShared, sink: &PushSink) {
    loop {
        let frame = {
            let mut slot = shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if slot.closed {
                    return;
                }
                if let Some(frame) = slot.latest.take() {
                    break frame;
                }
                slot = shared
                    .available
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        sink(frame);
        shared.delivered.fetch_add(1, Ordering::Relaxed);
    }
}
