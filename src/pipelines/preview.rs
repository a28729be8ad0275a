// SPDX-License-Identifier: GPL-3.0-only

//! Triple-buffered hand-off between the producer and the preview renderer
//!
//! Three equally sized buffers rotate between the tags `write`, `ready` and
//! `read`. The producer fills `write` and swaps it with `ready`; the renderer
//! swaps `ready` into `read` when a newer frame exists and draws `read`. The
//! lock only guards tag bookkeeping, never the pixel copy.
//!
//! The renderer receives its buffer as an `Arc`. If it is still holding an
//! old buffer when that buffer rotates back to `write`, the producer writes
//! into a fresh allocation instead, so a buffer visible to the renderer is
//! never mutated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Callback fired after each publish, typically waking a renderer
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// A frame handed to the renderer
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub pixels: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

const WRITE: usize = 0;
const READY: usize = 1;
const READ: usize = 2;

struct Slots {
    buffers: [Option<Arc<Vec<u8>>>; 3],
    /// Buffer index currently holding each tag, indexed by WRITE/READY/READ
    tags: [usize; 3],
    has_new_frame: bool,
    has_any_frame: bool,
    width: u32,
    height: u32,
    /// Bumped on reallocation and clear; a copy started under an older
    /// generation is discarded
    generation: u64,
}

impl Slots {
    fn empty() -> Self {
        Self {
            buffers: [None, None, None],
            tags: [0, 1, 2],
            has_new_frame: false,
            has_any_frame: false,
            width: 0,
            height: 0,
            generation: 0,
        }
    }

    fn reallocate(&mut self, width: u32, height: u32, len: usize) {
        for slot in &mut self.buffers {
            *slot = Some(Arc::new(vec![0u8; len]));
        }
        self.tags = [0, 1, 2];
        self.has_new_frame = false;
        self.has_any_frame = false;
        self.width = width;
        self.height = height;
        self.generation += 1;
    }
}

/// Lock-minimal producer → renderer exchange
pub struct TriplePreviewBuffer {
    slots: Mutex<Slots>,
    listener: Mutex<Option<FrameListener>>,
    published: AtomicU64,
}

impl Default for TriplePreviewBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TriplePreviewBuffer {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots::empty()),
            listener: Mutex::new(None),
            published: AtomicU64::new(0),
        }
    }

    /// Register the "frame available" callback
    pub fn set_frame_listener(&self, listener: Option<FrameListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Copy a packed frame into the `write` buffer and make it `ready`
    ///
    /// Producer thread only.
    pub fn publish(&self, pixels: &[u8], width: u32, height: u32) {
        let len = pixels.len();

        let (target, generation) = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let size_mismatch = slots.buffers.iter().flatten().any(|b| b.len() != len);
            if slots.width != width || slots.height != height || size_mismatch {
                debug!(width, height, "Reallocating preview buffers");
                slots.reallocate(width, height, len);
            }
            let index = slots.tags[WRITE];
            (slots.buffers[index].take(), slots.generation)
        };

        // Copy outside the lock
        let mut buffer = match target {
            Some(arc) if Arc::strong_count(&arc) == 1 => arc,
            _ => {
                trace!("Preview write buffer still referenced, allocating a fresh one");
                Arc::new(vec![0u8; len])
            }
        };
        if let Some(bytes) = Arc::get_mut(&mut buffer) {
            bytes.copy_from_slice(pixels);
        }

        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.generation != generation {
                // cleared or reallocated while copying
                return;
            }
            let index = slots.tags[WRITE];
            slots.buffers[index] = Some(buffer);
            slots.tags.swap(WRITE, READY);
            slots.has_new_frame = true;
            slots.has_any_frame = true;
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Latest frame for the renderer
    ///
    /// Promotes `ready` to `read` when a newer frame was published, otherwise
    /// returns the previous `read` frame again. `None` before the first
    /// publish. Never blocks on a pixel copy.
    pub fn consume(&self) -> Option<PreviewFrame> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.has_any_frame {
            return None;
        }
        if slots.has_new_frame {
            slots.tags.swap(READY, READ);
            slots.has_new_frame = false;
        }
        let index = slots.tags[READ];
        slots.buffers[index].clone().map(|pixels| PreviewFrame {
            pixels,
            width: slots.width,
            height: slots.height,
        })
    }

    /// Whether a frame newer than the last consumed one is waiting
    pub fn has_new_frame(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_new_frame
    }

    /// Number of frames published since creation
    pub fn frames_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Drop all buffers
    ///
    /// Only called once the producer has stopped.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = slots.generation + 1;
        *slots = Slots::empty();
        slots.generation = generation;
        drop(slots);
        self.set_frame_listener(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_consume_before_publish() {
        let buffer = TriplePreviewBuffer::new();
        assert!(buffer.consume().is_none());
    }

    #[test]
    fn test_consume_returns_latest_and_repeats() {
        let buffer = TriplePreviewBuffer::new();
        buffer.publish(&[1; 16], 2, 2);
        buffer.publish(&[2; 16], 2, 2);

        let frame = buffer.consume().unwrap();
        assert_eq!(frame.pixels[0], 2);
        assert!(!buffer.has_new_frame());

        // no new frame: same buffer again
        let again = buffer.consume().unwrap();
        assert!(Arc::ptr_eq(&frame.pixels, &again.pixels));
    }

    #[test]
    fn test_reallocates_on_resize() {
        let buffer = TriplePreviewBuffer::new();
        buffer.publish(&[1; 16], 2, 2);
        buffer.publish(&[3; 64], 4, 4);
        let frame = buffer.consume().unwrap();
        assert_eq!((frame.width, frame.height), (4, 4));
        assert_eq!(frame.pixels.len(), 64);
    }

    #[test]
    fn test_held_frame_is_never_overwritten() {
        let buffer = TriplePreviewBuffer::new();
        buffer.publish(&[1; 4], 1, 1);
        let held = buffer.consume().unwrap();
        for value in 2..10u8 {
            buffer.publish(&[value; 4], 1, 1);
            let _ = buffer.consume();
        }
        assert_eq!(*held.pixels, vec![1; 4]);
    }

    #[test]
    fn test_listener_fires_per_publish() {
        let buffer = TriplePreviewBuffer::new();
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        buffer.set_frame_listener(Some(Arc::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })));
        buffer.publish(&[0; 4], 1, 1);
        buffer.publish(&[0; 4], 1, 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(buffer.frames_published(), 2);
    }

    #[test]
    fn test_clear() {
        let buffer = TriplePreviewBuffer::new();
        buffer.publish(&[5; 4], 1, 1);
        buffer.clear();
        assert!(buffer.consume().is_none());
    }

    #[test]
    fn test_concurrent_publish_consume_never_tears() {
        let buffer = Arc::new(TriplePreviewBuffer::new());
        let done = Arc::new(AtomicBool::new(false));
        const LEN: usize = 64 * 64 * 4;

        let producer = {
            let buffer = Arc::clone(&buffer);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut frame = vec![0u8; LEN];
                for i in 0..2_000u32 {
                    frame.fill((i % 251) as u8);
                    buffer.publish(&frame, 64, 64);
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut observed = 0;
        while !done.load(Ordering::SeqCst) {
            if let Some(frame) = buffer.consume() {
                let first = frame.pixels[0];
                assert!(frame.pixels.iter().all(|&b| b == first), "torn frame");
                observed += 1;
            }
        }
        producer.join().unwrap();
        assert!(observed > 0);
    }
}
