// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot latest-frame holder for on-demand stills

use crate::backends::camera::types::PixelLayout;
use std::sync::{Mutex, PoisonError};

/// Copy of the most recent frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub sequence: u64,
}

/// Latest frame, overwritten on every publish, no history
#[derive(Debug, Default)]
pub struct SnapshotCache {
    slot: Mutex<Option<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cached frame, reusing the existing allocation
    pub fn store(&self, pixels: &[u8], width: u32, height: u32, layout: PixelLayout, sequence: u64) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(snapshot) => {
                snapshot.pixels.clear();
                snapshot.pixels.extend_from_slice(pixels);
                snapshot.width = width;
                snapshot.height = height;
                snapshot.layout = layout;
                snapshot.sequence = sequence;
            }
            None => {
                *slot = Some(Snapshot {
                    pixels: pixels.to_vec(),
                    width,
                    height,
                    layout,
                    sequence,
                });
            }
        }
    }

    /// Copy of the cached frame, `None` before the first frame
    pub fn latest(&self) -> Option<Snapshot> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
