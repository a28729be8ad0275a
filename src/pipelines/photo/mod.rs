// SPDX-License-Identifier: MPL-2.0

//! Async photo capture pipeline
//!
//! ```text
//! SnapshotCache → copy → encode (blocking pool) → write (blocking pool) → path
//!       ↑
//! producer keeps overwriting, preview never pauses
//! ```
//!
//! The snapshot is copied out of the cache up front, so the producer is never
//! held up by encoding.

pub mod encoding;
pub mod snapshot;

pub use encoding::{EncodingQuality, PhotoEncoder, StillEncoder};
pub use snapshot::{Snapshot, SnapshotCache};

use crate::errors::{SessionError, SessionResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Encode-and-save stage for still captures
#[derive(Clone)]
pub struct PhotoPipeline {
    encoder: Arc<dyn StillEncoder>,
}

impl PhotoPipeline {
    pub fn new(encoder: Arc<dyn StillEncoder>) -> Self {
        Self { encoder }
    }

    /// File extension of the encoded output
    pub fn extension(&self) -> &'static str {
        self.encoder.extension()
    }

    /// Encode `snapshot` and write it to `path`
    ///
    /// Both steps run on the blocking pool; the caller's task only awaits.
    pub async fn save(&self, snapshot: Snapshot, path: PathBuf) -> SessionResult<PathBuf> {
        let encoder = Arc::clone(&self.encoder);
        let (width, height) = (snapshot.width, snapshot.height);

        tokio::task::spawn_blocking(move || {
            let bytes = encoder
                .encode_still(&snapshot.pixels, width, height, snapshot.layout)
                .map_err(|e| SessionError::CaptureFailed(e.to_string()))?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| SessionError::CaptureFailed(format!("{}: {}", dir.display(), e)))?;
            }
            std::fs::write(&path, &bytes)
                .map_err(|e| SessionError::CaptureFailed(format!("Failed to save photo: {}", e)))?;
            info!(path = %path.display(), width, height, size = bytes.len(), "Photo saved");
            Ok(path)
        })
        .await
        .map_err(|e| SessionError::CaptureFailed(format!("Encoding task error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelLayout;

    #[tokio::test]
    async fn test_save_writes_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::new(Arc::new(PhotoEncoder::default()));
        let snapshot = Snapshot {
            pixels: vec![128; 8 * 6 * 4],
            width: 8,
            height: 6,
            layout: PixelLayout::Rgba,
            sequence: 0,
        };
        let path = pipeline
            .save(snapshot, dir.path().join("still.jpg"))
            .await
            .unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[tokio::test]
    async fn test_save_reports_capture_failure() {
        let pipeline = PhotoPipeline::new(Arc::new(PhotoEncoder::default()));
        let snapshot = Snapshot {
            pixels: vec![0; 4],
            width: 8,
            height: 8,
            layout: PixelLayout::Rgba,
            sequence: 0,
        };
        let err = pipeline
            .save(snapshot, std::env::temp_dir().join("never.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CaptureFailed(_)));
    }
}
