// SPDX-License-Identifier: MPL-2.0

//! Output file naming for stills and recordings

use crate::session::SessionId;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// File name prefix of every capture
pub const FILE_PREFIX: &str = "camera_desktop";

/// Process-wide; two captures in the same millisecond still get distinct names
static NEXT_CAPTURE: AtomicU64 = AtomicU64::new(1);

/// Unique path `<dir>/camera_desktop_<session>_<seq>.<ext>`
pub fn output_path(dir: &Path, session: SessionId, extension: &str) -> PathBuf {
    let seq = NEXT_CAPTURE.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("{}_{}_{}.{}", FILE_PREFIX, session, seq, extension));
    debug!(path = %path.display(), "Allocated output path");
    path
}

/// Newest capture in `dir` with the given extension
///
/// Sorted by modification time; unreadable entries are skipped.
pub async fn latest_capture(dir: PathBuf, extension: &'static str) -> Option<PathBuf> {
    tokio::task::spawn_blocking(move || {
        std::fs::read_dir(&dir)
            .ok()?
            .flatten()
            .filter(|entry| {
                let path = entry.path();
                let is_capture = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX));
                let matches_ext = path
                    .extension()
                    .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension));
                is_capture && matches_ext
            })
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, entry.path()))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, path)| path)
    })
    .await
    .ok()?
}
