// SPDX-License-Identifier: MPL-2.0

//! Video recording
//!
//! Frames and audio flow through a gated [`RecordEncodeQueue`] to a single
//! encode worker that exclusively owns the [`VideoWriter`]. Two writers are
//! provided: H.264/MP4 through GStreamer and a plugin-free YUV4MPEG2 file.

pub mod gst_writer;
pub mod queue;
pub mod recorder;
pub mod writer;
pub mod y4m;

use std::sync::Arc;
use tracing::info;

pub use gst_writer::GstWriterFactory;
pub use queue::{PushOutcome, RecordEncodeQueue, RecordItem};
pub use recorder::VideoRecorder;
pub use writer::{VideoConfig, VideoWriter, WriterFactory};
pub use y4m::Y4mWriterFactory;

/// Best writer available on this machine
pub fn default_writer_factory() -> Arc<dyn WriterFactory> {
    if GstWriterFactory::is_available() {
        Arc::new(GstWriterFactory)
    } else {
        info!("H.264 encoding unavailable, recording to y4m");
        Arc::new(Y4mWriterFactory)
    }
}
