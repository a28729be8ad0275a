// SPDX-License-Identifier: MPL-2.0

//! Consumers of the frame fan-out
//!
//! ```text
//!                      ┌─▶ SnapshotCache ──▶ photo (encode on blocking pool)
//! producer frame ──────┼─▶ VideoRecorder ──▶ encode worker ──▶ file
//!                      ├─▶ TriplePreviewBuffer ──▶ renderer
//!                      └─▶ StreamExportChannel ──▶ external reader
//! ```
//!
//! Every stage copies what it keeps, so the producer's buffer can be reused
//! as soon as distribution returns.

pub mod photo;
pub mod preview;
pub mod stream;
pub mod video;
