// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for device capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               CaptureSession                 │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │    Audio    │    │     Camera       │   │
//! │  │ (GStreamer) │    │ (GStreamer/v4l2, │   │
//! │  │             │    │  test pattern)   │   │
//! │  └─────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! - [`audio`]: audio sources feeding recordings
//! - [`camera`]: device sources, frame types and the producer loop

pub mod audio;
pub mod camera;
