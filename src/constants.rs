// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use crate::backends::camera::types::{CameraFormat, Framerate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Requested capture resolution class
///
/// Each preset is an upper bound on the frame height; the device format
/// closest to the bound (without exceeding it) is chosen at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionPreset {
    /// 240p
    Low,
    /// 480p
    Medium,
    /// 720p (default)
    #[default]
    High,
    /// 1080p
    VeryHigh,
    /// 2160p
    UltraHigh,
    /// Largest the device offers
    Max,
}

impl ResolutionPreset {
    pub const ALL: [ResolutionPreset; 6] = [
        ResolutionPreset::Low,
        ResolutionPreset::Medium,
        ResolutionPreset::High,
        ResolutionPreset::VeryHigh,
        ResolutionPreset::UltraHigh,
        ResolutionPreset::Max,
    ];

    /// Maximum frame height allowed by this preset
    pub fn max_height(&self) -> u32 {
        match self {
            ResolutionPreset::Low => 240,
            ResolutionPreset::Medium => 480,
            ResolutionPreset::High => 720,
            ResolutionPreset::VeryHigh => 1080,
            ResolutionPreset::UltraHigh => 2160,
            ResolutionPreset::Max => u32::MAX,
        }
    }

    /// Pick a device format for this preset
    ///
    /// Preference order:
    /// 1. the largest format under the height ceiling that reaches [`MIN_PREFERRED_FPS`]
    /// 2. the largest format under the ceiling at any rate
    /// 3. the smallest format the device offers
    /// 4. 640x480 @ 30 when the device reports nothing
    pub fn select(&self, formats: &[CameraFormat]) -> CameraFormat {
        let ceiling = self.max_height();
        let area = |f: &&CameraFormat| u64::from(f.width) * u64::from(f.height);
        let fps_of = |f: &CameraFormat| f.framerate.map(|r| r.as_int()).unwrap_or(0);

        let under: Vec<&CameraFormat> = formats.iter().filter(|f| f.height <= ceiling).collect();

        if let Some(best) = under
            .iter()
            .filter(|f| fps_of(f) >= MIN_PREFERRED_FPS)
            .max_by_key(|f| (area(f), fps_of(f)))
        {
            return (*best).clone();
        }
        if let Some(best) = under.iter().max_by_key(|f| (area(f), fps_of(f))) {
            return (*best).clone();
        }
        if let Some(smallest) = formats.iter().min_by_key(|f| area(f)) {
            return smallest.clone();
        }
        CameraFormat {
            width: 640,
            height: 480,
            framerate: Some(Framerate::from_int(30)),
            pixel_format: String::new(),
        }
    }
}

/// Formats below this rate are only used when nothing faster fits the preset
pub const MIN_PREFERRED_FPS: u32 = 15;

/// Video encoder bitrate presets
///
/// These presets define the target bitrate for video encoding based on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Smaller files, reduced quality
    Low,
    /// Balanced quality and file size (default)
    #[default]
    Medium,
    /// Larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Bitrate in kbps for a given frame width
    pub fn bitrate_kbps(&self, width: u32, _height: u32) -> u32 {
        self.bitrate_for_tier(get_resolution_tier(width))
    }

    /// Bitrate in kbps for a resolution tier
    ///
    /// - SD: 1 / 2 / 4 Mbps
    /// - HD: 2.5 / 5 / 10 Mbps
    /// - Full HD: 4 / 8 / 16 Mbps
    /// - 2K: 8 / 16 / 32 Mbps
    /// - 4K: 15 / 30 / 50 Mbps
    pub fn bitrate_for_tier(&self, tier: ResolutionTier) -> u32 {
        let [low, medium, high] = match tier {
            ResolutionTier::SD => [1_000, 2_000, 4_000],
            ResolutionTier::HD => [2_500, 5_000, 10_000],
            ResolutionTier::FullHD => [4_000, 8_000, 16_000],
            ResolutionTier::TwoK => [8_000, 16_000, 32_000],
            ResolutionTier::FourK => [15_000, 30_000, 50_000],
        };
        match self {
            BitratePreset::Low => low,
            BitratePreset::Medium => medium,
            BitratePreset::High => high,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// 640x480 and below
    SD,
    /// 1280x720
    HD,
    /// 1920x1080
    FullHD,
    /// 2560x1440
    TwoK,
    /// 3840x2160 and above
    FourK,
}

/// Get the resolution tier for a given width
pub fn get_resolution_tier(width: u32) -> ResolutionTier {
    match width {
        w if w >= 3840 => ResolutionTier::FourK,
        w if w >= 2560 => ResolutionTier::TwoK,
        w if w >= 1920 => ResolutionTier::FullHD,
        w if w >= 1280 => ResolutionTier::HD,
        _ => ResolutionTier::SD,
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(kbps: u32) -> String {
    let mbps = kbps as f64 / 1000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Frame rate bounds accepted at session creation
pub mod framerate {
    pub const MIN_FPS: u32 = 5;
    pub const MAX_FPS: u32 = 60;
    pub const DEFAULT_FPS: u32 = 30;

    /// Clamp a requested frame rate into the supported range
    pub fn clamp(fps: u32) -> u32 {
        fps.clamp(MIN_FPS, MAX_FPS)
    }
}

/// Record queue bounds
pub mod recording {
    /// Video frames buffered ahead of the encode worker
    pub const MAX_VIDEO_QUEUE: usize = 8;

    /// Audio samples buffered ahead of the encode worker
    pub const MAX_AUDIO_QUEUE: usize = 64;

    /// Default AAC bitrate
    pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 128;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Deadline for the first frame after `initialize`
    pub const INIT_TIMEOUT: Duration = Duration::from_millis(8_000);

    /// Upper bound on a single blocking device read, so stop requests are
    /// observed without waiting for the next frame
    pub const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Bus wait for end-of-stream when finalizing a recording
    pub const FINALIZE_TIMEOUT_SECS: u64 = 10;

    /// Pipeline state change timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Appsink queue depth (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Get number of threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }
}
