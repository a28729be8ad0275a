// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::PixelLayout;
use crate::constants::{BitratePreset, ResolutionPreset, framerate, recording, timing};
use crate::errors::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Device identifier understood by the synthetic source
pub const TEST_PATTERN_DEVICE: &str = "test-pattern";

/// Still image output format
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoOutputFormat {
    /// JPEG (lossy, default)
    #[default]
    Jpeg,
    /// PNG (lossless)
    Png,
}

impl PhotoOutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoOutputFormat::Jpeg => "jpg",
            PhotoOutputFormat::Png => "png",
        }
    }
}

/// Per-session capture configuration
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device path (e.g. `/dev/video0`) or [`TEST_PATTERN_DEVICE`]
    pub device: String,
    /// Resolution ceiling used when choosing a device format
    pub resolution_preset: ResolutionPreset,
    /// Explicit width, overrides the preset when set together with `height`
    pub width: Option<u32>,
    /// Explicit height
    pub height: Option<u32>,
    /// Requested frame rate, clamped to 5..=60
    pub fps: u32,
    /// Video bitrate in kbps, 0 derives it from `bitrate_preset`
    pub video_bitrate_kbps: u32,
    /// Bitrate preset used when no explicit bitrate is set
    pub bitrate_preset: BitratePreset,
    /// Audio bitrate in kbps
    pub audio_bitrate_kbps: u32,
    /// Record audio alongside video
    pub enable_audio: bool,
    /// Mirror frames horizontally before fan-out
    pub mirror: bool,
    /// First-frame deadline for `initialize`
    pub init_timeout_ms: u64,
    /// Directory for photos and recordings, system temp dir when unset
    pub output_dir: Option<PathBuf>,
    /// Still image format
    pub photo_format: PhotoOutputFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Byte order the preview renderer expects
    pub preview_format: PixelLayout,
    /// Video frames buffered ahead of the encode worker
    pub max_video_queue: usize,
    /// Audio samples buffered ahead of the encode worker
    pub max_audio_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            resolution_preset: ResolutionPreset::default(),
            width: None,
            height: None,
            fps: framerate::DEFAULT_FPS,
            video_bitrate_kbps: 0,
            bitrate_preset: BitratePreset::default(),
            audio_bitrate_kbps: recording::DEFAULT_AUDIO_BITRATE_KBPS,
            enable_audio: false,
            mirror: true,
            init_timeout_ms: timing::INIT_TIMEOUT.as_millis() as u64,
            output_dir: None,
            photo_format: PhotoOutputFormat::default(),
            jpeg_quality: 92,
            preview_format: PixelLayout::Rgba,
            max_video_queue: recording::MAX_VIDEO_QUEUE,
            max_audio_queue: recording::MAX_AUDIO_QUEUE,
        }
    }
}

impl SessionConfig {
    /// Config for the synthetic source at a fixed size
    pub fn test_pattern(width: u32, height: u32) -> Self {
        Self {
            device: TEST_PATTERN_DEVICE.to_string(),
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Return a copy with out-of-range values pulled back into range
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        config.fps = framerate::clamp(config.fps);
        config.jpeg_quality = config.jpeg_quality.clamp(1, 100);
        config.max_video_queue = config.max_video_queue.max(1);
        config.max_audio_queue = config.max_audio_queue.max(1);
        if config.init_timeout_ms == 0 {
            config.init_timeout_ms = timing::INIT_TIMEOUT.as_millis() as u64;
        }
        config
    }

    pub fn is_test_pattern(&self) -> bool {
        self.device == TEST_PATTERN_DEVICE
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Explicit size when both dimensions are given
    pub fn explicit_size(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Effective video bitrate for a frame width
    pub fn video_bitrate_for(&self, width: u32, height: u32) -> u32 {
        if self.video_bitrate_kbps > 0 {
            self.video_bitrate_kbps
        } else {
            self.bitrate_preset.bitrate_kbps(width, height)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("camera-desktop").join("session.json"))
    }

    /// Load a config from a JSON file
    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded session config");
        Ok(config)
    }

    /// Load from the default path, falling back to defaults when absent
    pub fn load_or_default() -> Self {
        Self::default_path()
            .filter(|p| p.exists())
            .and_then(|p| Self::load(&p).ok())
            .unwrap_or_default()
    }

    /// Write the config as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> SessionResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Config(e.to_string()))?;
        }
        let text =
            serde_json::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| SessionError::Config(e.to_string()))
    }
}
