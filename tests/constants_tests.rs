// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camera_desktop::constants::{BitratePreset, ResolutionPreset, recording, timing};
use std::time::Duration;

#[test]
fn test_bitrate_preset_values() {
    // Test that all presets exist (Low, Medium, High)
    assert_eq!(BitratePreset::ALL.len(), 3);
}

#[test]
fn test_bitrate_preset_ordering() {
    // Test that presets are ordered from lowest to highest quality
    let mut prev_bitrate = 0u32;
    for preset in BitratePreset::ALL {
        let bitrate = preset.bitrate_kbps(1920, 1080);
        assert!(
            bitrate >= prev_bitrate,
            "Presets should be ordered from lowest to highest"
        );
        prev_bitrate = bitrate;
    }
}

#[test]
fn test_bitrate_scales_with_resolution() {
    // Higher resolution should have higher bitrate at same preset
    let hd_bitrate = BitratePreset::Medium.bitrate_kbps(1280, 720);
    let fhd_bitrate = BitratePreset::Medium.bitrate_kbps(1920, 1080);
    let uhd_bitrate = BitratePreset::Medium.bitrate_kbps(3840, 2160);

    assert!(hd_bitrate < fhd_bitrate);
    assert!(fhd_bitrate < uhd_bitrate);
}

#[test]
fn test_bitrate_preset_display_names() {
    for preset in BitratePreset::ALL {
        assert!(
            !preset.display_name().is_empty(),
            "Preset {:?} has empty display name",
            preset
        );
    }
}

#[test]
fn test_resolution_presets_ascend() {
    let heights: Vec<u32> = ResolutionPreset::ALL.iter().map(|p| p.max_height()).collect();
    assert!(heights.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ResolutionPreset::default().max_height(), 720);
}

#[test]
fn test_queue_bounds() {
    assert_eq!(recording::MAX_VIDEO_QUEUE, 8);
    assert_eq!(recording::MAX_AUDIO_QUEUE, 64);
}

#[test]
fn test_init_timeout() {
    assert_eq!(timing::INIT_TIMEOUT, Duration::from_secs(8));
    assert!(timing::READ_POLL_TIMEOUT < timing::INIT_TIMEOUT);
}
