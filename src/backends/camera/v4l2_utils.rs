// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 format enumeration
//!
//! Only used to choose a capture size; the actual capture goes through
//! GStreamer's `v4l2src`.

use super::types::{CameraFormat, Framerate};
use tracing::debug;
use v4l::framesize::FrameSizeEnum;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::prelude::*;
use v4l::video::Capture;

/// Sizes probed when a device reports a stepwise range
const STEPWISE_CANDIDATES: &[(u32, u32)] = &[
    (3840, 2160),
    (1920, 1080),
    (1280, 720),
    (640, 480),
    (320, 240),
];

/// List the formats a V4L2 capture device offers
///
/// Returns an empty list when the device cannot be opened or queried.
pub fn enumerate_formats(path: &str) -> Vec<CameraFormat> {
    let dev = match Device::with_path(path) {
        Ok(d) => d,
        Err(e) => {
            debug!(path, error = %e, "Cannot open device for format enumeration");
            return Vec::new();
        }
    };

    let mut formats = Vec::new();
    let Ok(descriptions) = dev.enum_formats() else {
        return formats;
    };

    for desc in descriptions {
        let fourcc = format!("{}", desc.fourcc);
        let Ok(sizes) = dev.enum_framesizes(desc.fourcc) else {
            continue;
        };
        for size in sizes {
            match size.size {
                FrameSizeEnum::Discrete(discrete) => {
                    let rates = dev
                        .enum_frameintervals(desc.fourcc, discrete.width, discrete.height)
                        .unwrap_or_default();
                    if rates.is_empty() {
                        formats.push(CameraFormat {
                            width: discrete.width,
                            height: discrete.height,
                            framerate: None,
                            pixel_format: fourcc.clone(),
                        });
                    }
                    for interval in rates {
                        let framerate = match interval.interval {
                            FrameIntervalEnum::Discrete(frac) if frac.numerator > 0 => {
                                Some(Framerate::new(frac.denominator, frac.numerator))
                            }
                            _ => Some(Framerate::default()),
                        };
                        formats.push(CameraFormat {
                            width: discrete.width,
                            height: discrete.height,
                            framerate,
                            pixel_format: fourcc.clone(),
                        });
                    }
                }
                FrameSizeEnum::Stepwise(step) => {
                    for &(w, h) in STEPWISE_CANDIDATES {
                        if (step.min_width..=step.max_width).contains(&w)
                            && (step.min_height..=step.max_height).contains(&h)
                        {
                            formats.push(CameraFormat {
                                width: w,
                                height: h,
                                framerate: Some(Framerate::default()),
                                pixel_format: fourcc.clone(),
                            });
                        }
                    }
                }
            }
        }
    }

    debug!(path, count = formats.len(), "Enumerated device formats");
    formats
}
