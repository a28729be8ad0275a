// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands driving a capture session end to end
//!
//! - Listing device formats
//! - Taking photos
//! - Recording videos
//! - Reading frames through the stream export channel

use crate::CaptureArgs;
use camera_desktop::backends::camera::CameraBackend;
use camera_desktop::backends::camera::gst_source::GStreamerBackend;
use camera_desktop::config::{PhotoOutputFormat, SessionConfig};
use camera_desktop::constants::format_bitrate;
use camera_desktop::session::{CaptureSession, EventStream, SessionEvent, events, registry};
use futures::{FutureExt, StreamExt};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

type CliResult = Result<(), Box<dyn Error>>;

/// Config from `path`, or the default config file, or defaults
pub fn load_config(path: Option<&Path>) -> Result<SessionConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(SessionConfig::load(path)?),
        None => Ok(SessionConfig::load_or_default()),
    }
}

fn apply_args(mut config: SessionConfig, args: &CaptureArgs) -> SessionConfig {
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if args.width.is_some() || args.height.is_some() {
        config.width = args.width;
        config.height = args.height;
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(dir) = &args.output {
        config.output_dir = Some(dir.clone());
    }
    if args.no_mirror {
        config.mirror = false;
    }
    config
}

/// First device error reported so far, if any
fn pending_error(events: &mut EventStream) -> Option<String> {
    while let Some(Some(msg)) = events.next().now_or_never() {
        if let SessionEvent::CameraError { description } = msg.event {
            return Some(description);
        }
    }
    None
}

/// List capture formats of a V4L2 device
pub fn list_formats(device: &str) -> CliResult {
    let formats = GStreamerBackend::new().supported_formats(device);
    if formats.is_empty() {
        println!("No formats found for {}.", device);
        return Ok(());
    }

    // Best frame rate per resolution
    let mut resolutions: Vec<(u32, u32, u32)> = Vec::new();
    for format in &formats {
        let fps = format.framerate.map(|f| f.as_int()).unwrap_or(30);
        match resolutions
            .iter_mut()
            .find(|(w, h, _)| *w == format.width && *h == format.height)
        {
            Some(existing) => existing.2 = existing.2.max(fps),
            None => resolutions.push((format.width, format.height, fps)),
        }
    }
    resolutions.sort_by(|a, b| (b.0 * b.1).cmp(&(a.0 * a.1)));

    println!("Formats of {}:", device);
    for (w, h, fps) in resolutions {
        println!("  {}x{}@{}fps", w, h, fps);
    }
    Ok(())
}

/// Take a photo
pub fn take_photo(config: SessionConfig, args: &CaptureArgs, png: bool) -> CliResult {
    let mut config = apply_args(config, args);
    if png {
        config.photo_format = PhotoOutputFormat::Png;
    }
    println!("Using device: {}", config.device);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (sink, _events) = events::channel();
        let session = CaptureSession::new(config, sink);
        let (width, height) = session.initialize().await?;
        println!("Capture format: {}x{}", width, height);

        println!("Capturing...");
        let result = session.take_picture().await;
        session.dispose().await;
        println!("Photo saved: {}", result?.display());
        Ok::<(), Box<dyn Error>>(())
    })
}

/// Record a video for `duration` seconds or until Ctrl+C
pub fn record_video(config: SessionConfig, args: &CaptureArgs, duration: u64, audio: bool) -> CliResult {
    let mut config = apply_args(config, args);
    config.enable_audio = audio;
    println!("Using device: {}", config.device);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (sink, mut events) = events::channel();
        let session = CaptureSession::new(config, sink);
        let (width, height) = session.initialize().await?;
        println!("Capture format: {}x{}", width, height);

        let output = session.start_video_recording().await?;
        println!("Output: {}", output.display());
        println!("Duration: {} seconds", duration);
        println!(
            "Bitrate: {} ({})",
            format_bitrate(session.config().video_bitrate_for(width, height)),
            session.config().bitrate_preset.display_name()
        );
        if audio {
            println!("Audio: enabled");
        }
        println!();
        println!("Recording... (press Ctrl+C to stop early)");

        let start = Instant::now();
        let target = Duration::from_secs(duration);
        while start.elapsed() < target {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping early...");
                break;
            }
            if let Some(description) = pending_error(&mut events) {
                println!();
                println!("Camera error: {}", description);
                break;
            }
            let elapsed = start.elapsed().as_secs();
            print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
            std::io::Write::flush(&mut std::io::stdout())?;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        println!();

        let result = session.stop_video_recording().await;
        session.dispose().await;
        println!("Video saved: {}", result?.display());
        Ok::<(), Box<dyn Error>>(())
    })
}

/// Read `frames` frames through a stream handle
pub fn read_stream(config: SessionConfig, args: &CaptureArgs, frames: u64) -> CliResult {
    let config = apply_args(config, args);
    println!("Using device: {}", config.device);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (sink, mut events) = events::channel();
        let session = CaptureSession::new(config, sink);
        let (width, height) = session.initialize().await?;
        println!("Capture format: {}x{}", width, height);

        let handle = session.start_image_stream()?;
        let mut reader = registry::open_reader(handle)?;
        let notify = Arc::new(Notify::new());
        let notify_clone = Arc::clone(&notify);
        registry::register_callback(handle, Box::new(move |_| notify_clone.notify_one()))?;
        println!("Stream handle: {}", handle);

        let mut read = 0u64;
        let mut last_sequence = 0i64;
        while read < frames {
            if let Some(description) = pending_error(&mut events) {
                println!("Camera error: {}", description);
                break;
            }
            if tokio::time::timeout(Duration::from_secs(1), notify.notified())
                .await
                .is_err()
            {
                continue;
            }
            if let Some(frame) = reader.read() {
                read += 1;
                last_sequence = frame.header.sequence;
                print!(
                    "\rFrame {} ({}x{}, {} bytes)",
                    frame.header.sequence,
                    frame.header.width,
                    frame.header.height,
                    frame.pixels.len()
                );
                std::io::Write::flush(&mut std::io::stdout())?;
            }
        }
        println!();

        session.stop_image_stream(handle)?;
        session.dispose().await;
        let skipped = (last_sequence as u64).saturating_sub(read);
        println!("Read {} frames, last sequence {}, skipped {}", read, last_sequence, skipped);
        Ok::<(), Box<dyn Error>>(())
    })
}
