// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-desktop")]
#[command(about = "Capture photos, videos and frame streams from a camera")]
#[command(version)]
struct Cli {
    /// Session config file (default: ~/.config/camera-desktop/session.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every capture command
#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Device path, or `test-pattern` for the synthetic source
    #[arg(short, long)]
    pub device: Option<String>,

    /// Capture width (requires --height)
    #[arg(long)]
    pub width: Option<u32>,

    /// Capture height (requires --width)
    #[arg(long)]
    pub height: Option<u32>,

    /// Frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Disable horizontal mirroring
    #[arg(long)]
    pub no_mirror: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture formats of a device
    Formats {
        /// Device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
    },

    /// Take a photo
    Photo {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Save as PNG instead of JPEG
        #[arg(long)]
        png: bool,
    },

    /// Record a video
    Video {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Recording duration in seconds
        #[arg(short = 't', long, default_value = "10")]
        duration: u64,

        /// Enable audio recording
        #[arg(short, long)]
        audio: bool,
    },

    /// Read frames through the stream export channel
    Stream {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Number of frames to read
        #[arg(short, long, default_value = "30")]
        frames: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=camera_desktop=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Formats { device } => cli::list_formats(&device),
        Commands::Photo { capture, png } => cli::take_photo(config, &capture, png),
        Commands::Video {
            capture,
            duration,
            audio,
        } => cli::record_video(config, &capture, duration, audio),
        Commands::Stream { capture, frames } => cli::read_stream(config, &capture, frames),
    }
}
