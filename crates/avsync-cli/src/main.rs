//! avsync: play media through the decode, buffer and sync pipeline.
//!
//! ## Pipeline
//! 1. **Decode**: a worker thread demuxes the input, decodes video frames into a bounded
//!    frame buffer and audio into a lock-free ring.
//! 2. **Render**: the session thread owns the playback clock and presents the buffered frame
//!    closest to it on every tick.
//! 3. **Audio**: the CPAL callback drains the ring; the clock is anchored to the same timeline.
//!
//! ## Modes
//! - `play`: play a local file.
//! - `pattern`: play a generated test pattern.
//! - `probe`: print media info as JSON.

use anyhow::{Result, anyhow};
use avsync::synthetic::PatternSource;
use avsync_cli::{cli, config::PlaybackRunConfig, runtime};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,avsync=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = PlaybackRunConfig::from_args(args.device.clone(), args.no_audio, &args.tuning);
    match args.cmd {
        Some(cli::Command::Play { path }) => runtime::run_play(config, &path),
        Some(cli::Command::Pattern {
            duration,
            width,
            height,
            fps,
            gop,
            silent,
        }) => {
            let mut pattern = PatternSource::empty(duration)
                .with_video(width, height, fps)
                .with_gop(gop);
            if !silent {
                pattern = pattern.with_audio(48_000, 2);
            }
            runtime::run_pattern(config, pattern)
        }
        Some(cli::Command::Probe { path }) => runtime::probe(&path),
        None => Err(anyhow!("no command given; try `avsync --help`")),
    }
}
