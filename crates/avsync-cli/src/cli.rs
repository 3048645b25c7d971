use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "avsync", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Play video only; skip the audio device entirely
    #[arg(long, global = true)]
    pub no_audio: bool,

    #[command(flatten)]
    pub tuning: Tuning,
}

/// Pipeline knobs shared by every playback command.
#[derive(ClapArgs, Debug, Clone)]
pub struct Tuning {
    /// Frames the decode side keeps ahead of presentation
    #[arg(long, global = true, default_value_t = 3)]
    pub buffer_depth: usize,

    /// Audio ring duration in seconds
    #[arg(long, global = true, default_value_t = 0.5)]
    pub ring_seconds: f32,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, global = true, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Render tick period in milliseconds
    #[arg(long, global = true, default_value_t = 16)]
    pub tick_ms: u64,

    /// Restart from the beginning instead of stopping at the end
    #[arg(long = "loop", global = true)]
    pub looping: bool,

    /// Start position in seconds
    #[arg(long, global = true)]
    pub start: Option<f64>,

    /// Seconds between status lines (0 disables them)
    #[arg(long, global = true, default_value_t = 1.0)]
    pub status_every: f64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a local media file
    Play {
        /// Path to the media file
        path: PathBuf,
    },

    /// Play a generated test pattern with a sine tone
    Pattern {
        /// Length in seconds
        #[arg(long, default_value_t = 10.0)]
        duration: f64,

        #[arg(long, default_value_t = 64)]
        width: u32,

        #[arg(long, default_value_t = 36)]
        height: u32,

        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Keyframe interval in frames
        #[arg(long, default_value_t = 15)]
        gop: u64,

        /// Generate no audio track
        #[arg(long)]
        silent: bool,
    },

    /// Print track and duration info of a media file as JSON
    Probe {
        /// Path to the media file
        path: PathBuf,
    },
}
