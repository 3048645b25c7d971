use std::time::Duration;

pub use avsync::PlayerConfig;

use crate::cli::Tuning;

/// Settings for one playback run.
#[derive(Clone, Debug)]
pub struct PlaybackRunConfig {
    pub device: Option<String>,
    pub audio: bool,
    pub start_seconds: Option<f64>,
    pub status_every: Option<Duration>,
    pub player: PlayerConfig,
}

impl PlaybackRunConfig {
    pub fn from_args(device: Option<String>, no_audio: bool, tuning: &Tuning) -> Self {
        let player = PlayerConfig {
            frame_buffer_depth: tuning.buffer_depth,
            ring_seconds: tuning.ring_seconds,
            chunk_frames: tuning.chunk_frames,
            tick_interval: Duration::from_millis(tuning.tick_ms),
            looping: tuning.looping,
            ..PlayerConfig::default()
        }
        .normalized();
        let status_every = (tuning.status_every.is_finite() && tuning.status_every > 0.0)
            .then(|| Duration::from_secs_f64(tuning.status_every));
        Self {
            device: normalize_device_name(device),
            audio: !no_audio,
            start_seconds: tuning.start.filter(|s| s.is_finite() && *s > 0.0),
            status_every,
            player,
        }
    }
}

fn normalize_device_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
