use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a playback session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No media loaded, or the player has been destroyed.
    #[default]
    Idle,
    /// Media is being opened and probed.
    Loading,
    /// Media is loaded and positioned, not yet playing.
    Ready,
    /// The clock is running and frames are being presented.
    Playing,
    /// The clock is frozen at the current media time.
    Paused,
    /// A seek is in flight; resolves back to `Playing` or `Paused`.
    Seeking,
    /// Playback reached the end of the media.
    Ended,
    /// A fatal error ended the session.
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Ended => "ended",
            PlaybackState::Error => "error",
        }
    }

    /// Whether a source is loaded and positioned (commands like seek are accepted).
    pub fn has_media(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Seeking
                | PlaybackState::Ended
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes surfaced to the control layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LoadError,
    DecodeError,
    DemuxError,
    RenderError,
    AdapterError,
    UnsupportedFormat,
    NetworkError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LoadError => "LOAD_ERROR",
            ErrorCode::DecodeError => "DECODE_ERROR",
            ErrorCode::DemuxError => "DEMUX_ERROR",
            ErrorCode::RenderError => "RENDER_ERROR",
            ErrorCode::AdapterError => "ADAPTER_ERROR",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last error reported by a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// `true` when the error ended the session.
    pub fatal: bool,
}

/// Video track summary reported after load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VideoTrackInfo {
    /// Codec label (for example `raw/rgba8`).
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Average frame rate when the container reports enough to derive it.
    pub frame_rate: Option<f64>,
    pub sample_count: u64,
}

/// Audio track summary reported after load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioTrackInfo {
    /// Codec label (for example `FLAC`, `pcm/f32le`).
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: u64,
}

/// Media description delivered with a successful load.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
    /// Total duration in seconds.
    pub duration_seconds: f64,
    pub video: Option<VideoTrackInfo>,
    pub audio: Option<AudioTrackInfo>,
}

/// Point-in-time status of a player instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    /// Current media time in seconds, derived from the playback anchor.
    pub current_time_seconds: f64,
    /// Duration of the loaded media in seconds.
    pub duration_seconds: Option<f64>,
    pub media: Option<MediaInfo>,
    /// Frames handed to the render sink.
    pub frames_presented: u64,
    /// Frames evicted as stale or discarded after a flush.
    pub frames_dropped: u64,
    /// Frames currently held in the frame buffer.
    pub buffered_frames: u64,
    /// Non-fatal adapter failures observed this session.
    pub adapter_errors: u64,
    /// Samples buffered in the audio ring, when audio output is active.
    pub audio_buffered_samples: Option<u64>,
    /// Ring capacity in samples, when audio output is active.
    pub audio_capacity_samples: Option<u64>,
    /// Samples dropped because the ring was full.
    pub audio_overflow_samples: Option<u64>,
    /// Samples of silence emitted because the ring was empty.
    pub audio_underrun_samples: Option<u64>,
    pub last_error: Option<ErrorInfo>,
}
