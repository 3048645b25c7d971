//! Error types for the playback pipeline.
//!
//! Every error maps to an [`ErrorCode`] so the render context can surface it to the control
//! layer without inspecting messages.

use avsync_types::{ErrorCode, PlaybackState};
use thiserror::Error;

use crate::source::TrackId;

/// Errors raised by a [`SampleSource`](crate::source::SampleSource).
#[derive(Error, Debug)]
pub enum SourceError {
    /// I/O error while opening or reading the container.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container could not be parsed.
    #[error("Demux error: {0}")]
    Demux(String),

    /// The container parsed but holds nothing this pipeline can play.
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// A sample was requested for a track the source does not have.
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// The source could not be opened at all (missing file, bad URL, failed opener).
    #[error("Open failed: {0}")]
    Open(String),
}

impl SourceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::Io(_) | SourceError::Open(_) => ErrorCode::LoadError,
            SourceError::Demux(_) | SourceError::UnknownTrack(_) => ErrorCode::DemuxError,
            SourceError::Unsupported(_) => ErrorCode::UnsupportedFormat,
        }
    }
}

/// Errors raised by video and audio decoders.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// No decoder is available for the codec.
    #[error("Unsupported codec: {0}")]
    Unsupported(String),

    /// The decoder is unusable; the session cannot continue.
    #[error("Decoder failure: {0}")]
    Fatal(String),

    /// One sample could not be decoded; the decoder remains usable.
    #[error("Corrupt sample: {0}")]
    Corrupt(String),
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::Unsupported(_) => ErrorCode::UnsupportedFormat,
            DecodeError::Fatal(_) | DecodeError::Corrupt(_) => ErrorCode::DecodeError,
        }
    }

    /// Whether the error ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DecodeError::Corrupt(_))
    }
}

/// Fatal failure inside the decode context.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Source(e) => e.code(),
            PipelineError::Decode(e) => e.code(),
        }
    }
}

/// Error returned by a [`RenderSink`](crate::sink::RenderSink).
#[derive(Error, Debug)]
#[error("Render failed: {0}")]
pub struct RenderError(pub String);

/// Errors returned by the public [`Player`](crate::player::Player) API.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The player was destroyed; the instance is unusable.
    #[error("Player destroyed")]
    Destroyed,

    /// The command is not valid in the current state.
    #[error("Cannot {op} while {state}")]
    InvalidState { op: &'static str, state: PlaybackState },

    /// A fatal error ended the session.
    #[error("{code}: {message}")]
    Session { code: ErrorCode, message: String },

    /// The seek was replaced by a newer seek or a stop before it resolved.
    #[error("Seek superseded")]
    SeekSuperseded,

    /// The decode context did not acknowledge in time.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// A pipeline thread could not be started.
    #[error("Failed to start player: {0}")]
    Spawn(#[from] std::io::Error),
}

impl PlayerError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            PlayerError::Session { code, .. } => Some(*code),
            PlayerError::Timeout("load") => Some(ErrorCode::LoadError),
            _ => None,
        }
    }
}
