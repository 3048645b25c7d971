//! Messages between the render context and the decode context.
//!
//! Both channels are ordered. Frames and the ring consumer cross the boundary by ownership
//! transfer; the only shared counter is the retired-frame count, written by the render side.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use avsync_types::{ErrorCode, MediaInfo};

use crate::frame::VideoFrame;
use crate::output::AudioOutputSpec;
use crate::ring::RingConsumer;
use crate::source::MediaInput;

/// Monotonic tag bumped on every seek and stop; output tagged with an older epoch is stale.
pub type Epoch = u64;

/// Render → decode.
#[derive(Debug)]
pub enum DecodeCommand {
    Initialize {
        input: MediaInput,
        /// Format of the audio device, or `None` to skip the audio lane.
        audio_output: Option<AudioOutputSpec>,
    },
    Play {
        media_time_seconds: f64,
        anchor: Instant,
    },
    Pause,
    Seek {
        target_seconds: f64,
        epoch: Epoch,
    },
    Stop {
        epoch: Epoch,
    },
    UpdateMediaTime {
        media_time_seconds: f64,
        anchor: Instant,
    },
    Destroy,
}

impl DecodeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DecodeCommand::Initialize { .. } => "initialize",
            DecodeCommand::Play { .. } => "play",
            DecodeCommand::Pause => "pause",
            DecodeCommand::Seek { .. } => "seek",
            DecodeCommand::Stop { .. } => "stop",
            DecodeCommand::UpdateMediaTime { .. } => "update_media_time",
            DecodeCommand::Destroy => "destroy",
        }
    }
}

/// Decode → render.
#[derive(Debug)]
pub enum DecodeResponse {
    InitializeDone {
        media_info: MediaInfo,
        /// Consumer half of the audio ring, when an audio lane was built.
        audio: Option<RingConsumer>,
    },
    FrameReady {
        frame: VideoFrame,
        timestamp_us: i64,
        epoch: Epoch,
    },
    SeekDone {
        actual_seconds: f64,
        epoch: Epoch,
    },
    Ended,
    Error {
        message: String,
        code: ErrorCode,
        fatal: bool,
    },
}

/// Count of frames that have left the render side's frame buffer.
///
/// Only the render context holds this half; the decode context reads through
/// [`RetiredView`].
#[derive(Debug)]
pub struct RetiredFrames(Arc<AtomicU64>);

/// Read-only view of [`RetiredFrames`].
#[derive(Clone, Debug)]
pub struct RetiredView(Arc<AtomicU64>);

pub fn retired_counter() -> (RetiredFrames, RetiredView) {
    let shared = Arc::new(AtomicU64::new(0));
    (RetiredFrames(shared.clone()), RetiredView(shared))
}

impl RetiredFrames {
    pub fn retire(&self, n: u64) {
        if n > 0 {
            self.0.fetch_add(n, Ordering::Release);
        }
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl RetiredView {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}
