use std::sync::{Arc, Mutex};

use avsync_types::{ErrorInfo, MediaInfo, PlaybackState, PlayerStatus};

use crate::clock::PlaybackClock;
use crate::ring::RingMonitor;

/// Shared status updated by the render session and read by the `Player` handle.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    pub state: PlaybackState,
    /// Copy of the render clock; current time is extrapolated from its anchor.
    pub clock: PlaybackClock,
    pub media: Option<MediaInfo>,
    /// Frames handed to the sink.
    pub frames_presented: u64,
    /// Frames selected out of the frame buffer (presented or evicted as stale).
    pub frames_retired: u64,
    /// Frames thrown away by a seek, stop or stale-epoch discard.
    pub frames_abandoned: u64,
    pub buffered_frames: u64,
    pub adapter_errors: u64,
    /// Audio ring counters, while an audio lane exists.
    pub ring: Option<RingMonitor>,
    pub last_error: Option<ErrorInfo>,
}

impl PlayerStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn snapshot(&self) -> PlayerStatus {
        let ring = self.ring.as_ref().map(RingMonitor::stats);
        PlayerStatus {
            state: self.state,
            current_time_seconds: if self.media.is_some() {
                self.clock.now()
            } else {
                0.0
            },
            duration_seconds: self.media.as_ref().map(|m| m.duration_seconds),
            media: self.media.clone(),
            frames_presented: self.frames_presented,
            frames_dropped: self
                .frames_retired
                .saturating_sub(self.frames_presented)
                + self.frames_abandoned,
            buffered_frames: self.buffered_frames,
            adapter_errors: self.adapter_errors,
            audio_buffered_samples: ring.map(|r| r.buffered_samples as u64),
            audio_capacity_samples: ring.map(|r| r.capacity_samples as u64),
            audio_overflow_samples: ring.map(|r| r.overflow_samples),
            audio_underrun_samples: ring.map(|r| r.underrun_samples),
            last_error: self.last_error.clone(),
        }
    }

    /// Forget the loaded media (reload, destroy).
    pub fn clear_media(&mut self) {
        self.clock = PlaybackClock::new();
        self.media = None;
        self.buffered_frames = 0;
        self.ring = None;
    }
}
