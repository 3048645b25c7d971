//! Playback clock derived from an anchor.
//!
//! Media time is `anchor.media + (wall_now - anchor.wall)` while running and the anchor media
//! time while frozen. The render context owns the authoritative clock and mirrors its anchor
//! to the decode context, which keeps its own [`PlaybackClock`] for end-of-stream checks.

use std::time::{Duration, Instant};

/// (media time, wall instant) pair the clock extrapolates from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackAnchor {
    pub media_seconds: f64,
    pub wall: Instant,
}

impl PlaybackAnchor {
    pub fn new(media_seconds: f64, wall: Instant) -> Self {
        Self {
            media_seconds,
            wall,
        }
    }

    pub fn now(media_seconds: f64) -> Self {
        Self::new(media_seconds, Instant::now())
    }
}

#[derive(Clone, Debug)]
pub struct PlaybackClock {
    anchor: PlaybackAnchor,
    running: bool,
    duration: Option<f64>,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            anchor: PlaybackAnchor::now(0.0),
            running: false,
            duration: None,
        }
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration.filter(|d| d.is_finite() && *d > 0.0);
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn anchor(&self) -> PlaybackAnchor {
        self.anchor
    }

    /// Re-anchor without changing whether the clock runs.
    pub fn update_anchor(&mut self, media_seconds: f64, wall: Instant) {
        self.anchor = PlaybackAnchor::new(self.clamp(media_seconds), wall);
    }

    /// Re-anchor and start advancing.
    pub fn start(&mut self, media_seconds: f64, wall: Instant) {
        self.update_anchor(media_seconds, wall);
        self.running = true;
    }

    /// Stop advancing; the current time becomes the frozen anchor.
    pub fn freeze(&mut self) {
        let now = Instant::now();
        let media = self.now_at(now);
        self.anchor = PlaybackAnchor::new(media, now);
        self.running = false;
    }

    /// Freeze at an explicit media time (seek, stop).
    pub fn freeze_at(&mut self, media_seconds: f64) {
        self.anchor = PlaybackAnchor::now(self.clamp(media_seconds));
        self.running = false;
    }

    pub fn now(&self) -> f64 {
        self.now_at(Instant::now())
    }

    pub fn now_us(&self) -> i64 {
        (self.now() * 1_000_000.0).round() as i64
    }

    /// Media time at `wall`, clamped to `[0, duration]`.
    pub fn now_at(&self, wall: Instant) -> f64 {
        let elapsed = if self.running {
            wall.saturating_duration_since(self.anchor.wall)
        } else {
            Duration::ZERO
        };
        self.clamp(self.anchor.media_seconds + elapsed.as_secs_f64())
    }

    /// True once the clock has reached the end of known media.
    pub fn at_end(&self) -> bool {
        self.duration.is_some_and(|d| self.now() >= d)
    }

    fn clamp(&self, t: f64) -> f64 {
        let t = if t.is_finite() { t.max(0.0) } else { 0.0 };
        match self.duration {
            Some(d) => t.min(d),
            None => t,
        }
    }
}
