use std::time::Duration;

/// Tuning parameters shared by the decode, render and audio stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Target depth of the frame buffer; the decode side stops at this many outstanding frames.
    pub frame_buffer_depth: usize,
    /// Decoder in-flight queue size at which submission pauses.
    pub decoder_saturation: usize,
    /// Audio ring duration in seconds.
    pub ring_seconds: f32,
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Render tick period while playing.
    pub tick_interval: Duration,
    /// How often the render context re-sends its anchor to the decode context.
    pub time_sync_interval: Duration,
    /// Decode-side refill poll period while work is blocked on a bound.
    pub fill_interval: Duration,
    /// Upper bound for opening and probing a source.
    pub load_timeout: Duration,
    /// Upper bound for a seek acknowledgement.
    pub seek_timeout: Duration,
    /// Upper bound for a pending adapter result.
    pub adapter_timeout: Duration,
    /// Upper bound for a pending draw.
    pub draw_timeout: Duration,
    /// Restart from zero instead of ending.
    pub looping: bool,
}

impl Default for PlayerConfig {
    /// Defaults tuned for 24-60 fps content on a 60 Hz render cadence.
    fn default() -> Self {
        Self {
            frame_buffer_depth: 3,
            decoder_saturation: 4,
            ring_seconds: 0.5,
            chunk_frames: 1024,
            tick_interval: Duration::from_millis(16),
            time_sync_interval: Duration::from_secs(1),
            fill_interval: Duration::from_millis(4),
            load_timeout: Duration::from_secs(5),
            seek_timeout: Duration::from_secs(5),
            adapter_timeout: Duration::from_secs(1),
            draw_timeout: Duration::from_secs(1),
            looping: false,
        }
    }
}

impl PlayerConfig {
    /// Clamp values that would stall the pipeline (zero depths, zero periods).
    pub fn normalized(mut self) -> Self {
        self.frame_buffer_depth = self.frame_buffer_depth.max(1);
        self.decoder_saturation = self.decoder_saturation.max(1);
        self.chunk_frames = self.chunk_frames.max(1);
        if !(self.ring_seconds.is_finite() && self.ring_seconds > 0.0) {
            self.ring_seconds = 0.5;
        }
        let min_period = Duration::from_millis(1);
        self.tick_interval = self.tick_interval.max(min_period);
        self.fill_interval = self.fill_interval.max(min_period);
        self.time_sync_interval = self.time_sync_interval.max(self.tick_interval);
        self
    }

    /// Half a tick: how far ahead of the clock a frame may be and still count as due.
    pub fn presentation_lead_us(&self) -> i64 {
        (self.tick_interval.as_micros() / 2) as i64
    }
}
