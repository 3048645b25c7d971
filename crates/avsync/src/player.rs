//! Public player handle.
//!
//! A [`Player`] owns two threads: the render session and the decode worker behind it. Every
//! method is a request to the session thread with its own reply channel; `load` and `seek`
//! block until the decode context has acknowledged (or the configured timeout passes).

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use avsync_types::{MediaInfo, PlaybackState, PlayerStatus};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::adapter::FrameAdapter;
use crate::codec::CodecRegistry;
use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::events::{EventBus, PlayerEvent};
use crate::frame::{FrameLedger, FrameStats};
use crate::output::AudioOutput;
use crate::session::{SessionParts, SessionRequest, spawn_session};
use crate::sink::{NullSink, RenderSink};
use crate::source::MediaInput;
use crate::status::PlayerStatusState;

/// Slack on top of the session's own deadlines before the handle gives up on a reply.
const REPLY_GRACE: Duration = Duration::from_secs(1);

pub struct PlayerBuilder {
    config: PlayerConfig,
    sink: Option<Box<dyn RenderSink>>,
    audio: Option<Box<dyn AudioOutput>>,
    registry: Option<Arc<CodecRegistry>>,
    ledger: Option<Arc<FrameLedger>>,
}

impl PlayerBuilder {
    pub fn new() -> Self {
        Self {
            config: PlayerConfig::default(),
            sink: None,
            audio: None,
            registry: None,
            ledger: None,
        }
    }

    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Where presented frames go. Defaults to a [`NullSink`].
    pub fn sink(mut self, sink: impl RenderSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Audio device. Without one, audio tracks are ignored.
    pub fn audio_output(mut self, output: impl AudioOutput + 'static) -> Self {
        self.audio = Some(Box::new(output));
        self
    }

    pub fn codecs(mut self, registry: Arc<CodecRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Frame accounting; pass [`FrameLedger::instrumented`] to keep per-frame fates.
    pub fn ledger(mut self, ledger: Arc<FrameLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> Result<Player, PlayerError> {
        let config = self.config.normalized();
        let ledger = self.ledger.unwrap_or_else(FrameLedger::new);
        let events = EventBus::new();
        let status = PlayerStatusState::shared();
        let (requests, thread) = spawn_session(SessionParts {
            config: config.clone(),
            sink: self.sink.unwrap_or_else(|| Box::new(NullSink::new())),
            audio: self.audio,
            registry: self
                .registry
                .unwrap_or_else(|| CodecRegistry::new().shared()),
            ledger: ledger.clone(),
            events: events.clone(),
            status: status.clone(),
        })?;
        tracing::debug!(?config, "player started");
        Ok(Player {
            config,
            requests,
            status,
            events,
            ledger,
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Player {
    config: PlayerConfig,
    requests: Sender<SessionRequest>,
    status: Arc<Mutex<PlayerStatusState>>,
    events: EventBus,
    ledger: Arc<FrameLedger>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::new()
    }

    /// Player with default config, a [`NullSink`] and no audio.
    pub fn new() -> Result<Self, PlayerError> {
        PlayerBuilder::new().build()
    }

    /// Open `input` and wait until it is ready to play.
    pub fn load(&self, input: impl Into<MediaInput>) -> Result<MediaInfo, PlayerError> {
        let wait = self.config.load_timeout + REPLY_GRACE;
        self.call(
            |reply| SessionRequest::Load {
                input: input.into(),
                reply,
            },
            wait,
            "load",
        )
    }

    /// Start or resume playback. A no-op while already playing; from `ended` it replays from
    /// the start.
    pub fn play(&self) -> Result<(), PlayerError> {
        let wait = self.config.seek_timeout + REPLY_GRACE;
        self.call(|reply| SessionRequest::Play { reply }, wait, "play")
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.call(|reply| SessionRequest::Pause { reply }, self.short_wait(), "pause")
    }

    /// Seek to `seconds` (clamped to the media). Returns the position reached once the decode
    /// context has refilled.
    pub fn seek(&self, seconds: f64) -> Result<f64, PlayerError> {
        let wait = self.config.seek_timeout + REPLY_GRACE;
        self.call(|reply| SessionRequest::Seek { seconds, reply }, wait, "seek")
    }

    /// Pause, rewind to zero and flush; lands in `ready`.
    pub fn stop(&self) -> Result<(), PlayerError> {
        self.call(|reply| SessionRequest::Stop { reply }, self.short_wait(), "stop")
    }

    /// Install or remove the frame adapter. Takes effect on the next presented frame.
    pub fn set_adapter(&self, adapter: Option<Box<dyn FrameAdapter>>) -> Result<(), PlayerError> {
        self.requests
            .send(SessionRequest::SetAdapter { adapter })
            .map_err(|_| PlayerError::Destroyed)
    }

    pub fn state(&self) -> PlaybackState {
        self.status
            .lock()
            .map(|s| s.state)
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn current_time(&self) -> f64 {
        self.status().current_time_seconds
    }

    pub fn duration(&self) -> Option<f64> {
        self.status().duration_seconds
    }

    pub fn status(&self) -> PlayerStatus {
        self.status
            .lock()
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    /// Events from now on. The receiver disconnects when the player is destroyed.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.ledger.stats()
    }

    pub fn ledger(&self) -> &Arc<FrameLedger> {
        &self.ledger
    }

    /// Tear down both contexts and release every frame. Idempotent; returns once done.
    pub fn destroy(&self) {
        let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) else {
            return;
        };
        let (reply, done) = bounded(1);
        if self
            .requests
            .send(SessionRequest::Destroy { reply })
            .is_ok()
        {
            let _ = done.recv();
        }
        if thread.join().is_err() {
            tracing::error!("render session panicked");
        }
        tracing::debug!(frames = ?self.ledger.stats(), "player destroyed");
    }

    fn short_wait(&self) -> Duration {
        self.config.draw_timeout + self.config.adapter_timeout + REPLY_GRACE
    }

    fn call<T>(
        &self,
        request: impl FnOnce(Sender<Result<T, PlayerError>>) -> SessionRequest,
        wait: Duration,
        op: &'static str,
    ) -> Result<T, PlayerError> {
        let (reply, rx) = bounded(1);
        self.requests
            .send(request(reply))
            .map_err(|_| PlayerError::Destroyed)?;
        match rx.recv_timeout(wait) {
            Ok(result) => result,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(PlayerError::Timeout(op)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(PlayerError::Destroyed),
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.destroy();
    }
}
