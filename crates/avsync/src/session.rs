//! Render/control context: the session thread behind a [`Player`](crate::player::Player).
//!
//! The thread owns the authoritative clock, the frame buffer, the adapter pipeline, the sink
//! and the audio output. It multiplexes three inputs with `select!`: requests from the player
//! handle, responses from the decode context, and its own deadlines (render tick, load and seek
//! timeouts). Only this thread changes observable state.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use avsync_types::{ErrorCode, ErrorInfo, MediaInfo, PlaybackState};
use crossbeam_channel::{Receiver, Sender, never};

use crate::adapter::{AdapterPipeline, FrameAdapter};
use crate::buffer::FrameBuffer;
use crate::clock::PlaybackClock;
use crate::codec::CodecRegistry;
use crate::config::PlayerConfig;
use crate::error::{PlayerError, RenderError};
use crate::events::{EventBus, PlayerEvent};
use crate::frame::{FrameLedger, VideoFrame};
use crate::output::{AudioGate, AudioOutput};
use crate::protocol::{DecodeCommand, DecodeResponse, Epoch, RetiredFrames, retired_counter};
use crate::sink::{DrawOutcome, RenderSink};
use crate::source::MediaInput;
use crate::state::{self, PlayAction, SessionState};
use crate::status::PlayerStatusState;
use crate::worker::{DecodeWorkerHandle, spawn_decode_worker};

/// Wait used when no deadline is armed; bounds how stale the shared status can get.
const IDLE_WAIT: Duration = Duration::from_millis(250);

type Reply<T> = Sender<Result<T, PlayerError>>;

/// Requests from the player handle. Each carries its own reply channel.
pub(crate) enum SessionRequest {
    Load {
        input: MediaInput,
        reply: Reply<MediaInfo>,
    },
    Play {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Seek {
        seconds: f64,
        reply: Reply<f64>,
    },
    Stop {
        reply: Reply<()>,
    },
    SetAdapter {
        adapter: Option<Box<dyn FrameAdapter>>,
    },
    Destroy {
        reply: Sender<()>,
    },
}

/// Everything the session thread takes ownership of at spawn.
pub(crate) struct SessionParts {
    pub config: PlayerConfig,
    pub sink: Box<dyn RenderSink>,
    pub audio: Option<Box<dyn AudioOutput>>,
    pub registry: Arc<CodecRegistry>,
    pub ledger: Arc<FrameLedger>,
    pub events: EventBus,
    pub status: Arc<Mutex<PlayerStatusState>>,
}

pub(crate) fn spawn_session(
    parts: SessionParts,
) -> std::io::Result<(Sender<SessionRequest>, JoinHandle<()>)> {
    let (retired, retired_view) = retired_counter();
    let (worker, responses) = spawn_decode_worker(
        parts.config.clone(),
        parts.registry.clone(),
        parts.ledger.clone(),
        retired_view,
    )?;
    let (req_tx, req_rx) = crossbeam_channel::unbounded();

    let handle = thread::Builder::new()
        .name("avsync-render".into())
        .spawn(move || {
            let session = Session::new(parts, worker, retired);
            session.run(req_rx, responses);
        })?;
    Ok((req_tx, handle))
}

enum SeekReply {
    /// `seek()` from the caller.
    Seek(Reply<f64>),
    /// `play()` from `ended`: reposition at zero, then start.
    Replay(Reply<()>),
    /// Looping wrap-around.
    Loop,
}

struct PendingSeek {
    epoch: Epoch,
    target: f64,
    resolve_to: PlaybackState,
    reply: SeekReply,
    deadline: Instant,
}

struct PendingLoad {
    reply: Reply<MediaInfo>,
    deadline: Instant,
}

struct PendingDraw {
    rx: Receiver<Result<(), RenderError>>,
    deadline: Instant,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Session {
    config: PlayerConfig,
    worker: Option<DecodeWorkerHandle>,
    state: SessionState,
    clock: PlaybackClock,
    buffer: FrameBuffer,
    adapter: AdapterPipeline,
    sink: Box<dyn RenderSink>,
    audio: Option<Box<dyn AudioOutput>>,
    gate: AudioGate,
    status: Arc<Mutex<PlayerStatusState>>,
    epoch: Epoch,
    media: Option<MediaInfo>,
    pending_load: Option<PendingLoad>,
    /// Loads that timed out while the decode context was still opening; their outcome is
    /// ignored when it finally arrives.
    stale_loads: u32,
    pending_seek: Option<PendingSeek>,
    pending_draw: Option<PendingDraw>,
    next_tick: Option<Instant>,
    last_time_sync: Instant,
    /// Draw the next frame that arrives while not playing (after load, seek, stop).
    preview_pending: bool,
    /// Decode side reported the end; finish once the buffer drains.
    end_pending: bool,
    frames_presented: u64,
    /// Furthest timestamp handed to the adapter; the end of media when the length is unknown.
    last_presented_us: Option<i64>,
    adapter_errors: u64,
    last_error: Option<ErrorInfo>,
    destroy_reply: Option<Sender<()>>,
}

impl Session {
    fn new(parts: SessionParts, worker: DecodeWorkerHandle, retired: RetiredFrames) -> Self {
        let config = parts.config;
        Self {
            buffer: FrameBuffer::new(config.frame_buffer_depth, retired),
            adapter: AdapterPipeline::new(parts.ledger, config.adapter_timeout),
            worker: Some(worker),
            state: SessionState::new(parts.events),
            clock: PlaybackClock::new(),
            sink: parts.sink,
            audio: parts.audio,
            gate: AudioGate::new(),
            status: parts.status,
            epoch: 0,
            media: None,
            pending_load: None,
            stale_loads: 0,
            pending_seek: None,
            pending_draw: None,
            next_tick: None,
            last_time_sync: Instant::now(),
            preview_pending: false,
            end_pending: false,
            frames_presented: 0,
            last_presented_us: None,
            adapter_errors: 0,
            last_error: None,
            destroy_reply: None,
            config,
        }
    }

    fn run(mut self, requests: Receiver<SessionRequest>, mut responses: Receiver<DecodeResponse>) {
        loop {
            let timeout = self
                .next_deadline()
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_WAIT)
                .min(IDLE_WAIT);

            let mut decode_gone = false;
            let flow = crossbeam_channel::select! {
                recv(requests) -> msg => match msg {
                    Ok(request) => self.handle_request(request),
                    // Every handle is gone without an explicit destroy.
                    Err(_) => Flow::Exit,
                },
                recv(responses) -> msg => {
                    match msg {
                        Ok(response) => self.handle_response(response),
                        Err(_) => decode_gone = true,
                    }
                    Flow::Continue
                },
                default(timeout) => Flow::Continue,
            };
            if flow == Flow::Exit {
                break;
            }
            if decode_gone {
                responses = never();
                self.fatal(ErrorCode::DecodeError, "decode context exited".into());
            }
            self.on_timers(Instant::now());
            self.publish_status();
        }

        self.teardown(&responses);
        if let Some(reply) = self.destroy_reply.take() {
            let _ = reply.send(());
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.next_tick,
            self.pending_load.as_ref().map(|p| p.deadline),
            self.pending_seek.as_ref().map(|p| p.deadline),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn handle_request(&mut self, request: SessionRequest) -> Flow {
        match request {
            SessionRequest::Load { input, reply } => self.load(input, reply),
            SessionRequest::Play { reply } => {
                if let Some(result) = self.play(&reply) {
                    self.publish_status();
                    let _ = reply.send(result);
                }
            }
            SessionRequest::Pause { reply } => {
                let result = self.pause();
                self.publish_status();
                let _ = reply.send(result);
            }
            SessionRequest::Seek { seconds, reply } => self.seek(seconds, reply),
            SessionRequest::Stop { reply } => {
                let result = self.stop();
                self.publish_status();
                let _ = reply.send(result);
            }
            SessionRequest::SetAdapter { adapter } => {
                tracing::debug!(active = adapter.is_some(), "adapter replaced");
                self.adapter.set(adapter);
            }
            SessionRequest::Destroy { reply } => {
                // Answered once teardown has finished.
                self.destroy_reply = Some(reply);
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn load(&mut self, input: MediaInput, reply: Reply<MediaInfo>) {
        if let Err(e) = state::check_load(self.state.get()) {
            let _ = reply.send(Err(e));
            return;
        }
        tracing::info!(input = ?input, "load requested");
        if let Some(old) = self.pending_seek.take() {
            Self::reject_seek(old, PlayerError::SeekSuperseded);
        }
        self.stop_audio();
        self.buffer.flush();
        self.settle_draw();
        self.media = None;
        self.end_pending = false;
        self.next_tick = None;
        self.last_presented_us = None;
        self.clock = PlaybackClock::new();
        if let Ok(mut status) = self.status.lock() {
            status.clear_media();
        }

        let audio_output = self.audio.as_ref().map(|a| a.spec());
        self.state.set(PlaybackState::Loading);
        self.send(DecodeCommand::Initialize {
            input,
            audio_output,
        });
        self.pending_load = Some(PendingLoad {
            reply,
            deadline: Instant::now() + self.config.load_timeout,
        });
    }

    /// `None` when the reply is deferred until a reposition completes.
    fn play(&mut self, reply: &Reply<()>) -> Option<Result<(), PlayerError>> {
        if self.state.get() == PlaybackState::Paused
            && let Some(pending) = self.pending_seek.as_mut()
        {
            // Paused during a wrap-around that has not landed yet.
            pending.resolve_to = PlaybackState::Playing;
            return Some(Ok(()));
        }
        let action = match state::check_play(self.state.get()) {
            Ok(action) => action,
            Err(e) => return Some(Err(e)),
        };
        match action {
            PlayAction::Noop => Some(Ok(())),
            PlayAction::Start => {
                self.start_clock(self.clock.now());
                Some(Ok(()))
            }
            PlayAction::Reload => {
                tracing::info!("replaying from the start");
                self.begin_seek(
                    0.0,
                    SeekReply::Replay(reply.clone()),
                    PlaybackState::Playing,
                    PlaybackState::Loading,
                );
                None
            }
        }
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        let current = self.state.get();
        if let Some(pending) = self.pending_seek.as_mut() {
            // Seek, loop wrap-around or replay in flight: land paused once it resolves.
            if pending.resolve_to == PlaybackState::Playing {
                pending.resolve_to = PlaybackState::Paused;
            }
            tracing::debug!(epoch = pending.epoch, state = %current, "pause deferred to pending seek");
            if current == PlaybackState::Playing {
                // Wrap-around keeps `playing`; the clock is already frozen at the target.
                self.state.set(PlaybackState::Paused);
            }
            return Ok(());
        }
        if state::check_pause(current)? {
            self.clock.freeze();
            self.gate.close();
            self.next_tick = None;
            self.send(DecodeCommand::Pause);
            self.state.set(PlaybackState::Paused);
            tracing::debug!(at = self.clock.now(), "paused");
        }
        Ok(())
    }

    fn seek(&mut self, seconds: f64, reply: Reply<f64>) {
        if let Err(e) = state::check_seek(self.state.get()) {
            let _ = reply.send(Err(e));
            return;
        }
        let resolve_to = match self.pending_seek.as_ref() {
            Some(pending) => pending.resolve_to,
            None => state::seek_resolution(self.state.get()),
        };
        self.begin_seek(
            seconds,
            SeekReply::Seek(reply),
            resolve_to,
            PlaybackState::Seeking,
        );
    }

    fn begin_seek(
        &mut self,
        seconds: f64,
        reply: SeekReply,
        resolve_to: PlaybackState,
        during: PlaybackState,
    ) {
        let target = self.clamp_time(seconds);
        if let Some(old) = self.pending_seek.take() {
            tracing::debug!(epoch = old.epoch, "seek superseded");
            Self::reject_seek(old, PlayerError::SeekSuperseded);
        }
        self.epoch += 1;
        tracing::info!(epoch = self.epoch, target_seconds = target, "seek requested");

        self.gate.close();
        self.buffer.flush();
        self.end_pending = false;
        self.next_tick = None;
        self.clock.freeze_at(target);
        self.state.set(during);
        self.send(DecodeCommand::Pause);
        self.send(DecodeCommand::Seek {
            target_seconds: target,
            epoch: self.epoch,
        });
        self.pending_seek = Some(PendingSeek {
            epoch: self.epoch,
            target,
            resolve_to,
            reply,
            deadline: Instant::now() + self.config.seek_timeout,
        });
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        state::check_stop(self.state.get())?;
        if let Some(old) = self.pending_seek.take() {
            Self::reject_seek(old, PlayerError::SeekSuperseded);
        }
        self.epoch += 1;
        self.gate.close();
        self.buffer.flush();
        self.next_tick = None;
        self.end_pending = false;
        self.clock.freeze_at(0.0);
        self.send(DecodeCommand::Stop { epoch: self.epoch });
        self.preview_pending = true;
        self.state.set(PlaybackState::Ready);
        tracing::info!(epoch = self.epoch, "stopped");
        Ok(())
    }

    fn handle_response(&mut self, response: DecodeResponse) {
        match response {
            DecodeResponse::InitializeDone { media_info, audio } => {
                if self.stale_loads > 0 {
                    self.stale_loads -= 1;
                    tracing::debug!(
                        duration = media_info.duration_seconds,
                        has_audio = audio.is_some(),
                        "ignoring late initialize from a timed out load"
                    );
                    return;
                }
                let Some(pending) = self.pending_load.take() else {
                    tracing::debug!("initialize completed after the load was abandoned");
                    return;
                };
                self.clock = PlaybackClock::new();
                self.clock.set_duration(Some(media_info.duration_seconds));
                let monitor = audio.as_ref().map(|c| c.monitor());
                if let Some(consumer) = audio {
                    self.start_audio(consumer);
                }
                if let Ok(mut status) = self.status.lock() {
                    status.media = Some(media_info.clone());
                    status.ring = monitor;
                }
                self.media = Some(media_info.clone());
                self.preview_pending = true;
                self.state.set(PlaybackState::Ready);
                self.state
                    .events()
                    .publish(PlayerEvent::Loaded(media_info.clone()));
                tracing::info!(duration = media_info.duration_seconds, "loaded");
                self.publish_status();
                let _ = pending.reply.send(Ok(media_info));
            }
            DecodeResponse::FrameReady {
                frame,
                timestamp_us,
                epoch,
            } => {
                if epoch != self.epoch || self.pending_load.is_some() || self.media.is_none() {
                    tracing::trace!(epoch, current = self.epoch, timestamp_us, "discard stale frame");
                    self.buffer.discard(frame);
                    return;
                }
                self.buffer.push(frame);
                if self.preview_pending && self.pending_seek.is_none() && !self.is_playing() {
                    self.preview_pending = false;
                    let target = self.clock.now_us();
                    if let Some(frame) = self.buffer.select(target) {
                        self.present(frame);
                    }
                }
            }
            DecodeResponse::SeekDone {
                actual_seconds,
                epoch,
            } => {
                if epoch != self.epoch {
                    return;
                }
                let Some(pending) = self.pending_seek.take() else {
                    return;
                };
                self.finish_seek(pending, actual_seconds);
            }
            DecodeResponse::Ended => self.on_ended(),
            DecodeResponse::Error {
                message,
                code,
                fatal,
            } => {
                if fatal && self.stale_loads > 0 {
                    self.stale_loads -= 1;
                    tracing::debug!(%code, message = %message, "ignoring late failure from a timed out load");
                } else if fatal {
                    self.fatal(code, message);
                } else {
                    self.report(code, message);
                }
            }
        }
    }

    fn finish_seek(&mut self, pending: PendingSeek, actual: f64) {
        tracing::info!(
            epoch = pending.epoch,
            target = pending.target,
            actual,
            resolve_to = %pending.resolve_to,
            "seek completed"
        );
        self.clock.freeze_at(actual);
        match pending.reply {
            SeekReply::Seek(reply) => {
                self.resolve(pending.resolve_to, actual);
                self.state
                    .events()
                    .publish(PlayerEvent::SeekCompleted {
                        actual_seconds: actual,
                    });
                self.publish_status();
                let _ = reply.send(Ok(actual));
            }
            SeekReply::Replay(reply) => {
                self.state.set(PlaybackState::Ready);
                self.resolve(pending.resolve_to, actual);
                self.publish_status();
                let _ = reply.send(Ok(()));
            }
            SeekReply::Loop => {
                self.state.events().publish(PlayerEvent::Looped);
                self.resolve(pending.resolve_to, actual);
            }
        }
    }

    fn resolve(&mut self, to: PlaybackState, at: f64) {
        if to == PlaybackState::Playing {
            self.start_clock(at);
            return;
        }
        self.state.set(to);
        // Show where the seek landed.
        let target = self.clock.now_us();
        match self.buffer.select(target) {
            Some(frame) => self.present(frame),
            None => self.preview_pending = true,
        }
    }

    fn on_ended(&mut self) {
        if self.state.get() != PlaybackState::Playing {
            return;
        }
        if self.config.looping {
            tracing::info!("end reached; looping");
            self.begin_seek(
                0.0,
                SeekReply::Loop,
                PlaybackState::Playing,
                PlaybackState::Playing,
            );
            return;
        }
        self.end_pending = true;
        self.finish_end_if_drained();
    }

    fn finish_end_if_drained(&mut self) {
        if !self.end_pending || !self.buffer.is_empty() {
            return;
        }
        self.end_pending = false;
        self.next_tick = None;
        if self.clock.duration().is_none()
            && let Some(end_us) = self.last_presented_us
        {
            // Unknown length: the furthest frame shown marks the end.
            let end = end_us.max(0) as f64 / 1_000_000.0;
            self.clock.set_duration(Some(end));
            self.clock.freeze_at(end);
        } else {
            self.clock.freeze();
        }
        self.gate.close();
        self.state.set(PlaybackState::Ended);
        tracing::info!(at = self.clock.now(), "playback ended");
    }

    fn on_timers(&mut self, now: Instant) {
        if self.pending_load.as_ref().is_some_and(|p| now >= p.deadline)
            && let Some(pending) = self.pending_load.take()
        {
            let message = format!(
                "media did not load within {:?}",
                self.config.load_timeout
            );
            self.stale_loads += 1;
            self.fatal(ErrorCode::LoadError, message);
            let _ = pending.reply.send(Err(PlayerError::Timeout("load")));
        }

        if self.pending_seek.as_ref().is_some_and(|p| now >= p.deadline)
            && let Some(pending) = self.pending_seek.take()
        {
            tracing::warn!(epoch = pending.epoch, "seek not acknowledged in time");
            self.report(
                ErrorCode::DecodeError,
                format!("seek to {:.3}s timed out", pending.target),
            );
            let landing = match pending.resolve_to {
                PlaybackState::Ready => PlaybackState::Ready,
                _ => PlaybackState::Paused,
            };
            self.state.set(landing);
            Self::reject_seek(pending, PlayerError::Timeout("seek"));
        }

        if let Some(tick) = self.next_tick
            && now >= tick
        {
            self.tick(now);
            let next = tick + self.config.tick_interval;
            self.next_tick = Some(if next <= now {
                now + self.config.tick_interval
            } else {
                next
            });
            if !self.is_playing() {
                self.next_tick = None;
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        let target = (self.clock.now_at(now) * 1_000_000.0).round() as i64;
        if let Some(frame) = self
            .buffer
            .next_due(target, self.config.presentation_lead_us())
        {
            self.present(frame);
        }

        if now.saturating_duration_since(self.last_time_sync) >= self.config.time_sync_interval {
            self.last_time_sync = now;
            self.send(DecodeCommand::UpdateMediaTime {
                media_time_seconds: self.clock.now_at(now),
                anchor: now,
            });
        }
        self.finish_end_if_drained();
    }

    fn present(&mut self, frame: VideoFrame) {
        let ts = frame.timestamp_us();
        self.last_presented_us = Some(self.last_presented_us.map_or(ts, |last| last.max(ts)));
        let frame = match self.adapter.apply(frame) {
            Ok(frame) => frame,
            Err(e) => {
                self.adapter_errors += 1;
                self.report(e.code(), e.to_string());
                return;
            }
        };
        self.settle_draw();
        let timestamp_us = frame.timestamp_us();
        match self.sink.draw(frame) {
            Ok(DrawOutcome::Done) => self.frames_presented += 1,
            Ok(DrawOutcome::Pending(rx)) => {
                self.frames_presented += 1;
                self.pending_draw = Some(PendingDraw {
                    rx,
                    deadline: Instant::now() + self.config.draw_timeout,
                });
            }
            Err(e) => {
                tracing::warn!(timestamp_us, error = %e, "draw failed");
                self.report(ErrorCode::RenderError, e.to_string());
            }
        }
    }

    /// Wait for an in-flight draw before starting another.
    fn settle_draw(&mut self) {
        let Some(pending) = self.pending_draw.take() else {
            return;
        };
        let wait = pending.deadline.saturating_duration_since(Instant::now());
        match pending.rx.recv_timeout(wait) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(ErrorCode::RenderError, e.to_string()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => self.report(
                ErrorCode::RenderError,
                format!("draw did not finish within {:?}", self.config.draw_timeout),
            ),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {}
        }
    }

    fn start_clock(&mut self, media_seconds: f64) {
        let now = Instant::now();
        self.clock.start(media_seconds, now);
        self.send(DecodeCommand::Play {
            media_time_seconds: self.clock.now_at(now),
            anchor: now,
        });
        self.gate.open();
        self.last_time_sync = now;
        self.next_tick = Some(now);
        self.preview_pending = false;
        self.state.set(PlaybackState::Playing);
        tracing::debug!(from = media_seconds, "playing");
    }

    fn is_playing(&self) -> bool {
        self.state.get() == PlaybackState::Playing
    }

    fn start_audio(&mut self, consumer: crate::ring::RingConsumer) {
        let Some(output) = self.audio.as_mut() else {
            return;
        };
        self.gate.close();
        if let Err(e) = output.start(consumer, self.gate.clone()) {
            tracing::warn!(error = %e, "audio output failed; continuing without audio");
            self.report(ErrorCode::RenderError, format!("audio output: {e:#}"));
        }
    }

    fn stop_audio(&mut self) {
        self.gate.close();
        if let Some(output) = self.audio.as_mut() {
            output.stop();
        }
    }

    /// Non-fatal: record, publish, continue.
    fn report(&mut self, code: ErrorCode, message: String) {
        tracing::warn!(%code, message = %message, "playback error");
        let info = ErrorInfo {
            code,
            message,
            fatal: false,
        };
        self.last_error = Some(info.clone());
        self.state.events().publish(PlayerEvent::Error(info));
    }

    fn fatal(&mut self, code: ErrorCode, message: String) {
        tracing::error!(%code, message = %message, "session failed");
        let info = ErrorInfo {
            code,
            message: message.clone(),
            fatal: true,
        };
        self.last_error = Some(info.clone());

        self.gate.close();
        self.next_tick = None;
        self.end_pending = false;
        self.clock.freeze();
        self.buffer.flush();
        self.state.set(PlaybackState::Error);
        self.state.events().publish(PlayerEvent::Error(info));
        self.publish_status();

        if let Some(pending) = self.pending_load.take() {
            let _ = pending.reply.send(Err(PlayerError::Session {
                code,
                message: message.clone(),
            }));
        }
        if let Some(pending) = self.pending_seek.take() {
            Self::reject_seek(pending, PlayerError::Session { code, message });
        }
    }

    fn reject_seek(pending: PendingSeek, error: PlayerError) {
        match pending.reply {
            SeekReply::Seek(reply) => {
                let _ = reply.send(Err(error));
            }
            SeekReply::Replay(reply) => {
                let _ = reply.send(Err(error));
            }
            SeekReply::Loop => {}
        }
    }

    fn send(&self, command: DecodeCommand) {
        if let Some(worker) = self.worker.as_ref() {
            worker.send(command);
        }
    }

    fn clamp_time(&self, seconds: f64) -> f64 {
        let t = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        match self.media.as_ref().map(|m| m.duration_seconds) {
            Some(d) if d > 0.0 => t.min(d),
            _ => t,
        }
    }

    fn publish_status(&self) {
        let Ok(mut status) = self.status.lock() else {
            return;
        };
        status.state = self.state.get();
        status.clock = self.clock.clone();
        status.frames_presented = self.frames_presented;
        status.frames_retired = self.buffer.retired();
        status.frames_abandoned = self.buffer.abandoned();
        status.buffered_frames = self.buffer.len() as u64;
        status.adapter_errors = self.adapter_errors;
        status.last_error = self.last_error.clone();
    }

    /// Release everything and stop both contexts. Returns once the decode context is gone.
    fn teardown(&mut self, responses: &Receiver<DecodeResponse>) {
        tracing::info!("destroying session");
        if let Some(pending) = self.pending_load.take() {
            let _ = pending.reply.send(Err(PlayerError::Destroyed));
        }
        if let Some(pending) = self.pending_seek.take() {
            Self::reject_seek(pending, PlayerError::Destroyed);
        }
        self.stop_audio();
        self.next_tick = None;
        self.settle_draw();

        if let Some(worker) = self.worker.take() {
            worker.shutdown(self.config.load_timeout);
        }
        // Output the decode context sent before it stopped.
        for response in responses.try_iter() {
            if let DecodeResponse::FrameReady { frame, .. } = response {
                frame.release();
            }
        }
        self.buffer.flush();
        self.adapter.set(None);
        self.media = None;

        self.state.set(PlaybackState::Idle);
        if let Ok(mut status) = self.status.lock() {
            status.clear_media();
        }
        self.publish_status();
        self.state.events().close();
    }
}
