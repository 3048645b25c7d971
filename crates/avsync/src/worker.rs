//! Decode context: one worker thread that owns the source, the decoders and the ring producer.
//!
//! The worker reacts to [`DecodeCommand`]s and otherwise runs the refill loop on an explicit
//! schedule. While playing, the next fill is armed `fill_interval` ahead so frames retired by
//! the render side get replaced. When not playing, a fill that stops on a bound disarms the
//! schedule; play, seek and time sync re-arm it. Stop, destroy and a fatal error disarm it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::clock::PlaybackClock;
use crate::codec::CodecRegistry;
use crate::config::PlayerConfig;
use crate::decode_queue::{DecodeQueueManager, FillStop};
use crate::error::PipelineError;
use crate::frame::FrameLedger;
use crate::output::AudioOutputSpec;
use crate::protocol::{DecodeCommand, DecodeResponse, Epoch, RetiredView};
use crate::source::MediaInput;

/// Deadline-based refill schedule.
#[derive(Debug, Default)]
pub struct FillScheduler {
    next: Option<Instant>,
}

impl FillScheduler {
    pub fn arm_at(&mut self, when: Instant) {
        self.next = Some(match self.next {
            Some(existing) => existing.min(when),
            None => when,
        });
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Consume the deadline if it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(when) if when <= now => {
                self.next = None;
                true
            }
            _ => false,
        }
    }
}

/// Owner-side handle of the decode thread.
pub struct DecodeWorkerHandle {
    commands: Sender<DecodeCommand>,
    /// Disconnects when the worker thread has finished its teardown.
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl DecodeWorkerHandle {
    pub fn send(&self, command: DecodeCommand) -> bool {
        let name = command.name();
        if self.commands.send(command).is_err() {
            tracing::debug!(command = name, "decode worker gone");
            return false;
        }
        true
    }

    /// Send `Destroy` and wait up to `timeout` for the worker to finish.
    ///
    /// Returns `false` when the worker did not finish in time; it is then detached.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        let _ = self.commands.send(DecodeCommand::Destroy);
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if let Some(handle) = self.thread.take() {
                    let _ = handle.join();
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(?timeout, "decode worker did not stop in time; detaching");
                self.thread.take();
                false
            }
        }
    }
}

pub fn spawn_decode_worker(
    config: PlayerConfig,
    registry: Arc<CodecRegistry>,
    ledger: Arc<FrameLedger>,
    retired: RetiredView,
) -> std::io::Result<(DecodeWorkerHandle, Receiver<DecodeResponse>)> {
    let (cmd_tx, cmd_rx) = unbounded();
    let (resp_tx, resp_rx) = unbounded();
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

    let thread = thread::Builder::new()
        .name("avsync-decode".into())
        .spawn(move || {
            let mut worker = DecodeWorker::new(config, registry, ledger, retired, resp_tx);
            worker.run(cmd_rx);
            drop(worker);
            drop(done_tx);
        })?;

    Ok((
        DecodeWorkerHandle {
            commands: cmd_tx,
            done: done_rx,
            thread: Some(thread),
        },
        resp_rx,
    ))
}

struct DecodeWorker {
    config: PlayerConfig,
    registry: Arc<CodecRegistry>,
    ledger: Arc<FrameLedger>,
    retired: RetiredView,
    responses: Sender<DecodeResponse>,
    manager: Option<DecodeQueueManager>,
    clock: PlaybackClock,
    epoch: Epoch,
    playing: bool,
    ended_sent: bool,
    fill: FillScheduler,
}

impl DecodeWorker {
    fn new(
        config: PlayerConfig,
        registry: Arc<CodecRegistry>,
        ledger: Arc<FrameLedger>,
        retired: RetiredView,
        responses: Sender<DecodeResponse>,
    ) -> Self {
        Self {
            config,
            registry,
            ledger,
            retired,
            responses,
            manager: None,
            clock: PlaybackClock::new(),
            epoch: 0,
            playing: false,
            ended_sent: false,
            fill: FillScheduler::default(),
        }
    }

    fn run(&mut self, commands: Receiver<DecodeCommand>) {
        loop {
            let command = match self.fill.deadline() {
                Some(deadline) => match commands.recv_deadline(deadline) {
                    Ok(c) => Some(c),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                },
                None => match commands.recv() {
                    Ok(c) => Some(c),
                    Err(_) => break,
                },
            };

            match command {
                Some(DecodeCommand::Destroy) => break,
                Some(command) => self.handle(command),
                None => {}
            }

            if self.fill.take_due(Instant::now()) {
                self.fill_and_reschedule();
            }
        }
        self.teardown();
    }

    fn handle(&mut self, command: DecodeCommand) {
        tracing::trace!(command = command.name(), epoch = self.epoch, "decode command");
        match command {
            DecodeCommand::Initialize {
                input,
                audio_output,
            } => self.initialize(input, audio_output),
            DecodeCommand::Play {
                media_time_seconds,
                anchor,
            } => {
                self.clock.start(media_time_seconds, anchor);
                self.playing = true;
                self.fill.arm_at(Instant::now());
            }
            DecodeCommand::Pause => {
                self.clock.freeze();
                self.playing = false;
            }
            DecodeCommand::Seek {
                target_seconds,
                epoch,
            } => {
                self.epoch = epoch;
                let actual = self.reposition(target_seconds);
                // Refill before acknowledging so the covering frame precedes SeekDone.
                self.fill_and_reschedule();
                if let Some(actual_seconds) = actual {
                    self.respond(DecodeResponse::SeekDone {
                        actual_seconds,
                        epoch,
                    });
                }
            }
            DecodeCommand::Stop { epoch } => {
                self.epoch = epoch;
                self.playing = false;
                self.clock.freeze_at(0.0);
                self.reposition(0.0);
                // Preroll once, then stay idle until the next play or seek.
                self.fill_and_reschedule();
                self.fill.cancel();
            }
            DecodeCommand::UpdateMediaTime {
                media_time_seconds,
                anchor,
            } => {
                self.clock.update_anchor(media_time_seconds, anchor);
                if self.playing && !self.ended_sent {
                    self.fill.arm_at(Instant::now());
                }
            }
            DecodeCommand::Destroy => {}
        }
    }

    fn initialize(&mut self, input: MediaInput, audio_output: Option<AudioOutputSpec>) {
        if let Some(mut old) = self.manager.take() {
            old.close();
        }
        self.fill.cancel();
        self.playing = false;
        self.ended_sent = false;
        self.clock = PlaybackClock::new();

        let started = Instant::now();
        tracing::info!(input = ?input, "opening media");
        let opened = input.open().map_err(PipelineError::from).and_then(|source| {
            DecodeQueueManager::open(
                source,
                &self.registry,
                audio_output,
                &self.config,
                self.ledger.clone(),
                self.retired.clone(),
            )
        });

        match opened {
            Ok((manager, audio)) => {
                let media_info = manager.media_info().clone();
                self.clock.set_duration(Some(media_info.duration_seconds));
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    duration = media_info.duration_seconds,
                    "media opened"
                );
                self.manager = Some(manager);
                self.respond(DecodeResponse::InitializeDone { media_info, audio });
                self.fill.arm_at(Instant::now());
            }
            Err(e) => self.fail(e),
        }
    }

    /// Seek the manager. Returns the clamped target, or `None` after a fatal error.
    fn reposition(&mut self, target_seconds: f64) -> Option<f64> {
        self.ended_sent = false;
        let manager = self.manager.as_mut()?;
        match manager.seek(target_seconds) {
            Ok(actual) => {
                let now = Instant::now();
                self.clock.update_anchor(actual, now);
                tracing::debug!(target_seconds, actual, epoch = self.epoch, "decode seek");
                Some(actual)
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn fill_and_reschedule(&mut self) {
        let Self {
            manager,
            responses,
            epoch,
            ..
        } = self;
        let Some(manager) = manager.as_mut() else {
            return;
        };
        let epoch = *epoch;
        let result = manager.fill_buffer(&mut |frame| {
            let timestamp_us = frame.timestamp_us();
            if let Err(e) = responses.send(DecodeResponse::FrameReady {
                frame,
                timestamp_us,
                epoch,
            }) && let DecodeResponse::FrameReady { frame, .. } = e.into_inner()
            {
                frame.release();
            }
        });

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        for message in report.corrupt {
            self.respond(DecodeResponse::Error {
                message,
                code: avsync_types::ErrorCode::DecodeError,
                fatal: false,
            });
        }

        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        let exhausted = manager.is_exhausted();
        // Without a known duration the end is reached once everything forwarded is consumed.
        let reached_end = match self.clock.duration() {
            Some(_) => self.clock.at_end(),
            None => manager.is_drained(),
        };
        if exhausted && self.playing && !self.ended_sent && reached_end {
            tracing::info!(epoch = self.epoch, "end of media");
            self.ended_sent = true;
            self.respond(DecodeResponse::Ended);
        }

        let idle = if self.playing {
            exhausted && self.ended_sent
        } else {
            // Nothing is retired or drained while stopped; wait for a command.
            exhausted || matches!(report.stop, Some(FillStop::Depth | FillStop::RingFull))
        };
        if idle {
            self.fill.cancel();
        } else {
            self.fill.arm_at(Instant::now() + self.config.fill_interval);
        }
    }

    fn fail(&mut self, error: PipelineError) {
        tracing::error!(error = %error, code = %error.code(), "decode pipeline failed");
        if let Some(mut manager) = self.manager.take() {
            manager.close();
        }
        self.fill.cancel();
        self.playing = false;
        self.respond(DecodeResponse::Error {
            message: error.to_string(),
            code: error.code(),
            fatal: true,
        });
    }

    fn respond(&self, response: DecodeResponse) {
        if let Err(e) = self.responses.send(response) {
            // Render side is gone; frames inside are released on drop.
            tracing::trace!(response = ?e.into_inner(), "response dropped");
        }
    }

    fn teardown(&mut self) {
        self.fill.cancel();
        if let Some(mut manager) = self.manager.take() {
            manager.close();
        }
        tracing::debug!("decode worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::protocol::{RetiredFrames, retired_counter};
    use crate::source::{Codec, EncodedSample, MemorySource, Track, TrackKind};

    fn video(frames: i64) -> (Track, Vec<EncodedSample>) {
        let track = Track {
            id: 1,
            kind: TrackKind::Video {
                width: 1,
                height: 1,
            },
            codec: Codec::RawVideo(PixelFormat::Rgba8),
            timescale: 10,
            sample_count: 0,
            duration: frames as u64,
        };
        let samples = (0..frames)
            .map(|i| EncodedSample {
                track_id: 1,
                data: vec![0u8; 4].into_boxed_slice(),
                dts: i,
                pts: i,
                duration: 1,
                is_sync: true,
            })
            .collect();
        (track, samples)
    }

    fn source(frames: i64) -> MemorySource {
        let (track, samples) = video(frames);
        MemorySource::new(frames as f64 / 10.0).with_track(track, samples)
    }

    /// Container that does not report its length.
    fn unknown_length(frames: i64) -> MemorySource {
        let (track, samples) = video(frames);
        MemorySource::new(0.0).with_track(track, samples)
    }

    fn worker() -> (DecodeWorker, Receiver<DecodeResponse>, RetiredFrames) {
        let (retired, view) = retired_counter();
        let (tx, rx) = unbounded();
        let w = DecodeWorker::new(
            PlayerConfig::default(),
            Arc::new(CodecRegistry::new()),
            FrameLedger::new(),
            view,
            tx,
        );
        (w, rx, retired)
    }

    fn release_frames(rx: &Receiver<DecodeResponse>) -> usize {
        rx.try_iter()
            .filter_map(|r| match r {
                DecodeResponse::FrameReady { frame, .. } => {
                    frame.release();
                    Some(())
                }
                _ => None,
            })
            .count()
    }

    fn recv(rx: &Receiver<DecodeResponse>) -> DecodeResponse {
        rx.recv_timeout(Duration::from_secs(2)).expect("response")
    }

    #[test]
    fn scheduler_fires_once_per_arm() {
        let mut s = FillScheduler::default();
        let now = Instant::now();
        assert!(!s.take_due(now));
        s.arm_at(now + Duration::from_millis(5));
        s.arm_at(now);
        assert_eq!(s.deadline(), Some(now));
        assert!(s.take_due(now));
        assert!(!s.take_due(now));
        s.arm_at(now);
        s.cancel();
        assert!(!s.take_due(now + Duration::from_secs(1)));
    }

    #[test]
    fn initialize_then_frames_then_seek_ack() {
        let (retired, view) = retired_counter();
        let (handle, rx) = spawn_decode_worker(
            PlayerConfig::default(),
            Arc::new(CodecRegistry::new()),
            FrameLedger::new(),
            view,
        )
        .unwrap();
        handle.send(DecodeCommand::Initialize {
            input: MediaInput::Source(Box::new(source(20))),
            audio_output: None,
        });
        match recv(&rx) {
            DecodeResponse::InitializeDone { media_info, audio } => {
                assert_eq!(media_info.duration_seconds, 2.0);
                assert!(audio.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        for expected in [0, 100_000, 200_000] {
            match recv(&rx) {
                DecodeResponse::FrameReady {
                    frame,
                    timestamp_us,
                    epoch,
                } => {
                    assert_eq!(timestamp_us, expected);
                    assert_eq!(epoch, 0);
                    frame.release();
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        retired.retire(3);

        handle.send(DecodeCommand::Seek {
            target_seconds: 1.0,
            epoch: 1,
        });
        let mut saw_target = false;
        loop {
            match recv(&rx) {
                DecodeResponse::FrameReady { frame, epoch, .. } => {
                    // Refill frames from before the seek may still be queued.
                    if epoch == 1 && frame.timestamp_us() == 1_000_000 {
                        saw_target = true;
                    }
                    frame.release();
                    retired.retire(1);
                }
                DecodeResponse::SeekDone {
                    actual_seconds,
                    epoch,
                } => {
                    assert_eq!(epoch, 1);
                    assert_eq!(actual_seconds, 1.0);
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(saw_target);
        assert!(handle.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn failed_open_reports_fatal_load_error() {
        let (_retired, view) = retired_counter();
        let (handle, rx) = spawn_decode_worker(
            PlayerConfig::default(),
            Arc::new(CodecRegistry::new()),
            FrameLedger::new(),
            view,
        )
        .unwrap();
        handle.send(DecodeCommand::Initialize {
            input: MediaInput::File("/nonexistent/clip.mp4".into()),
            audio_output: None,
        });
        match recv(&rx) {
            DecodeResponse::Error { code, fatal, .. } => {
                assert_eq!(code, avsync_types::ErrorCode::LoadError);
                assert!(fatal);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(handle.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn ended_is_sent_once_clock_passes_duration() {
        let (retired, view) = retired_counter();
        let (handle, rx) = spawn_decode_worker(
            PlayerConfig::default(),
            Arc::new(CodecRegistry::new()),
            FrameLedger::new(),
            view,
        )
        .unwrap();
        handle.send(DecodeCommand::Initialize {
            input: MediaInput::Source(Box::new(source(2))),
            audio_output: None,
        });
        handle.send(DecodeCommand::Play {
            media_time_seconds: 0.15,
            anchor: Instant::now(),
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut ended = false;
        while Instant::now() < deadline && !ended {
            match recv(&rx) {
                DecodeResponse::FrameReady { frame, .. } => {
                    frame.release();
                    retired.retire(1);
                }
                DecodeResponse::Ended => ended = true,
                DecodeResponse::InitializeDone { .. } => {}
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(ended);
        assert!(handle.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn scheduler_idles_once_preroll_is_full_and_not_playing() {
        let (mut w, rx, _retired) = worker();
        w.handle(DecodeCommand::Initialize {
            input: MediaInput::source(source(20)),
            audio_output: None,
        });
        assert!(w.fill.deadline().is_some());
        assert!(w.fill.take_due(Instant::now()));
        w.fill_and_reschedule();
        assert_eq!(release_frames(&rx), 3);
        assert!(w.fill.deadline().is_none());

        w.handle(DecodeCommand::Play {
            media_time_seconds: 0.0,
            anchor: Instant::now(),
        });
        assert!(w.fill.deadline().is_some());
        w.handle(DecodeCommand::Stop { epoch: 1 });
        release_frames(&rx);
        assert!(w.fill.deadline().is_none());

        w.handle(DecodeCommand::UpdateMediaTime {
            media_time_seconds: 0.0,
            anchor: Instant::now(),
        });
        assert!(w.fill.deadline().is_none(), "time sync while stopped stays idle");
        w.teardown();
    }

    #[test]
    fn time_sync_rearms_while_playing() {
        let (mut w, rx, _retired) = worker();
        w.handle(DecodeCommand::Initialize {
            input: MediaInput::source(source(20)),
            audio_output: None,
        });
        w.handle(DecodeCommand::Play {
            media_time_seconds: 0.0,
            anchor: Instant::now(),
        });
        w.fill.cancel();
        w.handle(DecodeCommand::UpdateMediaTime {
            media_time_seconds: 0.1,
            anchor: Instant::now(),
        });
        assert!(w.fill.deadline().is_some());
        release_frames(&rx);
        w.teardown();
    }

    #[test]
    fn unknown_length_ends_once_everything_is_consumed() {
        let (retired, view) = retired_counter();
        let (handle, rx) = spawn_decode_worker(
            PlayerConfig::default(),
            Arc::new(CodecRegistry::new()),
            FrameLedger::new(),
            view,
        )
        .unwrap();
        handle.send(DecodeCommand::Initialize {
            input: MediaInput::source(unknown_length(3)),
            audio_output: None,
        });
        handle.send(DecodeCommand::Play {
            media_time_seconds: 0.0,
            anchor: Instant::now(),
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut frames = 0;
        let mut ended = false;
        while Instant::now() < deadline && !ended {
            match recv(&rx) {
                DecodeResponse::InitializeDone { media_info, .. } => {
                    assert_eq!(media_info.duration_seconds, 0.0);
                }
                DecodeResponse::FrameReady { frame, .. } => {
                    frames += 1;
                    frame.release();
                    retired.retire(1);
                }
                DecodeResponse::Ended => ended = true,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(ended);
        assert_eq!(frames, 3);
        assert!(handle.shutdown(Duration::from_secs(2)));
    }
}
