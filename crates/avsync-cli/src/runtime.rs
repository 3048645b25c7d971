//! Command runners for the `avsync` binary.
//!
//! Each playback command builds one [`Player`], loads a single input, plays it to the end (or
//! until ctrl-c) and tears the player down.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use avsync::decode_queue::describe;
use avsync::demux::SymphoniaSource;
use avsync::output::CpalOutput;
use avsync::synthetic::PatternSource;
use avsync::{MediaInput, NullSink, Player, PlayerEvent};
use avsync_types::{PlaybackState, PlayerStatus};
use crossbeam_channel::{bounded, never, select, tick};

use crate::config::PlaybackRunConfig;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for dev in avsync::device::list_devices(&host)? {
        let marker = if dev.is_default { "*" } else { " " };
        let rates = match (dev.min_rate, dev.max_rate) {
            (Some(min), Some(max)) => format!("{min}-{max} Hz"),
            _ => "rates unknown".to_string(),
        };
        println!("{marker} {:>2}: {} ({rates})", dev.index, dev.name);
    }
    Ok(())
}

/// Print the media info of `path` as JSON.
pub fn probe(path: &Path) -> Result<()> {
    let source = SymphoniaSource::open(path).with_context(|| format!("probe {path:?}"))?;
    let info = describe(&source);
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Play a local media file.
pub fn run_play(config: PlaybackRunConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("No such file: {path:?}"));
    }
    run_input(config, MediaInput::from(path.to_path_buf()))
}

/// Play the generated test pattern.
pub fn run_pattern(config: PlaybackRunConfig, pattern: PatternSource) -> Result<()> {
    run_input(config, MediaInput::source(pattern))
}

fn run_input(config: PlaybackRunConfig, input: MediaInput) -> Result<()> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("install ctrl-c handler")?;

    let sink = NullSink::new();
    let mut builder = Player::builder()
        .config(config.player.clone())
        .sink(sink.clone());
    if config.audio {
        match CpalOutput::open(config.device.as_deref(), None) {
            Ok(output) => builder = builder.audio_output(output),
            Err(e) => tracing::warn!("audio output unavailable, playing video only: {e:#}"),
        }
    }
    let player = builder.build().context("start player")?;
    let events = player.subscribe();

    let info = player.load(input).context("load media")?;
    tracing::info!(
        duration = info.duration_seconds,
        video = ?info.video,
        audio = ?info.audio,
        "media loaded"
    );
    if let Some(start) = config.start_seconds {
        let reached = player.seek(start).context("seek to start position")?;
        tracing::info!(reached, "positioned");
    }
    player.play().context("start playback")?;

    let ticker = config.status_every.map(tick).unwrap_or_else(never);
    let outcome = loop {
        select! {
            recv(stop_rx) -> _ => {
                tracing::info!("interrupted");
                break Ok(());
            }
            recv(events) -> event => match event {
                Ok(PlayerEvent::StateChanged { to: PlaybackState::Ended, .. }) => {
                    tracing::info!("playback finished");
                    break Ok(());
                }
                Ok(PlayerEvent::Error(err)) if err.fatal => {
                    break Err(anyhow!("playback failed ({}): {}", err.code, err.message));
                }
                Ok(PlayerEvent::Error(err)) => {
                    tracing::warn!(code = %err.code, "{}", err.message);
                }
                Ok(PlayerEvent::Looped) => tracing::info!("looped"),
                Ok(PlayerEvent::StateChanged { from, to }) => {
                    tracing::debug!(%from, %to, "state changed");
                }
                Ok(_) => {}
                Err(_) => break Ok(()),
            },
            recv(ticker) -> _ => log_status(&player.status(), sink.drawn()),
        }
    };

    let status = player.status();
    player.destroy();
    tracing::info!(
        presented = status.frames_presented,
        dropped = status.frames_dropped,
        drawn = sink.drawn(),
        frames = ?player.frame_stats(),
        "player destroyed"
    );
    outcome
}

fn log_status(status: &PlayerStatus, drawn: u64) {
    tracing::info!(
        state = %status.state,
        time = format_args!("{:.2}", status.current_time_seconds),
        duration = ?status.duration_seconds,
        drawn,
        dropped = status.frames_dropped,
        buffered = status.buffered_frames,
        audio_buffered = ?status.audio_buffered_samples,
        underrun = ?status.audio_underrun_samples,
        "status"
    );
}
