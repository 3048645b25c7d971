//! Audio output: the realtime consumer of the ring.
//!
//! The output callback reads only the [`RingConsumer`] and an [`AudioGate`]. It never locks
//! or allocates: channel mapping works out of a scratch buffer sized up front, and while the
//! gate is closed the callback outputs silence without draining the ring.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::device::{pick_buffer_size, pick_device, pick_output_config};
use crate::ring::RingConsumer;

/// Largest callback the scratch buffer handles in one pass; bigger callbacks loop.
const SCRATCH_FRAMES: usize = 4096;

/// Rate and channel layout of the audio device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioOutputSpec {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Play/pause flag shared with the realtime callback.
#[derive(Clone, Debug, Default)]
pub struct AudioGate(Arc<AtomicBool>);

impl AudioGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A device (or stand-in) that drains the ring in real time.
pub trait AudioOutput: Send {
    fn spec(&self) -> AudioOutputSpec;

    /// Start consuming `consumer`, playing only while `gate` is open.
    fn start(&mut self, consumer: RingConsumer, gate: AudioGate) -> Result<()>;

    /// Stop consuming and drop the consumer.
    fn stop(&mut self);
}

/// Render one callback's worth of audio into `data`.
///
/// `scratch` holds interleaved ring samples; its length bounds how many frames are
/// pulled per pass.
fn render_into<T>(
    data: &mut [T],
    dst_channels: usize,
    consumer: &mut RingConsumer,
    gate: &AudioGate,
    scratch: &mut [f32],
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    if !gate.is_open() {
        consumer.apply_flush();
        data.fill(silence);
        return;
    }

    let src_channels = consumer.channels();
    let frames_out = data.len() / dst_channels;
    let per_pass = (scratch.len() / src_channels).max(1);
    let mut done = 0;
    while done < frames_out {
        let n = (frames_out - done).min(per_pass);
        let src = &mut scratch[..n * src_channels];
        consumer.pop(src);
        for f in 0..n {
            let frame = &src[f * src_channels..(f + 1) * src_channels];
            let base = (done + f) * dst_channels;
            for ch in 0..dst_channels {
                data[base + ch] =
                    <T as cpal::Sample>::from_sample::<f32>(map_channel(frame, dst_channels, ch));
            }
        }
        done += n;
    }
    data[frames_out * dst_channels..].fill(silence);
}

/// Channel mapping:
/// - mono to stereo duplicates channel 0
/// - stereo to mono averages L/R
/// - matching layouts pass through
/// - anything else clamps to the available channels
fn map_channel(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (frame.len(), dst_channels) {
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (1, _) => frame[0],
        (src, _) => frame[dst_ch.min(src - 1)],
    }
}

enum OutputCommand {
    Start {
        consumer: RingConsumer,
        gate: AudioGate,
        reply: Sender<Result<()>>,
    },
    Stop,
}

/// CPAL-backed output. The device and stream live on a dedicated thread since CPAL streams
/// are not `Send`.
pub struct CpalOutput {
    spec: AudioOutputSpec,
    device_name: String,
    commands: Option<Sender<OutputCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the output device matching `device` (or the default) near `target_rate`.
    pub fn open(device: Option<&str>, target_rate: Option<u32>) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded::<Result<(AudioOutputSpec, String)>>(1);
        let (cmd_tx, cmd_rx) = unbounded::<OutputCommand>();
        let needle = device.map(str::to_owned);

        let thread = thread::Builder::new()
            .name("avsync-audio".into())
            .spawn(move || output_thread_main(needle, target_rate, ready_tx, cmd_rx))
            .context("spawn audio output thread")?;

        let (spec, device_name) = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| anyhow!("audio output thread did not report a device"))??;

        tracing::info!(
            device = %device_name,
            rate = spec.sample_rate,
            channels = spec.channels,
            "audio output opened"
        );

        Ok(Self {
            spec,
            device_name,
            commands: Some(cmd_tx),
            thread: Some(thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioOutput for CpalOutput {
    fn spec(&self) -> AudioOutputSpec {
        self.spec
    }

    fn start(&mut self, consumer: RingConsumer, gate: AudioGate) -> Result<()> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| anyhow!("audio output closed"))?;
        let (reply, result) = bounded(1);
        commands
            .send(OutputCommand::Start {
                consumer,
                gate,
                reply,
            })
            .map_err(|_| anyhow!("audio output thread exited"))?;
        result
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| anyhow!("audio output did not start"))?
    }

    fn stop(&mut self) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(OutputCommand::Stop);
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        // Closing the channel ends the output thread.
        self.commands.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn output_thread_main(
    needle: Option<String>,
    target_rate: Option<u32>,
    ready: Sender<Result<(AudioOutputSpec, String)>>,
    commands: Receiver<OutputCommand>,
) {
    let host = cpal::default_host();
    let opened = (|| -> Result<_> {
        let device = pick_device(&host, needle.as_deref())?;
        let name = device
            .description()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| "unknown".into());
        let supported = pick_output_config(&device, target_rate)?;
        Ok((device, supported, name))
    })();

    let (device, supported, name) = match opened {
        Ok(v) => v,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let mut config: cpal::StreamConfig = supported.config();
    if let Some(size) = pick_buffer_size(&supported) {
        config.buffer_size = size;
    }
    let spec = AudioOutputSpec {
        sample_rate: config.sample_rate,
        channels: config.channels as usize,
    };
    if ready.send(Ok((spec, name))).is_err() {
        return;
    }

    let mut stream: Option<cpal::Stream> = None;
    for command in commands.iter() {
        match command {
            OutputCommand::Start {
                consumer,
                gate,
                reply,
            } => {
                stream = None;
                let result = build_output_stream(&device, &config, sample_format, consumer, gate)
                    .and_then(|s| {
                        s.play().context("start output stream")?;
                        Ok(s)
                    });
                let reply_value = match result {
                    Ok(s) => {
                        stream = Some(s);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(reply_value);
            }
            OutputCommand::Stop => {
                stream = None;
            }
        }
    }
    drop(stream);
    tracing::debug!("audio output thread exiting");
}

/// Build a CPAL output stream that drains `consumer`.
///
/// The ring holds interleaved `f32` at the device rate; the callback maps channels and
/// converts to the device sample format.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    consumer: RingConsumer,
    gate: AudioGate,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, consumer, gate),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, consumer, gate),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, consumer, gate),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, consumer, gate),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: RingConsumer,
    gate: AudioGate,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let dst_channels = (config.channels as usize).max(1);
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES * consumer.channels()];

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            render_into(data, dst_channels, &mut consumer, &gate, &mut scratch);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Output without a device: a thread drains the ring at the nominal rate.
///
/// Used for headless playback and tests; it keeps audio flowing (and the ring draining)
/// exactly as a device would.
pub struct VirtualOutput {
    spec: AudioOutputSpec,
    period: Duration,
    played_frames: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VirtualOutput {
    pub fn new(spec: AudioOutputSpec) -> Self {
        Self {
            spec,
            period: Duration::from_millis(10),
            played_frames: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Frames pulled from the ring while the gate was open.
    pub fn played_frames(&self) -> Arc<AtomicU64> {
        self.played_frames.clone()
    }
}

impl AudioOutput for VirtualOutput {
    fn spec(&self) -> AudioOutputSpec {
        self.spec
    }

    fn start(&mut self, mut consumer: RingConsumer, gate: AudioGate) -> Result<()> {
        self.stop();
        self.stop.store(false, Ordering::Release);

        let frames_per_period =
            ((self.spec.sample_rate as u128 * self.period.as_micros()) / 1_000_000).max(1) as usize;
        let dst_channels = self.spec.channels.max(1);
        let mut data = vec![0.0f32; frames_per_period * dst_channels];
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * consumer.channels()];
        let period = self.period;
        let stop = self.stop.clone();
        let played = self.played_frames.clone();

        let handle = thread::Builder::new()
            .name("avsync-virtual-audio".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let open = gate.is_open();
                    render_into(&mut data, dst_channels, &mut consumer, &gate, &mut scratch);
                    if open {
                        played.fetch_add(frames_per_period as u64, Ordering::Relaxed);
                    }
                    thread::sleep(period);
                }
            })
            .context("spawn virtual audio thread")?;
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for VirtualOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ring_transport;

    #[test]
    fn channel_mapping_rules() {
        assert_eq!(map_channel(&[0.5], 2, 1), 0.5);
        assert_eq!(map_channel(&[0.2, 0.4], 1, 0), 0.5 * (0.2 + 0.4));
        assert_eq!(map_channel(&[0.1, 0.9], 2, 1), 0.9);
        assert_eq!(map_channel(&[0.1, 0.9], 6, 5), 0.9);
    }

    #[test]
    fn closed_gate_outputs_silence_without_draining() {
        let (mut p, mut c) = ring_transport(16, 2);
        p.push(&[1.0; 8]);
        let gate = AudioGate::new();
        let mut out = [9.0f32; 8];
        let mut scratch = vec![0.0; 8];
        render_into(&mut out, 2, &mut c, &gate, &mut scratch);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(c.available_read(), 8);
    }

    #[test]
    fn open_gate_maps_mono_to_stereo_and_pads_with_silence() {
        let (mut p, mut c) = ring_transport(16, 1);
        p.push(&[0.25, 0.5]);
        let gate = AudioGate::new();
        gate.open();
        let mut out = [9.0f32; 6];
        // Scratch smaller than the callback forces multiple passes.
        let mut scratch = vec![0.0; 2];
        render_into(&mut out, 2, &mut c, &gate, &mut scratch);
        assert_eq!(out, [0.25, 0.25, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(c.monitor().stats().underrun_samples, 1);
    }

    #[test]
    fn closed_gate_still_applies_flush() {
        let (mut p, mut c) = ring_transport(16, 1);
        p.push(&[1.0; 4]);
        p.request_flush();
        let gate = AudioGate::new();
        let mut out = [0.0f32; 2];
        render_into(&mut out, 1, &mut c, &gate, &mut vec![0.0; 4]);
        assert_eq!(c.available_read(), 0);
    }

    #[test]
    fn virtual_output_drains_while_open() {
        let spec = AudioOutputSpec {
            sample_rate: 8_000,
            channels: 1,
        };
        let (mut p, c) = ring_transport(8_000, 1);
        p.push(&[0.1; 4_000]);
        let monitor = p.monitor();
        let gate = AudioGate::new();
        let mut out = VirtualOutput::new(spec);
        out.start(c, gate.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(monitor.stats().buffered_samples, 4_000);
        gate.open();
        std::thread::sleep(Duration::from_millis(100));
        out.stop();
        assert!(monitor.stats().buffered_samples < 4_000);
        assert!(out.played_frames().load(Ordering::Relaxed) > 0);
    }
}
