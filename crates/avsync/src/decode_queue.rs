//! Decode queue manager: pulls samples from the source and keeps both lanes fed.
//!
//! Video: samples go to the video decoder while the number of outstanding frames (sent to
//! the render context and not yet retired there) is below the buffer depth and the decoder's
//! own queue is below its saturation point. Frames are forwarded in decoder output order.
//!
//! Audio: samples are decoded, trimmed to the last seek target, resampled to the device rate
//! and pushed into the ring while it has room for a typical chunk.
//!
//! `fill_buffer` takes `&mut self`, so overlapping fills cannot happen; calling it when
//! every bound is hit is a cheap no-op.

use std::sync::Arc;
use std::time::{Duration, Instant};

use avsync_types::{AudioTrackInfo, MediaInfo, VideoTrackInfo};

use crate::codec::{AudioDecoder, CodecRegistry, VideoDecoder};
use crate::config::PlayerConfig;
use crate::error::{PipelineError, SourceError};
use crate::frame::{FrameLedger, VideoFrame};
use crate::output::AudioOutputSpec;
use crate::protocol::RetiredView;
use crate::resample::StreamResampler;
use crate::ring::{RingConsumer, RingMonitor, RingProducer, ring_for_duration};
use crate::source::{SampleSource, Track, TrackKind};

const OVERFLOW_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Why a fill stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillStop {
    /// Nothing left to pull on any lane.
    Exhausted,
    /// Outstanding frames reached the buffer depth.
    Depth,
    /// The video decoder's queue is saturated.
    Saturated,
    /// Audio only: the ring has no room for another chunk.
    RingFull,
}

/// What one `fill_buffer` call did.
#[derive(Debug, Default)]
pub struct FillReport {
    pub frames_sent: usize,
    pub audio_samples: usize,
    /// Samples that failed to decode and were skipped.
    pub corrupt: Vec<String>,
    pub stop: Option<FillStop>,
}

impl FillReport {
    pub fn made_progress(&self) -> bool {
        self.frames_sent > 0 || self.audio_samples > 0
    }
}

struct VideoLane {
    track: Track,
    decoder: Box<dyn VideoDecoder>,
    exhausted: bool,
    drained: bool,
    /// Set after a seek until the frame covering the target has been forwarded.
    seek_target_us: Option<i64>,
    /// Latest decoded frame before the seek target.
    held: Option<VideoFrame>,
}

struct AudioLane {
    track: Track,
    decoder: Box<dyn AudioDecoder>,
    resampler: Option<StreamResampler>,
    producer: RingProducer,
    channels: usize,
    decoded: Vec<f32>,
    resampled: Vec<f32>,
    /// Audio before this time is dropped (seek).
    trim_until_us: Option<i64>,
    /// Samples a typical decoded chunk produces at the output rate.
    chunk_estimate: usize,
    exhausted: bool,
    last_overflow_log: Option<Instant>,
}

pub struct DecodeQueueManager {
    source: Box<dyn SampleSource>,
    video: Option<VideoLane>,
    audio: Option<AudioLane>,
    ledger: Arc<FrameLedger>,
    retired: RetiredView,
    sent: u64,
    depth: u64,
    saturation: usize,
    media_info: MediaInfo,
}

impl DecodeQueueManager {
    /// Build decoders for the source's tracks and, when `audio_output` is given, the audio
    /// ring. Returns the consumer half of the ring for the output.
    pub fn open(
        source: Box<dyn SampleSource>,
        registry: &CodecRegistry,
        audio_output: Option<AudioOutputSpec>,
        config: &PlayerConfig,
        ledger: Arc<FrameLedger>,
        retired: RetiredView,
    ) -> Result<(Self, Option<RingConsumer>), PipelineError> {
        let video_track = source.video_track().cloned();
        let audio_track = source.audio_track().cloned();
        if video_track.is_none() && audio_track.is_none() {
            return Err(SourceError::Unsupported("no video or audio track".into()).into());
        }

        let media_info = describe(source.as_ref());

        let video = match video_track {
            Some(track) => {
                let decoder = registry.video_decoder(&track)?;
                Some(VideoLane {
                    track,
                    decoder,
                    exhausted: false,
                    drained: false,
                    seek_target_us: None,
                    held: None,
                })
            }
            None => None,
        };

        let mut consumer = None;
        let audio = match (audio_track, audio_output) {
            (Some(track), Some(spec)) => {
                let decoder = registry.audio_decoder(&track)?;
                let (lane, cons) = AudioLane::new(track, decoder, spec, config)?;
                consumer = Some(cons);
                Some(lane)
            }
            (Some(track), None) => {
                tracing::info!(track = track.id, "no audio output; audio track ignored");
                None
            }
            (None, _) => None,
        };

        tracing::info!(
            duration = media_info.duration_seconds,
            video = video.is_some(),
            audio = audio.is_some(),
            "decode pipeline ready"
        );

        // The retired count is per player; start level with it so this session has nothing
        // outstanding.
        let sent = retired.get();
        Ok((
            Self {
                source,
                video,
                audio,
                ledger,
                retired,
                sent,
                depth: config.frame_buffer_depth.max(1) as u64,
                saturation: config.decoder_saturation.max(1),
                media_info,
            },
            consumer,
        ))
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn duration_seconds(&self) -> f64 {
        self.media_info.duration_seconds
    }

    pub fn ring_monitor(&self) -> Option<RingMonitor> {
        self.audio.as_ref().map(|a| a.producer.monitor())
    }

    /// Frames sent to the render context and not yet retired there.
    pub fn outstanding(&self) -> u64 {
        self.sent.saturating_sub(self.retired.get())
    }

    /// Every lane has pulled and forwarded everything.
    pub fn is_exhausted(&self) -> bool {
        let video_done = self
            .video
            .as_ref()
            .is_none_or(|v| v.exhausted && v.drained && v.held.is_none() && v.decoder.queue_size() == 0);
        let audio_done = self.audio.as_ref().is_none_or(|a| a.exhausted);
        video_done && audio_done
    }

    /// Everything forwarded has been consumed: no outstanding frames and an empty ring.
    pub fn is_drained(&self) -> bool {
        self.outstanding() == 0 && self.audio.as_ref().is_none_or(|a| a.producer.available_read() == 0)
    }

    /// Pull and decode until a bound is hit or the source is exhausted.
    ///
    /// Each forwarded frame is handed to `emit`. Fatal errors abort the fill; corrupt samples
    /// are skipped and listed in the report.
    pub fn fill_buffer(
        &mut self,
        emit: &mut dyn FnMut(VideoFrame),
    ) -> Result<FillReport, PipelineError> {
        let mut report = FillReport::default();
        let video_stop = self.fill_video(emit, &mut report)?;
        let audio_stop = self.fill_audio(&mut report)?;

        report.stop = match (video_stop, audio_stop) {
            (Some(v), _) if v != FillStop::Exhausted => Some(v),
            (_, Some(a)) if a != FillStop::Exhausted => Some(a),
            _ => Some(FillStop::Exhausted),
        };
        if report.made_progress() {
            tracing::trace!(
                frames = report.frames_sent,
                audio_samples = report.audio_samples,
                outstanding = self.outstanding(),
                stop = ?report.stop,
                "fill"
            );
        }
        Ok(report)
    }

    fn fill_video(
        &mut self,
        emit: &mut dyn FnMut(VideoFrame),
        report: &mut FillReport,
    ) -> Result<Option<FillStop>, PipelineError> {
        let Some(lane) = self.video.as_mut() else {
            return Ok(None);
        };
        loop {
            if self.sent.saturating_sub(self.retired.get()) >= self.depth {
                return Ok(Some(FillStop::Depth));
            }
            if let Some(mut frame) = lane.decoder.next_frame() {
                frame.track(&self.ledger);
                for out in lane.accept(frame) {
                    self.sent += 1;
                    report.frames_sent += 1;
                    emit(out);
                }
                continue;
            }
            if lane.exhausted {
                if !lane.drained {
                    lane.decoder.flush()?;
                    lane.drained = true;
                    continue;
                }
                // Seek target past the last frame: the held frame is the closest.
                if let Some(held) = lane.held.take() {
                    lane.seek_target_us = None;
                    self.sent += 1;
                    report.frames_sent += 1;
                    emit(held);
                }
                return Ok(Some(FillStop::Exhausted));
            }
            if lane.decoder.queue_size() >= self.saturation {
                return Ok(Some(FillStop::Saturated));
            }
            match self.source.next_sample(lane.track.id)? {
                None => {
                    tracing::debug!(track = lane.track.id, "video track exhausted");
                    lane.exhausted = true;
                }
                Some(sample) => {
                    let pts = sample.pts;
                    if let Err(e) = lane.decoder.decode(sample) {
                        if e.is_fatal() {
                            return Err(e.into());
                        }
                        tracing::warn!(pts, error = %e, "skipping corrupt video sample");
                        report.corrupt.push(e.to_string());
                    }
                }
            }
        }
    }

    fn fill_audio(&mut self, report: &mut FillReport) -> Result<Option<FillStop>, PipelineError> {
        let Some(lane) = self.audio.as_mut() else {
            return Ok(None);
        };
        loop {
            if lane.exhausted {
                return Ok(Some(FillStop::Exhausted));
            }
            if lane.producer.available_write() < lane.chunk_estimate {
                return Ok(Some(FillStop::RingFull));
            }
            match self.source.next_sample(lane.track.id)? {
                None => {
                    tracing::debug!(track = lane.track.id, "audio track exhausted");
                    lane.exhausted = true;
                    report.audio_samples += lane.finish()?;
                }
                Some(sample) => {
                    lane.decoded.clear();
                    if let Err(e) = lane.decoder.decode(&sample, &mut lane.decoded) {
                        if e.is_fatal() {
                            return Err(e.into());
                        }
                        tracing::warn!(pts = sample.pts, error = %e, "skipping corrupt audio sample");
                        report.corrupt.push(e.to_string());
                        continue;
                    }
                    let start_us = lane.track.ts_to_us(sample.pts);
                    lane.trim(start_us);
                    report.audio_samples += lane.push_decoded()?;
                }
            }
        }
    }

    /// Reposition at `seconds` (clamped to the media). Flushes decoders and the ring, and arms
    /// the hold-back of the last pre-target frame. Returns the clamped target.
    pub fn seek(&mut self, seconds: f64) -> Result<f64, PipelineError> {
        let duration = self.media_info.duration_seconds;
        let mut target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if duration > 0.0 {
            target = target.min(duration);
        }
        let sync_point = self.source.seek(target)?;
        let target_us = (target * 1_000_000.0).round() as i64;
        // The render side drops everything it holds from before the seek without retiring it.
        self.sent = self.retired.get();
        tracing::debug!(target, sync_point, "source repositioned");

        if let Some(lane) = self.video.as_mut() {
            lane.decoder.reset();
            if let Some(held) = lane.held.take() {
                held.release();
            }
            lane.exhausted = false;
            lane.drained = false;
            lane.seek_target_us = Some(target_us);
        }
        if let Some(lane) = self.audio.as_mut() {
            lane.decoder.reset();
            if let Some(rs) = lane.resampler.as_mut() {
                rs.reset();
            }
            lane.producer.request_flush();
            lane.exhausted = false;
            lane.trim_until_us = Some(target_us);
        }
        Ok(target)
    }

    /// Release everything still held and close the decoders.
    pub fn close(&mut self) {
        if let Some(lane) = self.video.as_mut() {
            if let Some(held) = lane.held.take() {
                held.release();
            }
            lane.decoder.reset();
            lane.decoder.close();
        }
        if let Some(lane) = self.audio.as_mut() {
            lane.producer.request_flush();
            lane.decoder.reset();
        }
    }
}

impl Drop for DecodeQueueManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl VideoLane {
    /// Apply the seek hold-back to a decoded frame; returns the frames to forward.
    fn accept(&mut self, frame: VideoFrame) -> Vec<VideoFrame> {
        let Some(target) = self.seek_target_us else {
            return vec![frame];
        };
        if frame.timestamp_us() < target {
            if let Some(prev) = self.held.replace(frame) {
                prev.release();
            }
            return Vec::new();
        }
        self.seek_target_us = None;
        match self.held.take() {
            Some(held) if frame.timestamp_us() > target => vec![held, frame],
            Some(held) => {
                held.release();
                vec![frame]
            }
            None => vec![frame],
        }
    }
}

impl AudioLane {
    fn new(
        track: Track,
        decoder: Box<dyn AudioDecoder>,
        spec: AudioOutputSpec,
        config: &PlayerConfig,
    ) -> Result<(Self, RingConsumer), PipelineError> {
        let src_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let resampler = if src_rate != spec.sample_rate {
            Some(StreamResampler::new(
                src_rate,
                spec.sample_rate,
                channels,
                config.chunk_frames,
            )?)
        } else {
            None
        };
        let (producer, consumer) = ring_for_duration(config.ring_seconds, spec.sample_rate, channels);

        let out_chunk_frames = resampler
            .as_ref()
            .map(|r| r.output_frames_for(config.chunk_frames))
            .unwrap_or(config.chunk_frames);
        let chunk_estimate = (out_chunk_frames * channels).min(producer.capacity() / 2).max(channels);

        tracing::debug!(
            track = track.id,
            src_rate,
            dst_rate = spec.sample_rate,
            channels,
            ring_capacity = producer.capacity(),
            "audio lane ready"
        );

        Ok((
            Self {
                track,
                decoder,
                resampler,
                producer,
                channels,
                decoded: Vec::new(),
                resampled: Vec::new(),
                trim_until_us: None,
                chunk_estimate,
                exhausted: false,
                last_overflow_log: None,
            },
            consumer,
        ))
    }

    /// Drop decoded audio before the seek target. `start_us` is the chunk's start time.
    fn trim(&mut self, start_us: i64) {
        let Some(until) = self.trim_until_us else {
            return;
        };
        let rate = self.decoder.sample_rate().max(1) as i64;
        let frames = self.decoded.len() / self.channels;
        let skip = ((until - start_us).max(0) as i128 * rate as i128 / 1_000_000) as usize;
        if skip >= frames {
            self.decoded.clear();
            return;
        }
        self.decoded.drain(..skip * self.channels);
        self.trim_until_us = None;
    }

    /// Resample (when needed) and push the decoded chunk. Returns samples written.
    fn push_decoded(&mut self) -> Result<usize, PipelineError> {
        if self.decoded.is_empty() {
            return Ok(0);
        }
        match self.resampler.as_mut() {
            Some(rs) => {
                self.resampled.clear();
                rs.process(&self.decoded, &mut self.resampled)?;
                let chunk = std::mem::take(&mut self.resampled);
                let written = self.push(&chunk);
                self.resampled = chunk;
                Ok(written)
            }
            None => {
                let chunk = std::mem::take(&mut self.decoded);
                let written = self.push(&chunk);
                self.decoded = chunk;
                Ok(written)
            }
        }
    }

    /// Flush the resampler tail at end of stream.
    fn finish(&mut self) -> Result<usize, PipelineError> {
        let Some(rs) = self.resampler.as_mut() else {
            return Ok(0);
        };
        self.resampled.clear();
        rs.finish(&mut self.resampled)?;
        let chunk = std::mem::take(&mut self.resampled);
        let written = self.push(&chunk);
        self.resampled = chunk;
        Ok(written)
    }

    fn push(&mut self, samples: &[f32]) -> usize {
        if samples.len() > self.chunk_estimate {
            self.chunk_estimate = samples.len().min(self.producer.capacity() / 2).max(self.channels);
        }
        let written = self.producer.push(samples);
        if written < samples.len() {
            let dropped = samples.len() - written;
            self.producer.note_overflow(dropped);
            let now = Instant::now();
            if self
                .last_overflow_log
                .is_none_or(|t| now.duration_since(t) >= OVERFLOW_LOG_INTERVAL)
            {
                self.last_overflow_log = Some(now);
                tracing::warn!(
                    dropped,
                    total = self.producer.monitor().stats().overflow_samples,
                    "audio ring overflow"
                );
            }
        }
        written
    }
}

/// Track and duration summary of an opened source.
pub fn describe(source: &dyn SampleSource) -> MediaInfo {
    let video = source.video_track().and_then(|t| match t.kind {
        TrackKind::Video { width, height } => Some(VideoTrackInfo {
            codec: t.codec.label(),
            width,
            height,
            frame_rate: t.frame_rate(),
            sample_count: t.sample_count,
        }),
        TrackKind::Audio { .. } => None,
    });
    let audio = source.audio_track().and_then(|t| match t.kind {
        TrackKind::Audio {
            sample_rate,
            channels,
        } => Some(AudioTrackInfo {
            codec: t.codec.label(),
            sample_rate,
            channels,
            sample_count: t.sample_count,
        }),
        TrackKind::Video { .. } => None,
    });
    MediaInfo {
        duration_seconds: source.duration_seconds(),
        video,
        audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFate, PixelFormat};
    use crate::protocol::retired_counter;
    use crate::source::{Codec, EncodedSample, MemorySource};

    const FPS: i64 = 25;

    fn video_source(frames: i64, gop: i64) -> MemorySource {
        let track = Track {
            id: 1,
            kind: TrackKind::Video {
                width: 2,
                height: 2,
            },
            codec: Codec::RawVideo(PixelFormat::Rgba8),
            timescale: FPS as u32,
            sample_count: 0,
            duration: frames as u64,
        };
        let samples = (0..frames)
            .map(|i| EncodedSample {
                track_id: 1,
                data: vec![i as u8; 16].into_boxed_slice(),
                dts: i,
                pts: i,
                duration: 1,
                is_sync: i % gop == 0,
            })
            .collect();
        MemorySource::new(frames as f64 / FPS as f64).with_track(track, samples)
    }

    fn with_audio(src: MemorySource, seconds: i64, rate: u32) -> MemorySource {
        let track = Track {
            id: 2,
            kind: TrackKind::Audio {
                sample_rate: rate,
                channels: 1,
            },
            codec: Codec::PcmF32,
            timescale: rate,
            sample_count: 0,
            duration: (seconds * rate as i64) as u64,
        };
        let chunk = (rate / 10) as i64;
        let samples = (0..seconds * 10)
            .map(|i| EncodedSample {
                track_id: 2,
                data: vec![0u8; chunk as usize * 4].into_boxed_slice(),
                dts: i * chunk,
                pts: i * chunk,
                duration: chunk as u32,
                is_sync: true,
            })
            .collect();
        src.with_track(track, samples)
    }

    fn manager(
        src: MemorySource,
        audio: Option<AudioOutputSpec>,
    ) -> (
        DecodeQueueManager,
        Option<RingConsumer>,
        crate::protocol::RetiredFrames,
        Arc<FrameLedger>,
    ) {
        let ledger = FrameLedger::instrumented();
        let (retired, view) = retired_counter();
        let registry = CodecRegistry::new();
        let (m, c) = DecodeQueueManager::open(
            Box::new(src),
            &registry,
            audio,
            &PlayerConfig::default(),
            ledger.clone(),
            view,
        )
        .unwrap();
        (m, c, retired, ledger)
    }

    #[test]
    fn fill_stops_at_buffer_depth() {
        let (mut m, _c, retired, _ledger) = manager(video_source(50, 1), None);
        let mut got = Vec::new();
        let report = m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(report.frames_sent, 3);
        assert_eq!(report.stop, Some(FillStop::Depth));
        assert_eq!(m.outstanding(), 3);

        // A second call at the bound is a no-op.
        let report = m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(report.frames_sent, 0);

        retired.retire(2);
        let report = m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(report.frames_sent, 2);
        let ts: Vec<i64> = got.iter().map(|f| f.timestamp_us()).collect();
        assert_eq!(ts, vec![0, 40_000, 80_000, 120_000, 160_000]);
    }

    #[test]
    fn exhaustion_is_reported() {
        let (mut m, _c, retired, _ledger) = manager(video_source(2, 1), None);
        let mut got = Vec::new();
        let report = m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(report.stop, Some(FillStop::Exhausted));
        assert_eq!(got.len(), 2);
        retired.retire(2);
        assert!(m.is_exhausted());
    }

    #[test]
    fn corrupt_samples_are_skipped() {
        let mut src = video_source(0, 1);
        let track = src.tracks()[0].clone();
        let good = |pts: i64, len: usize| EncodedSample {
            track_id: 1,
            data: vec![0u8; len].into_boxed_slice(),
            dts: pts,
            pts,
            duration: 1,
            is_sync: true,
        };
        src = MemorySource::new(1.0).with_track(track, vec![good(0, 16), good(1, 5), good(2, 16)]);
        let (mut m, _c, _retired, _ledger) = manager(src, None);
        let mut got = Vec::new();
        let report = m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn seek_holds_back_the_frame_covering_the_target() {
        let (mut m, _c, retired, ledger) = manager(video_source(100, 10), None);
        let mut got = Vec::new();
        m.fill_buffer(&mut |f| got.push(f)).unwrap();
        let n = got.len() as u64;
        got.drain(..).for_each(VideoFrame::release);
        retired.retire(n);

        // 1.3 s = frame 32.5; sync point is frame 30.
        let target = m.seek(1.30).unwrap();
        assert_eq!(target, 1.30);
        m.fill_buffer(&mut |f| got.push(f)).unwrap();
        let ts: Vec<i64> = got.iter().map(|f| f.timestamp_us()).collect();
        assert_eq!(ts, vec![1_280_000, 1_320_000, 1_360_000]);
        got.drain(..).for_each(VideoFrame::release);

        // Frames 30 and 31 were decoded and released without being forwarded.
        let stats = ledger.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn seek_onto_an_exact_frame_drops_the_held_one() {
        let (mut m, _c, _retired, ledger) = manager(video_source(100, 10), None);
        // Frame 13; decoding restarts at the sync frame 10.
        m.seek(0.52).unwrap();
        let mut got = Vec::new();
        m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].timestamp_us(), 520_000);
        let first = got[0].id();
        got.drain(..).for_each(VideoFrame::release);
        assert_eq!(ledger.fate(first), Some(FrameFate::Released));
        let stats = ledger.stats();
        assert_eq!(stats.created, 6);
        assert_eq!(stats.released, 6);
    }

    #[test]
    fn seek_past_the_end_forwards_the_last_frame() {
        let (mut m, _c, _retired, _ledger) = manager(video_source(10, 5), None);
        let target = m.seek(60.0).unwrap();
        assert_eq!(target, 0.4);
        let mut got = Vec::new();
        m.fill_buffer(&mut |f| got.push(f)).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].timestamp_us(), 360_000);
    }

    #[test]
    fn audio_lane_fills_ring_without_overflow() {
        let spec = AudioOutputSpec {
            sample_rate: 8_000,
            channels: 1,
        };
        let (mut m, c, _retired, _ledger) = manager(with_audio(video_source(250, 25), 10, 8_000), Some(spec));
        let c = c.unwrap();
        let report = m.fill_buffer(&mut |f| f.release()).unwrap();
        assert!(report.audio_samples > 0);
        let stats = c.monitor().stats();
        assert_eq!(stats.capacity_samples, 4_000);
        assert!(stats.buffered_samples <= 4_000);
        assert_eq!(stats.overflow_samples, 0);
    }

    #[test]
    fn audio_is_trimmed_to_seek_target() {
        let spec = AudioOutputSpec {
            sample_rate: 8_000,
            channels: 1,
        };
        let (mut m, c, _retired, _ledger) = manager(with_audio(video_source(250, 25), 10, 8_000), Some(spec));
        let mut c = c.unwrap();
        m.seek(2.05).unwrap();
        let report = m.fill_buffer(&mut |f| f.release()).unwrap();
        // Chunks start every 0.1 s; the chunk at 2.0 loses its first 400 frames.
        assert_eq!(report.audio_samples % 800, 400);
        let mut out = vec![0.0; 1];
        c.pop(&mut out);
        assert!(c.available_read() > 0);
    }

    #[test]
    fn media_info_describes_tracks() {
        let (m, _c, _retired, _ledger) = manager(with_audio(video_source(250, 25), 10, 8_000), None);
        let info = m.media_info();
        assert_eq!(info.duration_seconds, 10.0);
        let video = info.video.as_ref().unwrap();
        assert_eq!((video.width, video.height), (2, 2));
        assert_eq!(video.frame_rate, Some(25.0));
        assert_eq!(info.audio.as_ref().unwrap().codec, "pcm/f32le");
    }

    #[test]
    fn empty_source_is_unsupported() {
        let registry = CodecRegistry::new();
        let (_retired, view) = retired_counter();
        let err = DecodeQueueManager::open(
            Box::new(MemorySource::new(0.0)),
            &registry,
            None,
            &PlayerConfig::default(),
            FrameLedger::new(),
            view,
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), avsync_types::ErrorCode::UnsupportedFormat);
    }
}
