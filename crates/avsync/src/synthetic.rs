//! Generated test pattern: raw RGBA video with a moving bar plus a sine tone.
//!
//! Samples are produced on demand, so long durations cost nothing up front. Used by the
//! `pattern` command and by the end-to-end tests.

use std::f32::consts::TAU;

use crate::error::SourceError;
use crate::frame::PixelFormat;
use crate::source::{Codec, EncodedSample, SampleSource, Track, TrackId, TrackKind};

const VIDEO_TRACK: TrackId = 1;
const AUDIO_TRACK: TrackId = 2;
const AUDIO_CHUNK_FRAMES: u32 = 1024;
const TONE_HZ: f32 = 440.0;

#[derive(Clone, Debug)]
pub struct PatternSource {
    tracks: Vec<Track>,
    duration_seconds: f64,
    /// Sync sample every `gop` frames.
    gop: u64,
    video_next: u64,
    audio_next: u64,
}

impl PatternSource {
    /// 64x36 RGBA at 30 fps plus 48 kHz stereo, keyframe every 15 frames.
    pub fn new(duration_seconds: f64) -> Self {
        Self::empty(duration_seconds)
            .with_video(64, 36, 30)
            .with_audio(48_000, 2)
    }

    /// No tracks; add them with [`with_video`](Self::with_video) and
    /// [`with_audio`](Self::with_audio).
    pub fn empty(duration_seconds: f64) -> Self {
        Self {
            tracks: Vec::new(),
            duration_seconds: duration_seconds.max(0.0),
            gop: 15,
            video_next: 0,
            audio_next: 0,
        }
    }

    pub fn with_video(mut self, width: u32, height: u32, fps: u32) -> Self {
        let fps = fps.max(1);
        let frames = (self.duration_seconds * fps as f64).ceil() as u64;
        self.tracks.retain(|t| t.id != VIDEO_TRACK);
        self.tracks.push(Track {
            id: VIDEO_TRACK,
            kind: TrackKind::Video {
                width: width.max(1),
                height: height.max(1),
            },
            codec: Codec::RawVideo(PixelFormat::Rgba8),
            timescale: fps,
            sample_count: frames,
            duration: frames,
        });
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        let sample_rate = sample_rate.max(1);
        let frames = (self.duration_seconds * sample_rate as f64).round() as u64;
        self.tracks.retain(|t| t.id != AUDIO_TRACK);
        self.tracks.push(Track {
            id: AUDIO_TRACK,
            kind: TrackKind::Audio {
                sample_rate,
                channels: channels.max(1),
            },
            codec: Codec::PcmF32,
            timescale: sample_rate,
            sample_count: frames.div_ceil(AUDIO_CHUNK_FRAMES as u64),
            duration: frames,
        });
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.tracks.retain(|t| t.id != AUDIO_TRACK);
        self
    }

    pub fn with_gop(mut self, gop: u64) -> Self {
        self.gop = gop.max(1);
        self
    }

    fn track(&self, id: TrackId) -> Result<&Track, SourceError> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .ok_or(SourceError::UnknownTrack(id))
    }

    fn video_sample(&self, width: u32, height: u32, index: u64) -> EncodedSample {
        let mut data = vec![0u8; PixelFormat::Rgba8.buffer_size(width, height)];
        let bar = (index % width as u64) as u32;
        let shade = (index * 8 % 256) as u8;
        for y in 0..height {
            for x in 0..width {
                let px = ((y * width + x) * 4) as usize;
                let on_bar = x == bar;
                data[px] = if on_bar { 255 } else { shade };
                data[px + 1] = if on_bar { 255 } else { (y * 255 / height) as u8 };
                data[px + 2] = if on_bar { 255 } else { (x * 255 / width) as u8 };
                data[px + 3] = 255;
            }
        }
        EncodedSample {
            track_id: VIDEO_TRACK,
            data: data.into_boxed_slice(),
            dts: index as i64,
            pts: index as i64,
            duration: 1,
            is_sync: index % self.gop == 0,
        }
    }

    fn audio_sample(&self, track: &Track, index: u64) -> Option<EncodedSample> {
        let TrackKind::Audio {
            sample_rate,
            channels,
        } = track.kind
        else {
            return None;
        };
        let start = index * AUDIO_CHUNK_FRAMES as u64;
        if start >= track.duration {
            return None;
        }
        let frames = (track.duration - start).min(AUDIO_CHUNK_FRAMES as u64);
        let mut data = Vec::with_capacity(frames as usize * channels as usize * 4);
        for f in 0..frames {
            let t = (start + f) as f32 / sample_rate as f32;
            let v = 0.2 * (TAU * TONE_HZ * t).sin();
            for _ in 0..channels {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        Some(EncodedSample {
            track_id: track.id,
            data: data.into_boxed_slice(),
            dts: start as i64,
            pts: start as i64,
            duration: frames as u32,
            is_sync: true,
        })
    }
}

impl SampleSource for PatternSource {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn next_sample(&mut self, track_id: TrackId) -> Result<Option<EncodedSample>, SourceError> {
        let track = self.track(track_id)?;
        match track.kind {
            TrackKind::Video { width, height } => {
                if self.video_next >= track.duration {
                    return Ok(None);
                }
                let sample = self.video_sample(width, height, self.video_next);
                self.video_next += 1;
                Ok(Some(sample))
            }
            TrackKind::Audio { .. } => {
                let sample = self.audio_sample(track, self.audio_next);
                if sample.is_some() {
                    self.audio_next += 1;
                }
                Ok(sample)
            }
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<f64, SourceError> {
        let seconds = seconds.clamp(0.0, self.duration_seconds);
        let mut reached = seconds;
        if let Some(track) = self.tracks.iter().find(|t| t.id == AUDIO_TRACK) {
            let frame = track.seconds_to_ts(seconds).max(0) as u64;
            self.audio_next = frame / AUDIO_CHUNK_FRAMES as u64;
        }
        if let Some(track) = self.tracks.iter().find(|t| t.id == VIDEO_TRACK) {
            let index = (track.seconds_to_ts(seconds).max(0) as u64)
                .min(track.duration.saturating_sub(1));
            let sync = index - index % self.gop;
            self.video_next = sync;
            reached = track.ts_to_seconds(sync as i64);
        }
        tracing::trace!(seconds, reached, "pattern source repositioned");
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_expected_sample_counts() {
        let mut src = PatternSource::new(1.0);
        let mut video = 0;
        while let Some(s) = src.next_sample(VIDEO_TRACK).unwrap() {
            assert_eq!(s.data.len(), 64 * 36 * 4);
            assert_eq!(s.is_sync, s.pts % 15 == 0);
            video += 1;
        }
        assert_eq!(video, 30);

        let mut audio_frames = 0;
        while let Some(s) = src.next_sample(AUDIO_TRACK).unwrap() {
            audio_frames += s.data.len() / 8;
        }
        assert_eq!(audio_frames, 48_000);
    }

    #[test]
    fn seek_lands_on_previous_keyframe() {
        let mut src = PatternSource::new(2.0).with_gop(10);
        let reached = src.seek(0.55).unwrap();
        // Frame 16 is inside the GOP starting at frame 10.
        assert!((reached - 10.0 / 30.0).abs() < 1e-9);
        let s = src.next_sample(VIDEO_TRACK).unwrap().unwrap();
        assert_eq!(s.pts, 10);
        let a = src.next_sample(AUDIO_TRACK).unwrap().unwrap();
        assert_eq!(a.pts, (26_400 / 1024) * 1024);
    }

    #[test]
    fn without_audio_has_only_video() {
        let src = PatternSource::new(1.0).without_audio();
        assert!(src.video_track().is_some());
        assert!(src.audio_track().is_none());
    }
}
