//! Sample sources: the pull-based boundary to container parsers.
//!
//! A [`SampleSource`] hands out [`EncodedSample`]s per track in decode order. The decode
//! context is its only user; it opens the source from a [`MediaInput`], pulls samples while
//! its bounds allow, and repositions it on seek.

use std::fmt;
use std::path::PathBuf;

use symphonia::core::codecs::CodecParameters;

use crate::codec::symphonia_codec_name;
use crate::error::SourceError;
use crate::frame::PixelFormat;

pub type TrackId = u32;

/// Codec of a track, as far as the pipeline needs to know it.
#[derive(Clone, Debug)]
pub enum Codec {
    /// Packed pixels, one frame per sample.
    RawVideo(PixelFormat),
    /// Interleaved little-endian `f32` PCM.
    PcmF32,
    /// A codec symphonia can decode.
    Symphonia(CodecParameters),
    /// Decoded by a decoder registered under this name.
    Named(String),
}

impl Codec {
    pub fn label(&self) -> String {
        match self {
            Codec::RawVideo(format) => format!("raw/{}", format.label()),
            Codec::PcmF32 => "pcm/f32le".to_string(),
            Codec::Symphonia(params) => {
                symphonia_codec_name(params).unwrap_or_else(|| format!("{}", params.codec))
            }
            Codec::Named(name) => name.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video { width: u32, height: u32 },
    Audio { sample_rate: u32, channels: u16 },
}

/// One elementary stream. Immutable once the source has parsed it.
#[derive(Clone, Debug)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub codec: Codec,
    /// Timestamp units per second.
    pub timescale: u32,
    pub sample_count: u64,
    /// Duration in timescale units.
    pub duration: u64,
}

impl Track {
    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, TrackKind::Audio { .. })
    }

    /// Convert a timestamp in track units to microseconds.
    pub fn ts_to_us(&self, ts: i64) -> i64 {
        let scale = self.timescale.max(1) as i128;
        (ts as i128 * 1_000_000 / scale) as i64
    }

    pub fn ts_to_seconds(&self, ts: i64) -> f64 {
        ts as f64 / self.timescale.max(1) as f64
    }

    pub fn seconds_to_ts(&self, seconds: f64) -> i64 {
        (seconds * self.timescale.max(1) as f64).floor() as i64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration as f64 / self.timescale.max(1) as f64
    }

    /// Average frame rate for video tracks with a known duration.
    pub fn frame_rate(&self) -> Option<f64> {
        let secs = self.duration_seconds();
        (self.is_video() && secs > 0.0 && self.sample_count > 0)
            .then(|| self.sample_count as f64 / secs)
    }
}

/// One compressed access unit.
#[derive(Clone)]
pub struct EncodedSample {
    pub track_id: TrackId,
    pub data: Box<[u8]>,
    /// Decode timestamp, track units.
    pub dts: i64,
    /// Composition (presentation) timestamp, track units.
    pub pts: i64,
    /// Duration, track units.
    pub duration: u32,
    /// Decoding can start at this sample.
    pub is_sync: bool,
}

impl fmt::Debug for EncodedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedSample")
            .field("track_id", &self.track_id)
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("duration", &self.duration)
            .field("is_sync", &self.is_sync)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Pull-based provider of encoded samples, implemented by container parsers.
pub trait SampleSource: Send {
    fn tracks(&self) -> &[Track];

    fn duration_seconds(&self) -> f64;

    /// Next sample of `track` in decode order, or `None` once the track is exhausted.
    fn next_sample(&mut self, track: TrackId) -> Result<Option<EncodedSample>, SourceError>;

    /// Reposition every track at the last sync point at or before `seconds`.
    ///
    /// Returns the time actually reached (the video sync point when there is a video track).
    fn seek(&mut self, seconds: f64) -> Result<f64, SourceError>;

    fn video_track(&self) -> Option<&Track> {
        self.tracks().iter().find(|t| t.is_video())
    }

    fn audio_track(&self) -> Option<&Track> {
        self.tracks().iter().find(|t| t.is_audio())
    }
}

type SourceOpener = Box<dyn FnOnce() -> Result<Box<dyn SampleSource>, SourceError> + Send>;

/// What to load. Opening happens on the decode context.
pub enum MediaInput {
    /// A media file, demuxed with symphonia.
    File(PathBuf),
    /// An already-open source.
    Source(Box<dyn SampleSource>),
    /// A source opened lazily (network fetch, custom container parser).
    Deferred(SourceOpener),
}

impl MediaInput {
    pub fn source(source: impl SampleSource + 'static) -> Self {
        MediaInput::Source(Box::new(source))
    }

    pub fn deferred<F>(open: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn SampleSource>, SourceError> + Send + 'static,
    {
        MediaInput::Deferred(Box::new(open))
    }

    pub fn open(self) -> Result<Box<dyn SampleSource>, SourceError> {
        match self {
            MediaInput::File(path) => Ok(Box::new(crate::demux::SymphoniaSource::open(&path)?)),
            MediaInput::Source(source) => Ok(source),
            MediaInput::Deferred(open) => open(),
        }
    }
}

impl fmt::Debug for MediaInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaInput::File(path) => f.debug_tuple("File").field(path).finish(),
            MediaInput::Source(_) => f.write_str("Source(..)"),
            MediaInput::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<PathBuf> for MediaInput {
    fn from(path: PathBuf) -> Self {
        MediaInput::File(path)
    }
}

/// Source backed by samples held in memory. Samples are replayed after a seek.
pub struct MemorySource {
    tracks: Vec<Track>,
    samples: Vec<Vec<EncodedSample>>,
    cursors: Vec<usize>,
    duration_seconds: f64,
}

impl MemorySource {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            tracks: Vec::new(),
            samples: Vec::new(),
            cursors: Vec::new(),
            duration_seconds,
        }
    }

    /// Add a track with its samples in decode order.
    pub fn with_track(mut self, mut track: Track, samples: Vec<EncodedSample>) -> Self {
        track.sample_count = samples.len() as u64;
        self.tracks.push(track);
        self.samples.push(samples);
        self.cursors.push(0);
        self
    }

    fn index_of(&self, track: TrackId) -> Result<usize, SourceError> {
        self.tracks
            .iter()
            .position(|t| t.id == track)
            .ok_or(SourceError::UnknownTrack(track))
    }
}

impl SampleSource for MemorySource {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn next_sample(&mut self, track: TrackId) -> Result<Option<EncodedSample>, SourceError> {
        let idx = self.index_of(track)?;
        let cursor = self.cursors[idx];
        let sample = self.samples[idx].get(cursor).cloned();
        if sample.is_some() {
            self.cursors[idx] = cursor + 1;
        }
        Ok(sample)
    }

    fn seek(&mut self, seconds: f64) -> Result<f64, SourceError> {
        let mut reached = seconds;
        for (idx, track) in self.tracks.iter().enumerate() {
            let target = track.seconds_to_ts(seconds);
            let pos = self.samples[idx]
                .iter()
                .rposition(|s| s.is_sync && s.pts <= target)
                .unwrap_or(0);
            self.cursors[idx] = pos;
            if track.is_video() {
                reached = self.samples[idx]
                    .get(pos)
                    .map(|s| track.ts_to_seconds(s.pts))
                    .unwrap_or(0.0);
            }
        }
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_track() -> Track {
        Track {
            id: 1,
            kind: TrackKind::Video {
                width: 2,
                height: 2,
            },
            codec: Codec::RawVideo(PixelFormat::Rgba8),
            timescale: 30,
            sample_count: 0,
            duration: 300,
        }
    }

    fn sample(pts: i64, is_sync: bool) -> EncodedSample {
        EncodedSample {
            track_id: 1,
            data: vec![0u8; 16].into_boxed_slice(),
            dts: pts,
            pts,
            duration: 1,
            is_sync,
        }
    }

    #[test]
    fn timestamp_conversions() {
        let t = video_track();
        assert_eq!(t.ts_to_us(15), 500_000);
        assert_eq!(t.seconds_to_ts(1.5), 45);
        assert_eq!(t.duration_seconds(), 10.0);
    }

    #[test]
    fn frame_rate_from_count_and_duration() {
        let src = MemorySource::new(10.0)
            .with_track(video_track(), (0..300).map(|i| sample(i, true)).collect());
        assert_eq!(src.video_track().unwrap().frame_rate(), Some(30.0));
        assert!(src.audio_track().is_none());
    }

    #[test]
    fn memory_source_yields_in_order_then_exhausts() {
        let mut src = MemorySource::new(1.0)
            .with_track(video_track(), vec![sample(0, true), sample(1, false)]);
        assert_eq!(src.next_sample(1).unwrap().unwrap().pts, 0);
        assert_eq!(src.next_sample(1).unwrap().unwrap().pts, 1);
        assert!(src.next_sample(1).unwrap().is_none());
    }

    #[test]
    fn memory_source_seeks_to_previous_sync_point() {
        let samples = (0..30).map(|i| sample(i, i % 10 == 0)).collect();
        let mut src = MemorySource::new(1.0).with_track(video_track(), samples);
        let reached = src.seek(0.5).unwrap();
        assert_eq!(reached, 10.0 / 30.0);
        assert_eq!(src.next_sample(1).unwrap().unwrap().pts, 10);
    }

    #[test]
    fn unknown_track_is_an_error() {
        let mut src = MemorySource::new(1.0).with_track(video_track(), vec![]);
        assert!(matches!(
            src.next_sample(9),
            Err(SourceError::UnknownTrack(9))
        ));
    }

    #[test]
    fn codec_labels() {
        assert_eq!(Codec::RawVideo(PixelFormat::I420).label(), "raw/i420");
        assert_eq!(Codec::PcmF32.label(), "pcm/f32le");
        assert_eq!(Codec::Named("h264".into()).label(), "h264");
    }
}
