//! Container demuxing via symphonia.
//!
//! Symphonia probes the container and hands out packets for every track. The pipeline plays
//! the first decodable audio track; packets of other tracks are skipped.

use std::fs::File;
use std::path::Path;

use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::error::SourceError;
use crate::source::{Codec, EncodedSample, SampleSource, Track, TrackId, TrackKind};

/// [`SampleSource`] over a symphonia [`FormatReader`].
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    tracks: Vec<Track>,
    /// Symphonia timestamps are multiplied by this to get track units.
    ts_numer: u32,
    duration_seconds: f64,
}

impl SymphoniaSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file =
            File::open(path).map_err(|e| SourceError::Open(format!("open {path:?}: {e}")))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        Self::from_media_source(Box::new(file), hint)
    }

    /// Probe an arbitrary symphonia [`MediaSource`] (seekable or not).
    pub fn from_media_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<Self, SourceError> {
        let mss = MediaSourceStream::new(source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(map_error)?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL
                    && t.codec_params.sample_rate.is_some()
                    && t.codec_params.channels.is_some()
            })
            .ok_or_else(|| SourceError::Unsupported("no decodable audio track".into()))?;

        let params = track.codec_params.clone();
        let sample_rate = params.sample_rate.unwrap_or(0);
        let channels = params.channels.map(|c| c.count()).unwrap_or(0) as u16;
        let (ts_numer, timescale) = match params.time_base {
            Some(tb) => (tb.numer.max(1), tb.denom.max(1)),
            None => (1, sample_rate.max(1)),
        };
        let duration = params.n_frames.unwrap_or(0).saturating_mul(ts_numer as u64);
        let duration_seconds = duration as f64 / timescale as f64;

        tracing::debug!(
            track = track.id,
            codec = %params.codec,
            sample_rate,
            channels,
            duration_seconds,
            "probed container"
        );

        let tracks = vec![Track {
            id: track.id,
            kind: TrackKind::Audio {
                sample_rate,
                channels,
            },
            codec: Codec::Symphonia(params),
            timescale,
            sample_count: 0,
            duration,
        }];

        Ok(Self {
            format,
            tracks,
            ts_numer,
            duration_seconds,
        })
    }
}

impl SampleSource for SymphoniaSource {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn next_sample(&mut self, track: TrackId) -> Result<Option<EncodedSample>, SourceError> {
        if !self.tracks.iter().any(|t| t.id == track) {
            return Err(SourceError::UnknownTrack(track));
        }
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(map_error(e)),
            };
            if packet.track_id() != track {
                continue;
            }
            let ts = packet.ts().saturating_mul(self.ts_numer as u64) as i64;
            let duration = packet.dur().saturating_mul(self.ts_numer as u64);
            return Ok(Some(EncodedSample {
                track_id: track,
                data: packet.data,
                dts: ts,
                pts: ts,
                duration: u32::try_from(duration).unwrap_or(u32::MAX),
                is_sync: true,
            }));
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<f64, SourceError> {
        let seconds = seconds.max(0.0);
        let track = &self.tracks[0];
        let time = Time::new(seconds.trunc() as u64, seconds.fract());
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(track.id),
                },
            )
            .map_err(map_error)?;
        let reached = seeked.actual_ts.saturating_mul(self.ts_numer as u64);
        Ok(track.ts_to_seconds(reached as i64))
    }
}

fn map_error(err: SymphoniaError) -> SourceError {
    match err {
        SymphoniaError::IoError(e) => SourceError::Io(e),
        SymphoniaError::Unsupported(what) => SourceError::Unsupported(what.to_string()),
        other => SourceError::Demux(other.to_string()),
    }
}
