//! Video and audio decoders.
//!
//! Decoders are driven by the decode queue manager: samples go in through `decode`, output
//! comes back in decoder order. Built-in decoders cover packed raw video, `f32le` PCM and every
//! audio codec symphonia ships; anything else is registered by codec name on a
//! [`CodecRegistry`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use crate::error::DecodeError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::source::{Codec, EncodedSample, Track, TrackKind};

/// Decoder producing [`VideoFrame`]s.
pub trait VideoDecoder: Send {
    /// Submit one sample. Output (if any) becomes available through [`next_frame`](Self::next_frame).
    fn decode(&mut self, sample: EncodedSample) -> Result<(), DecodeError>;

    /// Samples submitted whose frames have not been taken yet.
    fn queue_size(&self) -> usize;

    /// Next decoded frame in decoder output order.
    fn next_frame(&mut self) -> Option<VideoFrame>;

    /// Emit everything still held back (end of stream).
    fn flush(&mut self) -> Result<(), DecodeError>;

    /// Discard all pending work. Used on seek; the next sample is a sync sample.
    fn reset(&mut self);

    fn close(&mut self) {}
}

/// Decoder producing interleaved `f32` audio.
pub trait AudioDecoder: Send {
    /// Decode one sample, appending interleaved samples to `out`. Returns frames appended.
    fn decode(&mut self, sample: &EncodedSample, out: &mut Vec<f32>) -> Result<usize, DecodeError>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    fn reset(&mut self);
}

/// Decoder for packed pixels: every sample is exactly one frame.
pub struct RawVideoDecoder {
    format: PixelFormat,
    width: u32,
    height: u32,
    timescale: u32,
    ready: VecDeque<VideoFrame>,
}

impl RawVideoDecoder {
    pub fn new(format: PixelFormat, width: u32, height: u32, timescale: u32) -> Self {
        Self {
            format,
            width,
            height,
            timescale: timescale.max(1),
            ready: VecDeque::new(),
        }
    }

    fn to_us(&self, ts: i64) -> i64 {
        (ts as i128 * 1_000_000 / self.timescale as i128) as i64
    }
}

impl VideoDecoder for RawVideoDecoder {
    fn decode(&mut self, sample: EncodedSample) -> Result<(), DecodeError> {
        let expected = self.format.buffer_size(self.width, self.height);
        if sample.data.len() != expected {
            return Err(DecodeError::Corrupt(format!(
                "raw frame at pts {} has {} bytes, expected {expected}",
                sample.pts,
                sample.data.len()
            )));
        }
        let frame = VideoFrame::new(
            sample.data.into_vec(),
            self.format,
            self.width,
            self.height,
            self.to_us(sample.pts),
        )
        .with_duration(self.to_us(sample.duration as i64));
        self.ready.push_back(frame);
        Ok(())
    }

    fn queue_size(&self) -> usize {
        self.ready.len()
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.ready.pop_front()
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn reset(&mut self) {
        for frame in self.ready.drain(..) {
            frame.release();
        }
    }

    fn close(&mut self) {
        self.reset();
    }
}

/// Decoder for interleaved little-endian `f32` PCM.
pub struct PcmDecoder {
    sample_rate: u32,
    channels: usize,
}

impl PcmDecoder {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&mut self, sample: &EncodedSample, out: &mut Vec<f32>) -> Result<usize, DecodeError> {
        let frame_bytes = 4 * self.channels;
        if sample.data.len() % frame_bytes != 0 {
            return Err(DecodeError::Corrupt(format!(
                "pcm payload of {} bytes is not a multiple of {frame_bytes}",
                sample.data.len()
            )));
        }
        out.extend(
            sample
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        Ok(sample.data.len() / frame_bytes)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn reset(&mut self) {}
}

/// Any audio codec symphonia can decode.
pub struct SymphoniaAudioDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl SymphoniaAudioDecoder {
    pub fn new(track_id: u32, params: &CodecParameters) -> Result<Self, DecodeError> {
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".into()))?;
        let channels = params
            .channels
            .ok_or_else(|| DecodeError::Unsupported("unknown channel layout".into()))?
            .count();
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
                other => DecodeError::Fatal(other.to_string()),
            })?;
        Ok(Self {
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }
}

impl AudioDecoder for SymphoniaAudioDecoder {
    fn decode(&mut self, sample: &EncodedSample, out: &mut Vec<f32>) -> Result<usize, DecodeError> {
        let packet = Packet::new_from_slice(
            self.track_id,
            sample.pts.max(0) as u64,
            sample.duration as u64,
            &sample.data,
        );
        let decoded = match self.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => return Err(DecodeError::Corrupt(msg.into())),
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                return Err(DecodeError::Corrupt("decoder reset required".into()));
            }
            Err(e) => return Err(DecodeError::Fatal(e.to_string())),
        };

        let frames = decoded.frames();
        if frames == 0 {
            return Ok(0);
        }
        let mut sample_buf = SampleBuffer::<f32>::new(frames as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        out.extend_from_slice(sample_buf.samples());
        Ok(frames)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn reset(&mut self) {
        self.decoder.reset();
    }
}

type VideoFactory = Box<dyn Fn(&Track) -> Result<Box<dyn VideoDecoder>, DecodeError> + Send + Sync>;
type AudioFactory = Box<dyn Fn(&Track) -> Result<Box<dyn AudioDecoder>, DecodeError> + Send + Sync>;

/// Maps tracks to decoders.
#[derive(Default)]
pub struct CodecRegistry {
    video: HashMap<String, VideoFactory>,
    audio: HashMap<String, AudioFactory>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Register a video decoder for tracks whose codec is [`Codec::Named`] `name`.
    pub fn register_video<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Track) -> Result<Box<dyn VideoDecoder>, DecodeError> + Send + Sync + 'static,
    {
        self.video.insert(name.into(), Box::new(factory));
    }

    /// Register an audio decoder for tracks whose codec is [`Codec::Named`] `name`.
    pub fn register_audio<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Track) -> Result<Box<dyn AudioDecoder>, DecodeError> + Send + Sync + 'static,
    {
        self.audio.insert(name.into(), Box::new(factory));
    }

    pub fn video_decoder(&self, track: &Track) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        let TrackKind::Video { width, height } = track.kind else {
            return Err(DecodeError::Unsupported(format!("track {} is not video", track.id)));
        };
        match &track.codec {
            Codec::RawVideo(format) => Ok(Box::new(RawVideoDecoder::new(
                *format,
                width,
                height,
                track.timescale,
            ))),
            Codec::Named(name) => match self.video.get(name) {
                Some(factory) => factory(track),
                None => Err(DecodeError::Unsupported(name.clone())),
            },
            other => Err(DecodeError::Unsupported(other.label())),
        }
    }

    pub fn audio_decoder(&self, track: &Track) -> Result<Box<dyn AudioDecoder>, DecodeError> {
        let TrackKind::Audio {
            sample_rate,
            channels,
        } = track.kind
        else {
            return Err(DecodeError::Unsupported(format!("track {} is not audio", track.id)));
        };
        match &track.codec {
            Codec::PcmF32 => Ok(Box::new(PcmDecoder::new(sample_rate, channels as usize))),
            Codec::Symphonia(params) => {
                Ok(Box::new(SymphoniaAudioDecoder::new(track.id, params)?))
            }
            Codec::Named(name) => match self.audio.get(name) {
                Some(factory) => factory(track),
                None => Err(DecodeError::Unsupported(name.clone())),
            },
            other => Err(DecodeError::Unsupported(other.label())),
        }
    }
}

/// Best-effort codec label used for media info.
pub fn symphonia_codec_name(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(data: Vec<u8>, pts: i64) -> EncodedSample {
        EncodedSample {
            track_id: 1,
            data: data.into_boxed_slice(),
            dts: pts,
            pts,
            duration: 1,
            is_sync: true,
        }
    }

    fn video_track(codec: Codec) -> Track {
        Track {
            id: 1,
            kind: TrackKind::Video {
                width: 2,
                height: 2,
            },
            codec,
            timescale: 25,
            sample_count: 0,
            duration: 0,
        }
    }

    #[test]
    fn raw_decoder_emits_frames_in_submission_order() {
        let mut dec = RawVideoDecoder::new(PixelFormat::Rgba8, 2, 2, 25);
        dec.decode(sample(vec![0; 16], 2)).unwrap();
        dec.decode(sample(vec![0; 16], 1)).unwrap();
        assert_eq!(dec.queue_size(), 2);
        let a = dec.next_frame().unwrap();
        let b = dec.next_frame().unwrap();
        assert_eq!(a.timestamp_us(), 80_000);
        assert_eq!(b.timestamp_us(), 40_000);
        assert_eq!(a.duration_us(), 40_000);
        assert!(dec.next_frame().is_none());
    }

    #[test]
    fn raw_decoder_rejects_short_payload_as_corrupt() {
        let mut dec = RawVideoDecoder::new(PixelFormat::Rgba8, 2, 2, 25);
        let err = dec.decode(sample(vec![0; 3], 0)).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(dec.queue_size(), 0);
    }

    #[test]
    fn pcm_decoder_reads_little_endian_floats() {
        let mut dec = PcmDecoder::new(48_000, 2);
        let bytes: Vec<u8> = [0.5f32, -0.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut out = Vec::new();
        assert_eq!(dec.decode(&sample(bytes, 0), &mut out).unwrap(), 1);
        assert_eq!(out, vec![0.5, -0.25]);

        let err = dec.decode(&sample(vec![0; 6], 0), &mut out).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupt(_)));
    }

    #[test]
    fn registry_resolves_builtin_and_named_decoders() {
        let mut registry = CodecRegistry::new();
        assert!(
            registry
                .video_decoder(&video_track(Codec::RawVideo(PixelFormat::Rgba8)))
                .is_ok()
        );
        assert!(matches!(
            registry.video_decoder(&video_track(Codec::Named("av1".into()))),
            Err(DecodeError::Unsupported(_))
        ));

        registry.register_video("av1", |t| {
            Ok(Box::new(RawVideoDecoder::new(PixelFormat::I420, 2, 2, t.timescale))
                as Box<dyn VideoDecoder>)
        });
        assert!(
            registry
                .video_decoder(&video_track(Codec::Named("av1".into())))
                .is_ok()
        );
    }

    #[test]
    fn registry_rejects_kind_mismatch() {
        let registry = CodecRegistry::new();
        assert!(
            registry
                .audio_decoder(&video_track(Codec::PcmF32))
                .is_err()
        );
    }

    #[test]
    fn codec_name_maps_known_codecs() {
        use symphonia::core::codecs::*;
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        assert_eq!(symphonia_codec_name(&params), Some("FLAC".to_string()));
        params.codec = CODEC_TYPE_PCM_S16LE;
        assert_eq!(symphonia_codec_name(&params), Some("PCM_S16".to_string()));
        assert!(symphonia_codec_name(&CodecParameters::new()).is_none());
    }
}
