//! Sample-rate conversion for the audio lane.
//!
//! Uses Rubato's sinc resampler to convert decoded interleaved `f32` audio from the source
//! rate to the output device rate. Runs inline on the decode context: input is buffered
//! until a full chunk is available, so output arrives in chunk-sized bursts.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::DecodeError;

/// Streaming resampler with an internal input accumulator.
pub struct StreamResampler {
    resampler: Async<f32>,
    channels: usize,
    chunk_frames: usize,
    src_rate: u32,
    dst_rate: u32,
    /// Input not yet processed, always less than one chunk after `process` returns.
    pending: Vec<f32>,
    scratch: Vec<f32>,
    indexing: Indexing,
}

impl StreamResampler {
    pub fn new(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self, DecodeError> {
        let channels = channels.max(1);
        let chunk_frames = chunk_frames.max(1);
        let f_ratio = dst_rate as f64 / src_rate.max(1) as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let resampler =
            Async::<f32>::new_sinc(f_ratio, 1.1, &params, chunk_frames, channels, FixedAsync::Input)
                .map_err(|e| DecodeError::Fatal(format!("resampler init: {e}")))?;

        // Room for one chunk at the maximum ratio plus filter slack.
        let out_frames = (chunk_frames as f64 * f_ratio * 1.1).ceil() as usize + sinc_len;
        tracing::debug!(src_rate, dst_rate, channels, chunk_frames, "resampler ready");

        Ok(Self {
            resampler,
            channels,
            chunk_frames,
            src_rate,
            dst_rate,
            pending: Vec::with_capacity(chunk_frames * channels * 2),
            scratch: vec![0.0; out_frames * channels],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Convert a frame count at the source rate to the output rate.
    pub fn output_frames_for(&self, src_frames: usize) -> usize {
        (src_frames as u64 * self.dst_rate as u64).div_ceil(self.src_rate.max(1) as u64) as usize
    }

    /// Feed interleaved input; every completed chunk is resampled and appended to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<(), DecodeError> {
        self.pending.extend_from_slice(input);
        let chunk_samples = self.chunk_frames * self.channels;
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let end = consumed + chunk_samples;
            let produced = Self::run(
                &mut self.resampler,
                &self.pending[consumed..end],
                &mut self.scratch,
                self.channels,
                &mut self.indexing,
                None,
            )?;
            out.extend_from_slice(&self.scratch[..produced]);
            consumed = end;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    /// Resample whatever partial chunk is buffered (end of stream).
    pub fn finish(&mut self, out: &mut Vec<f32>) -> Result<(), DecodeError> {
        let frames = self.pending.len() / self.channels;
        if frames == 0 {
            return Ok(());
        }
        // Pad to a full chunk; the resampler only reads `partial_len` frames.
        let mut tail = std::mem::take(&mut self.pending);
        tail.resize(self.chunk_frames * self.channels, 0.0);
        let produced = Self::run(
            &mut self.resampler,
            &tail,
            &mut self.scratch,
            self.channels,
            &mut self.indexing,
            Some(frames),
        )?;
        out.extend_from_slice(&self.scratch[..produced]);
        tail.clear();
        self.pending = tail;
        Ok(())
    }

    /// Drop buffered input and filter state (seek).
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.pending.clear();
    }

    fn run(
        resampler: &mut Async<f32>,
        input: &[f32],
        scratch: &mut [f32],
        channels: usize,
        indexing: &mut Indexing,
        partial_len: Option<usize>,
    ) -> Result<usize, DecodeError> {
        let in_frames = input.len() / channels;
        let input_adapter = InterleavedSlice::new(input, channels, in_frames)
            .map_err(|e| DecodeError::Fatal(format!("resampler input: {e}")))?;
        let out_frames = scratch.len() / channels;
        let mut output_adapter = InterleavedSlice::new_mut(scratch, channels, out_frames)
            .map_err(|e| DecodeError::Fatal(format!("resampler output: {e}")))?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;
        indexing.partial_len = partial_len;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(indexing))
            .map_err(|e| DecodeError::Fatal(format!("resampler process: {e}")))?;
        Ok(nbr_out * channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsampling_roughly_doubles_frame_count() {
        let mut rs = StreamResampler::new(24_000, 48_000, 2, 256).unwrap();
        let input = vec![0.25f32; 256 * 2 * 8];
        let mut out = Vec::new();
        rs.process(&input, &mut out).unwrap();
        rs.finish(&mut out).unwrap();
        let frames = out.len() / 2;
        assert_eq!(out.len() % 2, 0);
        assert!(frames > 256 * 8 * 3 / 2, "got {frames} frames");
        assert!(frames < 256 * 8 * 5 / 2, "got {frames} frames");
    }

    #[test]
    fn partial_input_waits_for_a_full_chunk() {
        let mut rs = StreamResampler::new(44_100, 48_000, 1, 512).unwrap();
        let mut out = Vec::new();
        rs.process(&[0.0; 100], &mut out).unwrap();
        assert!(out.is_empty());
        rs.reset();
        rs.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn output_frames_for_scales_by_ratio() {
        let rs = StreamResampler::new(44_100, 48_000, 2, 1024).unwrap();
        assert_eq!(rs.output_frames_for(44_100), 48_000);
        assert_eq!(rs.output_frames_for(1), 2);
    }
}
