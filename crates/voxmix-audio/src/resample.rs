//! Format conversion into the engine's output format: rubato resampling,
//! channel remapping, and float to 16-bit conversion.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;
use voxmix_core::{Error, Result};

const CHUNK_FRAMES: usize = 1024;

/// Streaming sample-rate converter over interleaved f32 frames.
pub struct Resampler {
    /// `None` when input and output rates match.
    inner: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved input waiting for a full chunk.
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        let inner = if input_rate == output_rate {
            None
        } else {
            let fft = FftFixedIn::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                2,
                channels,
            )
            .map_err(|e| Error::Decoder(format!("Failed to create resampler: {e}")))?;
            debug!(
                "Resampler created: {}Hz -> {}Hz, {} channels",
                input_rate, output_rate, channels
            );
            Some(fft)
        };

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    pub const fn needs_resampling(&self) -> bool {
        self.input_rate != self.output_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Feed interleaved samples; returns whatever full chunks produced.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if self.inner.is_none() {
            return Ok(input.to_vec());
        }

        for frame in input.chunks_exact(self.channels) {
            for (ch, &s) in self.pending.iter_mut().zip(frame) {
                ch.push(s);
            }
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();
            let frames = self.run(&chunk)?;
            interleave_into(&frames, usize::MAX, &mut output);
        }
        Ok(output)
    }

    /// Drain the tail at end of stream, zero-padding the last chunk.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let remaining = self.pending[0].len();
        if self.inner.is_none() || remaining == 0 {
            return Ok(Vec::new());
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|ch| {
                let mut data = std::mem::take(ch);
                data.resize(CHUNK_FRAMES, 0.0);
                data
            })
            .collect();
        let frames = self.run(&chunk)?;

        let keep = (remaining as f64 * f64::from(self.output_rate) / f64::from(self.input_rate))
            as usize;
        let mut output = Vec::with_capacity(keep * self.channels);
        interleave_into(&frames, keep, &mut output);
        Ok(output)
    }

    /// Forget buffered input, e.g. after a seek.
    pub fn reset(&mut self) {
        if let Some(inner) = &mut self.inner {
            inner.reset();
        }
        self.pending.iter_mut().for_each(Vec::clear);
    }

    fn run(&mut self, chunk: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let Some(inner) = &mut self.inner else {
            return Ok(chunk.to_vec());
        };
        inner
            .process(chunk, None)
            .map_err(|e| Error::Decoder(format!("Resample failed: {e}")))
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    for frame in 0..first.len().min(max_frames) {
        for plane in planes {
            output.push(plane[frame]);
        }
    }
}

/// Remap interleaved frames from `src` channels to `dst` channels.
///
/// Mono is duplicated into every output channel; downmixing to mono averages
/// the source channels; otherwise channels are copied by index and missing
/// ones are silent.
pub fn remap_channels(input: &[f32], src: usize, dst: usize) -> Vec<f32> {
    if src == dst || src == 0 {
        return input.to_vec();
    }
    let frames = input.len() / src;
    let mut output = Vec::with_capacity(frames * dst);
    for frame in input.chunks_exact(src) {
        if src == 1 {
            output.extend(std::iter::repeat_n(frame[0], dst));
        } else if dst == 1 {
            output.push(frame.iter().sum::<f32>() / src as f32);
        } else {
            output.extend((0..dst).map(|ch| frame.get(ch).copied().unwrap_or(0.0)));
        }
    }
    output
}

/// Same as [`remap_channels`] for 16-bit samples.
pub fn remap_channels_i16(input: &[i16], src: usize, dst: usize) -> Vec<i16> {
    if src == dst || src == 0 {
        return input.to_vec();
    }
    let mut output = Vec::with_capacity(input.len() / src * dst);
    for frame in input.chunks_exact(src) {
        if src == 1 {
            output.extend(std::iter::repeat_n(frame[0], dst));
        } else if dst == 1 {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            output.push((sum / src as i32) as i16);
        } else {
            output.extend((0..dst).map(|ch| frame.get(ch).copied().unwrap_or(0)));
        }
    }
    output
}

/// Convert a float sample in [-1, 1] to 16-bit with clipping.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
