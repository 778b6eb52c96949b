//! Fully decoded samples played on channels.

use crate::resample::remap_channels_i16;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use voxmix_core::{clamp_volume, MixerConfig, Volume, MAX_VOLUME};

/// Immutable PCM in the engine format, shared read-only by every channel
/// playing it.
#[derive(Debug)]
pub struct Chunk {
    samples: Arc<[i16]>,
    volume: AtomicU8,
    allocated: bool,
}

impl Chunk {
    /// Wrap interleaved samples already in the engine format.
    pub fn from_samples(samples: Vec<i16>) -> Arc<Self> {
        Arc::new(Self {
            samples: samples.into(),
            volume: AtomicU8::new(MAX_VOLUME),
            allocated: true,
        })
    }

    /// Build a chunk from interleaved PCM with `src_channels` channels,
    /// converting the channel layout to the engine's.
    pub fn from_pcm(samples: &[i16], src_channels: usize, config: &MixerConfig) -> Arc<Self> {
        let converted = remap_channels_i16(samples, src_channels, usize::from(config.channels));
        Self::from_samples(converted)
    }

    /// Share a caller-owned buffer without copying it. The engine does not
    /// own the memory of such a chunk.
    pub fn quick_raw(samples: Arc<[i16]>) -> Arc<Self> {
        Arc::new(Self {
            samples,
            volume: AtomicU8::new(MAX_VOLUME),
            allocated: false,
        })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the engine allocated the sample memory.
    pub const fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn volume(&self) -> Volume {
        self.volume.load(Ordering::Relaxed)
    }

    /// Set the default volume, clamped to 0..=128. Returns the previous one.
    pub fn set_volume(&self, volume: i32) -> Volume {
        self.volume.swap(clamp_volume(volume), Ordering::Relaxed)
    }

    /// Play length in seconds under `config`.
    pub fn duration(&self, config: &MixerConfig) -> f64 {
        let frames = self.samples.len() / usize::from(config.channels);
        config.frames_to_seconds(frames as u64)
    }
}
