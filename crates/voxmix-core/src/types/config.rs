//! Engine configuration fixed at open time.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default output rate in Hz.
pub const DEFAULT_FREQUENCY: u32 = 44100;
/// Default number of interleaved output channels.
pub const DEFAULT_CHANNELS: u16 = 2;
/// Default frames rendered per mixing cycle.
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;
/// Default number of voices in the channel pool.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Sample format handed to the device sink.
///
/// Mixing always happens in signed 16-bit; this selects the conversion the
/// output stage performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    S16,
    F32,
}

/// Mixer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MixerConfig {
    /// Output rate in Hz.
    pub frequency: u32,
    /// Interleaved output channels (1 = mono, 2 = stereo, ...).
    pub channels: u16,
    /// Frames rendered per mixing cycle.
    pub buffer_frames: usize,
    /// Number of chunk voices.
    pub pool_size: usize,
    /// Channels excluded from automatic allocation.
    pub reserved_channels: usize,
    /// Device sample format.
    pub format: SampleFormat,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            channels: DEFAULT_CHANNELS,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            pool_size: DEFAULT_POOL_SIZE,
            reserved_channels: 0,
            format: SampleFormat::default(),
        }
    }
}

impl MixerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a mixer.
    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            return Err(Error::InvalidConfig("frequency must be non-zero".into()));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(Error::InvalidConfig(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        if self.buffer_frames == 0 {
            return Err(Error::InvalidConfig("buffer_frames must be non-zero".into()));
        }
        if self.reserved_channels > self.pool_size {
            return Err(Error::InvalidConfig(format!(
                "{} reserved channels exceed pool of {}",
                self.reserved_channels, self.pool_size
            )));
        }
        Ok(())
    }

    /// Interleaved samples in one mixing cycle.
    pub const fn buffer_samples(&self) -> usize {
        self.buffer_frames * self.channels as usize
    }

    /// Bytes in one mixing cycle of signed 16-bit output.
    pub const fn buffer_bytes(&self) -> usize {
        self.buffer_samples() * std::mem::size_of::<i16>()
    }

    pub const fn is_stereo(&self) -> bool {
        self.channels >= 2
    }

    /// Convert milliseconds into output frames.
    pub const fn ms_to_frames(&self, ms: u32) -> u64 {
        ms as u64 * self.frequency as u64 / 1000
    }

    /// Convert seconds into output frames.
    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * f64::from(self.frequency)) as u64
    }

    /// Convert output frames into seconds.
    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / f64::from(self.frequency)
    }
}
