//! Core domain types for voxmix.

pub mod config;
pub mod music;
pub mod playback;
pub mod volume;

pub use config::{MixerConfig, SampleFormat};
pub use music::{LoopPoints, MusicId, MusicTags, MusicType};
pub use playback::{Fading, GroupTag, Loops, Which, ALL_CHANNELS};
pub use volume::{clamp_volume, scale_sample, Volume, MAX_VOLUME};
