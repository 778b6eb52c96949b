//! # voxmix-audio
//!
//! Real-time software mixer: a pool of sample channels and any number of
//! streamed music tracks summed into one 16-bit output.
//!
//! Features:
//! - Channel pool with reservation, groups, expiration and fades
//! - Per-source effect chains with built-in panning, distance and stereo swap
//! - Music streams with crossfade, loop points and seeking
//! - Prefetching decoders over a lock-free ring buffer
//! - Symphonia decoding and a cpal device sink

pub mod buffer;
pub mod channel;
pub mod chunk;
pub mod decode;
pub mod decoder;
pub mod effects;
pub mod engine;
pub mod events;
pub mod fade;
pub mod music;
pub mod output;
pub mod render;
pub mod resample;

pub use channel::PlayRequest;
pub use chunk::Chunk;
pub use decode::{load_chunk, load_chunk_from_bytes, SymphoniaDecoder};
pub use decoder::{Decoder, MemoryDecoder, PrefetchDecoder};
pub use effects::{EffectDoneFn, EffectFn, EffectId, EffectOwner, Position};
pub use engine::{ChannelFinishedFn, Mixer, MusicFinishedFn, PostMixFn, EVENT_QUEUE_CAPACITY};
pub use events::MixerEvent;
pub use music::{MusicState, MusicStatus};
pub use output::AudioOutput;
pub use render::MixStats;
pub use voxmix_core::{
    Error, Fading, GroupTag, LoopPoints, Loops, MixerConfig, MusicId, MusicTags, MusicType,
    Result, SampleFormat, Volume, Which, MAX_VOLUME,
};
