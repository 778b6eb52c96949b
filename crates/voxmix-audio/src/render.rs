//! The mixing core: one fixed-size output cycle at a time.
//!
//! Per cycle, in order: evaluate fades (stopping voices whose fade-out has
//! run out), expire channels, mix every channel in index order and every
//! music stream in creation order, run the post chain, apply master volume.
//! A voice whose fade-out ends with the cycle stops at that boundary.
//! Nothing here blocks or allocates; all buffers are sized at open.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::channel::ChannelPool;
use crate::effects::{EffectChain, EffectOwner};
use crate::events::{Notification, Notifications};
use crate::fade::FadeLevel;
use crate::music::{MusicDispatcher, Pull};
use voxmix_core::types::volume::combine;
use voxmix_core::{scale_sample, MixerConfig, Volume, MAX_VOLUME};

/// Counters observable by callers and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixStats {
    /// Cycles rendered while unpaused.
    pub cycles: u64,
    /// Times a channel's chunk was copied into the scratch buffer to run its
    /// effects. Music streams decode into their own buffer and run effects
    /// there in place, so they never count.
    pub scratch_copies: u64,
}

/// Everything the render thread reads and control calls mutate, guarded by
/// one lock in the engine.
#[derive(Debug)]
pub struct MixState {
    pub(crate) config: MixerConfig,
    /// Frames rendered so far; the engine's only notion of time.
    pub(crate) clock: u64,
    pub(crate) pool: ChannelPool,
    pub(crate) music: MusicDispatcher,
    pub(crate) post: EffectChain,
    pub(crate) master_volume: Volume,
    pub(crate) paused: bool,
    pub(crate) stats: MixStats,
    scratch: Vec<i16>,
    music_buf: Vec<i16>,
}

impl MixState {
    pub fn new(config: MixerConfig) -> Self {
        let samples = config.buffer_samples();
        Self {
            pool: ChannelPool::new(config.pool_size, config.reserved_channels),
            music: MusicDispatcher::new(),
            post: EffectChain::new(EffectOwner::Post),
            master_volume: MAX_VOLUME,
            paused: false,
            stats: MixStats::default(),
            clock: 0,
            scratch: vec![0; samples],
            music_buf: vec![0; samples],
            config,
        }
    }

    pub const fn now(&self) -> u64 {
        self.clock
    }

    /// Render exactly one cycle into `out`, which holds
    /// `config.buffer_samples()` samples.
    pub fn render_cycle(&mut self, out: &mut [i16], notes: &mut Notifications) {
        debug_assert_eq!(out.len(), self.scratch.len());
        out.fill(0);
        if self.paused {
            return;
        }

        let channels = usize::from(self.config.channels);
        let frames = (out.len() / channels) as u64;

        self.update_fades(notes);
        self.expire_channels(notes);
        self.mix_channels(out, channels, frames, notes);
        self.mix_music(out, channels, frames, notes);

        if !self.post.is_empty() {
            self.post.apply(channels, out);
        }
        if self.master_volume < MAX_VOLUME {
            let master = i32::from(self.master_volume);
            for s in out.iter_mut() {
                *s = scale_sample(*s, master) as i16;
            }
        }

        self.clock += frames;
        self.stats.cycles += 1;
    }

    fn update_fades(&mut self, notes: &mut Notifications) {
        for (index, channel) in self.pool.channels.iter_mut().enumerate() {
            if !channel.is_audible() {
                continue;
            }
            let chunk_volume = channel.chunk.as_ref().map_or(0, |c| c.volume());
            match channel.fade.evaluate(i32::from(channel.volume)) {
                FadeLevel::Gain(gain) => channel.gain = combine(gain, i32::from(chunk_volume)),
                FadeLevel::Silenced => channel.stop(index, notes),
            }
        }

        let general = i32::from(self.music.general_volume());
        for stream in &mut self.music.streams {
            if !stream.is_audible() {
                continue;
            }
            match stream.fade.evaluate(i32::from(stream.volume)) {
                FadeLevel::Gain(gain) => stream.gain = combine(gain, general),
                FadeLevel::Silenced => stream.stop(notes),
            }
        }
        self.music.reap();
    }

    fn expire_channels(&mut self, notes: &mut Notifications) {
        let now = self.clock;
        for (index, channel) in self.pool.channels.iter_mut().enumerate() {
            if channel.is_audible() && channel.expires.is_some_and(|deadline| now >= deadline) {
                channel.stop(index, notes);
            }
        }
    }

    fn mix_channels(
        &mut self,
        out: &mut [i16],
        channels: usize,
        frames: u64,
        notes: &mut Notifications,
    ) {
        let total = out.len();
        for (index, channel) in self.pool.channels.iter_mut().enumerate() {
            if !channel.is_audible() {
                continue;
            }
            let Some(chunk) = channel.chunk.clone() else {
                continue;
            };
            let samples = chunk.samples();
            let has_effects = !channel.effects.is_empty();
            if has_effects {
                self.stats.scratch_copies += 1;
                self.scratch.fill(0);
            }

            let mut written = 0;
            while written < total {
                let remaining = samples.len() - channel.cursor;
                if remaining == 0 {
                    if samples.is_empty() || !channel.loops.take_repeat() {
                        break;
                    }
                    channel.cursor = 0;
                    continue;
                }
                let n = remaining.min(total - written);
                let src = &samples[channel.cursor..channel.cursor + n];
                if has_effects {
                    self.scratch[written..written + n].copy_from_slice(src);
                } else {
                    mix_into(&mut out[written..written + n], src, channel.gain);
                }
                channel.cursor += n;
                written += n;
            }

            if has_effects {
                channel.effects.apply(channels, &mut self.scratch);
                mix_into(out, &self.scratch, channel.gain);
            }
            channel.fade.advance(frames);

            let played_out = channel.cursor >= samples.len() && !channel.loops.has_repeats();
            if played_out || channel.fade.is_spent() {
                channel.stop(index, notes);
            }
        }
    }

    fn mix_music(&mut self, out: &mut [i16], channels: usize, frames: u64, notes: &mut Notifications) {
        let frequency = self.config.frequency;
        for stream in &mut self.music.streams {
            if !stream.is_audible() {
                continue;
            }
            let buf = &mut self.music_buf[..];
            let (produced, ended) = match stream.pull(buf, channels, frequency) {
                Pull::Frames(n) => (n, false),
                Pull::Ended(n) => (n, true),
                Pull::Failed(n, error) => {
                    notes.push(Notification::DecoderFailed {
                        music: stream.id(),
                        error,
                    });
                    (n, true)
                }
            };
            buf[produced * channels..].fill(0);

            if !stream.effects.is_empty() {
                stream.effects.apply(channels, buf);
            }
            mix_into(out, buf, stream.gain);
            stream.fade.advance(frames);

            if ended || stream.fade.is_spent() {
                stream.stop(notes);
            }
        }
        self.music.reap();
    }

    /// Stop every voice, release every stream and every effect.
    pub(crate) fn clear(&mut self, notes: &mut Notifications) {
        self.pool.clear(notes);
        self.music.clear(notes);
        self.post.clear_into(notes);
    }
}

/// Add `src` scaled by `gain` (0..=128) into `out`, saturating.
pub fn mix_into(out: &mut [i16], src: &[i16], gain: i32) {
    if gain <= 0 {
        return;
    }
    for (o, &s) in out.iter_mut().zip(src) {
        let sum = i32::from(*o) + scale_sample(s, gain);
        *o = sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
}
