//! Fixed-size pool of chunk voices.
//!
//! The pool holds plain state; locking and time conversion happen in the
//! engine. Operations that stop a voice push their notifications onto the
//! caller's list instead of running callbacks.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::chunk::Chunk;
use crate::effects::{EffectChain, EffectOwner};
use crate::events::{push_event, MixerEvent, Notifications};
use crate::fade::FadeEnvelope;
use std::sync::Arc;
use tracing::{debug, trace};
use voxmix_core::{
    clamp_volume, Error, Fading, GroupTag, Loops, Result, Volume, Which, ALL_CHANNELS, MAX_VOLUME,
};

/// One playback voice.
#[derive(Debug)]
pub struct Channel {
    pub(crate) chunk: Option<Arc<Chunk>>,
    /// Next sample to play, as an offset into the chunk.
    pub(crate) cursor: usize,
    pub(crate) volume: Volume,
    pub(crate) loops: Loops,
    pub(crate) paused_at: Option<u64>,
    /// Absolute frame after which the voice is halted.
    pub(crate) expires: Option<u64>,
    pub(crate) fade: FadeEnvelope,
    pub(crate) tag: GroupTag,
    pub(crate) effects: EffectChain,
    /// (frame clock, sequence) at allocation; orders voices by age.
    pub(crate) started: (u64, u64),
    /// Gain for the current cycle, set by the fade pass.
    pub(crate) gain: i32,
}

impl Channel {
    fn new(index: usize) -> Self {
        Self {
            chunk: None,
            cursor: 0,
            volume: MAX_VOLUME,
            loops: Loops::ONCE,
            paused_at: None,
            expires: None,
            fade: FadeEnvelope::default(),
            tag: ALL_CHANNELS,
            effects: EffectChain::new(EffectOwner::Channel(index)),
            started: (0, 0),
            gain: 0,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.chunk.is_some()
    }

    pub const fn is_paused(&self) -> bool {
        self.is_active() && self.paused_at.is_some()
    }

    /// Active and not paused: the render pass mixes it.
    pub const fn is_audible(&self) -> bool {
        self.is_active() && self.paused_at.is_none()
    }

    const fn in_group(&self, tag: GroupTag) -> bool {
        tag == ALL_CHANNELS || self.tag == tag
    }

    /// Deactivate, reporting the finish and releasing every effect.
    pub(crate) fn stop(&mut self, index: usize, notes: &mut Notifications) {
        if self.chunk.take().is_none() {
            return;
        }
        self.cursor = 0;
        self.paused_at = None;
        self.expires = None;
        self.fade.clear();
        push_event(notes, MixerEvent::ChannelFinished(index));
        self.effects.clear_into(notes);
        trace!("Channel {index} stopped");
    }
}

/// Parameters of a play request.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// Explicit channel, or `None` for automatic selection.
    pub channel: Option<usize>,
    pub chunk: Arc<Chunk>,
    pub loops: Loops,
    /// Play at most this many frames.
    pub time_limit: Option<u64>,
    /// Replace the channel volume.
    pub volume: Option<i32>,
    /// Fade in over this many frames.
    pub fade_in: Option<u64>,
}

impl PlayRequest {
    pub fn new(channel: Option<usize>, chunk: Arc<Chunk>, loops: Loops) -> Self {
        Self {
            channel,
            chunk,
            loops,
            time_limit: None,
            volume: None,
            fade_in: None,
        }
    }
}

/// Fixed-size array of voices.
#[derive(Debug)]
pub struct ChannelPool {
    pub(crate) channels: Vec<Channel>,
    reserved: usize,
    sequence: u64,
}

impl ChannelPool {
    pub fn new(size: usize, reserved: usize) -> Self {
        Self {
            channels: (0..size).map(Channel::new).collect(),
            reserved: reserved.min(size),
            sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub const fn reserved(&self) -> usize {
        self.reserved
    }

    fn get(&self, index: usize) -> Result<&Channel> {
        self.channels.get(index).ok_or(Error::InvalidChannel(index))
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Channel> {
        self.channels
            .get_mut(index)
            .ok_or(Error::InvalidChannel(index))
    }

    fn check(&self, which: Which) -> Result<()> {
        match which {
            Which::Channel(index) if index >= self.channels.len() => {
                Err(Error::InvalidChannel(index))
            }
            _ => Ok(()),
        }
    }

    /// Indices addressed by `which`, after validation.
    fn targets(&self, which: Which) -> Result<std::ops::Range<usize>> {
        self.check(which)?;
        Ok(match which {
            Which::All => 0..self.channels.len(),
            Which::Channel(index) => index..index + 1,
        })
    }

    /// Exclude the first `count` channels from automatic selection.
    pub fn reserve(&mut self, count: usize) -> usize {
        self.reserved = count.min(self.channels.len());
        self.reserved
    }

    /// Start `request.chunk` on a channel and return its index.
    ///
    /// Automatic selection takes the first inactive unreserved channel, or
    /// reclaims the oldest unreserved one when all are busy. A reclaimed or
    /// explicitly targeted busy channel is stopped first.
    pub fn allocate(
        &mut self,
        request: PlayRequest,
        now: u64,
        notes: &mut Notifications,
    ) -> Result<usize> {
        let index = match request.channel {
            Some(index) if index < self.channels.len() => index,
            Some(_) => return Err(Error::NoChannelAvailable),
            None => self.pick_free().ok_or(Error::NoChannelAvailable)?,
        };

        let channel = &mut self.channels[index];
        if channel.is_active() {
            debug!("Reclaiming channel {index}");
            channel.stop(index, notes);
        }

        self.sequence += 1;
        let channel = &mut self.channels[index];
        channel.chunk = Some(request.chunk);
        channel.cursor = 0;
        channel.loops = request.loops;
        if let Some(volume) = request.volume {
            channel.volume = clamp_volume(volume);
        }
        channel.fade = request
            .fade_in
            .map_or_else(FadeEnvelope::default, FadeEnvelope::fade_in);
        channel.expires = request.time_limit.map(|limit| now + limit);
        channel.paused_at = None;
        channel.started = (now, self.sequence);
        Ok(index)
    }

    fn pick_free(&self) -> Option<usize> {
        let candidates = self.reserved..self.channels.len();
        candidates
            .clone()
            .find(|&i| !self.channels[i].is_active())
            .or_else(|| candidates.min_by_key(|&i| self.channels[i].started))
    }

    pub fn halt(&mut self, which: Which, notes: &mut Notifications) -> Result<()> {
        for index in self.targets(which)? {
            self.channels[index].stop(index, notes);
        }
        Ok(())
    }

    /// Stop every active member of `tag`. Returns how many stopped.
    pub fn halt_group(&mut self, tag: GroupTag, notes: &mut Notifications) -> usize {
        let mut halted = 0;
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if channel.in_group(tag) && channel.is_active() {
                channel.stop(index, notes);
                halted += 1;
            }
        }
        halted
    }

    /// Stop every channel playing `chunk`.
    pub fn halt_chunk(&mut self, chunk: &Arc<Chunk>, notes: &mut Notifications) -> usize {
        let mut halted = 0;
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if channel.chunk.as_ref().is_some_and(|c| Arc::ptr_eq(c, chunk)) {
                channel.stop(index, notes);
                halted += 1;
            }
        }
        halted
    }

    /// Set (or with `None` clear) an expiration `frames` from `now` on every
    /// active target. Returns how many were updated.
    pub fn expire(&mut self, which: Which, frames: Option<u64>, now: u64) -> Result<usize> {
        let mut updated = 0;
        for index in self.targets(which)? {
            let channel = &mut self.channels[index];
            if channel.is_active() {
                channel.expires = frames.map(|f| now + f);
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Install a fade-out on every active target. Returns how many fade.
    pub fn fade_out(&mut self, which: Which, frames: u64) -> Result<usize> {
        let mut fading = 0;
        for index in self.targets(which)? {
            let channel = &mut self.channels[index];
            if channel.is_active() {
                channel.fade = channel.fade.fade_out_from(frames);
                fading += 1;
            }
        }
        Ok(fading)
    }

    pub fn fade_out_group(&mut self, tag: GroupTag, frames: u64) -> usize {
        let mut fading = 0;
        for channel in &mut self.channels {
            if channel.in_group(tag) && channel.is_active() {
                channel.fade = channel.fade.fade_out_from(frames);
                fading += 1;
            }
        }
        fading
    }

    pub fn fading(&self, index: usize) -> Result<Fading> {
        let channel = self.get(index)?;
        Ok(if channel.is_active() {
            channel.fade.kind()
        } else {
            Fading::None
        })
    }

    /// Set the volume of the targets. Returns the previous volume, or the
    /// average previous volume when addressing all channels.
    pub fn set_volume(&mut self, which: Which, volume: i32) -> Result<Volume> {
        let volume = clamp_volume(volume);
        let range = self.targets(which)?;
        let count = range.len().max(1);
        let mut total = 0usize;
        for index in range {
            let channel = &mut self.channels[index];
            total += usize::from(channel.volume);
            channel.volume = volume;
        }
        Ok((total / count) as Volume)
    }

    pub fn volume(&self, index: usize) -> Result<Volume> {
        Ok(self.get(index)?.volume)
    }

    pub fn pause(&mut self, which: Which, now: u64) -> Result<()> {
        for index in self.targets(which)? {
            let channel = &mut self.channels[index];
            if channel.is_audible() {
                channel.paused_at = Some(now);
            }
        }
        Ok(())
    }

    /// Resume paused targets, pushing their expiration back by the time
    /// they spent paused.
    pub fn resume(&mut self, which: Which, now: u64) -> Result<()> {
        for index in self.targets(which)? {
            let channel = &mut self.channels[index];
            if let Some(paused_at) = channel.paused_at.take() {
                if let Some(expires) = &mut channel.expires {
                    *expires += now.saturating_sub(paused_at);
                }
            }
        }
        Ok(())
    }

    /// Number of paused channels among the targets.
    pub fn paused(&self, which: Which) -> Result<usize> {
        Ok(self
            .targets(which)?
            .filter(|&i| self.channels[i].is_paused())
            .count())
    }

    /// Number of active channels among the targets, paused ones included.
    pub fn playing(&self, which: Which) -> Result<usize> {
        Ok(self
            .targets(which)?
            .filter(|&i| self.channels[i].is_active())
            .count())
    }

    pub fn chunk(&self, index: usize) -> Result<Option<Arc<Chunk>>> {
        Ok(self.get(index)?.chunk.clone())
    }

    pub fn effects_mut(&mut self, index: usize) -> Result<&mut EffectChain> {
        Ok(&mut self.get_mut(index)?.effects)
    }

    pub fn effects(&self, index: usize) -> Result<&EffectChain> {
        Ok(&self.get(index)?.effects)
    }

    pub fn set_group(&mut self, index: usize, tag: GroupTag) -> Result<()> {
        self.get_mut(index)?.tag = tag;
        Ok(())
    }

    pub fn set_group_range(&mut self, from: usize, to: usize, tag: GroupTag) -> Result<()> {
        if from > to {
            return Err(Error::InvalidArgument(format!(
                "channel range {from}..={to} is empty"
            )));
        }
        if to >= self.channels.len() {
            return Err(Error::InvalidChannel(to));
        }
        for channel in &mut self.channels[from..=to] {
            channel.tag = tag;
        }
        Ok(())
    }

    /// Members of `tag`; `ALL_CHANNELS` counts the whole pool.
    pub fn group_count(&self, tag: GroupTag) -> usize {
        self.channels.iter().filter(|c| c.in_group(tag)).count()
    }

    /// First inactive member of `tag`.
    pub fn group_available(&self, tag: GroupTag) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.in_group(tag) && !c.is_active())
    }

    /// Active member of `tag` that started first.
    pub fn group_oldest(&self, tag: GroupTag) -> Option<usize> {
        self.active_members(tag).min_by_key(|&i| self.channels[i].started)
    }

    /// Active member of `tag` that started last.
    pub fn group_newest(&self, tag: GroupTag) -> Option<usize> {
        self.active_members(tag).max_by_key(|&i| self.channels[i].started)
    }

    fn active_members(&self, tag: GroupTag) -> impl Iterator<Item = usize> + '_ {
        (0..self.channels.len()).filter(move |&i| {
            let channel = &self.channels[i];
            channel.in_group(tag) && channel.is_active()
        })
    }

    /// Stop every voice and release every effect.
    pub fn clear(&mut self, notes: &mut Notifications) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            channel.stop(index, notes);
            channel.effects.clear_into(notes);
        }
    }
}
