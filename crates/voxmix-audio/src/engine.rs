//! The mixer handle: lifecycle, control operations, and notification
//! delivery.
//!
//! All state the render thread reads lives behind one short lock. Control
//! calls mutate it and return; stops and effect completions they cause are
//! collected while the lock is held and delivered after it is released, on
//! the calling thread. Those raised by rendering are delivered at the end of
//! the render call.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::channel::PlayRequest;
use crate::chunk::Chunk;
use crate::decoder::Decoder;
use crate::effects::{EffectChain, EffectDoneFn, EffectFn, EffectId, EffectOwner, Position};
use crate::events::{MixerEvent, Notification, Notifications};
use crate::music::MusicState;
use crate::render::{MixState, MixStats};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};
use voxmix_core::{
    clamp_volume, Error, Fading, GroupTag, LoopPoints, Loops, MixerConfig, MusicId, MusicTags,
    MusicType, Result, Volume, Which,
};

/// Called with the index of a channel that stopped.
pub type ChannelFinishedFn = Box<dyn FnMut(usize) + Send>;

/// Called with the stream that stopped.
pub type MusicFinishedFn = Box<dyn FnMut(MusicId) + Send>;

/// Receives every rendered cycle after master volume.
pub type PostMixFn = Box<dyn FnMut(&[i16]) + Send>;

/// Events kept for readers before the oldest are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

struct Shared {
    config: MixerConfig,
    state: Mutex<MixState>,
    closed: AtomicBool,
    channel_finished: Mutex<Option<ChannelFinishedFn>>,
    music_finished: Mutex<Option<MusicFinishedFn>>,
    post_mix: Mutex<Option<PostMixFn>>,
    event_tx: Sender<MixerEvent>,
    event_rx: Receiver<MixerEvent>,
    dropped_events: AtomicU64,
    /// Notification buffer reused by every render call.
    render_notes: Mutex<Notifications>,
    last_error: Mutex<Option<String>>,
}

/// Handle to an open mixer. Clones share the same engine.
#[derive(Clone)]
pub struct Mixer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("config", &self.shared.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Run `call` on the slot's hook without holding the slot lock, so the hook
/// may replace itself.
fn call_hook<T: ?Sized>(slot: &Mutex<Option<Box<T>>>, call: impl FnOnce(&mut Box<T>)) {
    let taken = slot.lock().take();
    if let Some(mut hook) = taken {
        call(&mut hook);
        let mut slot = slot.lock();
        if slot.is_none() {
            *slot = Some(hook);
        }
    }
}

fn effect_chain(state: &mut MixState, owner: EffectOwner) -> Result<&mut EffectChain> {
    match owner {
        EffectOwner::Channel(index) => state.pool.effects_mut(index),
        EffectOwner::Music(id) => state.music.effects_mut(id),
        EffectOwner::Post => Ok(&mut state.post),
    }
}

impl Mixer {
    /// Open a mixer without a device. Drive it with [`Mixer::render`] or
    /// attach an [`crate::AudioOutput`].
    pub fn open(config: MixerConfig) -> Result<Self> {
        config.validate()?;
        let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
        let notes_capacity = config.pool_size * 4 + 64;
        info!(
            "Mixer opened: {} Hz, {} channels, {} frames per cycle, {} voices ({} reserved)",
            config.frequency,
            config.channels,
            config.buffer_frames,
            config.pool_size,
            config.reserved_channels
        );
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MixState::new(config.clone())),
                config,
                closed: AtomicBool::new(false),
                channel_finished: Mutex::new(None),
                music_finished: Mutex::new(None),
                post_mix: Mutex::new(None),
                event_tx,
                event_rx,
                dropped_events: AtomicU64::new(0),
                render_notes: Mutex::new(Vec::with_capacity(notes_capacity)),
                last_error: Mutex::new(None),
            }),
        })
    }

    /// Halt everything, release every stream and effect, and refuse further
    /// control calls. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut notes = Vec::new();
        self.shared.state.lock().clear(&mut notes);
        self.dispatch(notes);
        info!("Mixer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The format fixed at open.
    pub fn query_spec(&self) -> MixerConfig {
        self.shared.config.clone()
    }

    /// Run a control operation under the state lock, then deliver what it
    /// raised. Failures are recorded as the last error.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MixState, &mut Notifications) -> Result<T>,
    ) -> Result<T> {
        let result = if self.is_closed() {
            Err(Error::Closed)
        } else {
            let mut notes = Vec::new();
            let result = {
                let mut state = self.shared.state.lock();
                f(&mut state, &mut notes)
            };
            self.dispatch(notes);
            result
        };
        if let Err(e) = &result {
            debug!("Mixer operation failed: {e}");
            *self.shared.last_error.lock() = Some(e.to_string());
        }
        result
    }

    fn dispatch(&self, mut notes: Notifications) {
        self.deliver(&mut notes);
    }

    /// Deliver and drain `notes`, keeping its storage.
    fn deliver(&self, notes: &mut Notifications) {
        for note in notes.drain(..) {
            match note {
                Notification::Event(event) => {
                    match &event {
                        MixerEvent::ChannelFinished(index) => {
                            call_hook(&self.shared.channel_finished, |hook| hook(*index));
                        }
                        MixerEvent::MusicFinished(id) => {
                            call_hook(&self.shared.music_finished, |hook| hook(*id));
                        }
                        MixerEvent::DecoderFailed { .. } => {}
                    }
                    self.publish(event);
                }
                Notification::DecoderFailed { music, error } => {
                    error!("Decoder for {music} failed: {error}");
                    self.publish(MixerEvent::DecoderFailed {
                        music,
                        message: error.to_string(),
                    });
                }
                Notification::EffectDone(done) => done.fire(),
            }
        }
    }

    /// Queue an event for readers. A full queue loses its oldest event.
    fn publish(&self, mut event: MixerEvent) {
        loop {
            match self.shared.event_tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    event = rejected;
                    if self.shared.event_rx.try_recv().is_ok() {
                        self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Message of the most recent failed operation.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    pub fn try_recv_event(&self) -> Option<MixerEvent> {
        self.shared.event_rx.try_recv().ok()
    }

    /// A receiver of every event, for consumers on another thread. Readers
    /// share one queue of at most [`EVENT_QUEUE_CAPACITY`] events.
    pub fn events(&self) -> Receiver<MixerEvent> {
        self.shared.event_rx.clone()
    }

    /// Events discarded because nobody read the queue in time.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }

    pub fn on_channel_finished(&self, hook: Option<ChannelFinishedFn>) {
        *self.shared.channel_finished.lock() = hook;
    }

    pub fn on_music_finished(&self, hook: Option<MusicFinishedFn>) {
        *self.shared.music_finished.lock() = hook;
    }

    /// Install or remove the sink that receives every rendered cycle.
    pub fn set_post_mix(&self, sink: Option<PostMixFn>) {
        *self.shared.post_mix.lock() = sink;
    }

    // Rendering

    /// Fill `out` with as many whole cycles as fit; a partial trailing cycle
    /// is left silent. Called by the device sink or directly when headless.
    pub fn render(&self, out: &mut [i16]) {
        let cycle = self.shared.config.buffer_samples();
        let whole = out.len() - out.len() % cycle;
        out[whole..].fill(0);
        if self.is_closed() {
            out.fill(0);
            return;
        }

        // A hook that renders again finds an empty buffer here.
        let mut notes = std::mem::take(&mut *self.shared.render_notes.lock());
        {
            let mut state = self.shared.state.lock();
            for piece in out[..whole].chunks_exact_mut(cycle) {
                state.render_cycle(piece, &mut notes);
            }
        }

        call_hook(&self.shared.post_mix, |sink| {
            for piece in out[..whole].chunks_exact(cycle) {
                sink(piece);
            }
        });
        self.deliver(&mut notes);

        let mut slot = self.shared.render_notes.lock();
        if notes.capacity() > slot.capacity() {
            *slot = notes;
        }
    }

    /// Render `cycles` cycles into a new buffer.
    pub fn render_cycles(&self, cycles: usize) -> Vec<i16> {
        let mut out = vec![0; cycles * self.shared.config.buffer_samples()];
        self.render(&mut out);
        out
    }

    /// Silence the output without advancing any voice.
    pub fn pause_audio(&self, paused: bool) -> Result<()> {
        self.with_state(|state, _| {
            state.paused = paused;
            debug!("Audio {}", if paused { "paused" } else { "resumed" });
            Ok(())
        })
    }

    pub fn stats(&self) -> MixStats {
        self.shared.state.lock().stats
    }

    /// Frames rendered since open.
    pub fn now_frames(&self) -> u64 {
        self.shared.state.lock().now()
    }

    /// Set the volume applied to the final mix. Returns the previous one.
    pub fn master_volume(&self, volume: i32) -> Result<Volume> {
        self.with_state(|state, _| {
            Ok(std::mem::replace(
                &mut state.master_volume,
                clamp_volume(volume),
            ))
        })
    }

    pub fn get_master_volume(&self) -> Result<Volume> {
        self.with_state(|state, _| Ok(state.master_volume))
    }

    // Channels

    pub fn num_channels(&self) -> usize {
        self.shared.config.pool_size
    }

    /// Exclude the first `count` channels from automatic selection.
    pub fn reserve_channels(&self, count: usize) -> Result<usize> {
        self.with_state(|state, _| Ok(state.pool.reserve(count)))
    }

    /// Play `chunk` on `channel` (or any free channel with `None`).
    /// `loops` counts repeats after the first play-through.
    pub fn play_channel(
        &self,
        channel: Option<usize>,
        chunk: &Arc<Chunk>,
        loops: impl Into<Loops>,
    ) -> Result<usize> {
        self.play_channel_timed(channel, chunk, loops, None)
    }

    /// Like [`Mixer::play_channel`], halting after at most `limit_ms`.
    pub fn play_channel_timed(
        &self,
        channel: Option<usize>,
        chunk: &Arc<Chunk>,
        loops: impl Into<Loops>,
        limit_ms: Option<u32>,
    ) -> Result<usize> {
        let mut request = PlayRequest::new(channel, chunk.clone(), loops.into());
        request.time_limit = limit_ms.map(|ms| self.shared.config.ms_to_frames(ms));
        self.play(request)
    }

    /// Play with a fade-in over `fade_ms`, optionally replacing the channel
    /// volume.
    pub fn fade_in_channel_timed(
        &self,
        channel: Option<usize>,
        chunk: &Arc<Chunk>,
        loops: impl Into<Loops>,
        fade_ms: u32,
        limit_ms: Option<u32>,
        volume: Option<i32>,
    ) -> Result<usize> {
        let config = &self.shared.config;
        let mut request = PlayRequest::new(channel, chunk.clone(), loops.into());
        request.time_limit = limit_ms.map(|ms| config.ms_to_frames(ms));
        request.fade_in = Some(config.ms_to_frames(fade_ms));
        request.volume = volume;
        self.play(request)
    }

    /// Start a prepared request, in frames.
    pub fn play(&self, request: PlayRequest) -> Result<usize> {
        self.with_state(|state, notes| {
            let now = state.now();
            let index = state.pool.allocate(request, now, notes)?;
            debug!("Chunk started on channel {index}");
            Ok(index)
        })
    }

    pub fn halt_channel(&self, which: impl Into<Which>) -> Result<()> {
        let which = which.into();
        self.with_state(|state, notes| state.pool.halt(which, notes))
    }

    pub fn halt_group(&self, tag: GroupTag) -> Result<usize> {
        self.with_state(|state, notes| Ok(state.pool.halt_group(tag, notes)))
    }

    /// Halt the targets after `ms`, or cancel their expiration with `None`.
    pub fn expire_channel(&self, which: impl Into<Which>, ms: Option<u32>) -> Result<usize> {
        let which = which.into();
        let frames = ms.map(|ms| self.shared.config.ms_to_frames(ms));
        self.with_state(|state, _| {
            let now = state.now();
            state.pool.expire(which, frames, now)
        })
    }

    pub fn fade_out_channel(&self, which: impl Into<Which>, ms: u32) -> Result<usize> {
        let which = which.into();
        let frames = self.shared.config.ms_to_frames(ms);
        self.with_state(|state, _| state.pool.fade_out(which, frames))
    }

    pub fn fade_out_group(&self, tag: GroupTag, ms: u32) -> Result<usize> {
        let frames = self.shared.config.ms_to_frames(ms);
        self.with_state(|state, _| Ok(state.pool.fade_out_group(tag, frames)))
    }

    pub fn fading_channel(&self, channel: usize) -> Result<Fading> {
        self.with_state(|state, _| state.pool.fading(channel))
    }

    /// Set the volume of the targets; values are clamped to 0..=128. Returns
    /// the previous volume (the average one for all channels).
    pub fn volume(&self, which: impl Into<Which>, volume: i32) -> Result<Volume> {
        let which = which.into();
        self.with_state(|state, _| state.pool.set_volume(which, volume))
    }

    pub fn channel_volume(&self, channel: usize) -> Result<Volume> {
        self.with_state(|state, _| state.pool.volume(channel))
    }

    pub fn pause(&self, which: impl Into<Which>) -> Result<()> {
        let which = which.into();
        self.with_state(|state, _| {
            let now = state.now();
            state.pool.pause(which, now)
        })
    }

    pub fn resume(&self, which: impl Into<Which>) -> Result<()> {
        let which = which.into();
        self.with_state(|state, _| {
            let now = state.now();
            state.pool.resume(which, now)
        })
    }

    /// Number of paused channels among the targets.
    pub fn paused(&self, which: impl Into<Which>) -> Result<usize> {
        let which = which.into();
        self.with_state(|state, _| state.pool.paused(which))
    }

    /// Number of active channels among the targets, paused ones included.
    pub fn playing(&self, which: impl Into<Which>) -> Result<usize> {
        let which = which.into();
        self.with_state(|state, _| state.pool.playing(which))
    }

    /// The chunk a channel is playing.
    pub fn chunk(&self, channel: usize) -> Result<Option<Arc<Chunk>>> {
        self.with_state(|state, _| state.pool.chunk(channel))
    }

    /// Halt every channel playing `chunk` so it can be dropped.
    pub fn free_chunk(&self, chunk: &Arc<Chunk>) -> Result<usize> {
        self.with_state(|state, notes| Ok(state.pool.halt_chunk(chunk, notes)))
    }

    pub fn group_channel(&self, channel: usize, tag: GroupTag) -> Result<()> {
        self.with_state(|state, _| state.pool.set_group(channel, tag))
    }

    pub fn group_channels(&self, from: usize, to: usize, tag: GroupTag) -> Result<()> {
        self.with_state(|state, _| state.pool.set_group_range(from, to, tag))
    }

    pub fn group_count(&self, tag: GroupTag) -> Result<usize> {
        self.with_state(|state, _| Ok(state.pool.group_count(tag)))
    }

    pub fn group_available(&self, tag: GroupTag) -> Result<Option<usize>> {
        self.with_state(|state, _| Ok(state.pool.group_available(tag)))
    }

    pub fn group_oldest(&self, tag: GroupTag) -> Result<Option<usize>> {
        self.with_state(|state, _| Ok(state.pool.group_oldest(tag)))
    }

    pub fn group_newest(&self, tag: GroupTag) -> Result<Option<usize>> {
        self.with_state(|state, _| Ok(state.pool.group_newest(tag)))
    }

    // Effects

    /// Append an effect to the owner's chain. Every registration is a
    /// separate entry with its own id.
    pub fn register_effect(
        &self,
        owner: EffectOwner,
        effect: EffectFn,
        on_done: Option<EffectDoneFn>,
    ) -> Result<EffectId> {
        self.with_state(|state, _| Ok(effect_chain(state, owner)?.register(effect, on_done)))
    }

    /// Remove one registration, firing its completion callback.
    pub fn unregister_effect(&self, owner: EffectOwner, id: EffectId) -> Result<()> {
        self.with_state(|state, notes| {
            let done = effect_chain(state, owner)?
                .unregister(id)
                .ok_or(Error::NotFound)?;
            notes.extend(done.map(Notification::EffectDone));
            Ok(())
        })
    }

    /// Remove every registration of the owner, firing each completion.
    pub fn unregister_all_effects(&self, owner: EffectOwner) -> Result<()> {
        self.with_state(|state, notes| {
            effect_chain(state, owner)?.clear_into(notes);
            Ok(())
        })
    }

    /// Number of entries in the owner's chain, built-ins included.
    pub fn effect_count(&self, owner: EffectOwner) -> Result<usize> {
        self.with_state(|state, _| Ok(effect_chain(state, owner)?.len()))
    }

    fn update_position(
        &self,
        owner: EffectOwner,
        update: impl FnOnce(&mut Position),
    ) -> Result<()> {
        self.with_state(|state, _| {
            let chain = effect_chain(state, owner)?;
            let mut position = chain.position();
            update(&mut position);
            chain.set_position(position);
            Ok(())
        })
    }

    /// Stereo gains, 255 being full. No-op on a non-stereo output.
    pub fn set_panning(&self, owner: EffectOwner, left: u8, right: u8) -> Result<()> {
        if !self.shared.config.is_stereo() {
            return self.with_state(|state, _| effect_chain(state, owner).map(|_| ()));
        }
        self.update_position(owner, |p| {
            p.left = left;
            p.right = right;
        })
    }

    /// Attenuation by distance, 0 being nearest.
    pub fn set_distance(&self, owner: EffectOwner, distance: u8) -> Result<()> {
        self.update_position(owner, |p| p.distance = distance)
    }

    /// Place the source at `angle` degrees (0 ahead, clockwise) and
    /// `distance`. Only the distance applies to a non-stereo output.
    pub fn set_position(&self, owner: EffectOwner, angle: i16, distance: u8) -> Result<()> {
        let stereo = self.shared.config.is_stereo();
        self.update_position(owner, |p| {
            if stereo {
                (p.left, p.right) = Position::gains_for_angle(angle);
            }
            p.distance = distance;
        })
    }

    /// Swap left and right. No-op on a non-stereo output.
    pub fn set_reverse_stereo(&self, owner: EffectOwner, flip: bool) -> Result<()> {
        let stereo = self.shared.config.is_stereo();
        self.with_state(|state, _| {
            let chain = effect_chain(state, owner)?;
            if stereo {
                chain.set_reverse_stereo(flip);
            }
            Ok(())
        })
    }

    // Music

    /// Hand a decoder to the mixer as a new stopped stream.
    pub fn load_music(&self, decoder: impl Decoder + 'static) -> Result<MusicId> {
        let decoder: Box<dyn Decoder> = Box::new(decoder);
        self.with_state(|state, _| Ok(state.music.load(decoder)))
    }

    pub fn free_music(&self, id: MusicId) -> Result<()> {
        self.with_state(|state, notes| state.music.free(id, notes))
    }

    pub fn play_music(&self, id: MusicId, loops: impl Into<Loops>) -> Result<()> {
        let loops = loops.into();
        self.with_state(|state, _| state.music.play(id, loops, None, None))
    }

    /// Start from `position` seconds. Fails with `Unsupported` if the
    /// decoder cannot seek.
    pub fn play_music_pos(&self, id: MusicId, loops: impl Into<Loops>, position: f64) -> Result<()> {
        let loops = loops.into();
        self.with_state(|state, _| state.music.play(id, loops, None, Some(position)))
    }

    pub fn fade_in_music(&self, id: MusicId, loops: impl Into<Loops>, ms: u32) -> Result<()> {
        let loops = loops.into();
        let frames = self.shared.config.ms_to_frames(ms);
        self.with_state(|state, _| state.music.play(id, loops, Some(frames), None))
    }

    pub fn fade_in_music_pos(
        &self,
        id: MusicId,
        loops: impl Into<Loops>,
        ms: u32,
        position: f64,
    ) -> Result<()> {
        let loops = loops.into();
        let frames = self.shared.config.ms_to_frames(ms);
        self.with_state(|state, _| state.music.play(id, loops, Some(frames), Some(position)))
    }

    pub fn halt_music(&self, id: MusicId) -> Result<()> {
        self.with_state(|state, notes| state.music.halt(id, notes))
    }

    /// Fade out over `ms` then stop; `0` stops at once. Returns false if the
    /// stream was not playing.
    pub fn fade_out_music(&self, id: MusicId, ms: u32) -> Result<bool> {
        let frames = self.shared.config.ms_to_frames(ms);
        self.with_state(|state, notes| state.music.fade_out(id, frames, notes))
    }

    /// Start `new` fading in while `old` fades out over the same `ms`.
    pub fn cross_fade_music(
        &self,
        old: MusicId,
        new: MusicId,
        loops: impl Into<Loops>,
        ms: u32,
        position: Option<f64>,
        free_old: bool,
    ) -> Result<()> {
        let loops = loops.into();
        let frames = self.shared.config.ms_to_frames(ms);
        self.with_state(|state, notes| {
            state
                .music
                .cross_fade(old, new, loops, frames, position, free_old, notes)
        })
    }

    pub fn pause_music(&self, id: MusicId) -> Result<()> {
        self.with_state(|state, _| state.music.pause(id))
    }

    pub fn resume_music(&self, id: MusicId) -> Result<()> {
        self.with_state(|state, _| state.music.resume(id))
    }

    pub fn rewind_music(&self, id: MusicId) -> Result<()> {
        self.with_state(|state, _| state.music.rewind(id))
    }

    pub fn pause_all_music(&self) -> Result<()> {
        self.with_state(|state, _| {
            state.music.pause_all();
            Ok(())
        })
    }

    pub fn resume_all_music(&self) -> Result<()> {
        self.with_state(|state, _| {
            state.music.resume_all();
            Ok(())
        })
    }

    pub fn halt_all_music(&self) -> Result<()> {
        self.with_state(|state, notes| {
            state.music.halt_all(notes);
            Ok(())
        })
    }

    /// The most recently started stream.
    pub fn current_music(&self) -> Result<Option<MusicId>> {
        self.with_state(|state, _| Ok(state.music.current()))
    }

    pub fn set_music_position(&self, id: MusicId, seconds: f64) -> Result<()> {
        self.with_state(|state, _| state.music.set_position(id, seconds))
    }

    pub fn music_position(&self, id: MusicId) -> Result<Option<f64>> {
        self.with_state(|state, _| state.music.position(id))
    }

    pub fn music_duration(&self, id: MusicId) -> Result<Option<f64>> {
        self.with_state(|state, _| state.music.duration(id))
    }

    pub fn set_music_tempo(&self, id: MusicId, tempo: f64) -> Result<()> {
        self.with_state(|state, _| state.music.set_tempo(id, tempo))
    }

    pub fn music_tempo(&self, id: MusicId) -> Result<f64> {
        self.with_state(|state, _| state.music.tempo(id))
    }

    pub fn music_tracks(&self, id: MusicId) -> Result<Option<usize>> {
        self.with_state(|state, _| state.music.tracks(id))
    }

    pub fn set_music_track_mute(&self, id: MusicId, track: usize, muted: bool) -> Result<()> {
        self.with_state(|state, _| state.music.set_track_mute(id, track, muted))
    }

    pub fn music_track_muted(&self, id: MusicId, track: usize) -> Result<bool> {
        self.with_state(|state, _| state.music.track_muted(id, track))
    }

    pub fn jump_to_order(&self, id: MusicId, order: usize) -> Result<()> {
        self.with_state(|state, _| state.music.jump_to_order(id, order))
    }

    pub fn music_loop_points(&self, id: MusicId) -> Result<Option<LoopPoints>> {
        self.with_state(|state, _| state.music.loop_points(id))
    }

    pub fn music_tags(&self, id: MusicId) -> Result<MusicTags> {
        self.with_state(|state, _| state.music.tags(id))
    }

    pub fn music_type(&self, id: MusicId) -> Result<MusicType> {
        self.with_state(|state, _| state.music.music_type(id))
    }

    /// Set a stream's volume, clamped to 0..=128. Returns the previous one.
    pub fn volume_music(&self, id: MusicId, volume: i32) -> Result<Volume> {
        self.with_state(|state, _| state.music.set_volume(id, volume))
    }

    pub fn music_volume(&self, id: MusicId) -> Result<Volume> {
        self.with_state(|state, _| state.music.volume(id))
    }

    /// Set the scalar applied to all music. Returns the previous one.
    pub fn volume_music_general(&self, volume: i32) -> Result<Volume> {
        self.with_state(|state, _| Ok(state.music.set_general_volume(volume)))
    }

    pub fn music_general_volume(&self) -> Result<Volume> {
        self.with_state(|state, _| Ok(state.music.general_volume()))
    }

    pub fn music_state(&self, id: MusicId) -> Result<MusicState> {
        self.with_state(|state, _| state.music.state(id))
    }

    /// Whether a stream is playing, paused ones included.
    pub fn playing_music(&self, id: MusicId) -> Result<bool> {
        self.with_state(|state, _| state.music.is_playing(id))
    }

    pub fn paused_music(&self, id: MusicId) -> Result<bool> {
        self.with_state(|state, _| state.music.is_paused(id))
    }

    pub fn fading_music(&self, id: MusicId) -> Result<Fading> {
        self.with_state(|state, _| state.music.fading(id))
    }

    /// Release the stream automatically once it stops.
    pub fn set_free_on_stop(&self, id: MusicId, free: bool) -> Result<()> {
        self.with_state(|state, _| state.music.set_free_on_stop(id, free))
    }

    pub fn set_synchro_value(&self, id: MusicId, value: i32) -> Result<()> {
        self.with_state(|state, _| state.music.set_synchro(id, value))
    }

    pub fn synchro_value(&self, id: MusicId) -> Result<i32> {
        self.with_state(|state, _| state.music.synchro(id))
    }
}
