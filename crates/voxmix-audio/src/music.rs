//! Music dispatcher: decoder-backed streams, any number of them resident and
//! several playing at once for crossfades.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::decoder::Decoder;
use crate::effects::{EffectChain, EffectOwner};
use crate::events::{push_event, MixerEvent, Notifications};
use crate::fade::FadeEnvelope;
use tracing::{debug, info, warn};
use voxmix_core::{
    clamp_volume, Error, Fading, LoopPoints, Loops, MusicId, MusicTags, MusicType, Result,
    Volume, MAX_VOLUME,
};

/// Transport status of a stream. Fades are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MusicStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Observable state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicState {
    Stopped,
    Playing,
    Paused,
    FadingIn,
    FadingOut,
}

/// Result of pulling one cycle of audio from a stream.
#[derive(Debug)]
pub(crate) enum Pull {
    /// The buffer is full.
    Frames(usize),
    /// End of stream with no repeat left after this many frames.
    Ended(usize),
    /// The decoder failed after this many frames.
    Failed(usize, Error),
}

/// One resident music stream.
pub struct MusicStream {
    id: MusicId,
    decoder: Box<dyn Decoder>,
    pub(crate) status: MusicStatus,
    pub(crate) volume: Volume,
    pub(crate) fade: FadeEnvelope,
    loops: Loops,
    tempo: f64,
    muted: Vec<bool>,
    free_on_stop: bool,
    /// Set on the outgoing stream of a crossfade that frees it.
    release_on_stop: bool,
    /// Whether the decoder has been played from since loading.
    started: bool,
    pub(crate) effects: EffectChain,
    synchro: i32,
    /// Gain for the current cycle, set by the fade pass.
    pub(crate) gain: i32,
}

impl MusicStream {
    fn new(id: MusicId, decoder: Box<dyn Decoder>) -> Self {
        let muted = vec![false; decoder.track_count().unwrap_or(0)];
        Self {
            id,
            decoder,
            status: MusicStatus::Stopped,
            volume: MAX_VOLUME,
            fade: FadeEnvelope::default(),
            loops: Loops::ONCE,
            tempo: 1.0,
            muted,
            free_on_stop: false,
            release_on_stop: false,
            started: false,
            effects: EffectChain::new(EffectOwner::Music(id)),
            synchro: 0,
            gain: 0,
        }
    }

    pub const fn id(&self) -> MusicId {
        self.id
    }

    pub const fn is_audible(&self) -> bool {
        matches!(self.status, MusicStatus::Playing)
    }

    pub fn state(&self) -> MusicState {
        match (self.status, self.fade.kind()) {
            (MusicStatus::Stopped, _) => MusicState::Stopped,
            (MusicStatus::Paused, _) => MusicState::Paused,
            (MusicStatus::Playing, Fading::In) => MusicState::FadingIn,
            (MusicStatus::Playing, Fading::Out) => MusicState::FadingOut,
            (MusicStatus::Playing, Fading::None) => MusicState::Playing,
        }
    }

    const fn should_release(&self) -> bool {
        matches!(self.status, MusicStatus::Stopped) && (self.free_on_stop || self.release_on_stop)
    }

    /// Mark stopped, reporting the finish and releasing every effect.
    pub(crate) fn stop(&mut self, notes: &mut Notifications) {
        if matches!(self.status, MusicStatus::Stopped) {
            return;
        }
        self.status = MusicStatus::Stopped;
        self.fade.clear();
        push_event(notes, MixerEvent::MusicFinished(self.id));
        self.effects.clear_into(notes);
        debug!("Music {} stopped", self.id);
    }

    /// Fill `buf` with interleaved frames, honoring the loop region and the
    /// repeat count.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub(crate) fn pull(&mut self, buf: &mut [i16], channels: usize, frequency: u32) -> Pull {
        let total = buf.len() / channels;
        let rate = f64::from(frequency);
        let loop_points = self.decoder.loop_points();
        let mut filled = 0;
        // Rewinds since frames were last produced.
        let mut idle_rewinds = 0;

        while filled < total {
            let mut want = total - filled;

            if let (Some(lp), true) = (loop_points, self.loops.has_repeats()) {
                if let Some(pos) = self.decoder.position() {
                    let end = (lp.end * rate).round() as u64;
                    let pos = (pos * rate).round() as u64;
                    if pos >= end {
                        self.loops.take_repeat();
                        if let Some(pull) = self.rewind_to(lp.start, filled, &mut idle_rewinds) {
                            return pull;
                        }
                        continue;
                    }
                    want = want.min((end - pos) as usize);
                }
            }

            let range = filled * channels..(filled + want) * channels;
            match self.decoder.decode(&mut buf[range]) {
                Ok(0) => {
                    if !self.loops.take_repeat() {
                        return Pull::Ended(filled);
                    }
                    let start = loop_points.map_or(0.0, |lp| lp.start);
                    if let Some(pull) = self.rewind_to(start, filled, &mut idle_rewinds) {
                        return pull;
                    }
                }
                Ok(frames) => {
                    filled += frames.min(want);
                    idle_rewinds = 0;
                }
                Err(e) => return Pull::Failed(filled, e),
            }
        }
        Pull::Frames(filled)
    }

    /// Seek back for a repeat. Returns the final outcome if playback cannot
    /// continue.
    fn rewind_to(&mut self, seconds: f64, filled: usize, idle_rewinds: &mut u32) -> Option<Pull> {
        *idle_rewinds += 1;
        if *idle_rewinds > 2 {
            warn!("Music {} produced no audio after rewinding", self.id);
            return Some(Pull::Ended(filled));
        }
        if let Err(e) = self.decoder.request_seek(seconds) {
            debug!("Music {} cannot loop: {e}", self.id);
            return Some(Pull::Ended(filled));
        }
        None
    }
}

impl std::fmt::Debug for MusicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicStream")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("volume", &self.volume)
            .field("fade", &self.fade)
            .field("loops", &self.loops)
            .finish_non_exhaustive()
    }
}

/// Every resident stream, in creation order.
#[derive(Debug)]
pub struct MusicDispatcher {
    pub(crate) streams: Vec<MusicStream>,
    current: Option<MusicId>,
    next_id: u64,
    general_volume: Volume,
}

impl Default for MusicDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicDispatcher {
    pub const fn new() -> Self {
        Self {
            streams: Vec::new(),
            current: None,
            next_id: 1,
            general_volume: MAX_VOLUME,
        }
    }

    fn index(&self, id: MusicId) -> Result<usize> {
        self.streams
            .iter()
            .position(|s| s.id == id)
            .ok_or(Error::InvalidStream(id.0))
    }

    fn get(&self, id: MusicId) -> Result<&MusicStream> {
        let index = self.index(id)?;
        Ok(&self.streams[index])
    }

    fn get_mut(&mut self, id: MusicId) -> Result<&mut MusicStream> {
        let index = self.index(id)?;
        Ok(&mut self.streams[index])
    }

    /// Number of resident streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// The most recently started stream.
    pub const fn current(&self) -> Option<MusicId> {
        self.current
    }

    pub fn ids(&self) -> Vec<MusicId> {
        self.streams.iter().map(|s| s.id).collect()
    }

    /// Take ownership of a decoder as a new stopped stream.
    pub fn load(&mut self, decoder: Box<dyn Decoder>) -> MusicId {
        let id = MusicId(self.next_id);
        self.next_id += 1;
        debug!("Loaded {id} ({:?})", decoder.music_type());
        self.streams.push(MusicStream::new(id, decoder));
        id
    }

    /// Stop (if needed) and release a stream.
    pub fn free(&mut self, id: MusicId, notes: &mut Notifications) -> Result<()> {
        let index = self.index(id)?;
        let mut stream = self.streams.remove(index);
        stream.stop(notes);
        stream.effects.clear_into(notes);
        stream.decoder.close();
        if self.current == Some(id) {
            self.current = None;
        }
        debug!("Freed {id}");
        Ok(())
    }

    /// Start a stream from `position` (seconds) or from the top, optionally
    /// fading in over `fade_in` frames. Restarts it if already playing.
    pub fn play(
        &mut self,
        id: MusicId,
        loops: Loops,
        fade_in: Option<u64>,
        position: Option<f64>,
    ) -> Result<()> {
        let stream = self.get_mut(id)?;
        match position {
            Some(seconds) => stream.decoder.request_seek(seconds)?,
            None if stream.started => {
                if let Err(e) = stream.decoder.request_seek(0.0) {
                    debug!("{id} cannot rewind before play: {e}");
                }
            }
            None => {}
        }
        stream.started = true;
        stream.status = MusicStatus::Playing;
        stream.loops = loops;
        stream.release_on_stop = false;
        stream.fade = fade_in.map_or_else(FadeEnvelope::default, FadeEnvelope::fade_in);
        self.current = Some(id);
        info!("Playing {id} (loops: {loops:?}, fade-in: {fade_in:?} frames)");
        Ok(())
    }

    pub fn halt(&mut self, id: MusicId, notes: &mut Notifications) -> Result<()> {
        self.get_mut(id)?.stop(notes);
        self.reap();
        Ok(())
    }

    /// Fade a playing or paused stream out over `frames`, or halt it at once
    /// when `frames` is zero. Returns false if the stream was stopped.
    pub fn fade_out(&mut self, id: MusicId, frames: u64, notes: &mut Notifications) -> Result<bool> {
        let stream = self.get_mut(id)?;
        if matches!(stream.status, MusicStatus::Stopped) {
            return Ok(false);
        }
        if frames == 0 {
            stream.stop(notes);
            self.reap();
        } else {
            stream.fade = stream.fade.fade_out_from(frames);
        }
        Ok(true)
    }

    /// Start `new` fading in while `old` fades out over the same `frames`.
    /// With `free_old`, `old` is released once its fade completes.
    #[allow(clippy::too_many_arguments)]
    pub fn cross_fade(
        &mut self,
        old: MusicId,
        new: MusicId,
        loops: Loops,
        frames: u64,
        position: Option<f64>,
        free_old: bool,
        notes: &mut Notifications,
    ) -> Result<()> {
        if old == new {
            return Err(Error::InvalidArgument(format!(
                "cannot crossfade {old} into itself"
            )));
        }
        self.index(old)?;
        self.play(new, loops, Some(frames), position)?;

        let outgoing = self.get_mut(old)?;
        if matches!(outgoing.status, MusicStatus::Stopped) {
            if free_old {
                self.free(old, notes)?;
            }
        } else {
            outgoing.fade = outgoing.fade.fade_out_from(frames);
            outgoing.release_on_stop = free_old;
        }
        info!("Crossfading {old} -> {new} over {frames} frames");
        Ok(())
    }

    pub fn pause(&mut self, id: MusicId) -> Result<()> {
        let stream = self.get_mut(id)?;
        if matches!(stream.status, MusicStatus::Playing) {
            stream.status = MusicStatus::Paused;
        }
        Ok(())
    }

    pub fn resume(&mut self, id: MusicId) -> Result<()> {
        let stream = self.get_mut(id)?;
        if matches!(stream.status, MusicStatus::Paused) {
            stream.status = MusicStatus::Playing;
        }
        Ok(())
    }

    pub fn pause_all(&mut self) {
        for stream in &mut self.streams {
            if matches!(stream.status, MusicStatus::Playing) {
                stream.status = MusicStatus::Paused;
            }
        }
    }

    pub fn resume_all(&mut self) {
        for stream in &mut self.streams {
            if matches!(stream.status, MusicStatus::Paused) {
                stream.status = MusicStatus::Playing;
            }
        }
    }

    pub fn halt_all(&mut self, notes: &mut Notifications) {
        for stream in &mut self.streams {
            stream.stop(notes);
        }
        self.reap();
    }

    pub fn rewind(&mut self, id: MusicId) -> Result<()> {
        self.get_mut(id)?.decoder.request_seek(0.0)
    }

    pub fn set_position(&mut self, id: MusicId, seconds: f64) -> Result<()> {
        self.get_mut(id)?.decoder.request_seek(seconds)
    }

    pub fn position(&self, id: MusicId) -> Result<Option<f64>> {
        Ok(self.get(id)?.decoder.position())
    }

    pub fn duration(&self, id: MusicId) -> Result<Option<f64>> {
        Ok(self.get(id)?.decoder.duration())
    }

    /// Change the playback speed. The multiplier must be positive.
    pub fn set_tempo(&mut self, id: MusicId, tempo: f64) -> Result<()> {
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(Error::InvalidArgument(format!("tempo {tempo} is not positive")));
        }
        let stream = self.get_mut(id)?;
        stream.decoder.set_tempo(tempo)?;
        stream.tempo = tempo;
        Ok(())
    }

    pub fn tempo(&self, id: MusicId) -> Result<f64> {
        let stream = self.get(id)?;
        Ok(stream.decoder.tempo().unwrap_or(stream.tempo))
    }

    pub fn tracks(&self, id: MusicId) -> Result<Option<usize>> {
        Ok(self.get(id)?.decoder.track_count())
    }

    pub fn set_track_mute(&mut self, id: MusicId, track: usize, muted: bool) -> Result<()> {
        let stream = self.get_mut(id)?;
        if let Some(count) = stream.decoder.track_count() {
            if track >= count {
                return Err(Error::InvalidArgument(format!(
                    "track {track} out of {count}"
                )));
            }
        }
        stream.decoder.set_track_mute(track, muted)?;
        if stream.muted.len() <= track {
            stream.muted.resize(track + 1, false);
        }
        stream.muted[track] = muted;
        Ok(())
    }

    pub fn track_muted(&self, id: MusicId, track: usize) -> Result<bool> {
        Ok(self.get(id)?.muted.get(track).copied().unwrap_or(false))
    }

    pub fn jump_to_order(&mut self, id: MusicId, order: usize) -> Result<()> {
        self.get_mut(id)?.decoder.jump_to_order(order)
    }

    pub fn loop_points(&self, id: MusicId) -> Result<Option<LoopPoints>> {
        Ok(self.get(id)?.decoder.loop_points())
    }

    pub fn tags(&self, id: MusicId) -> Result<MusicTags> {
        Ok(self.get(id)?.decoder.tags())
    }

    pub fn music_type(&self, id: MusicId) -> Result<MusicType> {
        Ok(self.get(id)?.decoder.music_type())
    }

    /// Set a stream's volume. Returns the previous one.
    pub fn set_volume(&mut self, id: MusicId, volume: i32) -> Result<Volume> {
        let stream = self.get_mut(id)?;
        Ok(std::mem::replace(&mut stream.volume, clamp_volume(volume)))
    }

    pub fn volume(&self, id: MusicId) -> Result<Volume> {
        Ok(self.get(id)?.volume)
    }

    /// Scalar applied to every stream. Returns the previous one.
    pub fn set_general_volume(&mut self, volume: i32) -> Volume {
        std::mem::replace(&mut self.general_volume, clamp_volume(volume))
    }

    pub const fn general_volume(&self) -> Volume {
        self.general_volume
    }

    pub fn state(&self, id: MusicId) -> Result<MusicState> {
        Ok(self.get(id)?.state())
    }

    pub fn fading(&self, id: MusicId) -> Result<Fading> {
        let stream = self.get(id)?;
        Ok(if matches!(stream.status, MusicStatus::Stopped) {
            Fading::None
        } else {
            stream.fade.kind()
        })
    }

    /// Whether a stream is playing, paused ones included.
    pub fn is_playing(&self, id: MusicId) -> Result<bool> {
        Ok(!matches!(self.get(id)?.status, MusicStatus::Stopped))
    }

    pub fn is_paused(&self, id: MusicId) -> Result<bool> {
        Ok(matches!(self.get(id)?.status, MusicStatus::Paused))
    }

    /// Release the stream automatically once it stops.
    pub fn set_free_on_stop(&mut self, id: MusicId, free: bool) -> Result<()> {
        self.get_mut(id)?.free_on_stop = free;
        Ok(())
    }

    pub fn set_synchro(&mut self, id: MusicId, value: i32) -> Result<()> {
        self.get_mut(id)?.synchro = value;
        Ok(())
    }

    pub fn synchro(&self, id: MusicId) -> Result<i32> {
        Ok(self.get(id)?.synchro)
    }

    pub fn effects_mut(&mut self, id: MusicId) -> Result<&mut EffectChain> {
        Ok(&mut self.get_mut(id)?.effects)
    }

    pub fn effects(&self, id: MusicId) -> Result<&EffectChain> {
        Ok(&self.get(id)?.effects)
    }

    /// Release every stopped stream flagged to free itself.
    pub(crate) fn reap(&mut self) {
        let mut index = 0;
        while index < self.streams.len() {
            if self.streams[index].should_release() {
                let mut stream = self.streams.remove(index);
                stream.decoder.close();
                if self.current == Some(stream.id) {
                    self.current = None;
                }
                debug!("Released {} after stop", stream.id);
            } else {
                index += 1;
            }
        }
    }

    /// Stop and release every stream.
    pub fn clear(&mut self, notes: &mut Notifications) {
        for mut stream in self.streams.drain(..) {
            stream.stop(notes);
            stream.effects.clear_into(notes);
            stream.decoder.close();
        }
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MemoryDecoder;
    use crate::events::Notification;
    use voxmix_core::MixerConfig;

    fn config() -> MixerConfig {
        MixerConfig {
            frequency: 100,
            channels: 1,
            ..MixerConfig::default()
        }
    }

    fn counting(frames: usize) -> Box<dyn Decoder> {
        let samples: Vec<i16> = (0..frames).map(|i| i as i16).collect();
        Box::new(MemoryDecoder::new(samples, &config()))
    }

    fn finished(notes: &Notifications) -> Vec<MusicId> {
        notes
            .iter()
            .filter_map(|n| match n {
                Notification::Event(MixerEvent::MusicFinished(id)) => Some(*id),
                _ => None,
            })
            .collect()
    }

    struct Fixed;

    impl Decoder for Fixed {
        fn decode(&mut self, buf: &mut [i16]) -> Result<usize> {
            buf.fill(1);
            Ok(buf.len())
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut music = MusicDispatcher::new();
        let id = music.load(counting(100));
        assert_eq!(music.state(id).unwrap(), MusicState::Stopped);

        music.play(id, Loops::ONCE, Some(50), None).unwrap();
        assert_eq!(music.state(id).unwrap(), MusicState::FadingIn);
        assert_eq!(music.current(), Some(id));

        music.pause(id).unwrap();
        assert_eq!(music.state(id).unwrap(), MusicState::Paused);
        assert!(music.is_playing(id).unwrap());
        music.resume(id).unwrap();

        let mut notes = Vec::new();
        assert!(music.fade_out(id, 10, &mut notes).unwrap());
        assert_eq!(music.state(id).unwrap(), MusicState::FadingOut);
        assert_eq!(music.fading(id).unwrap(), Fading::Out);

        assert!(music.fade_out(id, 0, &mut notes).unwrap());
        assert_eq!(music.state(id).unwrap(), MusicState::Stopped);
        assert_eq!(finished(&notes), vec![id]);
        assert!(!music.fade_out(id, 10, &mut notes).unwrap());
    }

    #[test]
    fn test_unknown_stream() {
        let mut music = MusicDispatcher::new();
        let mut notes = Vec::new();
        assert!(matches!(
            music.halt(MusicId(42), &mut notes),
            Err(Error::InvalidStream(42))
        ));
        assert!(music.volume(MusicId(1)).unwrap_err().is_invalid_handle());
    }

    #[test]
    fn test_pull_repeats_from_start() {
        let mut music = MusicDispatcher::new();
        let id = music.load(counting(3));
        music.play(id, Loops::Times(1), None, None).unwrap();

        let mut buf = [0i16; 8];
        let pull = music.streams[0].pull(&mut buf, 1, 100);
        assert!(matches!(pull, Pull::Ended(6)));
        assert_eq!(buf[..6], [0, 1, 2, 0, 1, 2]);
        assert_eq!(music.index(id).unwrap(), 0);
    }

    #[test]
    fn test_pull_honors_loop_region() {
        let mut music = MusicDispatcher::new();
        let samples: Vec<i16> = (0..10).collect();
        let decoder = MemoryDecoder::new(samples, &config())
            .with_loop_points(LoopPoints::new(0.02, 0.05).unwrap());
        let id = music.load(Box::new(decoder));
        music.play(id, Loops::Times(1), None, None).unwrap();

        let mut buf = [0i16; 14];
        let pull = music.streams[0].pull(&mut buf, 1, 100);
        assert!(matches!(pull, Pull::Ended(13)));
        assert_eq!(buf[..13], [0, 1, 2, 3, 4, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_pull_unseekable_ends_instead_of_looping() {
        struct Short(usize);
        impl Decoder for Short {
            fn decode(&mut self, buf: &mut [i16]) -> Result<usize> {
                let n = self.0.min(buf.len());
                self.0 -= n;
                Ok(n)
            }
        }

        let mut music = MusicDispatcher::new();
        let id = music.load(Box::new(Short(4)));
        music.play(id, Loops::Infinite, None, None).unwrap();
        let mut buf = [0i16; 16];
        assert!(matches!(music.streams[0].pull(&mut buf, 1, 100), Pull::Ended(4)));
    }

    #[test]
    fn test_pull_infinite_never_ends() {
        let mut music = MusicDispatcher::new();
        let id = music.load(Box::new(Fixed));
        music.play(id, Loops::Infinite, None, None).unwrap();
        let mut buf = [0i16; 64];
        assert!(matches!(music.streams[0].pull(&mut buf, 1, 100), Pull::Frames(64)));
    }

    #[test]
    fn test_tempo_validation() {
        let mut music = MusicDispatcher::new();
        let id = music.load(counting(10));
        assert!(matches!(
            music.set_tempo(id, 0.0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(music.set_tempo(id, 1.5).unwrap_err().is_unsupported());
        assert!((music.tempo(id).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!(music.set_track_mute(id, 0, true).unwrap_err().is_unsupported());
        assert!(music.jump_to_order(id, 2).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_unseekable_play_at_position_fails() {
        let mut music = MusicDispatcher::new();
        let id = music.load(Box::new(Fixed));
        assert!(music.play(id, Loops::ONCE, None, Some(3.0)).unwrap_err().is_unsupported());
        assert_eq!(music.state(id).unwrap(), MusicState::Stopped);
        assert!(music.set_position(id, 1.0).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_free_on_stop_releases() {
        let mut music = MusicDispatcher::new();
        let id = music.load(counting(10));
        music.set_free_on_stop(id, true).unwrap();
        music.play(id, Loops::ONCE, None, None).unwrap();

        let mut notes = Vec::new();
        music.halt(id, &mut notes).unwrap();
        assert!(music.is_empty());
        assert_eq!(music.current(), None);
        assert_eq!(finished(&notes), vec![id]);
    }

    #[test]
    fn test_cross_fade_installs_both_envelopes() {
        let mut music = MusicDispatcher::new();
        let a = music.load(counting(10));
        let b = music.load(counting(10));
        music.play(a, Loops::ONCE, None, None).unwrap();

        let mut notes = Vec::new();
        music.cross_fade(a, b, Loops::ONCE, 100, None, true, &mut notes).unwrap();
        assert_eq!(music.state(a).unwrap(), MusicState::FadingOut);
        assert_eq!(music.state(b).unwrap(), MusicState::FadingIn);
        assert_eq!(music.current(), Some(b));

        music.halt(a, &mut notes).unwrap();
        assert_eq!(music.ids(), vec![b]);
        assert!(music.cross_fade(b, b, Loops::ONCE, 10, None, false, &mut notes).is_err());
    }

    #[test]
    fn test_cross_fade_from_stopped_frees_immediately() {
        let mut music = MusicDispatcher::new();
        let a = music.load(counting(10));
        let b = music.load(counting(10));
        let mut notes = Vec::new();
        music.cross_fade(a, b, Loops::ONCE, 100, None, true, &mut notes).unwrap();
        assert_eq!(music.ids(), vec![b]);
        assert!(finished(&notes).is_empty());
    }

    #[test]
    fn test_volumes() {
        let mut music = MusicDispatcher::new();
        let id = music.load(counting(10));
        assert_eq!(music.set_volume(id, 64).unwrap(), MAX_VOLUME);
        assert_eq!(music.set_volume(id, 999).unwrap(), 64);
        assert_eq!(music.volume(id).unwrap(), MAX_VOLUME);
        assert_eq!(music.set_general_volume(-3), MAX_VOLUME);
        assert_eq!(music.general_volume(), 0);
    }

    #[test]
    fn test_pause_all_and_resume_all() {
        let mut music = MusicDispatcher::new();
        let a = music.load(counting(10));
        let b = music.load(counting(10));
        music.play(a, Loops::ONCE, None, None).unwrap();
        music.pause_all();
        assert!(music.is_paused(a).unwrap());
        assert!(!music.is_paused(b).unwrap());
        music.resume_all();
        assert_eq!(music.state(a).unwrap(), MusicState::Playing);

        let mut notes = Vec::new();
        music.halt_all(&mut notes);
        assert_eq!(finished(&notes), vec![a]);
    }
}
