//! Decoder adapters: the pull interface music streams read PCM from.
//!
//! Every adapter produces interleaved 16-bit frames already in the engine's
//! channel layout and rate. Capabilities a format lacks report
//! [`Error::Unsupported`].

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::buffer::{shared_ring_buffer, SharedRingBuffer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use voxmix_core::{Error, LoopPoints, MixerConfig, MusicTags, MusicType, Result};

/// Pull-based PCM source behind a music stream.
pub trait Decoder: Send {
    /// Fill `buf` with interleaved frames. Returns the number of frames
    /// written; `0` means end of stream.
    fn decode(&mut self, buf: &mut [i16]) -> Result<usize>;

    fn seek(&mut self, _seconds: f64) -> Result<()> {
        Err(Error::Unsupported("seek"))
    }

    /// Seek from inside the mixer lock. The default seeks at once; adapters
    /// whose seek may block hand it to another thread instead.
    fn request_seek(&mut self, seconds: f64) -> Result<()> {
        self.seek(seconds)
    }

    /// Current play position in seconds, if known.
    fn position(&self) -> Option<f64> {
        None
    }

    /// Total length in seconds, if known.
    fn duration(&self) -> Option<f64> {
        None
    }

    fn set_tempo(&mut self, _tempo: f64) -> Result<()> {
        Err(Error::Unsupported("tempo"))
    }

    fn tempo(&self) -> Option<f64> {
        None
    }

    /// Number of tracks for multi-track formats.
    fn track_count(&self) -> Option<usize> {
        None
    }

    fn set_track_mute(&mut self, _track: usize, _muted: bool) -> Result<()> {
        Err(Error::Unsupported("track mute"))
    }

    /// Jump to a pattern order of a pattern-based format.
    fn jump_to_order(&mut self, _order: usize) -> Result<()> {
        Err(Error::Unsupported("order jump"))
    }

    fn loop_points(&self) -> Option<LoopPoints> {
        None
    }

    fn tags(&self) -> MusicTags {
        MusicTags::default()
    }

    fn music_type(&self) -> MusicType {
        MusicType::None
    }

    /// Release resources. Called once when the stream is freed.
    fn close(&mut self) {}
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn decode(&mut self, buf: &mut [i16]) -> Result<usize> {
        (**self).decode(buf)
    }
    fn seek(&mut self, seconds: f64) -> Result<()> {
        (**self).seek(seconds)
    }
    fn request_seek(&mut self, seconds: f64) -> Result<()> {
        (**self).request_seek(seconds)
    }
    fn position(&self) -> Option<f64> {
        (**self).position()
    }
    fn duration(&self) -> Option<f64> {
        (**self).duration()
    }
    fn set_tempo(&mut self, tempo: f64) -> Result<()> {
        (**self).set_tempo(tempo)
    }
    fn tempo(&self) -> Option<f64> {
        (**self).tempo()
    }
    fn track_count(&self) -> Option<usize> {
        (**self).track_count()
    }
    fn set_track_mute(&mut self, track: usize, muted: bool) -> Result<()> {
        (**self).set_track_mute(track, muted)
    }
    fn jump_to_order(&mut self, order: usize) -> Result<()> {
        (**self).jump_to_order(order)
    }
    fn loop_points(&self) -> Option<LoopPoints> {
        (**self).loop_points()
    }
    fn tags(&self) -> MusicTags {
        (**self).tags()
    }
    fn music_type(&self) -> MusicType {
        (**self).music_type()
    }
    fn close(&mut self) {
        (**self).close();
    }
}

/// Decoder over PCM held in memory, already in the engine format.
#[derive(Debug, Clone)]
pub struct MemoryDecoder {
    samples: Arc<[i16]>,
    channels: usize,
    frequency: u32,
    /// Next frame to produce.
    cursor: usize,
    loop_points: Option<LoopPoints>,
    tags: MusicTags,
    music_type: MusicType,
}

impl MemoryDecoder {
    pub fn new(samples: impl Into<Arc<[i16]>>, config: &MixerConfig) -> Self {
        Self {
            samples: samples.into(),
            channels: usize::from(config.channels),
            frequency: config.frequency,
            cursor: 0,
            loop_points: None,
            tags: MusicTags::default(),
            music_type: MusicType::Pcm,
        }
    }

    #[must_use]
    pub const fn with_loop_points(mut self, loop_points: LoopPoints) -> Self {
        self.loop_points = Some(loop_points);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: MusicTags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub const fn with_type(mut self, music_type: MusicType) -> Self {
        self.music_type = music_type;
        self
    }

    fn total_frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl Decoder for MemoryDecoder {
    fn decode(&mut self, buf: &mut [i16]) -> Result<usize> {
        let frames = (buf.len() / self.channels).min(self.total_frames() - self.cursor);
        let start = self.cursor * self.channels;
        let len = frames * self.channels;
        buf[..len].copy_from_slice(&self.samples[start..start + len]);
        self.cursor += frames;
        Ok(frames)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn seek(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidArgument(format!("seek to {seconds}s")));
        }
        let frame = (seconds * f64::from(self.frequency)).round() as usize;
        self.cursor = frame.min(self.total_frames());
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn position(&self) -> Option<f64> {
        Some(self.cursor as f64 / f64::from(self.frequency))
    }

    #[allow(clippy::cast_precision_loss)]
    fn duration(&self) -> Option<f64> {
        Some(self.total_frames() as f64 / f64::from(self.frequency))
    }

    fn loop_points(&self) -> Option<LoopPoints> {
        self.loop_points
    }

    fn tags(&self) -> MusicTags {
        self.tags.clone()
    }

    fn music_type(&self) -> MusicType {
        self.music_type
    }
}

/// Frames decoded per worker step.
const PREFETCH_STEP_FRAMES: usize = 1024;

/// Worker idle time when the buffer is full or the source has ended.
const PREFETCH_IDLE: Duration = Duration::from_millis(2);

struct PrefetchShared {
    /// The wrapped decoder. The worker holds this lock while it decodes and
    /// writes, so a seek never races a write of stale samples.
    inner: Mutex<Box<dyn Decoder>>,
    ring: SharedRingBuffer<i16>,
    eos: AtomicBool,
    stop: AtomicBool,
    error: Mutex<Option<String>>,
    /// Target of the latest deferred seek, as `f64` bits.
    seek_target: AtomicU64,
    /// Number of deferred seeks the reader has issued.
    seek_requested: AtomicU64,
    /// Latest request the worker has carried out.
    seek_applied: AtomicU64,
    /// Ring write mark where audio for the applied seek starts.
    seek_mark: AtomicUsize,
}

/// Wraps any decoder and decodes ahead on a worker thread, so that reads on
/// the render thread only copy from a lock-free ring buffer.
///
/// An empty buffer before end of stream is an underrun and reads as
/// silence. A decoder error is reported once the buffered audio is used up.
/// [`Decoder::request_seek`] hands the seek to the worker and reads as
/// silence until the worker has repositioned the source.
pub struct PrefetchDecoder {
    shared: Arc<PrefetchShared>,
    channels: usize,
    frequency: u32,
    /// Frames handed out since the last seek, plus the seek target.
    position_frames: u64,
    seekable: bool,
    seek_generation: u64,
    seek_pending: bool,
    duration: Option<f64>,
    loop_points: Option<LoopPoints>,
    tags: MusicTags,
    music_type: MusicType,
    track_count: Option<usize>,
}

impl PrefetchDecoder {
    /// Start prefetching `inner`, buffering up to `buffer_frames` frames.
    pub fn spawn(
        mut inner: impl Decoder + 'static,
        config: &MixerConfig,
        buffer_frames: usize,
    ) -> Result<Self> {
        let channels = usize::from(config.channels);
        let duration = inner.duration();
        let loop_points = inner.loop_points();
        let tags = inner.tags();
        let music_type = inner.music_type();
        let track_count = inner.track_count();
        // Nothing has been decoded yet, so seeking to the start is a no-op
        // that tells whether the source can seek at all.
        let seekable = inner.seek(0.0).map_or_else(|e| !e.is_unsupported(), |()| true);

        let shared = Arc::new(PrefetchShared {
            inner: Mutex::new(Box::new(inner)),
            ring: shared_ring_buffer(buffer_frames.max(PREFETCH_STEP_FRAMES * 2) * channels),
            eos: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            error: Mutex::new(None),
            seek_target: AtomicU64::new(0),
            seek_requested: AtomicU64::new(0),
            seek_applied: AtomicU64::new(0),
            seek_mark: AtomicUsize::new(0),
        });

        let worker_shared = shared.clone();
        std::thread::Builder::new()
            .name("voxmix-prefetch".to_string())
            .spawn(move || prefetch_loop(&worker_shared, channels))
            .map_err(|e| Error::Decoder(format!("Failed to spawn prefetch thread: {e}")))?;

        debug!("Prefetch worker started ({channels} channels, {} frames)", buffer_frames);

        Ok(Self {
            shared,
            channels,
            frequency: config.frequency,
            position_frames: 0,
            seekable,
            seek_generation: 0,
            seek_pending: false,
            duration,
            loop_points,
            tags,
            music_type,
            track_count,
        })
    }

    /// Frames currently buffered ahead of the reader.
    pub fn buffered_frames(&self) -> usize {
        self.shared.ring.available() / self.channels
    }

    /// Whether the wrapped decoder has reached end of stream.
    pub fn source_ended(&self) -> bool {
        self.shared.eos.load(Ordering::Acquire)
    }

    /// Whether a deferred seek still waits on the worker. Once it has run,
    /// the audio buffered ahead of it is dropped.
    fn seek_in_flight(&mut self) -> bool {
        if !self.seek_pending {
            return false;
        }
        if self.shared.seek_applied.load(Ordering::Acquire) != self.seek_generation {
            return true;
        }
        self.shared.ring.discard_to(self.shared.seek_mark.load(Ordering::Acquire));
        self.seek_pending = false;
        false
    }

    /// Mark every deferred seek as done after the reader repositioned the
    /// source itself.
    fn settle_requests(&mut self) {
        self.shared.seek_applied.store(self.seek_generation, Ordering::Release);
        self.seek_pending = false;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.frequency)).round() as u64
    }
}

fn prefetch_loop(shared: &PrefetchShared, channels: usize) {
    let mut scratch = vec![0i16; PREFETCH_STEP_FRAMES * channels];
    while !shared.stop.load(Ordering::Acquire) {
        let requested = shared.seek_requested.load(Ordering::Acquire);
        if requested != shared.seek_applied.load(Ordering::Acquire) {
            apply_seek(shared, requested);
            continue;
        }
        if shared.eos.load(Ordering::Acquire) || shared.ring.free() < scratch.len() {
            std::thread::sleep(PREFETCH_IDLE);
            continue;
        }

        let mut inner = shared.inner.lock();
        // A seek may have run while this thread waited for the lock.
        if shared.eos.load(Ordering::Acquire)
            || shared.seek_requested.load(Ordering::Acquire) != requested
        {
            continue;
        }
        let result = inner.decode(&mut scratch);
        // Decoded from the position a newer request moves away from.
        if shared.seek_requested.load(Ordering::Acquire) != requested {
            continue;
        }
        match result {
            Ok(0) => shared.eos.store(true, Ordering::Release),
            Ok(frames) => {
                shared.ring.write(&scratch[..frames * channels]);
            }
            Err(e) => {
                warn!("Prefetch decode failed: {e}");
                *shared.error.lock() = Some(e.to_string());
                shared.eos.store(true, Ordering::Release);
            }
        }
    }
    shared.inner.lock().close();
    debug!("Prefetch worker stopped");
}

fn apply_seek(shared: &PrefetchShared, requested: u64) {
    let mut inner = shared.inner.lock();
    // The reader may have seeked directly while this thread waited.
    if shared.seek_applied.load(Ordering::Acquire) == requested {
        return;
    }
    let target = f64::from_bits(shared.seek_target.load(Ordering::Acquire));
    match inner.seek(target) {
        Ok(()) => {
            *shared.error.lock() = None;
            shared.eos.store(false, Ordering::Release);
        }
        Err(e) => {
            debug!("Prefetch seek to {target}s failed: {e}");
            shared.eos.store(true, Ordering::Release);
        }
    }
    shared.seek_mark.store(shared.ring.write_mark(), Ordering::Release);
    shared.seek_applied.store(requested, Ordering::Release);
}

impl Decoder for PrefetchDecoder {
    fn decode(&mut self, buf: &mut [i16]) -> Result<usize> {
        let wanted = buf.len() - buf.len() % self.channels;
        if self.seek_in_flight() {
            buf[..wanted].fill(0);
            return Ok(wanted / self.channels);
        }

        let ended = self.shared.eos.load(Ordering::Acquire);
        let got = self.shared.ring.read(&mut buf[..wanted]);
        let frames = got / self.channels;
        self.position_frames += frames as u64;

        if got == wanted {
            return Ok(frames);
        }
        if ended {
            if frames == 0 {
                if let Some(message) = self.shared.error.lock().take() {
                    return Err(Error::Decoder(message));
                }
            }
            return Ok(frames);
        }
        buf[got..wanted].fill(0);
        Ok(wanted / self.channels)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.seek(seconds)?;
        self.shared.ring.clear();
        *self.shared.error.lock() = None;
        self.shared.eos.store(false, Ordering::Release);
        drop(inner);
        self.settle_requests();
        self.position_frames = self.seconds_to_frames(seconds);
        Ok(())
    }

    fn request_seek(&mut self, seconds: f64) -> Result<()> {
        if !self.seekable {
            return Err(Error::Unsupported("seek"));
        }
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidArgument(format!("seek to {seconds}s")));
        }
        self.seek_generation += 1;
        self.shared.seek_target.store(seconds.to_bits(), Ordering::Release);
        self.shared.seek_requested.store(self.seek_generation, Ordering::Release);
        self.seek_pending = true;
        self.position_frames = self.seconds_to_frames(seconds);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn position(&self) -> Option<f64> {
        Some(self.position_frames as f64 / f64::from(self.frequency))
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn set_tempo(&mut self, tempo: f64) -> Result<()> {
        self.shared.inner.lock().set_tempo(tempo)
    }

    fn tempo(&self) -> Option<f64> {
        self.shared.inner.lock().tempo()
    }

    fn track_count(&self) -> Option<usize> {
        self.track_count
    }

    fn set_track_mute(&mut self, track: usize, muted: bool) -> Result<()> {
        self.shared.inner.lock().set_track_mute(track, muted)
    }

    fn jump_to_order(&mut self, order: usize) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.jump_to_order(order)?;
        self.shared.ring.clear();
        self.shared.eos.store(false, Ordering::Release);
        drop(inner);
        self.settle_requests();
        Ok(())
    }

    fn loop_points(&self) -> Option<LoopPoints> {
        self.loop_points
    }

    fn tags(&self) -> MusicTags {
        self.tags.clone()
    }

    fn music_type(&self) -> MusicType {
        self.music_type
    }

    /// Stops the worker without waiting for it; the worker closes the
    /// wrapped decoder once its current step returns.
    fn close(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
    }
}

impl Drop for PrefetchDecoder {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
    }
}
