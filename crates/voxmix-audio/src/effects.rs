//! Effect chains attached to channels, music streams, and the final mix.
//!
//! A chain is an ordered list of in-place transforms over interleaved
//! 16-bit frames. Transforms run in registration order; every entry's
//! completion callback fires exactly once, either when it is unregistered or
//! when the owning voice stops.
//!
//! Panning, positional attenuation and stereo reversal are built-in entries
//! living in the same chain as user transforms.

use crate::events::{Notification, Notifications};
use std::sync::atomic::{AtomicU64, Ordering};
use voxmix_core::MusicId;

/// The buffer an effect is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectOwner {
    Channel(usize),
    Music(MusicId),
    /// The summed output, before master volume.
    Post,
}

/// Transform run once per cycle over the owner's samples.
pub type EffectFn = Box<dyn FnMut(EffectOwner, &mut [i16]) + Send>;

/// Completion callback of an effect.
pub type EffectDoneFn = Box<dyn FnOnce(EffectOwner) + Send>;

/// Identity of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

static NEXT_EFFECT_ID: AtomicU64 = AtomicU64::new(1);

impl EffectId {
    fn next() -> Self {
        Self(NEXT_EFFECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A completion callback detached from its chain, waiting to be delivered
/// outside the mixer lock.
pub struct EffectDone {
    owner: EffectOwner,
    callback: EffectDoneFn,
}

impl EffectDone {
    pub fn fire(self) {
        (self.callback)(self.owner);
    }
}

impl std::fmt::Debug for EffectDone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectDone").field("owner", &self.owner).finish()
    }
}

/// Stereo gain and distance attenuation, all on the 0..=255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub left: u8,
    pub right: u8,
    pub distance: u8,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            left: 255,
            right: 255,
            distance: 0,
        }
    }
}

impl Position {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Left/right gains for a sound at `angle` degrees, 0 being straight
    /// ahead and increasing clockwise. Sounds behind the listener are
    /// attenuated on the far ear only.
    pub fn gains_for_angle(angle: i16) -> (u8, u8) {
        let angle = i32::from(angle).rem_euclid(360);
        let fall = |a: i32| (255 * a / 89).min(255);
        match angle {
            0..=89 => ((255 - fall(angle)) as u8, 255),
            90..=179 => (fall(angle - 90) as u8, 255),
            180..=269 => (255, (255 - fall(angle - 180)) as u8),
            _ => (255, fall(angle - 270) as u8),
        }
    }

    fn apply(&self, channels: usize, buf: &mut [i16]) {
        let near = 255 - i32::from(self.distance);
        if channels < 2 {
            for s in buf.iter_mut() {
                *s = (i32::from(*s) * near / 255) as i16;
            }
            return;
        }
        let left = i32::from(self.left) * near;
        let right = i32::from(self.right) * near;
        for frame in buf.chunks_exact_mut(channels) {
            frame[0] = (i32::from(frame[0]) * left / (255 * 255)) as i16;
            frame[1] = (i32::from(frame[1]) * right / (255 * 255)) as i16;
            for s in &mut frame[2..] {
                *s = (i32::from(*s) * near / 255) as i16;
            }
        }
    }
}

enum Transform {
    Custom(EffectFn),
    Position(Position),
    ReverseStereo,
}

struct Entry {
    id: EffectId,
    transform: Transform,
    on_done: Option<EffectDoneFn>,
}

/// Ordered effects of one owner.
pub struct EffectChain {
    owner: EffectOwner,
    entries: Vec<Entry>,
}

impl EffectChain {
    pub const fn new(owner: EffectOwner) -> Self {
        Self {
            owner,
            entries: Vec::new(),
        }
    }

    pub const fn owner(&self) -> EffectOwner {
        self.owner
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a user transform. Registrations are independent entries even
    /// when the same closure logic is registered twice.
    pub fn register(&mut self, transform: EffectFn, on_done: Option<EffectDoneFn>) -> EffectId {
        let id = EffectId::next();
        self.entries.push(Entry {
            id,
            transform: Transform::Custom(transform),
            on_done,
        });
        id
    }

    /// Remove the first entry matching `id` and hand back its completion.
    pub fn unregister(&mut self, id: EffectId) -> Option<Option<EffectDone>> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(index);
        Some(detach(self.owner, entry))
    }

    /// Remove every entry, queueing their completions in registration
    /// order. The chain keeps its storage, so this never allocates on its
    /// own.
    pub fn clear_into(&mut self, notes: &mut Notifications) {
        let owner = self.owner;
        notes.extend(
            self.entries
                .drain(..)
                .filter_map(|entry| detach(owner, entry))
                .map(Notification::EffectDone),
        );
    }

    /// Current built-in position state, identity when none is installed.
    pub fn position(&self) -> Position {
        self.entries
            .iter()
            .find_map(|e| match e.transform {
                Transform::Position(p) => Some(p),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Install, update, or (for the identity position) remove the built-in
    /// position entry.
    pub fn set_position(&mut self, position: Position) {
        let existing = self
            .entries
            .iter()
            .position(|e| matches!(e.transform, Transform::Position(_)));
        match (existing, position.is_identity()) {
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (Some(index), false) => self.entries[index].transform = Transform::Position(position),
            (None, true) => {}
            (None, false) => self.entries.push(Entry {
                id: EffectId::next(),
                transform: Transform::Position(position),
                on_done: None,
            }),
        }
    }

    pub fn reverse_stereo(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.transform, Transform::ReverseStereo))
    }

    /// Install or remove the built-in channel swap.
    pub fn set_reverse_stereo(&mut self, flip: bool) {
        let existing = self
            .entries
            .iter()
            .position(|e| matches!(e.transform, Transform::ReverseStereo));
        match (existing, flip) {
            (Some(index), false) => {
                self.entries.remove(index);
            }
            (None, true) => self.entries.push(Entry {
                id: EffectId::next(),
                transform: Transform::ReverseStereo,
                on_done: None,
            }),
            _ => {}
        }
    }

    /// Run every transform over `buf` in registration order.
    pub fn apply(&mut self, channels: usize, buf: &mut [i16]) {
        let owner = self.owner;
        for entry in &mut self.entries {
            match &mut entry.transform {
                Transform::Custom(f) => f(owner, buf),
                Transform::Position(p) => p.apply(channels, buf),
                Transform::ReverseStereo if channels >= 2 => {
                    for frame in buf.chunks_exact_mut(channels) {
                        frame.swap(0, 1);
                    }
                }
                Transform::ReverseStereo => {}
            }
        }
    }
}

fn detach(owner: EffectOwner, entry: Entry) -> Option<EffectDone> {
    entry
        .on_done
        .map(|callback| EffectDone { owner, callback })
}

impl std::fmt::Debug for EffectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectChain")
            .field("owner", &self.owner)
            .field("len", &self.entries.len())
            .finish()
    }
}
