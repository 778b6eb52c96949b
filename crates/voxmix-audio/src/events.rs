//! Notifications produced while the mixer state is locked and delivered
//! after the lock is released.

use crate::effects::EffectDone;
use voxmix_core::{Error, MusicId};

/// Events emitted by the mixer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerEvent {
    /// A channel stopped: played out, halted, expired, faded out, or evicted.
    ChannelFinished(usize),
    /// A music stream stopped.
    MusicFinished(MusicId),
    /// A music decoder failed mid-stream; the stream was stopped.
    DecoderFailed { music: MusicId, message: String },
}

/// Work deferred until the mixer lock is released.
#[derive(Debug)]
pub enum Notification {
    Event(MixerEvent),
    /// Becomes [`MixerEvent::DecoderFailed`] on delivery, so the message is
    /// only formatted off the render path.
    DecoderFailed { music: MusicId, error: Error },
    EffectDone(EffectDone),
}

/// Deferred notifications in the order they were raised.
pub type Notifications = Vec<Notification>;

pub(crate) fn push_event(notes: &mut Notifications, event: MixerEvent) {
    notes.push(Notification::Event(event));
}
