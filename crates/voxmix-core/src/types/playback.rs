//! Playback control types shared by channels and music streams.

use serde::{Deserialize, Serialize};

/// Group label attached to channels. `ALL_CHANNELS` addresses every channel
/// and is also the tag of an ungrouped channel.
pub type GroupTag = i32;

/// The group containing every channel.
pub const ALL_CHANNELS: GroupTag = -1;

/// Fade status of a voice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Fading {
    #[default]
    None,
    In,
    Out,
}

/// Repeat count of a voice, counted after the first play-through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Loops {
    Infinite,
    Times(u32),
}

impl Default for Loops {
    fn default() -> Self {
        Self::Times(0)
    }
}

impl Loops {
    /// Play once.
    pub const ONCE: Self = Self::Times(0);

    /// Build from the conventional integer form: `-1` loops forever, `0` plays
    /// once, `n` repeats `n` more times.
    pub const fn from_count(count: i32) -> Self {
        if count < 0 {
            Self::Infinite
        } else {
            Self::Times(count as u32)
        }
    }

    /// Consume one repeat. Returns false when no repeat is left.
    pub fn take_repeat(&mut self) -> bool {
        match self {
            Self::Infinite => true,
            Self::Times(0) => false,
            Self::Times(n) => {
                *n -= 1;
                true
            }
        }
    }

    pub const fn has_repeats(self) -> bool {
        !matches!(self, Self::Times(0))
    }
}

impl From<i32> for Loops {
    fn from(count: i32) -> Self {
        Self::from_count(count)
    }
}

/// Target of a channel operation: one channel or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    All,
    Channel(usize),
}

impl From<usize> for Which {
    fn from(channel: usize) -> Self {
        Self::Channel(channel)
    }
}
