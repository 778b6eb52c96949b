//! Music stream metadata types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a music stream resident in a mixer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MusicId(pub u64);

impl fmt::Display for MusicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "music#{}", self.0)
    }
}

/// Kind of content behind a music stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MusicType {
    #[default]
    None,
    Wav,
    Mod,
    Midi,
    Ogg,
    Mp3,
    Flac,
    Opus,
    Gme,
    /// Raw PCM already in the engine format.
    Pcm,
}

impl MusicType {
    /// Guess the type from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Self::Wav,
            "ogg" | "oga" => Self::Ogg,
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "opus" => Self::Opus,
            "mid" | "midi" | "rmi" => Self::Midi,
            "mod" | "xm" | "s3m" | "it" => Self::Mod,
            "nsf" | "spc" | "gbs" | "vgm" => Self::Gme,
            "pcm" | "raw" => Self::Pcm,
            _ => Self::None,
        }
    }

    /// Whether the format is pattern based and supports order jumps.
    pub const fn has_orders(self) -> bool {
        matches!(self, Self::Mod)
    }
}

/// Metadata tags reported by a decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MusicTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub copyright: Option<String>,
}

impl MusicTags {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.copyright.is_none()
    }
}

/// Loop region embedded in a music file, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LoopPoints {
    pub start: f64,
    pub end: f64,
}

impl LoopPoints {
    /// Build a loop region. Returns `None` for an empty or inverted region.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        (start >= 0.0 && end > start).then_some(Self { start, end })
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}
