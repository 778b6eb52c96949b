//! Error types for voxmix.

use thiserror::Error;

/// Result type alias using voxmix's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for voxmix.
#[derive(Error, Debug)]
pub enum Error {
    // Handle errors
    #[error("Invalid channel: {0}")]
    InvalidChannel(usize),

    #[error("Invalid music stream: {0}")]
    InvalidStream(u64),

    #[error("No channel available")]
    NoChannelAvailable,

    // Effect registration errors
    #[error("Effect not found")]
    NotFound,

    /// Never returned by the mixer: registering the same effect twice
    /// makes two independent registrations. Kept for callers matching on
    /// registration failures.
    #[error("Effect already registered")]
    AlreadyRegistered,

    // Decoder errors
    #[error("Unsupported by decoder: {0}")]
    Unsupported(&'static str),

    #[error("Decoder error: {0}")]
    Decoder(String),

    // Engine errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Mixer is closed")]
    Closed,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the error names a handle that does not exist.
    pub const fn is_invalid_handle(&self) -> bool {
        matches!(self, Self::InvalidChannel(_) | Self::InvalidStream(_))
    }

    /// Returns true if the decoder lacks the requested capability.
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::InvalidChannel(9).is_invalid_handle());
        assert!(Error::InvalidStream(3).is_invalid_handle());
        assert!(!Error::NotFound.is_invalid_handle());
        assert!(Error::Unsupported("seek").is_unsupported());
        assert!(!Error::Decoder("eof".into()).is_unsupported());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Unsupported("tempo");
        assert_eq!(err.to_string(), "Unsupported by decoder: tempo");
        assert_eq!(Error::InvalidChannel(12).to_string(), "Invalid channel: 12");
    }
}
