//! # Error Types
//!
//! Explicit error values returned by the analysis pipeline. Signal-quality
//! rejections (silence, low clarity, out-of-band pitch) are never errors; they
//! surface as "no estimate" instead.

use thiserror::Error;

/// Result alias for configuration-level operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Failure to parse or map a musical note.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoteError {
    #[error("unrecognized pitch class: {0:?}")]
    UnknownPitchClass(String),

    #[error("note {0:?} has no valid octave")]
    InvalidOctave(String),

    #[error("frequency {0} Hz cannot be mapped to a note")]
    InvalidFrequency(f32),
}

/// Invalid configuration handed to one of the components.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown tuning preset: {0:?}")]
    UnknownPreset(String),

    #[error("tuning preset {preset:?} has an invalid entry: {source}")]
    InvalidPresetEntry {
        preset: String,
        #[source]
        source: NoteError,
    },

    #[error("tuning preset {0:?} has no strings")]
    EmptyPreset(String),

    #[error("string {string:?} is not part of tuning preset {preset:?}")]
    StringNotInPreset { preset: String, string: String },

    #[error("analysis window must hold at least 2 samples, got {0}")]
    WindowTooShort(usize),

    #[error("hop size must be between 1 and the window length ({window}), got {hop}")]
    InvalidHop { window: usize, hop: usize },

    #[error("frequency band {min_hz}..{max_hz} Hz is empty or not positive")]
    InvalidBand { min_hz: f32, max_hz: f32 },

    #[error("sample rate must be positive")]
    InvalidSampleRate,

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error(transparent)]
    Note(#[from] NoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Capture or decode failure. Fatal to the current verification session only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("recording was never started")]
    NotStarted,

    #[error("recorded clip is empty")]
    EmptyClip,

    #[error("failed to decode recorded clip: {0}")]
    Decode(String),
}

impl From<hound::Error> for CaptureError {
    fn from(err: hound::Error) -> Self {
        CaptureError::Decode(err.to_string())
    }
}

/// Rejected operation on the chord verification workflow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("a verification session is already {0}; close it before starting a new one")]
    SessionBusy(&'static str),

    #[error("no verification session is open")]
    NoSession,
}
