// fretwise-core/src/lib.rs

//! The core logic for the guitar practice assistant.
//! This crate turns microphone input into tuning feedback and verifies
//! strummed chords against a vision classifier's label. It is completely
//! headless and contains no UI code; front ends drive it through
//! [`engine::PracticeEngine`].

pub mod audio;
pub mod autocorr;
pub mod chord;
pub mod clip;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod framer;
pub mod pitch;
pub mod tuner;
pub mod tuning;
pub mod verification;

pub use config::{FretwiseConfig, load_config, save_config};
pub use engine::{EngineEvent, PracticeEngine};
pub use error::{CaptureError, ConfigError, NoteError, VerificationError};
