//! # Tuning Evaluator
//!
//! Turns a stream of pitch estimates into a tuning verdict for the strings of
//! the active preset. Qualifying estimates are exponentially smoothed, matched
//! to the nearest target string (unless the player pinned one), and compared
//! against that string in cents.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::pitch::PitchEstimate;
use crate::tuning::{self, Note, TuningPreset};

/// Tuning direction reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    #[default]
    NoSignal,
    TooLow,
    TooHigh,
    InTune,
}

impl Verdict {
    /// In tune strictly inside `±tolerance` cents; a deviation of exactly the
    /// tolerance counts as out of tune.
    pub fn from_cents(cents: f32, tolerance: f32) -> Self {
        if cents.abs() < tolerance {
            Verdict::InTune
        } else if cents > 0.0 {
            Verdict::TooHigh
        } else {
            Verdict::TooLow
        }
    }
}

/// The string currently being tuned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetString {
    /// Position in the preset, lowest string first.
    pub index: usize,
    pub note: Note,
    pub frequency: f32,
}

/// Snapshot of the tuner, emitted after every qualifying estimate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TuningState {
    pub smoothed_frequency: Option<f32>,
    pub detected_note: Option<Note>,
    pub target_string: Option<TargetString>,
    pub cents_deviation: Option<f32>,
    pub verdict: Verdict,
    /// Number of strings walked through so far, advanced when a string is in tune.
    pub progress: usize,
}

/// Smoothing and gating parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerSettings {
    /// Weight of the newest estimate in the exponential smoothing.
    pub smoothing_alpha: f32,
    /// Estimates below this clarity are ignored.
    pub min_clarity: f32,
    /// Estimates below this frequency are ignored.
    pub min_frequency: f32,
    /// Half-width of the in-tune zone in cents.
    pub in_tune_cents: f32,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.2,
            min_clarity: 0.95,
            min_frequency: 50.0,
            in_tune_cents: 5.0,
        }
    }
}

impl TunerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::InvalidSetting {
                name: "smoothing_alpha",
                reason: format!("{} is outside (0, 1]", self.smoothing_alpha),
            });
        }
        if !(0.0..=1.0).contains(&self.min_clarity) {
            return Err(ConfigError::InvalidSetting {
                name: "min_clarity",
                reason: format!("{} is outside [0, 1]", self.min_clarity),
            });
        }
        if self.in_tune_cents <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "in_tune_cents",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Owns the tuning state for one preset.
#[derive(Debug)]
pub struct TuningEvaluator {
    preset: TuningPreset,
    settings: TunerSettings,
    pinned: Option<usize>,
    state: TuningState,
}

impl TuningEvaluator {
    pub fn new(preset: TuningPreset, settings: TunerSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        if preset.strings.is_empty() {
            return Err(ConfigError::EmptyPreset(preset.name));
        }
        Ok(Self {
            preset,
            settings,
            pinned: None,
            state: TuningState::default(),
        })
    }

    pub fn preset(&self) -> &TuningPreset {
        &self.preset
    }

    pub fn state(&self) -> &TuningState {
        &self.state
    }

    pub fn pinned_string(&self) -> Option<usize> {
        self.pinned
    }

    /// Switches preset and drops every bit of tuning state, including a pinned string.
    pub fn set_preset(&mut self, preset: TuningPreset) -> Result<(), ConfigError> {
        if preset.strings.is_empty() {
            return Err(ConfigError::EmptyPreset(preset.name));
        }
        debug!("[TUNER] Preset changed to {}", preset.name);
        self.preset = preset;
        self.pinned = None;
        self.state = TuningState::default();
        Ok(())
    }

    /// Pins the target string by note name, suppressing nearest-string selection.
    pub fn pin_string(&mut self, name: &str) -> Result<(), ConfigError> {
        let index = self.preset.string_index(name)?;
        self.pin_index(index)
    }

    /// Pins the target string by its position in the preset.
    pub fn pin_index(&mut self, index: usize) -> Result<(), ConfigError> {
        let note = *self
            .preset
            .strings
            .get(index)
            .ok_or_else(|| ConfigError::StringNotInPreset {
                preset: self.preset.name.clone(),
                string: format!("#{}", index + 1),
            })?;
        debug!("[TUNER] Pinned string {} ({})", index + 1, note);
        self.pinned = Some(index);
        self.state.target_string = Some(target(index, note));
        self.refresh_verdict();
        Ok(())
    }

    /// Returns to automatic nearest-string selection.
    pub fn clear_pin(&mut self) {
        self.pinned = None;
    }

    /// Reports a lost input: the smoothing history is dropped and the verdict
    /// returns to no-signal while preset, pin and progress survive.
    pub fn signal_lost(&mut self) -> &TuningState {
        self.state.smoothed_frequency = None;
        self.state.detected_note = None;
        self.state.cents_deviation = None;
        self.state.verdict = Verdict::NoSignal;
        if self.pinned.is_none() {
            self.state.target_string = None;
        }
        &self.state
    }

    /// Feeds one estimate. Returns the new state if the estimate qualified.
    pub fn update(&mut self, estimate: &PitchEstimate) -> Option<&TuningState> {
        let freq = estimate.frequency?;
        if estimate.clarity < self.settings.min_clarity || freq < self.settings.min_frequency {
            return None;
        }

        let alpha = self.settings.smoothing_alpha;
        let smoothed = match self.state.smoothed_frequency {
            Some(prev) => prev * (1.0 - alpha) + freq * alpha,
            None => freq,
        };
        self.state.smoothed_frequency = Some(smoothed);
        self.state.detected_note = tuning::frequency_to_note(freq).ok();

        let index = self.pinned.unwrap_or_else(|| self.closest_string(freq));
        self.state.target_string = Some(target(index, self.preset.strings[index]));
        self.refresh_verdict();

        debug!(
            "[TUNER] freq={:.2} smoothed={:.2} target={:?} cents={:?} verdict={:?}",
            freq,
            smoothed,
            self.state.target_string.map(|t| t.note.to_string()),
            self.state.cents_deviation,
            self.state.verdict
        );
        Some(&self.state)
    }

    /// Index of the preset string closest to `freq`; ties go to the earlier string.
    fn closest_string(&self, freq: f32) -> usize {
        let mut best = 0;
        let mut min_difference = f32::INFINITY;
        for (i, note) in self.preset.strings.iter().enumerate() {
            let difference = (freq - note.frequency()).abs();
            if difference < min_difference {
                min_difference = difference;
                best = i;
            }
        }
        best
    }

    fn refresh_verdict(&mut self) {
        let (Some(smoothed), Some(target)) =
            (self.state.smoothed_frequency, self.state.target_string)
        else {
            self.state.cents_deviation = None;
            self.state.verdict = Verdict::NoSignal;
            return;
        };
        let cents = tuning::calculate_cents_deviation(smoothed, target.frequency);
        let verdict = Verdict::from_cents(cents, self.settings.in_tune_cents);
        self.state.cents_deviation = Some(cents);
        self.state.verdict = verdict;

        // The last string in tune has no successor to move on to.
        if verdict == Verdict::InTune && target.index + 1 < self.preset.strings.len() {
            self.state.progress = self.state.progress.max(target.index + 1);
        }
    }
}

fn target(index: usize, note: Note) -> TargetString {
    TargetString {
        index,
        note,
        frequency: note.frequency(),
    }
}
