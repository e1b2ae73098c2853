//! # Chord Verification Workflow
//!
//! A timed, single-session state machine:
//!
//! ```text
//! Idle --trigger--> Preparing --countdown--> Recording --countdown--> Resolved
//!                        |                        |
//!                        +----capture error-------+--> Failed
//! ```
//!
//! Countdowns are driven by [`VerificationWorkflow::poll`] with a timestamp from
//! a [`crate::clock::Clock`], so the whole machine is deterministic under a
//! manual clock. Closing a session at any stage cancels its timer, releases the
//! recorder and discards partial results.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chord::{self, ChordInference, ChordPattern, NoteHistogram};
use crate::clip::{ClipRecorder, DecodedClip};
use crate::error::{ConfigError, VerificationError};
use crate::framer;
use crate::pitch::{EstimatorSettings, FrequencyBand, PitchEstimator};
use crate::tuning::{self, Note, PitchClass};

/// Stage of the verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Idle,
    Preparing,
    Recording,
    Resolved,
    Failed,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Preparing => "preparing",
            Stage::Recording => "recording",
            Stage::Resolved => "resolved",
            Stage::Failed => "failed",
        }
    }
}

/// Chord label supplied by the vision classifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExternalLabel {
    /// Nothing has arrived for this session.
    #[default]
    Pending,
    /// A label arrived but is not a known chord.
    NoChord { raw: String },
    Chord { raw: String, chord: String },
}

impl ExternalLabel {
    /// Normalizes a raw label through the classifier label table.
    pub fn from_raw(raw: &str) -> Self {
        match chord::chord_from_label(raw) {
            Some(chord) => ExternalLabel::Chord {
                raw: raw.to_string(),
                chord: chord.to_string(),
            },
            None => ExternalLabel::NoChord {
                raw: raw.to_string(),
            },
        }
    }
}

/// Whether the audio and vision results agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agreement {
    Agree,
    Disagree,
    /// The vision label never arrived.
    Unavailable,
}

/// Compares the inferred chord with the external label, ignoring case.
///
/// Only a label and an inference naming the same chord agree. A label that
/// is not a chord never agrees, even when the audio found no chord either.
pub fn compare(inferred: &ChordInference, label: &ExternalLabel) -> Agreement {
    match label {
        ExternalLabel::Pending => Agreement::Unavailable,
        ExternalLabel::NoChord { .. } => Agreement::Disagree,
        ExternalLabel::Chord { chord, .. } => match inferred.chord() {
            Some(local) if local.eq_ignore_ascii_case(chord) => Agreement::Agree,
            _ => Agreement::Disagree,
        },
    }
}

/// What the tuner should do once a verification session lets go of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumePolicy {
    #[default]
    Resume,
    StayStopped,
}

/// Timing and analysis parameters of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub prepare_ticks: u32,
    pub record_ticks: u32,
    pub tick_interval_ms: u64,
    pub window_len: usize,
    pub hop: usize,
    /// Estimates must be strictly clearer than this to count.
    pub min_clarity: f32,
    /// Estimates must lie strictly inside this band to count.
    pub band: FrequencyBand,
    /// Members a pattern needs in the second (partial) pass.
    pub min_partial_matches: usize,
    pub resume_policy: ResumePolicy,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            prepare_ticks: 4,
            record_ticks: 4,
            tick_interval_ms: 1000,
            window_len: 2048,
            hop: 1024,
            min_clarity: 0.8,
            band: FrequencyBand::default(),
            min_partial_matches: 2,
            resume_policy: ResumePolicy::Resume,
        }
    }
}

impl VerificationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        framer::validate_framing(self.window_len, self.hop)?;
        self.band.validate()?;
        if self.prepare_ticks == 0 || self.record_ticks == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "prepare_ticks/record_ticks",
                reason: "countdowns need at least one tick".into(),
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "tick_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if !(1..=chord::EVIDENCE_SIZE).contains(&self.min_partial_matches) {
            return Err(ConfigError::InvalidSetting {
                name: "min_partial_matches",
                reason: format!(
                    "{} is outside 1..={}",
                    self.min_partial_matches,
                    chord::EVIDENCE_SIZE
                ),
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// What the UI sees after every stage transition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub stage: Stage,
    /// Ticks left in the current countdown, 0 outside preparing/recording.
    pub countdown: u32,
    pub captured_notes: Vec<Note>,
    pub evidence: Vec<PitchClass>,
    pub inferred_chord: Option<ChordInference>,
    pub external_label: ExternalLabel,
    pub agreement: Option<Agreement>,
    pub failure: Option<String>,
}

/// A pending countdown. Dropping it cancels every tick it would have fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    remaining: u32,
    next_tick_at: Duration,
}

/// The mutable state of one session.
#[derive(Debug, Default)]
struct Session {
    stage: Stage,
    histogram: NoteHistogram,
    evidence: Vec<PitchClass>,
    inferred: Option<ChordInference>,
    external_label: ExternalLabel,
    failure: Option<String>,
}

/// Single-instance chord verification state machine.
pub struct VerificationWorkflow {
    settings: VerificationSettings,
    estimator: PitchEstimator,
    library: Vec<ChordPattern>,
    recorder: Box<dyn ClipRecorder>,
    session: Session,
    timer: Option<Countdown>,
}

impl VerificationWorkflow {
    /// Creates a workflow using the built-in chord library.
    pub fn new(
        settings: VerificationSettings,
        estimator_settings: EstimatorSettings,
        recorder: Box<dyn ClipRecorder>,
    ) -> Result<Self, ConfigError> {
        Self::with_library(
            settings,
            estimator_settings,
            recorder,
            chord::chord_library().to_vec(),
        )
    }

    /// Creates a workflow matching against a custom, ordered chord library.
    pub fn with_library(
        settings: VerificationSettings,
        estimator_settings: EstimatorSettings,
        recorder: Box<dyn ClipRecorder>,
        library: Vec<ChordPattern>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let estimator = PitchEstimator::new(EstimatorSettings {
            band: settings.band,
            ..estimator_settings
        })?;
        Ok(Self {
            settings,
            estimator,
            library,
            recorder,
            session: Session::default(),
            timer: None,
        })
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    pub fn stage(&self) -> Stage {
        self.session.stage
    }

    /// True while the session holds the physical input.
    pub fn is_recording(&self) -> bool {
        self.session.stage == Stage::Recording
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let agreement = self
            .session
            .inferred
            .as_ref()
            .map(|inferred| compare(inferred, &self.session.external_label));
        SessionSnapshot {
            stage: self.session.stage,
            countdown: self.timer.map_or(0, |t| t.remaining),
            captured_notes: self.session.histogram.notes().to_vec(),
            evidence: self.session.evidence.clone(),
            inferred_chord: self.session.inferred.clone(),
            external_label: self.session.external_label.clone(),
            agreement,
            failure: self.session.failure.clone(),
        }
    }

    /// Opens a session and starts the preparation countdown.
    ///
    /// Rejected without side effects unless the workflow is idle.
    pub fn trigger(
        &mut self,
        now: Duration,
        label: Option<&str>,
    ) -> Result<SessionSnapshot, VerificationError> {
        if self.session.stage != Stage::Idle {
            warn!(
                "[VERIFY] Trigger rejected: session is {}",
                self.session.stage.name()
            );
            return Err(VerificationError::SessionBusy(self.session.stage.name()));
        }
        self.session = Session {
            stage: Stage::Preparing,
            external_label: label.map(ExternalLabel::from_raw).unwrap_or_default(),
            ..Session::default()
        };
        self.start_countdown(now, self.settings.prepare_ticks);
        info!(
            "[VERIFY] Preparing: recording starts in {} ticks",
            self.settings.prepare_ticks
        );
        Ok(self.snapshot())
    }

    /// Records a vision label for the open session.
    ///
    /// Returns `Ok(false)` when the session already finished and the label is ignored.
    pub fn receive_label(&mut self, raw: &str) -> Result<bool, VerificationError> {
        match self.session.stage {
            Stage::Idle => Err(VerificationError::NoSession),
            Stage::Preparing | Stage::Recording => {
                self.session.external_label = ExternalLabel::from_raw(raw);
                debug!("[VERIFY] Vision label {:?}", self.session.external_label);
                Ok(true)
            }
            Stage::Resolved | Stage::Failed => {
                debug!("[VERIFY] Late vision label {raw:?} ignored");
                Ok(false)
            }
        }
    }

    /// Routes a live input chunk to the recorder while recording.
    pub fn push_chunk(&mut self, chunk: &[f32]) {
        if self.is_recording() {
            self.recorder.push(chunk);
        }
    }

    /// Advances the countdowns to `now`; returns a snapshot per stage transition.
    pub fn poll(&mut self, now: Duration) -> Vec<SessionSnapshot> {
        let mut transitions = Vec::new();
        while let Some(mut timer) = self.timer {
            if now < timer.next_tick_at {
                break;
            }
            timer.remaining = timer.remaining.saturating_sub(1);
            timer.next_tick_at += self.settings.tick_interval();
            self.timer = Some(timer);
            if timer.remaining > 0 {
                continue;
            }

            // The countdown that just expired.
            let expired_at = timer.next_tick_at - self.settings.tick_interval();
            self.timer = None;
            match self.session.stage {
                Stage::Preparing => self.begin_recording(expired_at),
                Stage::Recording => self.finish_recording(),
                _ => {}
            }
            transitions.push(self.snapshot());
        }
        transitions
    }

    /// Fails the open session because the live input broke off.
    ///
    /// Only a preparing or recording session is affected; returns its failed
    /// snapshot, or `None` when there was nothing to fail.
    pub fn capture_failed(&mut self, reason: &str) -> Option<SessionSnapshot> {
        match self.session.stage {
            Stage::Preparing | Stage::Recording => {
                self.fail(format!("input lost: {reason}"));
                Some(self.snapshot())
            }
            _ => None,
        }
    }

    /// Rejects analysis windows too short for the lowest frequency of the
    /// verification band at `sample_rate`.
    pub fn check_window_len(&self, sample_rate: u32) -> Result<(), ConfigError> {
        self.estimator
            .check_window_len(self.settings.window_len, sample_rate)
    }

    /// Closes the session from any stage: cancels the timer, releases the
    /// recorder and discards partial results.
    pub fn close(&mut self) -> SessionSnapshot {
        if self.timer.take().is_some() {
            debug!("[VERIFY] Pending countdown cancelled");
        }
        if self.recorder.is_recording() {
            self.recorder.abort();
        }
        if self.session.stage != Stage::Idle {
            info!("[VERIFY] Session closed from {}", self.session.stage.name());
        }
        self.session = Session::default();
        self.snapshot()
    }

    fn start_countdown(&mut self, now: Duration, ticks: u32) {
        self.timer = Some(Countdown {
            remaining: ticks,
            next_tick_at: now + self.settings.tick_interval(),
        });
    }

    fn begin_recording(&mut self, now: Duration) {
        match self.recorder.start() {
            Ok(()) => {
                self.session.stage = Stage::Recording;
                self.start_countdown(now, self.settings.record_ticks);
                info!(
                    "[VERIFY] Recording for {} ticks",
                    self.settings.record_ticks
                );
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn finish_recording(&mut self) {
        let decoded = self.recorder.finish().and_then(|clip| clip.decode());
        let clip = match decoded {
            Ok(clip) => clip,
            Err(e) => return self.fail(e.to_string()),
        };
        let histogram = match self.analyze(&clip) {
            Ok(histogram) => histogram,
            Err(e) => return self.fail(e.to_string()),
        };

        let evidence = histogram.top_pitch_classes();
        let inferred = chord::infer_chord(
            &evidence,
            &self.library,
            self.settings.min_partial_matches,
        );
        info!(
            "[VERIFY] Resolved: {} from {} notes, evidence {:?}, vision {:?}",
            inferred,
            histogram.notes().len(),
            evidence,
            self.session.external_label
        );
        self.session.stage = Stage::Resolved;
        self.session.histogram = histogram;
        self.session.evidence = evidence;
        self.session.inferred = Some(inferred);
    }

    /// Runs windowed pitch estimation over a decoded clip and tallies the notes.
    pub fn analyze(&self, clip: &DecodedClip) -> Result<NoteHistogram, ConfigError> {
        let windows = framer::reframe(
            &clip.samples,
            clip.sample_rate,
            self.settings.window_len,
            self.settings.hop,
        )?;
        let mut histogram = NoteHistogram::new();
        for window in &windows {
            let estimate = self.estimator.estimate(window)?;
            let Some(freq) = estimate.frequency else {
                continue;
            };
            if estimate.clarity <= self.settings.min_clarity
                || !self.settings.band.contains_strict(freq)
            {
                continue;
            }
            if let Ok(note) = tuning::frequency_to_note(freq) {
                histogram.add(note);
            }
        }
        debug!(
            "[VERIFY] {} windows, {} pitched",
            windows.len(),
            histogram.notes().len()
        );
        Ok(histogram)
    }

    fn fail(&mut self, reason: String) {
        warn!("[VERIFY] Session failed: {reason}");
        if self.recorder.is_recording() {
            self.recorder.abort();
        }
        self.timer = None;
        self.session.stage = Stage::Failed;
        self.session.failure = Some(reason);
    }
}

impl std::fmt::Debug for VerificationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationWorkflow")
            .field("settings", &self.settings)
            .field("session", &self.session)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}
