//! # Practice Engine
//!
//! The single entry point UI front ends talk to. It owns the tuner and the
//! chord verification workflow and arbitrates the one physical input between
//! them: while a verification session is recording, live chunks go to the
//! recorder and continuous tuning is suspended.
//!
//! Everything runs on the caller's thread; chunks, labels and clock polls are
//! processed strictly in the order they are handed in.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clip::ClipRecorder;
use crate::clock::Clock;
use crate::config::FretwiseConfig;
use crate::error::{ConfigError, VerificationError};
use crate::framer::SampleFramer;
use crate::pitch::PitchEstimator;
use crate::tuner::{TuningEvaluator, TuningState};
use crate::tuning::TuningPreset;
use crate::verification::{ResumePolicy, SessionSnapshot, Stage, VerificationWorkflow};

/// Output of the engine, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "state", rename_all = "kebab-case")]
pub enum EngineEvent {
    Tuning(TuningState),
    Verification(SessionSnapshot),
}

/// Shared analysis engine for continuous tuning and chord verification.
pub struct PracticeEngine<C: Clock> {
    clock: C,
    config: FretwiseConfig,
    framer: SampleFramer,
    estimator: PitchEstimator,
    tuner: TuningEvaluator,
    verifier: VerificationWorkflow,
    tuning_active: bool,
    /// Set while a verification session holds the physical input.
    input_claimed: bool,
}

impl<C: Clock> PracticeEngine<C> {
    /// Builds an engine from a validated configuration.
    ///
    /// `sample_rate` is the rate of the live chunk stream.
    pub fn new(
        config: FretwiseConfig,
        sample_rate: u32,
        recorder: Box<dyn ClipRecorder>,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let framer = SampleFramer::new(config.capture.window_len, sample_rate)?;
        let estimator = PitchEstimator::new(config.estimator.clone())?;
        estimator.check_window_len(config.capture.window_len, sample_rate)?;

        let preset = TuningPreset::find(&config.tuner.preset, &config.tuner.custom_presets)?;
        let mut tuner = TuningEvaluator::new(preset, config.tuner.settings.clone())?;
        if let Some(string) = &config.tuner.pinned_string {
            tuner.pin_string(string)?;
        }

        let verifier = VerificationWorkflow::new(
            config.verification.clone(),
            config.estimator.clone(),
            recorder,
        )?;
        verifier.check_window_len(sample_rate)?;

        Ok(Self {
            clock,
            config,
            framer,
            estimator,
            tuner,
            verifier,
            tuning_active: true,
            input_claimed: false,
        })
    }

    pub fn config(&self) -> &FretwiseConfig {
        &self.config
    }

    pub fn tuning_state(&self) -> &TuningState {
        self.tuner.state()
    }

    pub fn verification(&self) -> SessionSnapshot {
        self.verifier.snapshot()
    }

    pub fn is_tuning_active(&self) -> bool {
        self.tuning_active
    }

    /// Feeds one chunk of live input.
    pub fn push_chunk(&mut self, chunk: &[f32]) -> Result<Vec<EngineEvent>, ConfigError> {
        let mut events = self.poll();

        if self.verifier.is_recording() {
            self.verifier.push_chunk(chunk);
            return Ok(events);
        }
        if !self.tuning_active {
            return Ok(events);
        }

        for window in self.framer.push(chunk) {
            let estimate = self.estimator.estimate(&window)?;
            if let Some(state) = self.tuner.update(&estimate) {
                events.push(EngineEvent::Tuning(state.clone()));
            }
        }
        Ok(events)
    }

    /// Advances verification countdowns to the clock's current time.
    pub fn poll(&mut self) -> Vec<EngineEvent> {
        let transitions = self.verifier.poll(self.clock.now());
        let mut events = Vec::with_capacity(transitions.len());
        for snapshot in transitions {
            match snapshot.stage {
                Stage::Recording => self.claim_input(),
                Stage::Resolved | Stage::Failed => self.release_input(),
                _ => {}
            }
            events.push(EngineEvent::Verification(snapshot));
        }
        events
    }

    /// Starts a verification session, optionally with the label that prompted it.
    pub fn trigger_verification(
        &mut self,
        label: Option<&str>,
    ) -> Result<EngineEvent, VerificationError> {
        let snapshot = self.verifier.trigger(self.clock.now(), label)?;
        Ok(EngineEvent::Verification(snapshot))
    }

    /// Delivers a vision-classifier label for the open session.
    pub fn deliver_label(&mut self, raw: &str) -> Result<bool, VerificationError> {
        self.verifier.receive_label(raw)
    }

    /// Closes the verification session at any stage and releases the input.
    pub fn close_verification(&mut self) -> EngineEvent {
        let snapshot = self.verifier.close();
        self.release_input();
        EngineEvent::Verification(snapshot)
    }

    /// Switches the tuning preset, resetting all tuning state.
    pub fn select_preset(&mut self, name: &str) -> Result<EngineEvent, ConfigError> {
        let preset = TuningPreset::find(name, &self.config.tuner.custom_presets)?;
        self.tuner.set_preset(preset)?;
        self.framer.reset();
        self.config.tuner.preset = name.to_string();
        self.config.tuner.pinned_string = None;
        Ok(EngineEvent::Tuning(self.tuner.state().clone()))
    }

    /// Pins the string to tune, or returns to automatic selection with `None`.
    pub fn pin_string(&mut self, string: Option<&str>) -> Result<EngineEvent, ConfigError> {
        match string {
            Some(name) => self.tuner.pin_string(name)?,
            None => self.tuner.clear_pin(),
        }
        self.config.tuner.pinned_string = string.map(str::to_string);
        Ok(EngineEvent::Tuning(self.tuner.state().clone()))
    }

    /// Reports that the live input stalled or the device went away.
    ///
    /// The tuner drops to no-signal. A session still preparing or recording
    /// fails with `reason` and gives the input back.
    pub fn input_lost(&mut self, reason: &str) -> Vec<EngineEvent> {
        warn!("[ENGINE] Input lost ({reason}), tuner reset to no-signal");
        self.framer.reset();
        let mut events = vec![EngineEvent::Tuning(self.tuner.signal_lost().clone())];
        if let Some(snapshot) = self.verifier.capture_failed(reason) {
            self.release_input();
            events.push(EngineEvent::Verification(snapshot));
        }
        events
    }

    /// Restarts continuous tuning after a session left it stopped.
    pub fn resume_tuning(&mut self) {
        if !self.input_claimed && !self.tuning_active {
            info!("[ENGINE] Tuning resumed");
            self.tuning_active = true;
        }
    }

    fn claim_input(&mut self) {
        if self.tuning_active {
            debug!("[ENGINE] Tuning suspended while recording");
        }
        self.input_claimed = true;
        self.tuning_active = false;
        self.framer.reset();
    }

    fn release_input(&mut self) {
        if !std::mem::take(&mut self.input_claimed) {
            return;
        }
        match self.config.verification.resume_policy {
            ResumePolicy::Resume => {
                debug!("[ENGINE] Input released, tuning resumed");
                self.tuning_active = true;
            }
            ResumePolicy::StayStopped => debug!("[ENGINE] Input released, tuning left stopped"),
        }
    }
}
