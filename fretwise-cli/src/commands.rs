//! One-shot subcommands and event rendering.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use fretwise_core::chord::{self, ChordInference};
use fretwise_core::clip::{RecordedClip, WavFileRecorder};
use fretwise_core::config::{FretwiseConfig, save_config};
use fretwise_core::engine::EngineEvent;
use fretwise_core::tuner::{TuningState, Verdict};
use fretwise_core::tuning::{Note, PitchClass, TuningPreset};
use fretwise_core::verification::{Agreement, ExternalLabel, SessionSnapshot, VerificationWorkflow};

/// Result of analyzing a recorded take.
#[derive(Debug, Serialize)]
struct ClipReport {
    sample_rate: u32,
    duration_secs: f32,
    notes: Vec<Note>,
    evidence: Vec<PitchClass>,
    chord: ChordInference,
}

/// Decodes a WAV file and infers the chord played in it.
pub fn analyze(config: &FretwiseConfig, path: &Path, json: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let clip = RecordedClip::Wav(bytes).decode()?;

    let workflow = VerificationWorkflow::new(
        config.verification.clone(),
        config.estimator.clone(),
        Box::new(WavFileRecorder::new(path)),
    )?;
    let histogram = workflow.analyze(&clip)?;
    let evidence = histogram.top_pitch_classes();
    let inferred = chord::infer_chord(
        &evidence,
        chord::chord_library(),
        config.verification.min_partial_matches,
    );

    let report = ClipReport {
        sample_rate: clip.sample_rate,
        duration_secs: clip.samples.len() as f32 / clip.sample_rate as f32,
        notes: histogram.notes().to_vec(),
        evidence,
        chord: inferred,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {:.1} s at {} Hz, {} pitched windows",
            path.display(),
            report.duration_secs,
            report.sample_rate,
            report.notes.len()
        );
        println!("Evidence: {}", join(&report.evidence));
        println!("Chord:    {}", report.chord);
    }
    Ok(())
}

/// Prints custom presets from the configuration followed by the built-ins.
pub fn list_presets(config: &FretwiseConfig) -> Result<()> {
    let mut presets = Vec::new();
    for def in &config.tuner.custom_presets {
        presets.push(TuningPreset::new(&def.name, &def.strings)?);
    }
    presets.extend(TuningPreset::builtin()?);

    for preset in presets {
        let marker = if preset.name == config.tuner.preset { "*" } else { " " };
        println!("{marker} {:<16} {}", preset.name, join(&preset.strings));
    }
    Ok(())
}

pub fn write_config(config: &FretwiseConfig, path: &Path) -> Result<()> {
    save_config(config, path)?;
    info!("[MAIN] Configuration written to {}", path.display());
    Ok(())
}

/// Prints one engine event, either as a JSON line or as a human-readable line.
pub fn print_event(event: &EngineEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        EngineEvent::Tuning(state) => println!("{}", describe_tuning(state)),
        EngineEvent::Verification(snapshot) => println!("{}", describe_session(snapshot)),
    }
    Ok(())
}

fn describe_tuning(state: &TuningState) -> String {
    let (Some(freq), Some(target), Some(cents)) = (
        state.smoothed_frequency,
        state.target_string,
        state.cents_deviation,
    ) else {
        return "-- no signal --".to_string();
    };
    let arrow = match state.verdict {
        Verdict::InTune => "in tune",
        Verdict::TooLow => "tune up",
        Verdict::TooHigh => "tune down",
        Verdict::NoSignal => "no signal",
    };
    let heard = state
        .detected_note
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".into());
    format!(
        "{freq:7.2} Hz  heard {heard:<4} string {} ({})  {cents:+6.1} cents  {arrow}  [{} done]",
        target.index + 1,
        target.note,
        state.progress
    )
}

fn describe_session(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[{}]", snapshot.stage.name());
    if snapshot.countdown > 0 {
        line.push_str(&format!(" {} ticks left", snapshot.countdown));
    }
    if let Some(chord) = &snapshot.inferred_chord {
        line.push_str(&format!(" heard {chord}"));
        if !snapshot.evidence.is_empty() {
            line.push_str(&format!(" ({})", join(&snapshot.evidence)));
        }
    }
    match &snapshot.external_label {
        ExternalLabel::Pending => {}
        ExternalLabel::NoChord { raw } => line.push_str(&format!(", vision saw {raw:?}")),
        ExternalLabel::Chord { chord, .. } => line.push_str(&format!(", vision saw {chord}")),
    }
    match snapshot.agreement {
        Some(Agreement::Agree) => line.push_str(": match"),
        Some(Agreement::Disagree) => line.push_str(": mismatch"),
        Some(Agreement::Unavailable) => line.push_str(": no vision label"),
        None => {}
    }
    if let Some(reason) = &snapshot.failure {
        line.push_str(&format!(": {reason}"));
    }
    line
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
