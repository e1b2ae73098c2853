//! End-to-end tests over synthetic guitar audio: live tuning, chord
//! verification from a WAV take, and configuration files driving the engine.

use std::f32::consts::PI;
use std::path::Path;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::tempdir;

use fretwise_core::autocorr::AutocorrelationMethod;
use fretwise_core::chord::ChordInference;
use fretwise_core::clip::{StreamRecorder, WavFileRecorder};
use fretwise_core::clock::ManualClock;
use fretwise_core::config::{FretwiseConfig, load_config, save_config};
use fretwise_core::engine::{EngineEvent, PracticeEngine};
use fretwise_core::tuner::Verdict;
use fretwise_core::tuning::note_to_frequency;
use fretwise_core::verification::{Agreement, SessionSnapshot, Stage};

const SAMPLE_RATE: u32 = 16000;

/// A plucked-string-like tone: fundamental plus two decaying overtones.
fn pluck(freq: f32, seconds: f32) -> Vec<f32> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let envelope = (-1.5 * t).exp();
            envelope
                * (0.4 * (2.0 * PI * freq * t).sin()
                    + 0.15 * (2.0 * PI * 2.0 * freq * t).sin()
                    + 0.05 * (2.0 * PI * 3.0 * freq * t).sin())
        })
        .collect()
}

fn arpeggio(notes: &[&str], seconds_per_note: f32) -> Vec<f32> {
    notes
        .iter()
        .flat_map(|name| pluck(note_to_frequency(name).unwrap(), seconds_per_note))
        .collect()
}

fn write_wav(path: &Path, samples: &[f32]) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for sample in samples {
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

fn config() -> FretwiseConfig {
    let mut config = FretwiseConfig::default();
    config.estimator.method = AutocorrelationMethod::Fft;
    config
}

fn verification_snapshots(events: Vec<EngineEvent>) -> Vec<SessionSnapshot> {
    events
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::Verification(snapshot) => Some(snapshot),
            EngineEvent::Tuning(_) => None,
        })
        .collect()
}

#[test]
fn test_tuning_a_flat_low_e() {
    let clock = ManualClock::new();
    let mut engine = PracticeEngine::new(
        config(),
        SAMPLE_RATE,
        Box::new(StreamRecorder::new(SAMPLE_RATE)),
        clock,
    )
    .unwrap();

    // Low E string about 30 cents flat.
    let flat_e = 82.41 * 2f32.powf(-30.0 / 1200.0);
    let mut states = Vec::new();
    for chunk in pluck(flat_e, 1.0).chunks(512) {
        for event in engine.push_chunk(chunk).unwrap() {
            if let EngineEvent::Tuning(state) = event {
                states.push(state);
            }
        }
    }

    let last = states.last().expect("tuning updates");
    let target = last.target_string.unwrap();
    assert_eq!(target.index, 0);
    assert_eq!(target.note.to_string(), "E2");
    assert_eq!(last.verdict, Verdict::TooLow);
    assert_abs_diff_eq!(last.cents_deviation.unwrap(), -30.0, epsilon = 5.0);
    assert_eq!(last.progress, 0);
}

#[test]
fn test_verify_chord_from_wav_take() {
    let dir = tempdir().unwrap();
    let take = dir.path().join("take.wav");
    write_wav(&take, &arpeggio(&["G2", "B2", "D3", "G3"], 0.8));

    let clock = ManualClock::new();
    let mut engine = PracticeEngine::new(
        config(),
        SAMPLE_RATE,
        Box::new(WavFileRecorder::new(&take)),
        clock.clone(),
    )
    .unwrap();

    engine.trigger_verification(None).unwrap();
    clock.advance(Duration::from_secs(2));
    assert!(engine.poll().is_empty());
    engine.deliver_label("g_major").unwrap();

    clock.advance(Duration::from_secs(2));
    let snapshots = verification_snapshots(engine.poll());
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].stage, Stage::Recording);
    assert!(!engine.is_tuning_active());

    clock.advance(Duration::from_secs(4));
    let snapshots = verification_snapshots(engine.poll());
    let resolved = &snapshots[0];
    assert_eq!(resolved.stage, Stage::Resolved);
    assert_eq!(
        resolved.inferred_chord,
        Some(ChordInference::Chord("G".into()))
    );
    assert_eq!(resolved.agreement, Some(Agreement::Agree));
    assert!(engine.is_tuning_active());

    // Labels after resolution are ignored and leave the result intact.
    assert!(!engine.deliver_label("Am").unwrap());
    assert_eq!(engine.verification().agreement, Some(Agreement::Agree));
}

#[test]
fn test_missing_take_fails_session() {
    let dir = tempdir().unwrap();
    let clock = ManualClock::new();
    let mut engine = PracticeEngine::new(
        config(),
        SAMPLE_RATE,
        Box::new(WavFileRecorder::new(dir.path().join("missing.wav"))),
        clock.clone(),
    )
    .unwrap();

    engine.trigger_verification(Some("C")).unwrap();
    clock.advance(Duration::from_secs(4));
    let snapshots = verification_snapshots(engine.poll());
    assert_eq!(snapshots[0].stage, Stage::Failed);
    assert!(snapshots[0].failure.is_some());
    assert!(engine.is_tuning_active());

    // A failed session blocks new triggers until closed.
    assert!(engine.trigger_verification(None).is_err());
    engine.close_verification();
    assert!(engine.trigger_verification(None).is_ok());
}

#[test]
fn test_engine_from_saved_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fretwise.json");

    let mut saved = config();
    saved.tuner.preset = "Drop D".into();
    saved.verification.prepare_ticks = 1;
    saved.verification.record_ticks = 2;
    saved.verification.tick_interval_ms = 500;
    save_config(&saved, &path).unwrap();

    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded, saved);

    let clock = ManualClock::new();
    let mut engine = PracticeEngine::new(
        loaded,
        SAMPLE_RATE,
        Box::new(StreamRecorder::new(SAMPLE_RATE)),
        clock.clone(),
    )
    .unwrap();

    let mut last = None;
    for chunk in pluck(73.42, 1.0).chunks(512) {
        for event in engine.push_chunk(chunk).unwrap() {
            if let EngineEvent::Tuning(state) = event {
                last = Some(state);
            }
        }
    }
    let state = last.expect("tuning updates");
    assert_eq!(state.target_string.unwrap().note.to_string(), "D2");
    assert_eq!(state.verdict, Verdict::InTune);

    engine.trigger_verification(None).unwrap();
    clock.advance(Duration::from_millis(500));
    let snapshots = verification_snapshots(engine.poll());
    assert_eq!(snapshots[0].stage, Stage::Recording);

    // Silence goes to the recorder, not the tuner.
    let events = engine.push_chunk(&vec![0.0; SAMPLE_RATE as usize]).unwrap();
    assert!(events.is_empty());
    clock.advance(Duration::from_millis(1000));
    let snapshots = verification_snapshots(engine.poll());
    assert_eq!(snapshots[0].stage, Stage::Resolved);
    assert_eq!(snapshots[0].inferred_chord, Some(ChordInference::NoEvidence));
    assert_eq!(snapshots[0].agreement, Some(Agreement::Unavailable));
}
