//! Live sessions driven by the microphone and stdin commands.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use std::io::BufRead;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use fretwise_core::audio::{self, CaptureMessage, TARGET_SAMPLE_RATE};
use fretwise_core::clip::{ClipRecorder, StreamRecorder, WavFileRecorder};
use fretwise_core::clock::SystemClock;
use fretwise_core::config::FretwiseConfig;
use fretwise_core::engine::{EngineEvent, PracticeEngine};
use fretwise_core::verification::Stage;

use crate::commands::print_event;

/// How often countdowns are polled when no audio arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Input without a chunk for this long counts as lost.
const INPUT_TIMEOUT: Duration = Duration::from_secs(2);

/// User commands read from stdin.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Verify(Option<String>),
    Label(String),
    Close,
    Preset(String),
    Pin(Option<String>),
    Resume,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, Some(arg.trim().to_string())),
            None => (line, None),
        };
        match (verb, arg) {
            ("v" | "verify", label) => Some(Command::Verify(label)),
            ("l" | "label", Some(label)) => Some(Command::Label(label)),
            ("c" | "close", None) => Some(Command::Close),
            ("p" | "preset", Some(name)) => Some(Command::Preset(name)),
            ("s" | "string", Some(name)) if name == "auto" => Some(Command::Pin(None)),
            ("s" | "string", Some(name)) => Some(Command::Pin(Some(name))),
            ("r" | "resume", None) => Some(Command::Resume),
            ("q" | "quit", None) => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Continuous tuning with interactive verification until `q` or end of input.
pub fn run_tuner(
    mut config: FretwiseConfig,
    preset: Option<&str>,
    string: Option<&str>,
    json: bool,
) -> Result<()> {
    if let Some(preset) = preset {
        config.tuner.preset = preset.to_string();
        config.tuner.pinned_string = None;
    }
    if let Some(string) = string {
        config.tuner.pinned_string = Some(string.to_string());
    }

    let (capture_tx, capture_rx) = crossbeam_channel::unbounded();
    let (stream, sample_rate) = audio::start_audio_capture(capture_tx)?;
    let recorder = Box::new(StreamRecorder::new(sample_rate));
    let mut engine = PracticeEngine::new(config, sample_rate, recorder, SystemClock::new())?;
    info!(
        "[MAIN] Tuning to {} (type q to quit)",
        engine.config().tuner.preset
    );

    let commands = spawn_stdin_reader();
    run_loop(&mut engine, Some(&capture_rx), &commands, json, false)?;

    drop(stream);
    info!("[MAIN] Audio stream stopped");
    Ok(())
}

/// Runs a single verification session, from the microphone or a WAV file.
pub fn run_verification(
    config: FretwiseConfig,
    label: Option<&str>,
    clip: Option<&Path>,
    json: bool,
) -> Result<()> {
    let (capture_tx, capture_rx) = crossbeam_channel::unbounded();
    let (stream, sample_rate, recorder) = match clip {
        Some(path) => {
            info!("[MAIN] Verifying take from {}", path.display());
            let recorder: Box<dyn ClipRecorder> = Box::new(WavFileRecorder::new(path));
            (None, TARGET_SAMPLE_RATE, recorder)
        }
        None => {
            let (stream, rate) = audio::start_audio_capture(capture_tx)?;
            let recorder: Box<dyn ClipRecorder> = Box::new(StreamRecorder::new(rate));
            (Some(stream), rate, recorder)
        }
    };

    let mut engine = PracticeEngine::new(config, sample_rate, recorder, SystemClock::new())?;
    let triggered = engine
        .trigger_verification(label)
        .map_err(|e| anyhow!("could not start verification: {e}"))?;
    print_event(&triggered, json)?;

    let commands = spawn_stdin_reader();
    let live_input = stream.as_ref().map(|_| &capture_rx);
    run_loop(&mut engine, live_input, &commands, json, true)?;

    drop(stream);
    Ok(())
}

/// Reads stdin on a helper thread. The channel disconnects at end of input.
fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || read_commands(&tx));
    rx
}

fn read_commands(tx: &Sender<Command>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match Command::parse(&line) {
            Some(command) => {
                let quit = command == Command::Quit;
                if tx.send(command).is_err() || quit {
                    return;
                }
            }
            None => warn!("[INPUT] Unrecognized command: {}", line.trim()),
        }
    }
}

/// Feeds chunks, commands and clock polls to the engine until told to stop.
///
/// Without `capture_rx` only commands and clock polls drive the engine. With
/// `until_resolved` the loop ends when the session resolves or fails, and end
/// of stdin no longer stops it.
fn run_loop(
    engine: &mut PracticeEngine<SystemClock>,
    capture_rx: Option<&Receiver<CaptureMessage>>,
    commands: &Receiver<Command>,
    json: bool,
    until_resolved: bool,
) -> Result<()> {
    let watch_input = capture_rx.is_some();
    let never = crossbeam_channel::never();
    let capture_rx = capture_rx.unwrap_or(&never);
    let no_commands = crossbeam_channel::never();
    let mut stdin_open = true;
    let mut since_last_chunk = Duration::ZERO;
    let mut input_lost = false;

    loop {
        let command_rx = if stdin_open { commands } else { &no_commands };
        let events = crossbeam_channel::select! {
            recv(capture_rx) -> msg => match msg {
                Ok(CaptureMessage::Chunk(chunk)) => {
                    since_last_chunk = Duration::ZERO;
                    input_lost = false;
                    engine.push_chunk(&chunk)?
                }
                Ok(CaptureMessage::Error(reason)) => {
                    error!("[AUDIO] Input failed: {}", reason);
                    input_lost = true;
                    engine.input_lost(&reason)
                }
                Err(_) => {
                    for event in engine.input_lost("capture stream closed") {
                        print_event(&event, json)?;
                    }
                    return Err(anyhow!("audio capture ended"));
                }
            },
            recv(command_rx) -> msg => match msg {
                Err(_) if until_resolved => {
                    stdin_open = false;
                    Vec::new()
                }
                Ok(Command::Quit) | Err(_) => {
                    if until_resolved {
                        print_event(&engine.close_verification(), json)?;
                    }
                    return Ok(());
                }
                Ok(command) => apply(engine, command),
            },
            default(POLL_INTERVAL) => {
                since_last_chunk += POLL_INTERVAL;
                let mut events = engine.poll();
                if watch_input && since_last_chunk >= INPUT_TIMEOUT && !input_lost {
                    input_lost = true;
                    events.extend(engine.input_lost("no audio for 2 s"));
                }
                events
            },
        };

        let mut finished = false;
        for event in &events {
            print_event(event, json)?;
            if let EngineEvent::Verification(snapshot) = event {
                finished |= matches!(snapshot.stage, Stage::Resolved | Stage::Failed);
            }
        }
        if until_resolved && finished {
            return Ok(());
        }
    }
}

fn apply(engine: &mut PracticeEngine<SystemClock>, command: Command) -> Vec<EngineEvent> {
    let outcome = match command {
        Command::Verify(label) => engine
            .trigger_verification(label.as_deref())
            .map_err(|e| e.to_string()),
        Command::Label(label) => match engine.deliver_label(&label) {
            Ok(true) => return Vec::new(),
            Ok(false) => {
                info!("[INPUT] Session already finished, label ignored");
                return Vec::new();
            }
            Err(e) => Err(e.to_string()),
        },
        Command::Close => Ok(engine.close_verification()),
        Command::Preset(name) => engine.select_preset(&name).map_err(|e| e.to_string()),
        Command::Pin(string) => engine.pin_string(string.as_deref()).map_err(|e| e.to_string()),
        Command::Resume => {
            engine.resume_tuning();
            return Vec::new();
        }
        Command::Quit => return Vec::new(),
    };
    match outcome {
        Ok(event) => vec![event],
        Err(reason) => {
            warn!("[INPUT] {}", reason);
            Vec::new()
        }
    }
}
