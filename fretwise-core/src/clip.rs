//! # Recorded Clips
//!
//! The verification workflow records a whole clip before analysing it. A clip
//! either arrives as raw PCM or as encoded WAV bytes, and is decoded into a
//! flat mono sample sequence once recording ends.

use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use std::path::PathBuf;
use tracing::debug;

use crate::error::CaptureError;

/// A finished recording as handed over by the capture collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedClip {
    /// Mono f32 samples.
    Pcm { samples: Vec<f32>, sample_rate: u32 },
    /// A complete WAV file in memory.
    Wav(Vec<u8>),
}

/// A decoded, mono clip ready for reframing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RecordedClip {
    /// Decodes the clip into mono f32 samples.
    ///
    /// Multichannel WAV data is averaged down to mono and integer formats are
    /// scaled to [-1, 1].
    pub fn decode(self) -> Result<DecodedClip, CaptureError> {
        let decoded = match self {
            RecordedClip::Pcm {
                samples,
                sample_rate,
            } => DecodedClip {
                samples,
                sample_rate,
            },
            RecordedClip::Wav(bytes) => decode_wav(&bytes)?,
        };
        if decoded.sample_rate == 0 {
            return Err(CaptureError::Decode("sample rate is zero".into()));
        }
        if decoded.samples.is_empty() {
            return Err(CaptureError::EmptyClip);
        }
        Ok(decoded)
    }
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedClip, CaptureError> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    debug!(
        "[CLIP] Decoded WAV: {} Hz, {} channel(s), {} samples",
        spec.sample_rate,
        channels,
        samples.len()
    );

    Ok(DecodedClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Capture collaborator for the verification workflow.
///
/// `start` claims the input, `finish` releases it and returns the clip,
/// `abort` releases it and discards whatever was captured.
pub trait ClipRecorder {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Offers a live chunk of input. Recorders that capture on their own ignore it.
    fn push(&mut self, _chunk: &[f32]) {}

    fn finish(&mut self) -> Result<RecordedClip, CaptureError>;

    fn abort(&mut self);

    /// Whether the recorder currently holds the input.
    fn is_recording(&self) -> bool;
}

/// Records the chunks the engine routes to it while armed.
#[derive(Debug)]
pub struct StreamRecorder {
    sample_rate: u32,
    buffer: Vec<f32>,
    armed: bool,
}

impl StreamRecorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            buffer: Vec::new(),
            armed: false,
        }
    }

    pub fn captured(&self) -> usize {
        self.buffer.len()
    }
}

impl ClipRecorder for StreamRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.buffer.clear();
        self.armed = true;
        Ok(())
    }

    fn push(&mut self, chunk: &[f32]) {
        if self.armed {
            self.buffer.extend_from_slice(chunk);
        }
    }

    fn finish(&mut self) -> Result<RecordedClip, CaptureError> {
        if !self.armed {
            return Err(CaptureError::NotStarted);
        }
        self.armed = false;
        Ok(RecordedClip::Pcm {
            samples: std::mem::take(&mut self.buffer),
            sample_rate: self.sample_rate,
        })
    }

    fn abort(&mut self) {
        self.armed = false;
        self.buffer.clear();
    }

    fn is_recording(&self) -> bool {
        self.armed
    }
}

/// Plays the role of a recorder by reading a WAV file when recording ends.
///
/// Used to verify chords from pre-recorded takes.
#[derive(Debug)]
pub struct WavFileRecorder {
    path: PathBuf,
    started: bool,
}

impl WavFileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started: false,
        }
    }
}

impl ClipRecorder for WavFileRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        if !self.path.exists() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        self.started = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<RecordedClip, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted);
        }
        self.started = false;
        let bytes = std::fs::read(&self.path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(RecordedClip::Wav(bytes))
    }

    fn abort(&mut self) {
        self.started = false;
    }

    fn is_recording(&self) -> bool {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(spec: WavSpec, write: impl FnOnce(&mut WavWriter<&mut Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_int16_stereo_downmix() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, |w| {
            for _ in 0..4 {
                w.write_sample(16384_i16).unwrap();
                w.write_sample(0_i16).unwrap();
            }
        });
        let clip = RecordedClip::Wav(bytes).decode().unwrap();
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.samples.len(), 4);
        assert_abs_diff_eq!(clip.samples[0], 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_decode_float_mono() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, |w| {
            for s in [0.5_f32, -0.5, 0.25] {
                w.write_sample(s).unwrap();
            }
        });
        let clip = RecordedClip::Wav(bytes).decode().unwrap();
        assert_eq!(clip.samples, vec![0.5, -0.5, 0.25]);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = RecordedClip::Wav(b"definitely not a wav".to_vec()).decode();
        assert!(matches!(result, Err(CaptureError::Decode(_))));
    }

    #[test]
    fn test_empty_pcm_clip_rejected() {
        let clip = RecordedClip::Pcm {
            samples: vec![],
            sample_rate: 44100,
        };
        assert_eq!(clip.decode(), Err(CaptureError::EmptyClip));
    }

    #[test]
    fn test_stream_recorder_only_captures_while_armed() {
        let mut recorder = StreamRecorder::new(8000);
        recorder.push(&[1.0, 2.0]);
        assert_eq!(recorder.captured(), 0);
        assert_eq!(recorder.finish(), Err(CaptureError::NotStarted));

        recorder.start().unwrap();
        recorder.push(&[1.0, 2.0]);
        recorder.push(&[3.0]);
        let clip = recorder.finish().unwrap();
        assert_eq!(
            clip,
            RecordedClip::Pcm {
                samples: vec![1.0, 2.0, 3.0],
                sample_rate: 8000
            }
        );
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_stream_recorder_abort_discards() {
        let mut recorder = StreamRecorder::new(8000);
        recorder.start().unwrap();
        recorder.push(&[1.0; 16]);
        recorder.abort();
        assert_eq!(recorder.captured(), 0);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_wav_file_recorder_missing_file() {
        let mut recorder = WavFileRecorder::new("/nonexistent/take.wav");
        assert!(matches!(
            recorder.start(),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }
}
