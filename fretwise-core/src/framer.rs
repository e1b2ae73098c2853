//! # Sample Framer
//!
//! Turns an arbitrarily chunked mono sample stream into fixed-size analysis
//! windows. Live framing never overlaps; batch reframing of a whole clip may
//! overlap by using a hop smaller than the window.

use std::sync::Arc;

use crate::error::ConfigError;

/// Default analysis window for the live tuning path.
pub const DEFAULT_WINDOW_LEN: usize = 2048;

/// A fixed-length block of samples handed to the pitch estimator.
///
/// The samples are shared and never mutated after the window is emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioWindow {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accumulates incoming chunks and emits non-overlapping windows.
#[derive(Debug)]
pub struct SampleFramer {
    window_len: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
}

impl SampleFramer {
    pub fn new(window_len: usize, sample_rate: u32) -> Result<Self, ConfigError> {
        if window_len < 2 {
            return Err(ConfigError::WindowTooShort(window_len));
        }
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        Ok(Self {
            window_len,
            sample_rate,
            buffer: Vec::with_capacity(window_len * 2),
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples waiting for the next window.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a chunk and returns every window it completed, oldest first.
    pub fn push(&mut self, chunk: &[f32]) -> Vec<AudioWindow> {
        self.buffer.extend_from_slice(chunk);

        let mut windows = Vec::new();
        // While we have enough data for a full frame, emit it.
        while self.buffer.len() >= self.window_len {
            let frame: Vec<f32> = self.buffer.drain(..self.window_len).collect();
            windows.push(AudioWindow::new(frame, self.sample_rate));
        }
        windows
    }

    /// Drops any partially accumulated samples.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Splits a whole clip into possibly overlapping windows.
///
/// Windows start every `hop` samples; a trailing remainder shorter than
/// `window_len` is discarded.
pub fn reframe(
    samples: &[f32],
    sample_rate: u32,
    window_len: usize,
    hop: usize,
) -> Result<Vec<AudioWindow>, ConfigError> {
    validate_framing(window_len, hop)?;
    if samples.len() < window_len {
        return Ok(Vec::new());
    }
    Ok((0..=samples.len() - window_len)
        .step_by(hop)
        .map(|start| AudioWindow::new(&samples[start..start + window_len], sample_rate))
        .collect())
}

/// Checks a window/hop pair for batch reframing.
pub fn validate_framing(window_len: usize, hop: usize) -> Result<(), ConfigError> {
    if window_len < 2 {
        return Err(ConfigError::WindowTooShort(window_len));
    }
    if hop == 0 || hop > window_len {
        return Err(ConfigError::InvalidHop {
            window: window_len,
            hop,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaligned_chunks_produce_full_windows() {
        let mut framer = SampleFramer::new(4, 8000).unwrap();
        assert!(framer.push(&[0.0, 1.0, 2.0]).is_empty());

        let windows = framer.push(&[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(windows[1].samples(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn test_no_sample_in_two_windows() {
        let mut framer = SampleFramer::new(5, 8000).unwrap();
        let stream: Vec<f32> = (0..53).map(|i| i as f32).collect();
        let mut emitted = Vec::new();
        for chunk in stream.chunks(3) {
            for window in framer.push(chunk) {
                assert_eq!(window.len(), 5);
                emitted.extend_from_slice(window.samples());
            }
        }
        assert_eq!(emitted, stream[..50].to_vec());
        assert_eq!(framer.pending(), 3);
    }

    #[test]
    fn test_reset_discards_partial_window() {
        let mut framer = SampleFramer::new(4, 8000).unwrap();
        framer.push(&[1.0, 2.0]);
        framer.reset();
        assert_eq!(framer.pending(), 0);
        let windows = framer.push(&[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(windows[0].samples(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert!(matches!(
            SampleFramer::new(1, 44100),
            Err(ConfigError::WindowTooShort(1))
        ));
        assert!(SampleFramer::new(2048, 0).is_err());
    }

    #[test]
    fn test_reframe_with_overlap() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let windows = reframe(&samples, 8000, 4, 2).unwrap();
        let starts: Vec<f32> = windows.iter().map(|w| w.samples()[0]).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_reframe_short_clip_is_empty() {
        assert!(reframe(&[0.0; 3], 8000, 4, 2).unwrap().is_empty());
    }

    #[test]
    fn test_reframe_rejects_bad_hop() {
        assert!(reframe(&[0.0; 8], 8000, 4, 0).is_err());
        assert!(reframe(&[0.0; 8], 8000, 4, 5).is_err());
    }
}
