//! # Pitch Detection Module
//!
//! Time-domain pitch estimation based on normalized autocorrelation, tuned for
//! plucked guitar strings.
//!
//! ## Features
//! - RMS noise gate to reject silence
//! - Quality threshold and rising-slope condition to reject the trivial zero-lag peak
//! - Octave-safe peak selection that prefers the shortest strong period
//! - Parabolic interpolation for sub-sample accuracy
//! - Configurable acceptance band

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::autocorr::{self, AutocorrelationMethod};
use crate::error::ConfigError;
use crate::framer::AudioWindow;

/// An inclusive frequency range in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl FrequencyBand {
    pub const fn new(min_hz: f32, max_hz: f32) -> Self {
        Self { min_hz, max_hz }
    }

    /// True if `freq` lies within the band, endpoints included.
    pub fn contains(&self, freq: f32) -> bool {
        freq >= self.min_hz && freq <= self.max_hz
    }

    /// True if `freq` lies strictly inside the band.
    pub fn contains_strict(&self, freq: f32) -> bool {
        freq > self.min_hz && freq < self.max_hz
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_hz > 0.0 && self.max_hz > self.min_hz && self.max_hz.is_finite()) {
            return Err(ConfigError::InvalidBand {
                min_hz: self.min_hz,
                max_hz: self.max_hz,
            });
        }
        Ok(())
    }
}

impl Default for FrequencyBand {
    /// 50-1200 Hz covers every guitar string plus the lower fretted range.
    fn default() -> Self {
        Self::new(50.0, 1200.0)
    }
}

/// Thresholds and options for [`PitchEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Windows with an RMS below this are silence.
    pub silence_rms: f32,
    /// Minimum normalized correlation a peak must reach.
    pub quality_threshold: f32,
    /// Estimates outside this band are discarded.
    pub band: FrequencyBand,
    pub method: AutocorrelationMethod,
    /// A shorter period wins over the global best if it is within this margin.
    pub peak_tolerance: f32,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            silence_rms: 0.005,
            quality_threshold: 0.8,
            band: FrequencyBand::default(),
            method: AutocorrelationMethod::Direct,
            peak_tolerance: 0.02,
        }
    }
}

impl EstimatorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.band.validate()?;
        if !(0.0..1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::InvalidSetting {
                name: "quality_threshold",
                reason: format!("{} is outside [0, 1)", self.quality_threshold),
            });
        }
        if self.silence_rms < 0.0 || !self.silence_rms.is_finite() {
            return Err(ConfigError::InvalidSetting {
                name: "silence_rms",
                reason: format!("{} is not a non-negative level", self.silence_rms),
            });
        }
        if !(0.0..1.0).contains(&self.peak_tolerance) {
            return Err(ConfigError::InvalidSetting {
                name: "peak_tolerance",
                reason: format!("{} is outside [0, 1)", self.peak_tolerance),
            });
        }
        Ok(())
    }
}

/// Result of analysing one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz, `None` when no reliable pitch was found.
    pub frequency: Option<f32>,
    /// Normalized correlation of the best period, in [0, 1].
    pub clarity: f32,
}

impl PitchEstimate {
    pub fn none() -> Self {
        Self {
            frequency: None,
            clarity: 0.0,
        }
    }

    pub fn is_pitched(&self) -> bool {
        self.frequency.is_some()
    }
}

/// Normalized-autocorrelation pitch estimator.
#[derive(Debug, Clone)]
pub struct PitchEstimator {
    settings: EstimatorSettings,
}

impl PitchEstimator {
    pub fn new(settings: EstimatorSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    /// Estimates the fundamental of one analysis window.
    pub fn estimate(&self, window: &AudioWindow) -> Result<PitchEstimate, ConfigError> {
        self.estimate_samples(window.samples(), window.sample_rate())
    }

    /// Estimates the fundamental of a raw sample slice.
    ///
    /// # Returns
    /// * `Ok(estimate)` - `estimate.frequency` is `None` for silence, noise or out-of-band pitch
    /// * `Err(ConfigError)` - Fewer than 2 samples or a zero sample rate
    pub fn estimate_samples(
        &self,
        signal: &[f32],
        sample_rate: u32,
    ) -> Result<PitchEstimate, ConfigError> {
        let frame_size = signal.len();
        if frame_size < 2 {
            return Err(ConfigError::WindowTooShort(frame_size));
        }
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }

        // --- Noise Gate: Calculate RMS to filter out silence/noise ---
        let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
        if rms < self.settings.silence_rms {
            return Ok(PitchEstimate::none());
        }

        // Search just past the longest period the band admits, keeping at
        // least a quarter of the window in the overlap.
        let max_lag = (self.longest_period(sample_rate) + 1).min(max_lag_for(frame_size));
        let curve = autocorr::normalized_autocorrelation(signal, max_lag, self.settings.method);

        // --- Candidate lags: strong correlation on a rising slope ---
        let candidates: Vec<(usize, f32)> = (1..curve.len())
            .filter(|&lag| {
                curve[lag] > self.settings.quality_threshold && curve[lag] > curve[lag - 1]
            })
            .map(|lag| (lag, curve[lag]))
            .collect();

        let Some(best) = candidates
            .iter()
            .map(|&(_, corr)| corr)
            .max_by(|a, b| a.total_cmp(b))
        else {
            return Ok(PitchEstimate::none());
        };

        // The shortest lag close to the best one avoids picking a period multiple.
        let chosen = candidates
            .iter()
            .find(|&&(_, corr)| corr >= best - self.settings.peak_tolerance)
            .map(|&(lag, _)| lag)
            .unwrap_or(1);

        // Climb to the top of that peak.
        let mut peak = chosen;
        while peak + 1 < curve.len() && curve[peak + 1] > curve[peak] {
            peak += 1;
        }

        let clarity = curve[peak].clamp(0.0, 1.0);

        // Still rising at the last computed lag: the true period lies beyond
        // what this window can resolve.
        if peak + 1 >= curve.len() {
            trace!(
                "[PITCH] peak at boundary lag {} of a {}-sample window",
                peak, frame_size
            );
            return Ok(PitchEstimate {
                frequency: None,
                clarity,
            });
        }

        let period = refine_period(&curve, peak);
        let frequency = sample_rate as f32 / period;

        trace!(
            "[PITCH] lag={} period={:.2} freq={:.2} clarity={:.3}",
            peak, period, frequency, clarity
        );

        if frequency.is_finite() && self.settings.band.contains(frequency) {
            Ok(PitchEstimate {
                frequency: Some(frequency),
                clarity,
            })
        } else {
            Ok(PitchEstimate {
                frequency: None,
                clarity,
            })
        }
    }
}

impl PitchEstimator {
    /// Period in samples of the lowest frequency the band admits.
    fn longest_period(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 / self.settings.band.min_hz).ceil() as usize
    }

    /// Shortest window that can resolve the lowest in-band frequency.
    pub fn min_window_len(&self, sample_rate: u32) -> usize {
        ((self.longest_period(sample_rate) + 1) * 4).div_ceil(3)
    }

    /// Rejects a window length too short to reach the bottom of the band.
    ///
    /// # Returns
    /// * `Ok(())` - Every in-band period has a full peak inside the window
    /// * `Err(ConfigError::InvalidSetting)` - The window is too short for `band.min_hz`
    pub fn check_window_len(&self, window_len: usize, sample_rate: u32) -> Result<(), ConfigError> {
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        let needed = self.min_window_len(sample_rate);
        if window_len < needed {
            return Err(ConfigError::InvalidSetting {
                name: "window_len",
                reason: format!(
                    "{} samples cannot resolve {} Hz at {} Hz; at least {} needed",
                    window_len, self.settings.band.min_hz, sample_rate, needed
                ),
            });
        }
        Ok(())
    }
}

/// Longest lag whose overlap still spans a quarter of the window.
fn max_lag_for(frame_size: usize) -> usize {
    (frame_size * 3 / 4).max(1)
}

/// Parabolic interpolation of the peak position for sub-sample precision.
fn refine_period(curve: &[f32], peak: usize) -> f32 {
    if peak == 0 || peak + 1 >= curve.len() {
        return peak as f32;
    }
    let y1 = curve[peak - 1];
    let y2 = curve[peak];
    let y3 = curve[peak + 1];
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-9 {
        return peak as f32;
    }
    let shift = (0.5 * (y1 - y3) / denominator).clamp(-0.5, 0.5);
    peak as f32 + shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 44100;

    /// A sine with the given RMS level.
    fn tone(freq: f32, rms: f32, len: usize) -> Vec<f32> {
        let amplitude = rms * 2.0_f32.sqrt();
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn estimator() -> PitchEstimator {
        PitchEstimator::new(EstimatorSettings::default()).unwrap()
    }

    #[test]
    fn test_pure_tones_within_one_percent() {
        let estimator = estimator();
        for freq in [80.0, 82.41, 110.0, 146.83, 196.0, 246.94, 329.63, 440.0, 660.0, 880.0, 1000.0] {
            let signal = tone(freq, 0.1, 2048);
            let estimate = estimator.estimate_samples(&signal, SAMPLE_RATE).unwrap();
            let detected = estimate
                .frequency
                .unwrap_or_else(|| panic!("no pitch for {freq} Hz"));
            let error = (detected - freq).abs() / freq;
            assert!(error < 0.01, "{freq} Hz detected as {detected} Hz");
            assert!(estimate.clarity > 0.8 && estimate.clarity <= 1.0);
        }
    }

    #[test]
    fn test_fft_method_agrees() {
        let settings = EstimatorSettings {
            method: AutocorrelationMethod::Fft,
            ..Default::default()
        };
        let estimator = PitchEstimator::new(settings).unwrap();
        let signal = tone(196.0, 0.2, 4096);
        let detected = estimator
            .estimate_samples(&signal, SAMPLE_RATE)
            .unwrap()
            .frequency
            .unwrap();
        assert!((detected - 196.0).abs() < 1.96);
    }

    #[test]
    fn test_silence_yields_none() {
        let estimate = estimator().estimate_samples(&[0.0; 2048], SAMPLE_RATE).unwrap();
        assert_eq!(estimate, PitchEstimate::none());
    }

    #[test]
    fn test_quiet_signal_below_gate() {
        let signal = tone(220.0, 0.001, 2048);
        let estimate = estimator().estimate_samples(&signal, SAMPLE_RATE).unwrap();
        assert!(estimate.frequency.is_none());
    }

    #[test]
    fn test_out_of_band_rejected() {
        let settings = EstimatorSettings {
            band: FrequencyBand::new(50.0, 350.0),
            ..Default::default()
        };
        let estimator = PitchEstimator::new(settings).unwrap();
        let signal = tone(440.0, 0.2, 2048);
        assert!(estimator.estimate_samples(&signal, SAMPLE_RATE).unwrap().frequency.is_none());
    }

    #[test]
    fn test_harmonic_rich_tone_keeps_fundamental() {
        let freq = 110.0;
        let signal: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                0.3 * (2.0 * PI * freq * t).sin()
                    + 0.2 * (2.0 * PI * 2.0 * freq * t).sin()
                    + 0.1 * (2.0 * PI * 3.0 * freq * t).sin()
            })
            .collect();
        let detected = estimator()
            .estimate_samples(&signal, SAMPLE_RATE)
            .unwrap()
            .frequency
            .unwrap();
        assert!((detected - freq).abs() / freq < 0.01, "detected {detected}");
    }

    #[test]
    fn test_low_e_in_short_window() {
        let estimate = estimator()
            .estimate_samples(&tone(82.41, 0.1, 1024), SAMPLE_RATE)
            .unwrap();
        let detected = estimate.frequency.expect("82.41 Hz fits a 1024-sample window");
        assert!((detected - 82.41).abs() / 82.41 < 0.01, "detected {detected}");
    }

    #[test]
    fn test_period_longer_than_window_is_not_reported() {
        // A 512-sample window holds less than one period of 82.41 Hz.
        let estimate = estimator()
            .estimate_samples(&tone(82.41, 0.1, 512), SAMPLE_RATE)
            .unwrap();
        assert!(estimate.frequency.is_none(), "got {:?}", estimate);
    }

    #[test]
    fn test_clarity_describes_returned_period() {
        let freq = 110.0;
        let signal: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                0.3 * (2.0 * PI * freq * t).sin() + 0.1 * (2.0 * PI * 2.0 * freq * t).sin()
            })
            .collect();
        let estimate = estimator().estimate_samples(&signal, SAMPLE_RATE).unwrap();
        let detected = estimate.frequency.unwrap();

        let curve = autocorr::normalized_autocorrelation(
            &signal,
            2047,
            AutocorrelationMethod::Direct,
        );
        let lag = (SAMPLE_RATE as f32 / detected).round() as usize;
        let at_peak = curve[lag - 1..=lag + 1].iter().cloned().fold(f32::MIN, f32::max);
        assert!((estimate.clarity - at_peak).abs() < 1e-4);
    }

    #[test]
    fn test_window_length_check() {
        let estimator = estimator();
        // 44100 / 50 Hz = 882 samples per period, searched up to lag 883.
        assert_eq!(estimator.min_window_len(SAMPLE_RATE), 1178);
        assert!(estimator.check_window_len(2048, SAMPLE_RATE).is_ok());
        assert!(matches!(
            estimator.check_window_len(1024, SAMPLE_RATE),
            Err(ConfigError::InvalidSetting { name: "window_len", .. })
        ));
        assert!(estimator.check_window_len(512, 8000).is_ok());
    }

    #[test]
    fn test_short_window_rejected() {
        assert!(matches!(
            estimator().estimate_samples(&[0.5], SAMPLE_RATE),
            Err(ConfigError::WindowTooShort(1))
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = EstimatorSettings {
            band: FrequencyBand::new(300.0, 100.0),
            ..Default::default()
        };
        assert!(PitchEstimator::new(settings).is_err());
    }
}
