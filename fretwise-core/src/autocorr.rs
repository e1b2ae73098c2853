//! # Autocorrelation Module
//!
//! Computes the normalized autocorrelation curve used by the pitch estimator.
//! Two interchangeable methods produce the same curve:
//! - `Direct`: the plain O(n²) lag-by-lag sum
//! - `Fft`: Wiener–Khinchin via RustFFT, O(n log n)
//!
//! For each lag the raw product sum over the valid overlap is divided by the
//! geometric mean of the energies of the two overlapping segments. The overlap
//! length cancels out of that ratio, and the result always lies in [-1, 1].

use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};

/// How the raw lag products are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutocorrelationMethod {
    #[default]
    Direct,
    Fft,
}

/// Energies smaller than this are treated as silence for a given lag.
const MIN_ENERGY: f64 = 1e-12;

/// Returns the normalized autocorrelation for lags `0..=max_lag`.
///
/// `max_lag` is clamped to `signal.len() - 1`.
pub fn normalized_autocorrelation(
    signal: &[f32],
    max_lag: usize,
    method: AutocorrelationMethod,
) -> Vec<f32> {
    if signal.is_empty() {
        return Vec::new();
    }
    let max_lag = max_lag.min(signal.len() - 1);
    let raw = match method {
        AutocorrelationMethod::Direct => raw_direct(signal, max_lag),
        AutocorrelationMethod::Fft => raw_fft(signal, max_lag),
    };
    normalize(signal, &raw)
}

/// Unnormalized lag products `Σ x[i]·x[i+lag]`, computed directly.
fn raw_direct(signal: &[f32], max_lag: usize) -> Vec<f64> {
    let n = signal.len();
    (0..=max_lag)
        .map(|lag| {
            signal[..n - lag]
                .iter()
                .zip(&signal[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum()
        })
        .collect()
}

/// Unnormalized lag products via a zero-padded forward/inverse FFT.
fn raw_fft(signal: &[f32], max_lag: usize) -> Vec<f64> {
    let n = signal.len();
    // Pad to at least 2n so the circular correlation does not wrap.
    let fft_len = (2 * n).next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&sample| Complex { re: sample, im: 0.0 })
        .chain(std::iter::repeat(Complex { re: 0.0, im: 0.0 }))
        .take(fft_len)
        .collect();

    forward.process(&mut buffer);
    for bin in buffer.iter_mut() {
        *bin = Complex {
            re: bin.norm_sqr(),
            im: 0.0,
        };
    }
    inverse.process(&mut buffer);

    // RustFFT does not scale the inverse transform.
    let scale = fft_len as f64;
    buffer
        .iter()
        .take(max_lag + 1)
        .map(|c| c.re as f64 / scale)
        .collect()
}

/// Divides each raw lag product by the energies of its two overlapping segments.
fn normalize(signal: &[f32], raw: &[f64]) -> Vec<f32> {
    let n = signal.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0_f64);
    for &sample in signal {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + sample as f64 * sample as f64);
    }
    let total = prefix[n];

    raw.iter()
        .enumerate()
        .map(|(lag, &sum)| {
            let head = prefix[n - lag];
            let tail = total - prefix[lag];
            let denom = (head * tail).sqrt();
            if denom < MIN_ENERGY {
                0.0
            } else {
                (sum / denom).clamp(-1.0, 1.0) as f32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_zero_lag_is_one() {
        let signal = sine(220.0, 44100.0, 1024);
        let curve = normalized_autocorrelation(&signal, 10, AutocorrelationMethod::Direct);
        assert_abs_diff_eq!(curve[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_period_lag_is_near_one() {
        // 441 Hz at 44.1 kHz has a period of exactly 100 samples.
        let signal = sine(441.0, 44100.0, 2048);
        let curve = normalized_autocorrelation(&signal, 150, AutocorrelationMethod::Direct);
        assert!(curve[100] > 0.999);
        assert!(curve[50] < -0.99);
    }

    #[test]
    fn test_fft_matches_direct() {
        let signal: Vec<f32> = sine(196.0, 44100.0, 2048)
            .iter()
            .zip(sine(392.0, 44100.0, 2048))
            .map(|(a, b)| a + 0.3 * b)
            .collect();
        let direct = normalized_autocorrelation(&signal, 900, AutocorrelationMethod::Direct);
        let fft = normalized_autocorrelation(&signal, 900, AutocorrelationMethod::Fft);
        assert_eq!(direct.len(), fft.len());
        for (a, b) in direct.iter().zip(&fft) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_silence_gives_zero_curve() {
        let curve = normalized_autocorrelation(&[0.0; 64], 32, AutocorrelationMethod::Fft);
        assert!(curve.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_max_lag_clamped() {
        let curve = normalized_autocorrelation(&[1.0, -1.0, 1.0], 10, AutocorrelationMethod::Direct);
        assert_eq!(curve.len(), 3);
    }
}
