//! # Audio Capture Module
//!
//! Live microphone capture using CPAL (Cross-Platform Audio Library). The
//! stream callback only downmixes to mono and forwards raw chunks over a
//! channel; framing and analysis happen on the consumer's thread.
//!
//! ## Features
//! - Default input device selection
//! - Prefers mono 32-bit float at 44.1 kHz, downmixes wider formats
//! - Stream errors reported on the same channel as audio

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{error, info};

/// Preferred capture sample rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Message from the capture thread.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMessage {
    /// A chunk of mono samples, in capture order.
    Chunk(Vec<f32>),
    /// The device reported an error; the stream may have stopped.
    Error(String),
}

/// Starts audio capture from the default input device.
///
/// # Arguments
/// * `sender` - Channel receiving mono chunks and stream errors
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and sample rate
/// * `Err(e)` - No usable input device or format
pub fn start_audio_capture(sender: Sender<CaptureMessage>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("[AUDIO] Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE
        .clamp(supported_config.min_sample_rate().0, supported_config.max_sample_rate().0);
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));

    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;
    let config: cpal::StreamConfig = config.into();

    info!(
        "[AUDIO] Selected sample rate: {} Hz, {} channel(s)",
        sample_rate, channels
    );

    let error_sender = sender.clone();
    let err_fn = move |err: cpal::StreamError| {
        error!("[AUDIO] An error occurred on the audio stream: {}", err);
        let _ = error_sender.try_send(CaptureMessage::Error(err.to_string()));
    };

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let chunk = downmix(data, channels);
            // Drop the chunk rather than block the audio callback.
            let _ = sender.try_send(CaptureMessage::Chunk(chunk));
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Finds the best supported f32 input configuration.
///
/// Mono configurations win over wider ones; among equals, the one whose
/// sample rate range lies closest to `target_rate` is chosen.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                (min as i64 - target_rate as i64)
                    .abs()
                    .min((max as i64 - target_rate as i64).abs())
            };
            (c.channels() != 1, distance)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }
}
