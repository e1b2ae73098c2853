//! # Configuration
//!
//! Plain-value settings for the whole pipeline, saved and loaded as JSON.
//! Every section has defaults, so a config file only needs the fields it
//! changes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::framer::DEFAULT_WINDOW_LEN;
use crate::pitch::EstimatorSettings;
use crate::tuner::TunerSettings;
use crate::tuning::{DEFAULT_PRESET, PresetDefinition, TuningPreset};
use crate::verification::VerificationSettings;

/// Live capture framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Samples per analysis window on the continuous tuning path.
    pub window_len: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_len: DEFAULT_WINDOW_LEN,
        }
    }
}

/// Tuner selection and behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Name of the active preset, built-in or custom.
    pub preset: String,
    /// Optional manual target string, e.g. "D3".
    pub pinned_string: Option<String>,
    #[serde(flatten)]
    pub settings: TunerSettings,
    /// Extra presets, looked up before the built-in ones.
    pub custom_presets: Vec<PresetDefinition>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            preset: DEFAULT_PRESET.to_string(),
            pinned_string: None,
            settings: TunerSettings::default(),
            custom_presets: Vec::new(),
        }
    }
}

/// Complete configuration of the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FretwiseConfig {
    pub capture: CaptureConfig,
    pub estimator: EstimatorSettings,
    pub tuner: TunerConfig,
    pub verification: VerificationSettings,
}

impl FretwiseConfig {
    /// Checks every section, including that the selected preset and pinned
    /// string resolve.
    pub fn validate(&self) -> Result<()> {
        if self.capture.window_len < 2 {
            return Err(ConfigError::WindowTooShort(self.capture.window_len));
        }
        self.estimator.validate()?;
        self.tuner.settings.validate()?;
        self.verification.validate()?;

        for def in &self.tuner.custom_presets {
            TuningPreset::new(&def.name, &def.strings)?;
        }
        let preset = TuningPreset::find(&self.tuner.preset, &self.tuner.custom_presets)?;
        if let Some(string) = &self.tuner.pinned_string {
            preset.string_index(string)?;
        }
        Ok(())
    }
}

/// Saves the configuration as pretty-printed JSON.
pub fn save_config(config: &FretwiseConfig, path: impl AsRef<Path>) -> Result<()> {
    let json_string = serde_json::to_string_pretty(config)?;
    let mut file = File::create(path)?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// Loads and validates a configuration from a JSON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<FretwiseConfig> {
    let mut file = File::open(path)?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: FretwiseConfig = serde_json::from_str(&data)?;
    config.validate()?;
    Ok(config)
}
