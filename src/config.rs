//! Render configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "input_root": "clean_midi",
//!   "output_root": "renders",
//!   "workers": 0,
//!   "instruments": {
//!     "0": { "waveform": "triangle" },
//!     "33": { "waveform": "sawtooth", "envelope": { "release": 0.1 }, "gain": 0.6 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 2;

/// Top-level settings for a render run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// `<root>/<artist>/<song>/<program>_<name>.mid`
    pub input_root: PathBuf,
    /// `<renders>/<artist>/<song>.wav`
    pub output_root: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Parallel song jobs. 1 renders sequentially, 0 uses every core.
    pub workers: usize,
    /// Tone instruments keyed by MIDI program number.
    pub instruments: BTreeMap<u8, ToneConfig>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let mut instruments = BTreeMap::new();
        instruments.insert(0, ToneConfig::default());
        instruments.insert(
            1,
            ToneConfig {
                waveform: Waveform::Sawtooth,
                ..ToneConfig::default()
            },
        );
        RenderConfig {
            input_root: PathBuf::from("clean_midi"),
            output_root: PathBuf::from("renders"),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            workers: 1,
            instruments,
        }
    }
}

impl RenderConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// A simple oscillator instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneConfig {
    pub waveform: Waveform,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    /// Linear output gain per voice.
    #[serde(default = "default_gain")]
    pub gain: f64,
}

fn default_gain() -> f64 {
    0.3
}

impl Default for ToneConfig {
    fn default() -> Self {
        ToneConfig {
            waveform: Waveform::Triangle,
            envelope: EnvelopeConfig::default(),
            gain: default_gain(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    #[serde(alias = "saw")]
    Sawtooth,
    Triangle,
}

/// ADSR times in seconds, sustain as a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        EnvelopeConfig {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}
