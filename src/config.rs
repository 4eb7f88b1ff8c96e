//! Render configuration.
//!
//! Every optional setting is an explicit field with a default, so a
//! configuration file only needs to mention what it changes:
//!
//! ```json
//! {
//!   "sample_rate": 48000,
//!   "instruments": {
//!     "default": { "attack": 0.01, "decay": 0.1, "sustain": 0.6, "release": 0.2 },
//!     "tracks": [
//!       { "name": "bass", "instrument": { "waveform": "sawtooth", "gain": 0.5 } }
//!     ]
//!   }
//! }
//! ```

use crate::audio::{Adsr, InstrumentMap, InstrumentProfile, Waveform};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default tempo in beats per minute.
pub const DEFAULT_BEATS_PER_MINUTE: f64 = 120.0;

/// Samples rendered per mixing driver call.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Chunks the producer may run ahead of a slow sink.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Longest accepted attack, decay or release, in seconds.
pub const MAX_ENVELOPE_SECONDS: f64 = 3600.0;

/// Top-level settings for parsing and rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sample_rate: u32,
    pub beats_per_minute: f64,
    pub chunk_size: usize,
    pub queue_capacity: usize,
    pub instruments: InstrumentsConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            beats_per_minute: DEFAULT_BEATS_PER_MINUTE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            instruments: InstrumentsConfig::default(),
        }
    }
}

impl RenderConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse render config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_json(&json)
    }

    /// Checks that values can drive the renderer.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.sample_rate > 0, "sample_rate must be positive");
        anyhow::ensure!(
            self.beats_per_minute.is_finite() && self.beats_per_minute > 0.0,
            "beats_per_minute must be positive"
        );
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.queue_capacity > 0, "queue_capacity must be positive");

        self.instruments
            .default
            .validate()
            .context("Invalid default instrument")?;
        for (i, entry) in self.instruments.tracks.iter().enumerate() {
            entry
                .instrument
                .validate()
                .with_context(|| format!("Invalid instrument for track entry {}", i))?;
        }
        Ok(())
    }

    /// Resolves the instrument table into profiles bound to this sample rate.
    pub fn instrument_map(&self) -> InstrumentMap {
        let build = |name: String, instrument: &InstrumentConfig| {
            Arc::new(instrument.to_profile(name, self.sample_rate))
        };

        let mut map = InstrumentMap::shared(build("default".to_string(), &self.instruments.default));
        for (i, entry) in self.instruments.tracks.iter().enumerate() {
            let label = entry
                .name
                .clone()
                .or_else(|| entry.index.map(|index| format!("track {}", index)))
                .unwrap_or_else(|| format!("entry {}", i));
            let profile = build(label, &entry.instrument);
            if let Some(index) = entry.index {
                map = map.with_index(index, Arc::clone(&profile));
            }
            if let Some(name) = &entry.name {
                map = map.with_name(name.clone(), profile);
            }
        }
        map
    }
}

/// Instrument table: one default plus optional per-track overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentsConfig {
    pub default: InstrumentConfig,
    pub tracks: Vec<TrackInstrumentConfig>,
}

/// Instrument override for a track, matched by index and/or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInstrumentConfig {
    pub index: Option<usize>,
    pub name: Option<String>,
    pub instrument: InstrumentConfig,
}

/// Envelope and waveform of a built-in instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub waveform: Waveform,
    pub gain: f32,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
            waveform: Waveform::Sine,
            gain: 1.0,
        }
    }
}

impl InstrumentConfig {
    /// Checks that envelope times and levels are usable.
    pub fn validate(&self) -> Result<()> {
        for (label, seconds) in [
            ("attack", self.attack),
            ("decay", self.decay),
            ("release", self.release),
        ] {
            anyhow::ensure!(
                seconds.is_finite() && (0.0..=MAX_ENVELOPE_SECONDS).contains(&seconds),
                "{} must be between 0 and {} seconds, got {}",
                label,
                MAX_ENVELOPE_SECONDS,
                seconds
            );
        }
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.sustain),
            "sustain must be between 0 and 1, got {}",
            self.sustain
        );
        anyhow::ensure!(self.gain.is_finite(), "gain must be finite");
        Ok(())
    }

    pub fn adsr(&self) -> Adsr {
        Adsr::new(self.attack, self.decay, self.sustain, self.release)
    }

    pub fn to_profile(&self, name: impl Into<String>, sample_rate: u32) -> InstrumentProfile {
        InstrumentProfile::waveform(name, self.adsr(), self.waveform, sample_rate, self.gain)
    }
}
