//! Instrument profiles: envelope timing plus an oscillator.
//!
//! A profile is shared by every note rendered with it, so it is handed
//! around as `Arc<InstrumentProfile>`. The [`InstrumentMap`] resolves which
//! profile a track uses, once, before its events are walked.

use crate::midi::Pitch;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

/// Attack/decay/release in seconds, sustain as an amplitude ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
        }
    }

    /// Flat envelope: full amplitude for exactly the note duration.
    pub fn flat() -> Self {
        Self::new(0.0, 0.0, 1.0, 0.0)
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::flat()
    }
}

/// Produces raw waveform samples for a pitch.
///
/// `phase_offset` is the note-local index of `out[0]`. Implementations
/// must be deterministic in `(phase_offset, pitch)` so chunked rendering
/// is phase-continuous.
pub trait Oscillator: Send + Sync {
    fn fill(&self, phase_offset: u64, pitch: Pitch, out: &mut [f32]);

    /// Allocating convenience wrapper around [`fill`](Oscillator::fill).
    fn generate(&self, phase_offset: u64, count: usize, pitch: Pitch) -> Vec<f32> {
        let mut out = vec![0.0; count];
        self.fill(phase_offset, pitch, &mut out);
        out
    }
}

/// Built-in waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Value of the waveform at a phase in cycles, range [-1, 1].
    fn at(self, cycles: f64) -> f64 {
        let t = cycles.fract();
        match self {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * t - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
        }
    }
}

/// Equal-temperament oscillator for one of the built-in [`Waveform`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveOscillator {
    pub waveform: Waveform,
    pub sample_rate: u32,
    pub gain: f32,
}

impl WaveOscillator {
    pub fn new(waveform: Waveform, sample_rate: u32, gain: f32) -> Self {
        Self {
            waveform,
            sample_rate,
            gain,
        }
    }
}

impl Oscillator for WaveOscillator {
    fn fill(&self, phase_offset: u64, pitch: Pitch, out: &mut [f32]) {
        let step = pitch.frequency() / self.sample_rate as f64;
        for (i, sample) in out.iter_mut().enumerate() {
            let cycles = (phase_offset + i as u64) as f64 * step;
            *sample = self.waveform.at(cycles) as f32 * self.gain;
        }
    }
}

/// Envelope timing plus the oscillator that produces the raw waveform.
#[derive(Clone)]
pub struct InstrumentProfile {
    pub name: String,
    pub adsr: Adsr,
    pub oscillator: Arc<dyn Oscillator>,
}

impl InstrumentProfile {
    pub fn new(name: impl Into<String>, adsr: Adsr, oscillator: Arc<dyn Oscillator>) -> Self {
        Self {
            name: name.into(),
            adsr,
            oscillator,
        }
    }

    /// Profile backed by a built-in waveform.
    pub fn waveform(
        name: impl Into<String>,
        adsr: Adsr,
        waveform: Waveform,
        sample_rate: u32,
        gain: f32,
    ) -> Self {
        Self::new(
            name,
            adsr,
            Arc::new(WaveOscillator::new(waveform, sample_rate, gain)),
        )
    }
}

impl fmt::Debug for InstrumentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentProfile")
            .field("name", &self.name)
            .field("adsr", &self.adsr)
            .finish_non_exhaustive()
    }
}

/// Maps tracks to instrument profiles.
///
/// Lookup order: track name, then track index, then the default entry.
#[derive(Debug, Clone)]
pub struct InstrumentMap {
    default: Arc<InstrumentProfile>,
    by_index: HashMap<usize, Arc<InstrumentProfile>>,
    by_name: HashMap<String, Arc<InstrumentProfile>>,
}

impl InstrumentMap {
    /// Every track uses the same instrument.
    pub fn shared(default: Arc<InstrumentProfile>) -> Self {
        Self {
            default,
            by_index: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// One instrument per track index; the first is also the default.
    ///
    /// Returns None for an empty list.
    pub fn per_track(profiles: Vec<Arc<InstrumentProfile>>) -> Option<Self> {
        let default = Arc::clone(profiles.first()?);
        let mut map = Self::shared(default);
        for (index, profile) in profiles.into_iter().enumerate() {
            map.by_index.insert(index, profile);
        }
        Some(map)
    }

    pub fn with_index(mut self, index: usize, profile: Arc<InstrumentProfile>) -> Self {
        self.by_index.insert(index, profile);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>, profile: Arc<InstrumentProfile>) -> Self {
        self.by_name.insert(name.into(), profile);
        self
    }

    pub fn default_profile(&self) -> &Arc<InstrumentProfile> {
        &self.default
    }

    /// Resolves the instrument for a track.
    pub fn resolve(&self, track_index: usize, track_name: Option<&str>) -> Arc<InstrumentProfile> {
        track_name
            .and_then(|name| self.by_name.get(name))
            .or_else(|| self.by_index.get(&track_index))
            .unwrap_or(&self.default)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Arc<InstrumentProfile> {
        Arc::new(InstrumentProfile::waveform(
            name,
            Adsr::flat(),
            Waveform::Sine,
            44100,
            1.0,
        ))
    }

    #[test]
    fn test_adsr_clamping() {
        let adsr = Adsr::new(-1.0, 0.1, 1.5, 0.2);
        assert_eq!(adsr.attack, 0.0);
        assert_eq!(adsr.sustain, 1.0);
    }

    #[test]
    fn test_waveform_shapes() {
        assert!((Waveform::Sine.at(0.25) - 1.0).abs() < 1e-12);
        assert_eq!(Waveform::Square.at(0.1), 1.0);
        assert_eq!(Waveform::Square.at(0.6), -1.0);
        assert_eq!(Waveform::Sawtooth.at(0.0), -1.0);
        assert_eq!(Waveform::Triangle.at(0.5), 1.0);
        assert_eq!(Waveform::Triangle.at(0.0), -1.0);
    }

    #[test]
    fn test_oscillator_phase_continuity() {
        let osc = WaveOscillator::new(Waveform::Sine, 44100, 0.5);
        let whole = osc.generate(0, 300, Pitch(69));
        let mut parts = osc.generate(0, 120, Pitch(69));
        parts.extend(osc.generate(120, 180, Pitch(69)));
        assert_eq!(whole, parts);
        assert!(whole.iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn test_instrument_map_resolution() {
        let map = InstrumentMap::shared(profile("default"))
            .with_index(1, profile("second"))
            .with_name("bass", profile("bass"));

        assert_eq!(map.resolve(0, None).name, "default");
        assert_eq!(map.resolve(1, None).name, "second");
        assert_eq!(map.resolve(1, Some("bass")).name, "bass");
        assert_eq!(map.resolve(5, Some("unknown")).name, "default");
    }

    #[test]
    fn test_per_track() {
        assert!(InstrumentMap::per_track(Vec::new()).is_none());
        let map = InstrumentMap::per_track(vec![profile("a"), profile("b")]).unwrap();
        assert_eq!(map.default_profile().name, "a");
        assert_eq!(map.resolve(1, None).name, "b");
        assert_eq!(map.resolve(7, None).name, "a");
    }
}
