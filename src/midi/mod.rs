//! Symbolic MIDI input: pitches, event streams and timing conversions.
//!
//! This module provides the types the rendering engine consumes. Decoding
//! of Standard MIDI Files happens in [`import_from_midi`]; everything downstream
//! only sees [`MidiSource`] event streams.

mod event;
mod midi_import;

pub use event::{EventKind, MidiSource, TrackEvent};
pub use midi_import::{import_from_midi, source_from_smf, MidiImportError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Default resolution used when a source does not say otherwise.
pub const DEFAULT_TICKS_PER_BEAT: u32 = 480;

/// Default time signature numerator (4/4).
pub const DEFAULT_NUMERATOR: u8 = 4;

/// Absolute semitone index of a note (MIDI convention, 60 = C4).
///
/// Equality and hashing are by index only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pitch(pub u8);

impl Pitch {
    /// Returns the raw semitone index.
    pub fn index(self) -> u8 {
        self.0
    }

    /// Octave number, MIDI convention (note 0 is in octave -1).
    pub fn octave(self) -> i8 {
        (self.0 / 12) as i8 - 1
    }

    /// Name of the pitch class without octave, e.g. "F#".
    pub fn class_name(self) -> &'static str {
        NOTE_NAMES[(self.0 % 12) as usize]
    }

    /// Human-readable name with octave.
    ///
    /// # Examples
    ///
    /// ```
    /// use midiwave::midi::Pitch;
    ///
    /// assert_eq!(Pitch(60).name(), "C4");
    /// ```
    pub fn name(self) -> String {
        format!("{}{}", self.class_name(), self.octave())
    }

    /// Parses a note name like "C4" or "F#5".
    ///
    /// Returns None if the name is malformed or out of the MIDI range.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        // Find where the octave number starts
        let (octave_start, _) = name
            .char_indices()
            .find(|&(_, c)| c.is_ascii_digit() || c == '-')?;

        let class = &name[..octave_start];
        let octave: i16 = name[octave_start..].parse().ok()?;
        let class_index = NOTE_NAMES.iter().position(|&n| n == class)? as i16;

        let index = (octave + 1) * 12 + class_index;
        if (0..=127).contains(&index) {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Equal-temperament frequency in Hz, A4 (69) = 440 Hz.
    pub fn frequency(self) -> f64 {
        440.0 * 2f64.powf((self.0 as f64 - 69.0) / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class_name(), self.octave())
    }
}

impl From<u8> for Pitch {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

/// Converts ticks to seconds for a fixed tempo.
///
/// # Arguments
///
/// * `ticks` - Number of ticks
/// * `ticks_per_beat` - Source resolution
/// * `beats_per_minute` - Tempo
pub fn ticks_to_seconds(ticks: u64, ticks_per_beat: u32, beats_per_minute: f64) -> f64 {
    let beats = ticks as f64 / ticks_per_beat as f64;
    beats * 60.0 / beats_per_minute
}

/// Converts an absolute tick position to an absolute sample index.
///
/// Computed from the absolute tick rather than accumulated per event, so
/// long tracks do not drift by one sample per event. The product is formed
/// before the single division and rounded to nearest, so positions that
/// land exactly on a sample are never pulled one sample early.
pub fn ticks_to_samples(
    ticks: u64,
    ticks_per_beat: u32,
    beats_per_minute: f64,
    sample_rate: u32,
) -> u64 {
    let numerator = ticks as f64 * 60.0 * sample_rate as f64;
    let denominator = ticks_per_beat as f64 * beats_per_minute;
    (numerator / denominator).round().max(0.0) as u64
}

/// Rounds a tick count up to the next whole bar.
///
/// Exact multiples of the bar length are returned unchanged.
pub fn round_ticks_to_bar(ticks: u64, ticks_per_bar: u64) -> u64 {
    if ticks_per_bar == 0 {
        return ticks;
    }
    let rem = ticks % ticks_per_bar;
    if rem != 0 {
        ticks + (ticks_per_bar - rem)
    } else {
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_name() {
        assert_eq!(Pitch(60).name(), "C4");
        assert_eq!(Pitch(69).name(), "A4");
        assert_eq!(Pitch(0).name(), "C-1");
        assert_eq!(Pitch(127).name(), "G9");
        assert_eq!(Pitch(64).to_string(), "E4");
    }

    #[test]
    fn test_pitch_from_name() {
        assert_eq!(Pitch::from_name("C4"), Some(Pitch(60)));
        assert_eq!(Pitch::from_name("A4"), Some(Pitch(69)));
        assert_eq!(Pitch::from_name("C-1"), Some(Pitch(0)));
        assert_eq!(Pitch::from_name("H4"), None);
        assert_eq!(Pitch::from_name("C10"), None);
        assert_eq!(Pitch::from_name(""), None);
        assert_eq!(Pitch::from_name("C\u{266f}4"), None);
    }

    #[test]
    fn test_pitch_roundtrip_all() {
        for i in 0..=127u8 {
            assert_eq!(Pitch::from_name(&Pitch(i).name()), Some(Pitch(i)));
        }
    }

    #[test]
    fn test_frequency() {
        assert!((Pitch(69).frequency() - 440.0).abs() < 1e-9);
        assert!((Pitch(81).frequency() - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_tick_conversions() {
        // At 120 BPM, one beat = 0.5 seconds
        let seconds = ticks_to_seconds(480, 480, 120.0);
        assert!((seconds - 0.5).abs() < 1e-9);
        assert_eq!(ticks_to_samples(480, 480, 120.0, 44100), 22050);
        assert_eq!(ticks_to_samples(0, 480, 120.0, 44100), 0);
    }

    #[test]
    fn test_ticks_to_samples_exact_positions() {
        // Exact integer positions must not come out one sample early
        assert_eq!(ticks_to_samples(176, 480, 120.0, 44100), 8085);
        assert_eq!(ticks_to_samples(336, 480, 120.0, 44100), 15435);

        // Every tick whose position is a whole sample maps exactly
        for tpb in [96u32, 120, 192, 240, 384, 480, 960] {
            for ticks in 0..20_000u64 {
                let num = ticks * 60 * 44100;
                let den = tpb as u64 * 120;
                if num % den == 0 {
                    assert_eq!(ticks_to_samples(ticks, tpb, 120.0, 44100), num / den);
                }
            }
        }
    }

    #[test]
    fn test_round_ticks_to_bar() {
        let bar = 4 * 480;
        assert_eq!(round_ticks_to_bar(2000, bar), 3840);
        assert_eq!(round_ticks_to_bar(3840, bar), 3840);
        assert_eq!(round_ticks_to_bar(3000, bar), 3840);
        assert_eq!(round_ticks_to_bar(0, bar), 0);
        assert_eq!(round_ticks_to_bar(1, bar), 1920);
    }
}
