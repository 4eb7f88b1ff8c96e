//! One note's playback instance.
//!
//! A [`NoteSound`] owns the sample-accurate envelope of a single note:
//! its phase boundaries are derived once at construction, and only the
//! progress counter and lifecycle state change while it is rendered.
//!
//! All windows are half-open. For a note active on `[sample_on, sample_off)`
//! with release tail up to `stop_release`:
//!
//! ```text
//! sample_on <= stop_attack <= stop_decay <= sample_off <= stop_release
//!    attack  |    decay     |   sustain   |   release
//! ```

use super::instrument::InstrumentProfile;
use crate::error::{ParseError, RenderError};
use crate::midi::Pitch;
use std::sync::Arc;

/// Lifecycle of a note during rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    /// Nothing rendered yet.
    Pending,
    /// Partially rendered.
    Rendering,
    /// Rendered up to the end of the release tail.
    Done,
}

/// Envelope phase a sample falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Converts seconds to a whole number of samples.
fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * sample_rate as f64).round().max(0.0) as u64
}

#[derive(Debug, Clone)]
pub struct NoteSound {
    pitch: Pitch,
    track: usize,
    channel: u8,

    sample_on: u64,
    sample_off: u64,

    ns_attack: u64,
    ns_decay: u64,
    ns_sustain: u64,
    ns_release: u64,

    stop_attack: u64,
    stop_decay: u64,
    stop_release: u64,

    sustain: f64,
    /// Level reached at the end of decay. Above `sustain` when the note is
    /// too short for its nominal decay.
    sustain_extra: f64,

    instrument: Arc<InstrumentProfile>,

    /// Samples of local waveform generated so far.
    rendered: u64,
    state: NoteState,
}

impl NoteSound {
    /// Creates a note active on `[sample_on, sample_off)`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidNoteWindow`] unless `sample_off > sample_on`,
    /// and [`ParseError::EnvelopeOverflow`] if the release tail cannot be
    /// represented.
    pub fn new(
        pitch: Pitch,
        sample_on: u64,
        sample_off: u64,
        instrument: Arc<InstrumentProfile>,
        sample_rate: u32,
    ) -> Result<Self, ParseError> {
        if sample_off <= sample_on {
            return Err(ParseError::InvalidNoteWindow {
                sample_on,
                sample_off,
            });
        }

        let adsr = instrument.adsr;
        let ns = sample_off - sample_on;

        let ns_release = seconds_to_samples(adsr.release, sample_rate);
        let ns_attack = seconds_to_samples(adsr.attack, sample_rate).min(ns);
        let ns_decay_nominal = seconds_to_samples(adsr.decay, sample_rate).max(1);
        let ns_decay = ns_decay_nominal.min(ns - ns_attack);
        let ns_sustain = ns - ns_attack - ns_decay;

        let stop_attack = sample_on + ns_attack;
        let stop_decay = stop_attack + ns_decay;
        let stop_release = sample_off
            .checked_add(ns_release)
            .ok_or(ParseError::EnvelopeOverflow {
                sample_off,
                release_samples: ns_release,
            })?;

        // A truncated decay stops early on its nominal slope instead of
        // jumping down to the sustain level.
        let sustain = adsr.sustain;
        let sustain_extra = ((sustain - 1.0) * (ns - ns_attack) as f64 / ns_decay_nominal as f64
            + 1.0)
            .max(sustain);

        Ok(Self {
            pitch,
            track: 0,
            channel: 0,
            sample_on,
            sample_off,
            ns_attack,
            ns_decay,
            ns_sustain,
            ns_release,
            stop_attack,
            stop_decay,
            stop_release,
            sustain,
            sustain_extra,
            instrument,
            rendered: 0,
            state: NoteState::Pending,
        })
    }

    /// Tags the note with the track and channel it came from.
    pub fn with_origin(mut self, track: usize, channel: u8) -> Self {
        self.track = track;
        self.channel = channel;
        self
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn sample_on(&self) -> u64 {
        self.sample_on
    }

    pub fn sample_off(&self) -> u64 {
        self.sample_off
    }

    pub fn stop_attack(&self) -> u64 {
        self.stop_attack
    }

    pub fn stop_decay(&self) -> u64 {
        self.stop_decay
    }

    pub fn stop_release(&self) -> u64 {
        self.stop_release
    }

    /// Note duration without the release tail.
    pub fn duration(&self) -> u64 {
        self.sample_off - self.sample_on
    }

    /// Phase lengths in samples: (attack, decay, sustain, release).
    pub fn phase_lengths(&self) -> (u64, u64, u64, u64) {
        (self.ns_attack, self.ns_decay, self.ns_sustain, self.ns_release)
    }

    pub fn sustain_extra(&self) -> f64 {
        self.sustain_extra
    }

    pub fn instrument(&self) -> &Arc<InstrumentProfile> {
        &self.instrument
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn state(&self) -> NoteState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == NoteState::Done
    }

    /// Whether the active window `[sample_on, stop_release)` intersects
    /// `[start, end)`.
    pub fn overlaps_range(&self, start: u64, end: u64) -> bool {
        self.sample_on < end && self.stop_release > start
    }

    /// Phase of an absolute sample, or None outside the active window.
    ///
    /// Phases are checked in attack, decay, sustain, release order.
    pub fn phase_at(&self, sample: u64) -> Option<Phase> {
        if self.sample_on <= sample && sample < self.stop_attack {
            Some(Phase::Attack)
        } else if self.stop_attack <= sample && sample < self.stop_decay {
            Some(Phase::Decay)
        } else if self.stop_decay <= sample && sample < self.sample_off {
            Some(Phase::Sustain)
        } else if self.sample_off <= sample && sample < self.stop_release {
            Some(Phase::Release)
        } else {
            None
        }
    }

    /// Envelope multiplier at an absolute sample (0.0 outside the window).
    ///
    /// Each ramp reaches its target on its last sample, so the value just
    /// before `stop_attack` is 1.0 and just before `stop_decay` is the
    /// decay target.
    pub fn envelope_at(&self, sample: u64) -> f32 {
        let ramp = |k: u64, n: u64| (k + 1) as f64 / n as f64;
        let value = match self.phase_at(sample) {
            Some(Phase::Attack) => ramp(sample - self.sample_on, self.ns_attack),
            Some(Phase::Decay) => {
                1.0 + (self.sustain_extra - 1.0) * ramp(sample - self.stop_attack, self.ns_decay)
            }
            Some(Phase::Sustain) => self.sustain,
            Some(Phase::Release) => {
                self.sustain_extra * (1.0 - ramp(sample - self.sample_off, self.ns_release))
            }
            None => 0.0,
        };
        value as f32
    }

    /// Renders this note's contribution to a chunk.
    ///
    /// `buffer[i]` holds absolute sample `start + i`. Only the part of the
    /// chunk inside `[sample_on, stop_release)` is touched, and the result
    /// is added to what is already there.
    ///
    /// Calls must cover the note's window in increasing order without gaps
    /// or overlap; the oscillator is driven by the note-local progress
    /// counter, so this is what keeps the waveform phase-continuous.
    ///
    /// # Returns
    ///
    /// Number of samples rendered.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NonContiguous`] if the chunk does not continue
    /// exactly where the previous call stopped.
    pub fn render(&mut self, buffer: &mut [f32], start: u64) -> Result<usize, RenderError> {
        let end = start + buffer.len() as u64;
        let lo = start.max(self.sample_on);
        let hi = end.min(self.stop_release);
        if lo >= hi {
            return Ok(0);
        }

        self.check_contiguous(start, end)?;

        let count = (hi - lo) as usize;
        let offset = (lo - start) as usize;
        let target = &mut buffer[offset..offset + count];

        let wave = self
            .instrument
            .oscillator
            .generate(self.rendered, count, self.pitch);
        for (i, (out, raw)) in target.iter_mut().zip(wave).enumerate() {
            *out += raw * self.envelope_at(lo + i as u64);
        }

        self.rendered += count as u64;
        self.state = if hi == self.stop_release {
            NoteState::Done
        } else {
            NoteState::Rendering
        };
        Ok(count)
    }

    /// Checks that the chunk `[start, end)` would continue this note exactly
    /// where the previous render stopped. Chunks that miss the note's
    /// window always pass.
    pub fn check_contiguous(&self, start: u64, end: u64) -> Result<(), RenderError> {
        let lo = start.max(self.sample_on);
        let hi = end.min(self.stop_release);
        let expected = self.sample_on + self.rendered;
        if lo < hi && lo != expected {
            return Err(RenderError::NonContiguous { expected, got: lo });
        }
        Ok(())
    }

    /// Rewinds progress so the note can be rendered again from the start.
    pub fn reset(&mut self) {
        self.rendered = 0;
        self.state = NoteState::Pending;
    }
}
