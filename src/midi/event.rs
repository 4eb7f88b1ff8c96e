//! Symbolic per-track event streams.
//!
//! This is the decoded form of a MIDI file that the timeline parser walks:
//! an ordered list of events per track, each carrying the tick delta since
//! the previous event on the same track.

use super::{Pitch, DEFAULT_TICKS_PER_BEAT};

/// The events the rendering engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Start of a note.
    NoteOn { channel: u8, pitch: Pitch },
    /// End of a note. A note-on with velocity 0 is decoded as this.
    NoteOff { channel: u8, pitch: Pitch },
    /// Time signature meta event, denominator as a plain number (4, 8, ...).
    TimeSignature { numerator: u8, denominator: u8 },
    /// Track name meta event.
    TrackName(String),
    /// Any other event. Kept so its delta time still advances the clock.
    Other,
}

/// A single event with its delta time in ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta_ticks: u32,
    pub kind: EventKind,
}

impl TrackEvent {
    pub fn new(delta_ticks: u32, kind: EventKind) -> Self {
        Self { delta_ticks, kind }
    }

    pub fn note_on(delta_ticks: u32, pitch: u8) -> Self {
        Self::new(
            delta_ticks,
            EventKind::NoteOn {
                channel: 0,
                pitch: Pitch(pitch),
            },
        )
    }

    pub fn note_off(delta_ticks: u32, pitch: u8) -> Self {
        Self::new(
            delta_ticks,
            EventKind::NoteOff {
                channel: 0,
                pitch: Pitch(pitch),
            },
        )
    }

    pub fn time_signature(delta_ticks: u32, numerator: u8, denominator: u8) -> Self {
        Self::new(
            delta_ticks,
            EventKind::TimeSignature {
                numerator,
                denominator,
            },
        )
    }

    pub fn track_name(delta_ticks: u32, name: impl Into<String>) -> Self {
        Self::new(delta_ticks, EventKind::TrackName(name.into()))
    }
}

/// A decoded MIDI source: resolution plus one event list per track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiSource {
    /// Display name, usually the file stem.
    pub name: String,
    /// Ticks per quarter note.
    pub ticks_per_beat: u32,
    pub tracks: Vec<Vec<TrackEvent>>,
}

impl MidiSource {
    pub fn new(name: impl Into<String>, ticks_per_beat: u32) -> Self {
        Self {
            name: name.into(),
            ticks_per_beat,
            tracks: Vec::new(),
        }
    }

    /// Builder-style helper to append a track.
    pub fn with_track(mut self, events: Vec<TrackEvent>) -> Self {
        self.tracks.push(events);
        self
    }

    /// Returns the total length of a track in ticks.
    pub fn track_ticks(events: &[TrackEvent]) -> u64 {
        events.iter().map(|e| e.delta_ticks as u64).sum()
    }

    /// Interleaves all tracks into a single track ordered by absolute tick.
    ///
    /// Events at the same tick keep their track order, and within a track
    /// their original order. The result keeps the longest track's length.
    pub fn flattened(&self) -> Vec<TrackEvent> {
        let mut timed: Vec<(u64, usize, usize, &EventKind)> = Vec::new();
        let mut end = 0u64;
        for (track_idx, track) in self.tracks.iter().enumerate() {
            let mut tick = 0u64;
            for (event_idx, event) in track.iter().enumerate() {
                tick += event.delta_ticks as u64;
                timed.push((tick, track_idx, event_idx, &event.kind));
            }
            end = end.max(tick);
        }
        timed.sort_by_key(|&(tick, track_idx, event_idx, _)| (tick, track_idx, event_idx));

        let mut events = Vec::with_capacity(timed.len() + 1);
        let mut last = 0u64;
        for (tick, _, _, kind) in timed {
            events.push(TrackEvent::new((tick - last) as u32, kind.clone()));
            last = tick;
        }
        if end > last {
            events.push(TrackEvent::new((end - last) as u32, EventKind::Other));
        }
        events
    }
}

impl Default for MidiSource {
    fn default() -> Self {
        Self::new("untitled", DEFAULT_TICKS_PER_BEAT)
    }
}
