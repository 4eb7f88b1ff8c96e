//! Parsed timelines: note sounds built from symbolic event streams.
//!
//! A [`ParsedMidi`] is either fully valid or never constructed. Parsing
//! walks every track, pairs note-on/note-off events into [`NoteSound`]s
//! and checks that all tracks end on the same bar.

use super::instrument::InstrumentMap;
use super::note_sound::NoteSound;
use crate::config::RenderConfig;
use crate::error::ParseError;
use crate::midi::{
    import_from_midi, round_ticks_to_bar, ticks_to_samples, EventKind, MidiImportError,
    MidiSource, Pitch, TrackEvent, DEFAULT_NUMERATOR,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Open note-ons of one track: (channel, pitch) -> start sample.
type PendingNotes = HashMap<(u8, Pitch), u64>;

/// A validated, renderable timeline.
#[derive(Debug, Clone)]
pub struct ParsedMidi {
    /// Sorted by `sample_on`.
    notes: Vec<NoteSound>,
    /// Length of the timeline rounded up to a whole bar, in samples.
    n_samples: u64,
    /// Length of the timeline rounded up to a whole bar, in ticks.
    ticks: u64,
    numerator: u8,
    ticks_per_beat: u32,
    ticks_per_bar: u64,
    sample_rate: u32,
    track_count: usize,
}

impl ParsedMidi {
    /// Parses a source using the given instruments.
    ///
    /// # Errors
    ///
    /// Fails on a time signature other than x/4, a note-off without a
    /// pending note-on, or tracks whose bar-rounded lengths differ.
    pub fn parse(
        source: &MidiSource,
        instruments: &InstrumentMap,
        config: &RenderConfig,
    ) -> Result<Self, ParseError> {
        if source.tracks.is_empty() {
            return Err(ParseError::NoTracks);
        }
        if source.ticks_per_beat == 0 {
            return Err(MidiImportError::UnsupportedFormat(
                "ticks per beat must be positive".to_string(),
            )
            .into());
        }

        let tpb = source.ticks_per_beat;
        let to_samples =
            |ticks: u64| ticks_to_samples(ticks, tpb, config.beats_per_minute, config.sample_rate);

        // Time signature carries over from earlier tracks, so a conductor
        // track sets the bar length for the ones after it.
        let mut numerator = DEFAULT_NUMERATOR;
        let mut ticks_per_bar = numerator as u64 * tpb as u64;

        let mut notes = Vec::new();
        let mut rounded = Vec::with_capacity(source.tracks.len());

        for (track_idx, events) in source.tracks.iter().enumerate() {
            let instrument = instruments.resolve(track_idx, track_name(events));
            let mut pending = PendingNotes::new();
            let mut ticks = 0u64;
            let first_note = notes.len();

            for event in events {
                ticks += event.delta_ticks as u64;
                let sample = to_samples(ticks);

                match &event.kind {
                    EventKind::TimeSignature {
                        numerator: num,
                        denominator,
                    } => {
                        if *denominator != 4 || *num == 0 {
                            return Err(ParseError::UnsupportedTimeSignature {
                                track: track_idx,
                                numerator: *num,
                                denominator: *denominator,
                            });
                        }
                        numerator = *num;
                        ticks_per_bar = *num as u64 * tpb as u64;
                    }
                    EventKind::NoteOn { channel, pitch } => {
                        if pending.insert((*channel, *pitch), sample).is_some() {
                            tracing::warn!(
                                "Track {}: note {} re-triggered at tick {} before its note off",
                                track_idx,
                                pitch,
                                ticks
                            );
                        }
                    }
                    EventKind::NoteOff { channel, pitch } => {
                        let sample_on = pending.remove(&(*channel, *pitch)).ok_or(
                            ParseError::DanglingNoteOff {
                                track: track_idx,
                                pitch: pitch.index(),
                                tick: ticks,
                            },
                        )?;
                        if sample > sample_on {
                            notes.push(
                                NoteSound::new(
                                    *pitch,
                                    sample_on,
                                    sample,
                                    instrument.clone(),
                                    config.sample_rate,
                                )?
                                .with_origin(track_idx, *channel),
                            );
                        } else {
                            tracing::warn!(
                                "Track {}: skipping zero-length note {} at tick {}",
                                track_idx,
                                pitch,
                                ticks
                            );
                        }
                    }
                    EventKind::TrackName(_) | EventKind::Other => {}
                }
            }

            // Close unterminated notes at the end of the track
            let track_end = to_samples(ticks);
            let mut unterminated: Vec<_> = pending.into_iter().collect();
            unterminated.sort_by_key(|&((channel, pitch), sample_on)| (sample_on, channel, pitch));
            for ((channel, pitch), sample_on) in unterminated {
                tracing::warn!(
                    "Track {}: note {} has no note off, closing at end of track",
                    track_idx,
                    pitch
                );
                if track_end > sample_on {
                    notes.push(
                        NoteSound::new(
                            pitch,
                            sample_on,
                            track_end,
                            instrument.clone(),
                            config.sample_rate,
                        )?
                        .with_origin(track_idx, channel),
                    );
                }
            }

            let track_rounded = round_ticks_to_bar(ticks, ticks_per_bar);
            tracing::debug!(
                "Track {} ({}): {} notes, {} ticks, {} rounded to bar",
                track_idx,
                instrument.name,
                notes.len() - first_note,
                ticks,
                track_rounded
            );
            rounded.push(track_rounded);
        }

        let ticks = rounded[0];
        if rounded.iter().any(|&r| r != ticks) {
            return Err(ParseError::InconsistentTrackLength { lengths: rounded });
        }

        notes.sort_by_key(|note| note.sample_on());

        Ok(Self {
            notes,
            n_samples: to_samples(ticks),
            ticks,
            numerator,
            ticks_per_beat: tpb,
            ticks_per_bar,
            sample_rate: config.sample_rate,
            track_count: source.tracks.len(),
        })
    }

    /// Imports and parses a single MIDI file.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        instruments: &InstrumentMap,
        config: &RenderConfig,
    ) -> Result<Self, ParseError> {
        let source = import_from_midi(path)?;
        Self::parse(&source, instruments, config)
    }

    /// Imports several single-track MIDI files and parses them as one
    /// multi-track timeline. See [`merge_sources`].
    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        instruments: &InstrumentMap,
        config: &RenderConfig,
    ) -> Result<Self, ParseError> {
        let sources = paths
            .iter()
            .map(import_from_midi)
            .collect::<Result<Vec<_>, _>>()?;
        let merged = merge_sources(&sources)?;
        Self::parse(&merged, instruments, config)
    }

    /// Rewinds every note so the timeline renders again from sample 0.
    pub fn reset(&mut self) {
        for note in &mut self.notes {
            note.reset();
        }
    }

    /// Splits the timeline into one timeline per source track.
    ///
    /// Each part keeps the full timeline length, so the parts can be
    /// rendered independently and summed.
    pub fn into_tracks(self) -> Vec<ParsedMidi> {
        let mut parts: Vec<ParsedMidi> = (0..self.track_count)
            .map(|_| ParsedMidi {
                track_count: 1,
                ..self.clone_header()
            })
            .collect();
        for note in self.notes {
            let track = note.track();
            parts[track].notes.push(note);
        }
        parts
    }

    fn clone_header(&self) -> ParsedMidi {
        ParsedMidi {
            notes: Vec::new(),
            n_samples: self.n_samples,
            ticks: self.ticks,
            numerator: self.numerator,
            ticks_per_beat: self.ticks_per_beat,
            ticks_per_bar: self.ticks_per_bar,
            sample_rate: self.sample_rate,
            track_count: self.track_count,
        }
    }

    pub fn notes(&self) -> &[NoteSound] {
        &self.notes
    }

    pub(crate) fn notes_mut(&mut self) -> &mut [NoteSound] {
        &mut self.notes
    }

    /// Bar-rounded length in samples, without release tails.
    pub fn n_samples(&self) -> u64 {
        self.n_samples
    }

    /// Bar-rounded length in ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// First sample after everything has finished sounding, including
    /// release tails that ring past the last bar.
    pub fn end_sample(&self) -> u64 {
        self.notes
            .iter()
            .map(NoteSound::stop_release)
            .max()
            .unwrap_or(0)
            .max(self.n_samples)
    }

    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    pub fn ticks_per_bar(&self) -> u64 {
        self.ticks_per_bar
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn track_count(&self) -> usize {
        self.track_count
    }

    /// True once every note has rendered its release tail.
    pub fn is_done(&self) -> bool {
        self.notes.iter().all(NoteSound::is_done)
    }
}

/// Returns the first track name event of a track.
fn track_name(events: &[TrackEvent]) -> Option<&str> {
    events.iter().find_map(|event| match &event.kind {
        EventKind::TrackName(name) => Some(name.as_str()),
        _ => None,
    })
}

/// Combines several sources into one multi-track source.
///
/// Each source becomes one track (multi-track sources are flattened),
/// its notes move to channel `i`, and its track name becomes the source
/// name. Only the first time signature of each source is kept; later ones
/// are blanked but keep their delta time.
///
/// # Errors
///
/// Returns [`ParseError::IncompatibleMerge`] if sources disagree on ticks
/// per beat, time signature numerator, or denominator. A source without a
/// time signature counts as 4/4.
pub fn merge_sources(sources: &[MidiSource]) -> Result<MidiSource, ParseError> {
    if sources.is_empty() {
        return Err(ParseError::NoTracks);
    }

    let ticks_per_beat: BTreeSet<u32> = sources.iter().map(|s| s.ticks_per_beat).collect();
    if ticks_per_beat.len() != 1 {
        return Err(ParseError::IncompatibleMerge(format!(
            "different ticks per beat {:?}",
            ticks_per_beat
        )));
    }

    let mut numerators = BTreeSet::new();
    let mut denominators = BTreeSet::new();
    let mut merged = MidiSource::new(
        sources
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("+"),
        sources[0].ticks_per_beat,
    );

    for (i, source) in sources.iter().enumerate() {
        let channel = u8::try_from(i).map_err(|_| {
            ParseError::IncompatibleMerge(format!("too many sources ({})", sources.len()))
        })?;
        let events = match source.tracks.as_slice() {
            [single] => single.clone(),
            _ => source.flattened(),
        };

        let mut track = Vec::with_capacity(events.len() + 1);
        let mut named = false;
        let mut time_signature_seen = false;

        for event in events {
            let kind = match event.kind {
                EventKind::TrackName(_) => {
                    named = true;
                    EventKind::TrackName(source.name.clone())
                }
                EventKind::TimeSignature {
                    numerator,
                    denominator,
                } => {
                    numerators.insert(numerator);
                    denominators.insert(denominator);
                    if time_signature_seen {
                        EventKind::Other
                    } else {
                        time_signature_seen = true;
                        EventKind::TimeSignature {
                            numerator,
                            denominator,
                        }
                    }
                }
                EventKind::NoteOn { pitch, .. } => EventKind::NoteOn { channel, pitch },
                EventKind::NoteOff { pitch, .. } => EventKind::NoteOff { channel, pitch },
                EventKind::Other => EventKind::Other,
            };
            track.push(TrackEvent::new(event.delta_ticks, kind));
        }

        if !time_signature_seen {
            numerators.insert(DEFAULT_NUMERATOR);
            denominators.insert(4);
        }
        if !named {
            track.insert(0, TrackEvent::track_name(0, source.name.clone()));
        }
        merged.tracks.push(track);
    }

    if numerators.len() != 1 || denominators.len() != 1 {
        return Err(ParseError::IncompatibleMerge(format!(
            "different time signatures (numerators {:?}, denominators {:?})",
            numerators, denominators
        )));
    }

    tracing::debug!(
        "Merged {} source(s) into {:?}",
        sources.len(),
        merged.name
    );
    Ok(merged)
}
