//! Standard MIDI File (SMF) import functionality.
//!
//! Decodes .mid and .midi files into [`MidiSource`] event streams.
//! Supports SMF Format 0 (single track) and Format 1 (multi-track) files.
//!
//! # Limitations
//!
//! - Only metrical timing (ticks per beat) is supported
//! - Note on/off, time signature and track name events are decoded
//! - Everything else (tempo, controllers, sysex) is kept as
//!   [`EventKind::Other`] so delta times stay intact

use super::{EventKind, MidiSource, Pitch, TrackEvent};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during MIDI import.
#[derive(Debug, Error)]
pub enum MidiImportError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// MIDI parsing failed
    #[error("MIDI parse error: {0}")]
    Parse(String),
    /// Unsupported MIDI format or timing
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Imports a MIDI file into a [`MidiSource`].
///
/// The source is named after the file stem.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed, or uses an
/// unsupported format.
pub fn import_from_midi<P: AsRef<Path>>(path: P) -> Result<MidiSource, MidiImportError> {
    let path = path.as_ref();
    let data = fs::read(path)?;

    let smf = Smf::parse(&data).map_err(|e| MidiImportError::Parse(e.to_string()))?;

    let mut source = source_from_smf(&smf)?;
    source.name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Imported MIDI")
        .to_string();

    tracing::debug!(
        "Imported {:?}: {} track(s), {} ticks per beat",
        path,
        source.tracks.len(),
        source.ticks_per_beat
    );
    Ok(source)
}

/// Converts an already parsed SMF into a [`MidiSource`].
pub fn source_from_smf(smf: &Smf) -> Result<MidiSource, MidiImportError> {
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int() as u32,
        Timing::Timecode(_, _) => {
            return Err(MidiImportError::UnsupportedFormat(
                "SMPTE timecode timing not supported".to_string(),
            ))
        }
    };

    if smf.header.format == Format::Sequential {
        return Err(MidiImportError::UnsupportedFormat(
            "Format 2 (sequential) MIDI files not supported".to_string(),
        ));
    }

    let mut source = MidiSource::new("Imported MIDI", ticks_per_beat);
    for track in &smf.tracks {
        source.tracks.push(convert_track(track));
    }
    Ok(source)
}

/// Converts one midly track into symbolic events, keeping every delta.
fn convert_track(track: &[midly::TrackEvent]) -> Vec<TrackEvent> {
    track
        .iter()
        .map(|event| TrackEvent::new(event.delta.as_int(), convert_kind(&event.kind)))
        .collect()
}

fn convert_kind(kind: &TrackEventKind) -> EventKind {
    match kind {
        TrackEventKind::Meta(MetaMessage::TrackName(name_bytes)) => {
            EventKind::TrackName(String::from_utf8_lossy(name_bytes).into_owned())
        }
        TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_power, _, _)) => {
            // denom_power is power of 2 (e.g., 2 means quarter note)
            EventKind::TimeSignature {
                numerator: *num,
                denominator: 1u8.checked_shl(*denom_power as u32).unwrap_or(0),
            }
        }
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => EventKind::NoteOn {
                    channel,
                    pitch: Pitch(key.as_int()),
                },
                // Note on with velocity 0 = note off
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    EventKind::NoteOff {
                        channel,
                        pitch: Pitch(key.as_int()),
                    }
                }
                _ => EventKind::Other,
            }
        }
        _ => EventKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::{Header, TrackEvent as SmfEvent};

    fn midi(delta: u32, message: MidiMessage) -> SmfEvent<'static> {
        SmfEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message,
            },
        }
    }

    fn meta(delta: u32, message: MetaMessage<'static>) -> SmfEvent<'static> {
        SmfEvent {
            delta: delta.into(),
            kind: TrackEventKind::Meta(message),
        }
    }

    #[test]
    fn test_source_from_smf() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(480.into())));
        smf.tracks.push(vec![
            meta(0, MetaMessage::TrackName(b"bass")),
            meta(0, MetaMessage::TimeSignature(3, 2, 24, 8)),
            meta(0, MetaMessage::Tempo(500_000.into())),
            midi(
                0,
                MidiMessage::NoteOn {
                    key: 60.into(),
                    vel: 100.into(),
                },
            ),
            midi(
                480,
                MidiMessage::NoteOn {
                    key: 60.into(),
                    vel: 0.into(),
                },
            ),
            midi(
                0,
                MidiMessage::NoteOff {
                    key: 62.into(),
                    vel: 64.into(),
                },
            ),
            meta(10, MetaMessage::EndOfTrack),
        ]);

        let source = source_from_smf(&smf).unwrap();
        assert_eq!(source.ticks_per_beat, 480);
        assert_eq!(source.tracks.len(), 1);

        let kinds: Vec<_> = source.tracks[0].iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds[0], EventKind::TrackName("bass".to_string()));
        assert_eq!(
            kinds[1],
            EventKind::TimeSignature {
                numerator: 3,
                denominator: 4
            }
        );
        assert_eq!(kinds[2], EventKind::Other);
        assert_eq!(
            kinds[3],
            EventKind::NoteOn {
                channel: 0,
                pitch: Pitch(60)
            }
        );
        assert_eq!(
            kinds[4],
            EventKind::NoteOff {
                channel: 0,
                pitch: Pitch(60)
            }
        );
        assert_eq!(
            kinds[5],
            EventKind::NoteOff {
                channel: 0,
                pitch: Pitch(62)
            }
        );
        assert_eq!(MidiSource::track_ticks(&source.tracks[0]), 490);
    }

    #[test]
    fn test_timecode_rejected() {
        let smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Timecode(midly::Fps::Fps25, 40),
        ));
        assert!(matches!(
            source_from_smf(&smf),
            Err(MidiImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_sequential_rejected() {
        let smf = Smf::new(Header::new(Format::Sequential, Timing::Metrical(96.into())));
        assert!(matches!(
            source_from_smf(&smf),
            Err(MidiImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_import_missing_file() {
        let result = import_from_midi("/definitely/not/here.mid");
        assert!(matches!(result, Err(MidiImportError::Io(_))));
    }
}
