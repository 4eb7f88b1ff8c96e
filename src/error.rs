//! Error types for parsing timelines and rendering audio.

use crate::midi::MidiImportError;
use thiserror::Error;

/// Errors raised while building a [`ParsedMidi`](crate::audio::ParsedMidi).
///
/// Every variant is fatal: a failed parse or merge never yields a
/// partially built timeline.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Only quarter-note based time signatures (x/4) are supported.
    #[error("track {track}: unsupported time signature {numerator}/{denominator} (denominator must be 4)")]
    UnsupportedTimeSignature {
        track: usize,
        numerator: u8,
        denominator: u8,
    },

    /// Tracks disagree on their length once rounded up to a whole bar.
    #[error("number of ticks rounded to bar must be equal for all tracks, got {lengths:?}")]
    InconsistentTrackLength { lengths: Vec<u64> },

    /// Sources passed to a merge disagree on ticks-per-beat or time signature.
    #[error("cannot merge sources: {0}")]
    IncompatibleMerge(String),

    /// A note-off arrived for a pitch with no pending note-on.
    #[error("track {track}: note off for pitch {pitch} at tick {tick} has no matching note on")]
    DanglingNoteOff { track: usize, pitch: u8, tick: u64 },

    /// A note window must be non-empty.
    #[error("invalid note window [{sample_on}, {sample_off})")]
    InvalidNoteWindow { sample_on: u64, sample_off: u64 },

    /// The release tail would end past the last representable sample.
    #[error("release of {release_samples} samples after sample {sample_off} overflows the timeline")]
    EnvelopeOverflow {
        sample_off: u64,
        release_samples: u64,
    },

    /// Nothing to parse.
    #[error("no tracks to parse")]
    NoTracks,

    #[error(transparent)]
    Import(#[from] MidiImportError),
}

/// Errors raised while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A note was asked to render a range that does not continue where the
    /// previous call stopped. Each note must be rendered in strictly
    /// increasing, gap-free sample order.
    #[error("non-contiguous render: expected next sample {expected}, got {got}")]
    NonContiguous { expected: u64, got: u64 },

    /// The consumer side of a stream failed.
    #[error("sink error: {0}")]
    Sink(String),
}
