//! midiwave - Sample-accurate MIDI-to-audio rendering.
//!
//! This library turns note on/off events into ADSR-shaped waveforms mixed
//! chunk by chunk into caller-provided buffers.

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;

// Re-export commonly used types
pub use audio::{export_to_wav, stream_to_sink, InstrumentProfile, Mixer, NoteSound, ParsedMidi};
pub use config::RenderConfig;
pub use error::{ParseError, RenderError};
pub use midi::{MidiSource, Pitch};
