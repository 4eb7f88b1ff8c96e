//! Sample-accurate rendering of parsed MIDI timelines.
//!
//! This module turns symbolic notes into audio. It provides:
//! - Instrument profiles (ADSR envelope plus oscillator)
//! - Per-note envelope rendering that resumes across chunk boundaries
//! - Timeline parsing, bar-alignment validation and multi-file merging
//! - A chunked mixing driver, with coarse-grained parallel mixing
//! - Output sinks and a bounded producer/consumer streaming pipeline
//! - WAV export

pub mod export;
pub mod instrument;
pub mod mixer;
pub mod note_sound;
pub mod pipeline;
pub mod stream;
pub mod timeline;

pub use export::export_to_wav;
pub use instrument::{Adsr, InstrumentMap, InstrumentProfile, Oscillator, WaveOscillator, Waveform};
pub use mixer::{mix_notes, mix_parallel, Mixer};
pub use note_sound::{NoteSound, NoteState, Phase};
pub use pipeline::stream_to_sink;
pub use stream::{float32_to_int16, AudioSink, MemorySink, Pcm16Sink, SpeakerSink, WavFormat, WavSink};
pub use timeline::{merge_sources, ParsedMidi};
