//! Mixing driver: renders a timeline chunk by chunk.
//!
//! Notes are sorted by `sample_on`, so the driver finds the last candidate
//! for a chunk with a binary search, and keeps a cursor past the prefix of
//! notes whose release tail ended before the current chunk. Contributions
//! are purely additive; visiting order does not change the output.

use super::note_sound::NoteSound;
use super::timeline::ParsedMidi;
use crate::error::RenderError;
use rayon::prelude::*;

/// Renders every note of a sorted slice that overlaps
/// `[start, start + buffer.len())` into `buffer`.
///
/// Returns the number of notes that contributed. Every candidate is
/// checked for contiguity first, so on error neither `buffer` nor any
/// note's progress has changed.
pub fn mix_notes(
    notes: &mut [NoteSound],
    buffer: &mut [f32],
    start: u64,
) -> Result<usize, RenderError> {
    let end = start + buffer.len() as u64;
    let stop = notes.partition_point(|note| note.sample_on() < end);
    let active = &mut notes[..stop];

    for note in active.iter().filter(|note| note.stop_release() > start) {
        note.check_contiguous(start, end)?;
    }

    let mut touched = 0;
    for note in active.iter_mut().filter(|note| note.stop_release() > start) {
        note.render(buffer, start)?;
        touched += 1;
    }
    Ok(touched)
}

/// Stateful driver over one timeline.
///
/// Chunks must be requested in increasing, non-overlapping sample order
/// (each note's progress counter depends on it). Use [`rewind`](Mixer::rewind)
/// to start over.
pub struct Mixer<'a> {
    timeline: &'a mut ParsedMidi,
    /// First note whose release tail may still reach the next chunk.
    cursor: usize,
    /// Start of the next chunk for [`next_chunk`](Mixer::next_chunk).
    position: u64,
    end: u64,
}

impl<'a> Mixer<'a> {
    pub fn new(timeline: &'a mut ParsedMidi) -> Self {
        let end = timeline.end_sample();
        Self {
            timeline,
            cursor: 0,
            position: 0,
            end,
        }
    }

    /// Next sample [`next_chunk`](Mixer::next_chunk) will render.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// First sample after the last release tail.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.end
    }

    pub fn timeline(&self) -> &ParsedMidi {
        &*self.timeline
    }

    /// Adds the contribution of every note overlapping
    /// `[start, start + buffer.len())` to `buffer`.
    ///
    /// Returns the number of notes that contributed.
    pub fn render(&mut self, buffer: &mut [f32], start: u64) -> Result<usize, RenderError> {
        let notes = self.timeline.notes_mut();
        while self.cursor < notes.len() && notes[self.cursor].stop_release() <= start {
            self.cursor += 1;
        }
        let touched = mix_notes(&mut notes[self.cursor..], buffer, start)?;
        self.position = self.position.max(start + buffer.len() as u64);
        Ok(touched)
    }

    /// Clears `buffer` and renders the next contiguous chunk into it.
    ///
    /// The last chunk may be shorter than `buffer`. Returns the number of
    /// samples written, or None once the timeline is exhausted.
    pub fn next_chunk(&mut self, buffer: &mut [f32]) -> Result<Option<usize>, RenderError> {
        if self.is_finished() || buffer.is_empty() {
            return Ok(None);
        }
        let len = buffer.len().min((self.end - self.position) as usize);
        let chunk = &mut buffer[..len];
        chunk.fill(0.0);
        let start = self.position;
        self.render(chunk, start)?;
        Ok(Some(len))
    }

    /// Resets the timeline and the driver to sample 0.
    pub fn rewind(&mut self) {
        self.timeline.reset();
        self.cursor = 0;
        self.position = 0;
    }
}

/// Renders independent timelines on separate workers and sums them into
/// `buffer`.
///
/// Parallelism is per timeline, never per note; each mixer still sees its
/// chunks in order.
pub fn mix_parallel(
    mixers: &mut [Mixer<'_>],
    buffer: &mut [f32],
    start: u64,
) -> Result<(), RenderError> {
    let len = buffer.len();
    let parts = mixers
        .par_iter_mut()
        .map(|mixer| -> Result<Vec<f32>, RenderError> {
            let mut local = vec![0.0f32; len];
            mixer.render(&mut local, start)?;
            Ok(local)
        })
        .collect::<Result<Vec<_>, _>>()?;

    for part in parts {
        for (out, sample) in buffer.iter_mut().zip(part) {
            *out += sample;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::instrument::{Adsr, InstrumentMap, InstrumentProfile, Oscillator, Waveform};
    use crate::config::RenderConfig;
    use crate::midi::{EventKind, MidiSource, Pitch, TrackEvent};
    use std::sync::Arc;

    const RATE: u32 = 1000;

    fn config() -> RenderConfig {
        RenderConfig {
            sample_rate: RATE,
            ..RenderConfig::default()
        }
    }

    fn sine(adsr: Adsr) -> InstrumentMap {
        InstrumentMap::shared(Arc::new(InstrumentProfile::waveform(
            "sine",
            adsr,
            Waveform::Sine,
            RATE,
            0.5,
        )))
    }

    /// C4 on [0, 1000) and E4 on [500, 1500) at 1 kHz, one bar long.
    fn two_notes() -> MidiSource {
        MidiSource::new("two", 480).with_track(vec![
            TrackEvent::note_on(0, 60),
            TrackEvent::note_on(480, 64),
            TrackEvent::note_off(480, 60),
            TrackEvent::note_off(480, 64),
        ])
    }

    fn render_all(mixer: &mut Mixer, chunk: usize) -> Vec<f32> {
        let mut out = Vec::new();
        let mut buffer = vec![0.0; chunk];
        while let Some(len) = mixer.next_chunk(&mut buffer).unwrap() {
            out.extend_from_slice(&buffer[..len]);
        }
        out
    }

    #[test]
    fn test_overlapping_notes_scenario() {
        let instruments = sine(Adsr::flat());
        let mut timeline = ParsedMidi::parse(&two_notes(), &instruments, &config()).unwrap();
        assert_eq!(timeline.n_samples(), 2000);

        let mut buffer = vec![0.0; 2000];
        let mut mixer = Mixer::new(&mut timeline);
        assert_eq!(mixer.render(&mut buffer, 0).unwrap(), 2);

        let osc = &instruments.default_profile().oscillator;
        let a = osc.generate(0, 1000, Pitch(60));
        let b = osc.generate(0, 1000, Pitch(64));

        for i in 0..500 {
            assert!((buffer[i] - a[i]).abs() < 1e-6);
        }
        for i in 500..1000 {
            assert!((buffer[i] - (a[i] + b[i - 500])).abs() < 1e-6);
        }
        for i in 1000..1500 {
            assert!((buffer[i] - b[i - 500]).abs() < 1e-6);
        }
        assert!(buffer[1500..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_chunked_mixing_matches_single_pass() {
        let instruments = sine(Adsr::new(0.05, 0.1, 0.6, 0.3));
        let source = two_notes();

        let mut whole = ParsedMidi::parse(&source, &instruments, &config()).unwrap();
        let mut mixer = Mixer::new(&mut whole);
        let end = mixer.end();
        assert_eq!(end, 2000);
        let mut expected = vec![0.0; end as usize];
        mixer.render(&mut expected, 0).unwrap();

        for chunk in [1, 13, 256, 999, 4096] {
            let mut timeline = ParsedMidi::parse(&source, &instruments, &config()).unwrap();
            let mut mixer = Mixer::new(&mut timeline);
            let out = render_all(&mut mixer, chunk);
            assert_eq!(out, expected, "chunk size {}", chunk);
            assert!(mixer.timeline().is_done());
        }
    }

    #[test]
    fn test_release_tail_extends_end() {
        let instruments = sine(Adsr::new(0.0, 0.0, 1.0, 0.8));
        let mut timeline = ParsedMidi::parse(&two_notes(), &instruments, &config()).unwrap();
        let mut mixer = Mixer::new(&mut timeline);
        assert_eq!(mixer.end(), 2300);
        assert_eq!(render_all(&mut mixer, 512).len(), 2300);
        assert!(mixer.is_finished());
    }

    #[test]
    fn test_rewind_replays_identically() {
        let instruments = sine(Adsr::new(0.01, 0.2, 0.4, 0.1));
        let mut timeline = ParsedMidi::parse(&two_notes(), &instruments, &config()).unwrap();
        let mut mixer = Mixer::new(&mut timeline);

        let first = render_all(&mut mixer, 300);
        assert_eq!(mixer.next_chunk(&mut [0.0; 8]).unwrap(), None);
        mixer.rewind();
        assert_eq!(mixer.position(), 0);
        let second = render_all(&mut mixer, 300);
        assert_eq!(first, second);
    }

    #[test]
    fn test_pruning_skips_inactive_notes() {
        let source = MidiSource::new("sparse", 480).with_track(vec![
            TrackEvent::note_on(0, 60),
            TrackEvent::note_off(96, 60),
            TrackEvent::note_on(864, 62),
            TrackEvent::note_off(96, 62),
            TrackEvent::new(864, EventKind::Other),
        ]);
        let mut timeline = ParsedMidi::parse(&source, &sine(Adsr::flat()), &config()).unwrap();
        let mut mixer = Mixer::new(&mut timeline);

        let mut buffer = vec![0.0; 100];
        assert_eq!(mixer.render(&mut buffer, 0).unwrap(), 1);
        buffer.fill(0.0);
        assert_eq!(mixer.render(&mut buffer, 100).unwrap(), 0);
        assert!(buffer.iter().all(|&s| s == 0.0));
        buffer.fill(0.0);
        assert_eq!(mixer.render(&mut buffer, 1000).unwrap(), 1);
        assert_eq!(mixer.cursor, 1);
    }

    #[test]
    fn test_out_of_order_chunk_is_an_error() {
        let mut timeline = ParsedMidi::parse(&two_notes(), &sine(Adsr::flat()), &config()).unwrap();
        let mut mixer = Mixer::new(&mut timeline);
        let mut buffer = vec![0.0; 600];
        mixer.render(&mut buffer, 0).unwrap();
        assert!(matches!(
            mixer.render(&mut buffer, 0),
            Err(RenderError::NonContiguous { .. })
        ));
    }

    #[test]
    fn test_failed_chunk_leaves_buffer_and_notes_untouched() {
        let mut timeline = ParsedMidi::parse(&two_notes(), &sine(Adsr::flat()), &config()).unwrap();
        let later = timeline.notes()[1].sample_on();

        // Advance only the later note, so it no longer lines up with a
        // chunk that also covers the earlier one
        let mut scratch = vec![0.0; 10];
        timeline.notes_mut()[1].render(&mut scratch, later).unwrap();

        let mut buffer = vec![0.25; later as usize + 100];
        let result = mix_notes(timeline.notes_mut(), &mut buffer, 0);
        assert!(matches!(
            result,
            Err(RenderError::NonContiguous { expected, got }) if expected == later + 10 && got == later
        ));
        assert!(buffer.iter().all(|&s| s == 0.25));
        assert_eq!(timeline.notes()[0].rendered(), 0);
        assert_eq!(timeline.notes()[1].rendered(), 10);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let source = MidiSource::new("duo", 480)
            .with_track(vec![
                TrackEvent::note_on(0, 48),
                TrackEvent::note_off(1440, 48),
                TrackEvent::new(480, EventKind::Other),
            ])
            .with_track(vec![
                TrackEvent::note_on(240, 67),
                TrackEvent::note_off(960, 67),
                TrackEvent::new(720, EventKind::Other),
            ]);
        let instruments = sine(Adsr::new(0.02, 0.05, 0.7, 0.1));

        let mut serial = ParsedMidi::parse(&source, &instruments, &config()).unwrap();
        let mut mixer = Mixer::new(&mut serial);
        let expected = render_all(&mut mixer, 128);

        let mut parts = ParsedMidi::parse(&source, &instruments, &config())
            .unwrap()
            .into_tracks();
        let end = parts.iter().map(ParsedMidi::end_sample).max().unwrap();
        let mut mixers: Vec<Mixer> = parts.iter_mut().map(Mixer::new).collect();

        let mut out = vec![0.0; end as usize];
        for (i, chunk) in out.chunks_mut(128).enumerate() {
            mix_parallel(&mut mixers, chunk, (i * 128) as u64).unwrap();
        }

        assert_eq!(out.len(), expected.len());
        for (a, b) in out.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    struct Counter;

    impl Oscillator for Counter {
        fn fill(&self, phase_offset: u64, _pitch: Pitch, out: &mut [f32]) {
            for (i, s) in out.iter_mut().enumerate() {
                *s = (phase_offset + i as u64) as f32;
            }
        }
    }

    #[test]
    fn test_oscillator_sees_local_progress() {
        let profile = Arc::new(InstrumentProfile::new("counter", Adsr::flat(), Arc::new(Counter)));
        let source = MidiSource::new("late", 480).with_track(vec![
            TrackEvent::note_on(480, 60),
            TrackEvent::note_off(480, 60),
            TrackEvent::new(960, EventKind::Other),
        ]);
        let mut timeline =
            ParsedMidi::parse(&source, &InstrumentMap::shared(profile), &config()).unwrap();
        let mut mixer = Mixer::new(&mut timeline);
        let out = render_all(&mut mixer, 333);

        // The note starts at sample 500 but its waveform starts at phase 0
        assert_eq!(out[499], 0.0);
        assert_eq!(out[500], 0.0);
        assert_eq!(out[501], 1.0);
        assert_eq!(out[999], 499.0);
    }
}
