//! Audio export functionality.
//!
//! Exports a parsed timeline to a WAV file by rendering it chunk by chunk,
//! release tails included.

use super::mixer::Mixer;
use super::stream::{AudioSink, WavFormat, WavSink};
use super::timeline::ParsedMidi;
use crate::config::RenderConfig;
use anyhow::Result;
use std::path::Path;

/// Exports a timeline to a 16-bit mono WAV file.
///
/// The timeline is rewound first, so it can be exported more than once.
///
/// # Arguments
///
/// * `timeline` - The timeline to render
/// * `output_path` - Path for the output WAV file
/// * `config` - Chunk size and sample rate
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Returns
///
/// Number of samples written
///
/// # Errors
///
/// Returns error if the output file cannot be created or rendering fails
pub fn export_to_wav<P, F>(
    timeline: &mut ParsedMidi,
    output_path: P,
    config: &RenderConfig,
    mut progress_callback: Option<F>,
) -> Result<u64>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let mut sink = WavSink::create(output_path.as_ref(), timeline.sample_rate(), WavFormat::Int16)?;

    let mut mixer = Mixer::new(timeline);
    mixer.rewind();
    let total_samples = mixer.end();
    let mut buffer = vec![0.0f32; config.chunk_size.max(1)];

    tracing::info!(
        "Exporting {} samples to {}",
        total_samples,
        output_path.as_ref().display()
    );

    let mut written = 0u64;
    while let Some(len) = mixer.next_chunk(&mut buffer)? {
        sink.write(&buffer[..len])?;
        written += len as u64;

        if let Some(ref mut callback) = progress_callback {
            callback(written as f32 / total_samples as f32);
        }
    }

    sink.finish()?;
    Ok(written)
}
