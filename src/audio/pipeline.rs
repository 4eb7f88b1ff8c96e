//! Streaming a timeline into a sink through a bounded queue.
//!
//! The renderer runs on a worker thread and hands chunks to the calling
//! thread over a bounded channel. The producer blocks when the queue is
//! full, so a slow sink throttles rendering instead of letting chunks pile
//! up. End of stream is the channel closing; if the sink fails, the
//! consumer drops its end and the producer stops at its next send.

use super::mixer::Mixer;
use super::stream::AudioSink;
use super::timeline::ParsedMidi;
use crate::config::RenderConfig;
use crate::error::RenderError;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread;

/// Renders `timeline` `loops` times in a row into `sink`, then finishes
/// the sink.
///
/// The timeline is rewound between passes. Returns the number of samples
/// written. If rendering or writing fails, the error is returned and
/// [`finish`](AudioSink::finish) is never called.
pub fn stream_to_sink(
    timeline: &mut ParsedMidi,
    sink: &mut dyn AudioSink,
    config: &RenderConfig,
    loops: usize,
) -> Result<u64> {
    let (sender, receiver) = bounded(config.queue_capacity.max(1));
    let chunk_size = config.chunk_size.max(1);

    tracing::info!(
        "Streaming {} pass(es) of {} samples in chunks of {}",
        loops,
        timeline.end_sample(),
        chunk_size
    );

    thread::scope(|scope| {
        let producer = scope.spawn(move || produce(timeline, chunk_size, loops, sender));
        let consumed = consume(receiver, sink);
        let produced = producer
            .join()
            .map_err(|_| anyhow!("Render thread panicked"))?;

        let written = consumed?;
        // Only a complete stream is finished
        let rendered = produced?;
        sink.finish()?;
        tracing::info!("Streamed {} samples ({} rendered)", written, rendered);
        Ok(written)
    })
}

/// Renders chunks into the channel. Dropping `sender` on return closes it.
fn produce(
    timeline: &mut ParsedMidi,
    chunk_size: usize,
    loops: usize,
    sender: Sender<Vec<f32>>,
) -> Result<u64, RenderError> {
    let mut mixer = Mixer::new(timeline);
    let mut buffer = vec![0.0f32; chunk_size];
    let mut rendered = 0u64;

    for pass in 0..loops {
        if pass > 0 {
            mixer.rewind();
        }
        while let Some(len) = mixer.next_chunk(&mut buffer)? {
            if sender.send(buffer[..len].to_vec()).is_err() {
                tracing::debug!(
                    "Consumer hung up, stopping render at sample {}",
                    mixer.position()
                );
                return Ok(rendered);
            }
            rendered += len as u64;
        }
    }
    Ok(rendered)
}

/// Drains the channel into the sink until the producer closes it.
fn consume(receiver: Receiver<Vec<f32>>, sink: &mut dyn AudioSink) -> Result<u64> {
    let mut written = 0u64;
    for chunk in receiver {
        sink.write(&chunk)?;
        written += chunk.len() as u64;
    }
    Ok(written)
}
