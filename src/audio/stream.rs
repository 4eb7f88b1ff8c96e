//! Output sinks for rendered audio.
//!
//! A sink receives mono `f32` chunks of any size, in order, until the
//! timeline is exhausted, then [`finish`](AudioSink::finish) is called once.
//!
//! File and memory sinks are driven by a consumer that blocks on the render
//! queue, so their output is exactly the rendered stream. [`SpeakerSink`] is
//! different: the device pulls samples on its own clock and never waits. If
//! the renderer falls behind, the device plays silence for the missing
//! samples and the rest of the stream is delayed by that much. Playback then
//! drifts behind the render clock, but no rendered sample is dropped.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use hound::{SampleFormat, WavSpec, WavWriter};
use rodio::{OutputStream, Sink, Source};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Chunks the speaker queue holds before `write` blocks.
const SPEAKER_QUEUE_CHUNKS: usize = 8;

/// Destination for rendered audio.
pub trait AudioSink {
    /// Consumes one chunk of mono samples, nominal range [-1, 1].
    fn write(&mut self, chunk: &[f32]) -> Result<()>;

    /// Flushes and closes the sink. Called once after the last chunk.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Converts a float sample to signed 16-bit PCM.
///
/// Scales by 32768 and clips anything outside [-1.0, 1.0). No dithering.
pub fn float32_to_int16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(-32768.0, 32767.0) as i16
}

/// Collects everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Vec<f32>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        self.samples.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Raw headerless PCM, signed 16-bit little-endian.
pub struct Pcm16Sink<W: Write> {
    writer: W,
}

impl<W: Write> Pcm16Sink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl Pcm16Sink<BufWriter<File>> {
    /// Creates (or truncates) a raw PCM file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref()).with_context(|| {
            format!("Failed to create PCM file: {}", path.as_ref().display())
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> AudioSink for Pcm16Sink<W> {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        let mut bytes = Vec::with_capacity(chunk.len() * 2);
        for &sample in chunk {
            bytes.extend_from_slice(&float32_to_int16(sample).to_le_bytes());
        }
        self.writer
            .write_all(&bytes)
            .context("Failed to write PCM data")
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush PCM data")
    }
}

/// Sample encoding of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    Float32,
    Int16,
}

/// Mono WAV file writer.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    format: WavFormat,
}

impl WavSink {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32, format: WavFormat) -> Result<Self> {
        let spec = match format {
            WavFormat::Float32 => WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
            WavFormat::Int16 => WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        };
        let writer = WavWriter::create(path.as_ref(), spec).with_context(|| {
            format!(
                "Failed to create output WAV file: {}",
                path.as_ref().display()
            )
        })?;
        Ok(Self {
            writer: Some(writer),
            format,
        })
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .context("WAV file already finalized")?;
        for &sample in chunk {
            match self.format {
                WavFormat::Float32 => writer.write_sample(sample)?,
                WavFormat::Int16 => writer.write_sample(float32_to_int16(sample))?,
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(())
    }
}

/// Audio source that plays chunks received over a channel.
/// Implements rodio's Source trait for playback.
///
/// Never blocks: on underrun it yields silence and resumes with the next
/// chunk once one arrives.
struct ChannelSource {
    receiver: Receiver<Vec<f32>>,
    buf: Vec<f32>,
    buf_pos: usize,
    sample_rate: u32,
}

impl Iterator for ChannelSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        while self.buf_pos >= self.buf.len() {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.buf_pos = 0;
                }
                // Renderer is behind: play silence rather than block the audio thread
                Err(TryRecvError::Empty) => return Some(0.0),
                Err(TryRecvError::Disconnected) => return None,
            }
        }
        let sample = self.buf[self.buf_pos];
        self.buf_pos += 1;
        Some(sample)
    }
}

impl Source for ChannelSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Plays audio on the default output device.
///
/// `write` blocks once the device queue is full, so rendering never runs
/// more than a few chunks ahead of playback.
pub struct SpeakerSink {
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    sink: Sink,
    sender: Option<Sender<Vec<f32>>>,
}

impl SpeakerSink {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let (stream, handle) = OutputStream::try_default().context("Failed to open audio output")?;
        let sink = Sink::try_new(&handle).context("Failed to start audio playback")?;

        let (sender, receiver) = bounded(SPEAKER_QUEUE_CHUNKS);
        sink.append(ChannelSource {
            receiver,
            buf: Vec::new(),
            buf_pos: 0,
            sample_rate,
        });

        Ok(Self {
            _stream: stream,
            sink,
            sender: Some(sender),
        })
    }
}

impl AudioSink for SpeakerSink {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        let sender = self.sender.as_ref().context("Speaker output already closed")?;
        sender
            .send(chunk.to_vec())
            .map_err(|_| anyhow::anyhow!("Audio output stopped"))
    }

    fn finish(&mut self) -> Result<()> {
        // Closing the channel lets the source drain and end
        self.sender.take();
        self.sink.sleep_until_end();
        Ok(())
    }
}
