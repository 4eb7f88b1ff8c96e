//! midiwave - Render MIDI files to audio.
//!
//! Parses one or more MIDI files into a timeline, renders every note with
//! its instrument's ADSR envelope, and streams the result to a WAV file,
//! raw PCM, or the speakers.
//!
//! # Usage
//!
//! ```bash
//! midiwave song.mid -o song.wav
//! midiwave drums.mid bass.mid --config instruments.json --play
//! RUST_LOG=debug midiwave song.mid --pcm song.raw --loops 4
//! ```

use anyhow::{Context, Result};
use midiwave::audio::{
    stream_to_sink, AudioSink, Pcm16Sink, SpeakerSink, WavFormat, WavSink,
};
use midiwave::{ParsedMidi, RenderConfig};
use std::path::PathBuf;

/// Where rendered audio goes.
enum Output {
    Wav(PathBuf),
    Pcm(PathBuf),
    Speakers,
}

/// Command-line options for the application.
struct CliOptions {
    /// MIDI files; several are merged into one multi-track timeline.
    inputs: Vec<PathBuf>,
    /// Optional JSON render configuration.
    config: Option<PathBuf>,
    output: Output,
    /// Number of times the timeline is played back to back.
    loops: usize,
}

fn print_help(program: &str) {
    eprintln!("midiwave - Render MIDI files to audio");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] FILE.mid...", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH   JSON render configuration (instruments, sample rate, ...)");
    eprintln!("  -o, --output PATH   Write a 16-bit WAV file (default: out.wav)");
    eprintln!("      --pcm PATH      Write raw signed 16-bit little-endian PCM");
    eprintln!("  -p, --play          Play on the default audio device");
    eprintln!("  -l, --loops N       Play the timeline N times (default: 1)");
    eprintln!("  -h, --help          Print this help message");
    eprintln!();
    eprintln!("Several input files are merged; they must share ticks per beat and time signature.");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("midiwave");

        let mut inputs = Vec::new();
        let mut config = None;
        let mut output = Output::Wav(PathBuf::from("out.wav"));
        let mut loops = 1;
        let mut i = 1;

        let value = |i: usize, flag: &str| -> Result<String> {
            args.get(i)
                .cloned()
                .with_context(|| format!("{} requires an argument", flag))
        };

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    config = Some(PathBuf::from(value(i, "--config")?));
                }
                "--output" | "-o" => {
                    i += 1;
                    output = Output::Wav(PathBuf::from(value(i, "--output")?));
                }
                "--pcm" => {
                    i += 1;
                    output = Output::Pcm(PathBuf::from(value(i, "--pcm")?));
                }
                "--play" | "-p" => output = Output::Speakers,
                "--loops" | "-l" => {
                    i += 1;
                    loops = value(i, "--loops")?
                        .parse()
                        .context("--loops expects a positive number")?;
                    anyhow::ensure!(loops > 0, "--loops expects a positive number");
                }
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => inputs.push(PathBuf::from(other)),
            }
            i += 1;
        }

        if inputs.is_empty() {
            print_help(program);
            std::process::exit(1);
        }

        Ok(Self {
            inputs,
            config,
            output,
            loops,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = CliOptions::parse()?;

    let config = match &options.config {
        Some(path) => RenderConfig::from_json_file(path)?,
        None => RenderConfig::default(),
    };
    let instruments = config.instrument_map();

    let mut timeline = if options.inputs.len() == 1 {
        ParsedMidi::from_file(&options.inputs[0], &instruments, &config)
    } else {
        ParsedMidi::from_files(&options.inputs, &instruments, &config)
    }
    .context("Failed to parse MIDI input")?;

    tracing::info!(
        "Parsed {} note(s) on {} track(s), {} samples ({}/4)",
        timeline.notes().len(),
        timeline.track_count(),
        timeline.n_samples(),
        timeline.numerator()
    );

    let mut sink: Box<dyn AudioSink> = match &options.output {
        Output::Wav(path) => Box::new(WavSink::create(path, config.sample_rate, WavFormat::Int16)?),
        Output::Pcm(path) => Box::new(Pcm16Sink::create(path)?),
        Output::Speakers => Box::new(SpeakerSink::new(config.sample_rate)?),
    };

    let written = stream_to_sink(&mut timeline, sink.as_mut(), &config, options.loops)?;
    eprintln!(
        "Rendered {:.2} s of audio",
        written as f64 / config.sample_rate as f64
    );
    Ok(())
}
