//! Shared fixtures: a deterministic stand-in for every external tool of
//! a render, plus helpers for source recordings and configurations.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use upmix::engine::{probe_wav, read_wav, write_wav, AudioBuffer, SampleEncoding, SampleSpec};
use upmix::pipeline::{CommandLine, ProcessExit, StageExecutable};
use upmix::{RemapMatrix, RenderConfig};

/// Emulates cmake, make, sox, the native binaries, amixer and aplay on
/// real WAV files.
pub struct FakeRig {
    /// Channels the fake synthesis binary writes
    pub synthesis_channels: usize,
    /// Whether `make` leaves the native binaries behind
    pub build_produces_binaries: bool,
    /// Program name and exit status to fail with
    pub fail: Option<(&'static str, i32)>,
    pub issued: Vec<CommandLine>,
}

impl FakeRig {
    pub fn new(synthesis_channels: usize) -> Self {
        Self {
            synthesis_channels,
            build_produces_binaries: true,
            fail: None,
            issued: Vec::new(),
        }
    }

    pub fn failing(mut self, program: &'static str, code: i32) -> Self {
        self.fail = Some((program, code));
        self
    }

    /// Program names in the order they were run
    pub fn programs(&self) -> Vec<String> {
        self.issued
            .iter()
            .map(|c| c.program_name().to_string())
            .collect()
    }

    pub fn ran(&self, program: &str) -> bool {
        self.issued.iter().any(|c| c.program_name() == program)
    }

    pub fn commands_of(&self, program: &str) -> Vec<&CommandLine> {
        self.issued
            .iter()
            .filter(|c| c.program_name() == program)
            .collect()
    }

    fn build(&self, command: &CommandLine) -> io::Result<()> {
        if !self.build_produces_binaries {
            return Ok(());
        }
        let dir = command.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
        fs::write(dir.join("revolve"), b"#!/bin/true\n")?;
        fs::write(dir.join("driver_model"), b"#!/bin/true\n")?;
        Ok(())
    }

    /// Channel k carries the left or right input, scaled by (k + 1) / 100
    fn synthesize(&self, command: &CommandLine) -> io::Result<()> {
        let (input, output) = (&command.args[0], &command.args[1]);
        let stereo = read_wav(Path::new(input)).map_err(to_io)?;

        let mut field = AudioBuffer::new(
            self.synthesis_channels,
            stereo.num_frames(),
            stereo.sample_rate(),
        );
        for k in 0..self.synthesis_channels {
            let gain = (k + 1) as f32 / 100.0;
            let source = stereo.channel(k % stereo.num_channels()).to_vec();
            for (out, s) in field.channel_mut(k).iter_mut().zip(source) {
                *out = s * gain;
            }
        }
        write_wav(&field, Path::new(output), SampleSpec::float32()).map_err(to_io)
    }

    /// Identity driver model
    fn correct(&self, command: &CommandLine) -> io::Result<()> {
        let buffer = read_wav(Path::new(&command.args[0])).map_err(to_io)?;
        write_wav(&buffer, Path::new(&command.args[1]), SampleSpec::float32()).map_err(to_io)
    }
}

impl StageExecutable for FakeRig {
    fn execute(&mut self, command: &CommandLine) -> io::Result<ProcessExit> {
        self.issued.push(command.clone());
        let program = command.program_name().to_string();

        if let Some((failing, code)) = self.fail {
            if failing == program {
                return Ok(ProcessExit::from_code(code));
            }
        }

        match program.as_str() {
            "cmake" | "amixer" | "aplay" => {}
            "make" => self.build(command)?,
            "revolve" => self.synthesize(command)?,
            "driver_model" => self.correct(command)?,
            "sox" => sox(command)?,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}: command not found", other),
                ))
            }
        }

        Ok(ProcessExit::success())
    }
}

/// The subset of sox used by the pipelines:
/// `sox IN [-e float] [-b BITS] OUT [gain DB] [rate R] [trim S [D]]
/// [remix ...] [treble G F] [norm DB]`. `rate` relabels the samples
/// without resampling; `trim` counts frames at the new rate.
fn sox(command: &CommandLine) -> io::Result<()> {
    let args = &command.args;
    let input = Path::new(&args[0]);
    let mut format = {
        let header = probe_wav(input).map_err(to_io)?;
        SampleSpec {
            bit_depth: header.bit_depth,
            encoding: header.encoding,
        }
    };
    let mut buffer = read_wav(input).map_err(to_io)?;

    // `-b` without `-e` selects integer PCM, as sox does for WAV output
    let mut encoding = None;
    let mut i = 1;
    while !args[i].ends_with(".wav") {
        match args[i].as_str() {
            "-b" => format.bit_depth = args[i + 1].parse().map_err(invalid)?,
            "-e" if args[i + 1] == "float" => encoding = Some(SampleEncoding::Float),
            "-e" => encoding = Some(SampleEncoding::Int),
            other => return Err(invalid(format!("unknown option {}", other))),
        }
        i += 2;
    }
    if i > 1 {
        format.encoding = encoding.unwrap_or(SampleEncoding::Int);
    }
    let output = PathBuf::from(&args[i]);
    let effects = &args[i + 1..];
    let mut sample_rate = buffer.sample_rate();

    let mut j = 0;
    while j < effects.len() {
        match effects[j].as_str() {
            "gain" => {
                let db: f32 = effects[j + 1].parse().map_err(invalid)?;
                scale(&mut buffer, 10f32.powf(db / 20.0));
                j += 2;
            }
            "rate" => {
                let rate = &effects[j + 1];
                sample_rate = match rate.strip_suffix('k') {
                    Some(k) => k.parse::<u32>().map_err(invalid)? * 1000,
                    None => rate.parse().map_err(invalid)?,
                };
                j += 2;
            }
            "trim" => {
                let start: f64 = effects[j + 1].parse().map_err(invalid)?;
                let duration = effects.get(j + 2).and_then(|d| d.parse::<f64>().ok());
                let first = (start * sample_rate as f64) as usize;
                for channel in buffer.samples.iter_mut() {
                    channel.drain(..first.min(channel.len()));
                    if let Some(d) = duration {
                        channel.truncate((d * sample_rate as f64) as usize);
                    }
                }
                j += if duration.is_some() { 3 } else { 2 };
            }
            "remix" => {
                let end = effects[j + 1..]
                    .iter()
                    .position(|e| e == "norm" || e == "treble")
                    .map_or(effects.len(), |p| j + 1 + p);
                let layout = effects[j + 1..end].join(" ");
                let matrix = RemapMatrix::from_remix(buffer.num_channels(), &layout).map_err(to_io)?;
                buffer = matrix.apply(&buffer).map_err(to_io)?;
                j = end;
            }
            "treble" => j += 3,
            "norm" => {
                let db: f32 = effects[j + 1].parse().map_err(invalid)?;
                let peak = buffer
                    .samples
                    .iter()
                    .flatten()
                    .fold(0.0f32, |p, s| p.max(s.abs()));
                if peak > 0.0 {
                    scale(&mut buffer, 10f32.powf(db / 20.0) / peak);
                }
                j += 2;
            }
            other => return Err(invalid(format!("unknown effect {}", other))),
        }
    }

    let buffer = AudioBuffer::from_channels(buffer.samples, sample_rate).map_err(to_io)?;
    write_wav(&buffer, &output, format).map_err(to_io)
}

fn scale(buffer: &mut AudioBuffer, gain: f32) {
    for s in buffer.samples.iter_mut().flatten() {
        *s *= gain;
    }
}

fn to_io(e: upmix::UpmixError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

fn invalid(e: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
}

/// A one-second stereo recording: a 440 Hz tone left, 660 Hz right
pub fn write_source(path: &Path, sample_rate: u32) {
    write_long_source(path, sample_rate, 1);
}

/// The same two tones, `secs` seconds long
pub fn write_long_source(path: &Path, sample_rate: u32, secs: usize) {
    let frames = sample_rate as usize * secs;
    let tone = |freq: f32| -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    };
    let buffer = AudioBuffer::from_channels(vec![tone(440.0), tone(660.0)], sample_rate).unwrap();
    write_wav(&buffer, path, SampleSpec::pcm24()).unwrap();
}

/// Default configuration rooted in `root`
pub fn config(root: &Path) -> RenderConfig {
    let mut config = RenderConfig::default();
    config.paths.work_dir = root.join("work");
    config.paths.build_dir = root.join("build");
    config
}
