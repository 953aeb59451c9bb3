//! Audio file I/O for Upmix
//!
//! WAV reading, writing and header probing. Unlike a general importer this
//! never resamples or rejects wide channel layouts: artifacts are read back
//! exactly as the stage that produced them wrote them.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, UpmixError};

/// Integer PCM or IEEE float samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Int,
    Float,
}

impl From<SampleFormat> for SampleEncoding {
    fn from(format: SampleFormat) -> Self {
        match format {
            SampleFormat::Int => SampleEncoding::Int,
            SampleFormat::Float => SampleEncoding::Float,
        }
    }
}

impl std::fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleEncoding::Int => write!(f, "int"),
            SampleEncoding::Float => write!(f, "float"),
        }
    }
}

/// On-disk sample format of a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub bit_depth: u16,
    pub encoding: SampleEncoding,
}

impl SampleSpec {
    /// 24-bit integer PCM
    pub fn pcm24() -> Self {
        Self {
            bit_depth: 24,
            encoding: SampleEncoding::Int,
        }
    }

    /// 32-bit float
    pub fn float32() -> Self {
        Self {
            bit_depth: 32,
            encoding: SampleEncoding::Float,
        }
    }
}

/// What a WAV header says about a file, without decoding its samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub encoding: SampleEncoding,
    /// Frames per channel
    pub frames: u32,
}

/// Read only the header of a WAV file
pub fn probe_wav(path: &Path) -> Result<WavHeader> {
    let reader = open_reader(path)?;
    let spec = reader.spec();

    Ok(WavHeader {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bit_depth: spec.bits_per_sample,
        encoding: spec.sample_format.into(),
        frames: reader.duration(),
    })
}

/// Read a WAV file of any channel count into a planar buffer.
///
/// # Errors
/// * `SourceNotFound` - If the file does not exist
/// * `AudioRead` - If the file is not a readable WAV file
/// * `UnsupportedFormat` - If the integer bit depth is not 8, 16, 24 or 32
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = open_reader(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved = read_samples_as_f32(reader, path, spec.bits_per_sample, spec.sample_format)?;
    AudioBuffer::from_channels(deinterleave(&interleaved, channels), spec.sample_rate)
}

/// Write a planar buffer as WAV in the given sample format
pub fn write_wav(buffer: &AudioBuffer, path: &Path, format: SampleSpec) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: format.bit_depth,
        sample_format: match format.encoding {
            SampleEncoding::Int => SampleFormat::Int,
            SampleEncoding::Float => SampleFormat::Float,
        },
    };

    let write_err = |source: hound::Error| UpmixError::AudioWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    let interleaved = interleave(&buffer.samples);

    match (format.encoding, format.bit_depth) {
        (SampleEncoding::Float, 32) => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(write_err)?;
            }
        }
        (SampleEncoding::Int, 16) => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        (SampleEncoding::Int, 24) => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        (encoding, bits) => {
            return Err(UpmixError::UnsupportedFormat {
                format: format!("{}-bit {} output", bits, encoding),
            });
        }
    }

    writer.finalize().map_err(write_err)?;
    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn open_reader(path: &Path) -> Result<WavReader<std::io::BufReader<std::fs::File>>> {
    if !path.exists() {
        return Err(UpmixError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    WavReader::open(path).map_err(|source| UpmixError::AudioRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    path: &Path,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_err = |source: hound::Error| UpmixError::AudioRead {
        path: path.to_path_buf(),
        source,
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(UpmixError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };

            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err)
        }
    }
}

/// De-interleave samples from [a,b,c,a,b,c,...] to [[a,a,...], [b,b,...], [c,c,...]]
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }

    let frames = samples.len() / channels;
    let mut result = vec![Vec::with_capacity(frames); channels];

    for (i, sample) in samples.iter().enumerate() {
        result[i % channels].push(*sample);
    }

    result
}

/// Interleave planar channels into frame order
fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    if channels.is_empty() {
        return Vec::new();
    }

    let frames = channels[0].len();
    let mut result = Vec::with_capacity(frames * channels.len());

    for frame in 0..frames {
        for channel in channels {
            result.push(channel[frame]);
        }
    }

    result
}
