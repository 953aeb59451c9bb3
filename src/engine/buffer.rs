//! Audio Buffer Management
//!
//! Planar multichannel audio used wherever the orchestrator touches sample
//! data itself (the native remap backend and artifact checks). Channel count
//! is unrestricted: a synthesized wave field easily carries 16 or more.

use crate::error::{Result, UpmixError};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// AudioBuffer
// ============================================================================

/// Planar audio: one `Vec<f32>` per channel, all of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data, indexed `[channel][frame]`
    pub samples: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer
    pub fn new(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0; frames]; channels],
            sample_rate,
        }
    }

    /// Wrap existing channel data.
    ///
    /// # Errors
    /// * `UnsupportedFormat` - If the channels differ in length
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if let Some(first) = samples.first() {
            let frames = first.len();
            if let Some((ch, data)) = samples
                .iter()
                .enumerate()
                .find(|(_, data)| data.len() != frames)
            {
                return Err(UpmixError::UnsupportedFormat {
                    format: format!(
                        "ragged channels: channel {} has {} frames, expected {}",
                        ch,
                        data.len(),
                        frames
                    ),
                });
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    pub fn num_frames(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// True when every sample of the channel is exactly zero
    pub fn is_channel_silent(&self, index: usize) -> bool {
        self.samples[index].iter().all(|&s| s == 0.0)
    }

    /// True when every sample of every channel is exactly zero
    pub fn is_silent(&self) -> bool {
        (0..self.num_channels()).all(|ch| self.is_channel_silent(ch))
    }

    /// Peak level across all channels in dBFS
    pub fn peak_db(&self) -> f32 {
        let peak = self
            .samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max);

        linear_to_db(peak)
    }
}
