//! Render Configuration
//!
//! Every tunable of a render in one typed structure. The compiled-in
//! defaults reproduce the reference rig: 16 synthesized channels laid out
//! across 20 interface outputs, a UMC1820 on card 3.
//!
//! Precedence: defaults < JSON file < environment < command-line flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::device::{CalibrationProfile, ChannelCalibration, MixerControl};
use crate::error::{Result, UpmixError};
use crate::remap::RemapMatrix;

pub const ENV_WORK_DIR: &str = "UPMIX_WORK_DIR";
pub const ENV_BUILD_DIR: &str = "UPMIX_BUILD_DIR";
pub const ENV_CARD: &str = "UPMIX_CARD";
pub const ENV_PLAYBACK_DEVICE: &str = "UPMIX_PLAYBACK_DEVICE";

/// How the remap stage is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemapBackend {
    /// `sox ... remix <layout>`
    #[default]
    Sox,
    /// Decode, apply the matrix in-process, write 32-bit float
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding every artifact of a run
    pub work_dir: PathBuf,
    /// Native build directory; also where the binaries end up
    pub build_dir: PathBuf,
    /// Generic audio tool
    pub sox: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir().join("upmix"),
            build_dir: PathBuf::from("build"),
            sox: "sox".to_string(),
        }
    }
}

/// Preparation of the stereo source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub gain_db: f32,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub trim_start_secs: f64,
    /// Length of the excerpt; `None` renders to the end
    pub duration_secs: Option<f64>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            gain_db: -10.0,
            sample_rate: 48000,
            bit_depth: 24,
            trim_start_secs: 0.0,
            duration_secs: Some(8.0),
        }
    }
}

/// Logical and physical channel layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Channels written by the synthesis stage (N)
    pub synthesis_channels: usize,
    /// Outputs of the audio interface (M)
    pub physical_channels: usize,
    /// Remap in remix notation, one token per physical channel
    pub remix: String,
    pub backend: RemapBackend,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            synthesis_channels: 16,
            physical_channels: 20,
            remix: default_remix(),
            backend: RemapBackend::Sox,
        }
    }
}

/// Two silent outputs ahead of each bank of eight
fn default_remix() -> String {
    let bank = |range: std::ops::RangeInclusive<usize>| {
        range.map(|c| format!("{}v1", c)).collect::<Vec<_>>().join(" ")
    };
    format!("0 0 {} 0 0 {}", bank(1..=8), bank(9..=16))
}

/// Tonal shaping and loudness normalization of the corrected render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinishingConfig {
    pub treble_db: f32,
    pub treble_hz: u32,
    pub norm_db: f32,
    pub bit_depth: u16,
}

impl Default for FinishingConfig {
    fn default() -> Self {
        Self {
            treble_db: -3.0,
            treble_hz: 10000,
            norm_db: -32.0,
            bit_depth: 24,
        }
    }
}

/// Playback device and its calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub mixer: MixerControl,
    pub player: String,
    /// ALSA PCM the render is played on
    pub playback_device: String,
    /// One entry per physical channel
    pub calibration: Vec<ChannelCalibration>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut calibration = vec![ChannelCalibration::on(127); 10];
        calibration.extend(vec![ChannelCalibration::on(122); 10]);

        Self {
            mixer: MixerControl::default(),
            player: "aplay".to_string(),
            playback_device: "hw:CARD=UMC1820,DEV=0".to_string(),
            calibration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub cmake: String,
    pub make: String,
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cmake: "cmake".to_string(),
            make: "make".to_string(),
            jobs: 55,
        }
    }
}

/// Stereo fold of the wave field for checking a render without the rig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub norm_db: f32,
    /// `None` plays on the system default device
    pub playback_device: Option<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            norm_db: -22.0,
            playback_device: None,
        }
    }
}

/// Complete configuration of a render
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub paths: PathsConfig,
    pub input: InputConfig,
    pub layout: LayoutConfig,
    pub finishing: FinishingConfig,
    pub device: DeviceConfig,
    pub build: BuildConfig,
    pub preview: PreviewConfig,
}

impl RenderConfig {
    /// Load a JSON configuration; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| UpmixError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config = serde_json::from_str(&content).map_err(|e| UpmixError::InvalidConfig {
            reason: format!("{}: {}", path.display(), e),
        })?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `UPMIX_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.paths.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_BUILD_DIR) {
            self.paths.build_dir = PathBuf::from(dir);
        }
        if let Some(card) = lookup(ENV_CARD) {
            self.device.mixer.card = card;
        }
        if let Some(device) = lookup(ENV_PLAYBACK_DEVICE) {
            self.device.playback_device = device;
        }
    }

    /// The validated remap from synthesis to physical channels
    pub fn remap_matrix(&self) -> Result<RemapMatrix> {
        let matrix = RemapMatrix::from_remix(self.layout.synthesis_channels, &self.layout.remix)?;
        if matrix.outputs() != self.layout.physical_channels {
            return Err(UpmixError::InvalidRemap {
                reason: format!(
                    "layout has {} outputs but the interface has {} channels",
                    matrix.outputs(),
                    self.layout.physical_channels
                ),
            });
        }
        Ok(matrix)
    }

    /// The validated calibration profile
    pub fn calibration_profile(&self) -> Result<CalibrationProfile> {
        CalibrationProfile::new(
            self.device.calibration.clone(),
            self.layout.physical_channels,
        )
    }

    /// Check every cross-field invariant before any stage runs.
    ///
    /// # Errors
    /// * `InvalidConfig` - On zero channel counts, zero jobs or an
    ///   unsupported bit depth
    /// * `InvalidRemap` - If the remix layout is invalid for N and M
    /// * `CalibrationFailed` - If the profile length differs from M
    pub fn validate(&self) -> Result<()> {
        if self.layout.synthesis_channels == 0 || self.layout.physical_channels == 0 {
            return Err(UpmixError::InvalidConfig {
                reason: "channel counts must be at least 1".to_string(),
            });
        }
        if self.layout.synthesis_channels > u16::MAX as usize
            || self.layout.physical_channels > u16::MAX as usize
        {
            return Err(UpmixError::InvalidConfig {
                reason: "channel counts exceed the WAV format limit".to_string(),
            });
        }
        if self.build.jobs == 0 {
            return Err(UpmixError::InvalidConfig {
                reason: "build.jobs must be at least 1".to_string(),
            });
        }
        if self.input.sample_rate == 0 {
            return Err(UpmixError::InvalidConfig {
                reason: "input.sample_rate must be positive".to_string(),
            });
        }
        for (key, bits) in [
            ("input.bit_depth", self.input.bit_depth),
            ("finishing.bit_depth", self.finishing.bit_depth),
        ] {
            if !matches!(bits, 16 | 24 | 32) {
                return Err(UpmixError::InvalidConfig {
                    reason: format!("{} must be 16, 24 or 32, got {}", key, bits),
                });
            }
        }
        if let Some(duration) = self.input.duration_secs {
            if duration.is_nan() || duration <= 0.0 {
                return Err(UpmixError::InvalidConfig {
                    reason: format!("input.duration_secs must be positive, got {}", duration),
                });
            }
        }

        self.remap_matrix()?;
        self.calibration_profile()?.commands(&self.device.mixer)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
