//! Hardware Calibration Profile
//!
//! Per-physical-channel gain and enable state for the audio interface. The
//! profile configures the playback device, never the audio content, and is
//! applied all-or-nothing before playback: every entry is validated before a
//! single mixer command is issued, and any rejected command aborts the run.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpmixError};
use crate::pipeline::executable::{CommandLine, StageExecutable};

/// Gain and enable state for one physical output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    /// Gain in the mixer control's native units
    pub gain: u32,
    pub enabled: bool,
}

impl ChannelCalibration {
    pub fn on(gain: u32) -> Self {
        Self {
            gain,
            enabled: true,
        }
    }

    pub fn off(gain: u32) -> Self {
        Self {
            gain,
            enabled: false,
        }
    }
}

/// ALSA mixer controls of the interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerControl {
    /// Program used to drive the mixer
    pub program: String,
    /// Card index or name, as passed to `--card`
    pub card: String,
    /// Element identifier of the per-channel playback volume
    pub volume_control: String,
    /// Element identifier of the per-channel playback switch
    pub switch_control: String,
    /// Highest gain value the volume control accepts
    pub max_gain: u32,
}

impl Default for MixerControl {
    fn default() -> Self {
        Self {
            program: "amixer".to_string(),
            card: "3".to_string(),
            volume_control: "numid=3,iface=MIXER,name=UMC1820 Output Playback Volume".to_string(),
            switch_control: "numid=1,iface=MIXER,name=UMC1820 Output Playback Switch".to_string(),
            max_gain: 127,
        }
    }
}

/// Calibration for every physical output of the interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationProfile {
    channels: Vec<ChannelCalibration>,
}

impl CalibrationProfile {
    /// Build a profile for an interface with `physical_channels` outputs.
    ///
    /// # Errors
    /// * `CalibrationFailed` - If the entry count differs from the channel count
    pub fn new(channels: Vec<ChannelCalibration>, physical_channels: usize) -> Result<Self> {
        if channels.len() != physical_channels {
            return Err(UpmixError::CalibrationFailed {
                reason: format!(
                    "profile has {} entries but the interface has {} channels",
                    channels.len(),
                    physical_channels
                ),
                exit_code: None,
            });
        }

        Ok(Self { channels })
    }

    /// Same gain on every channel, all enabled
    pub fn uniform(physical_channels: usize, gain: u32) -> Self {
        Self {
            channels: vec![ChannelCalibration::on(gain); physical_channels],
        }
    }

    pub fn channels(&self) -> &[ChannelCalibration] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Render the volume and switch commands, validating every entry first.
    ///
    /// # Errors
    /// * `CalibrationFailed` - If any gain exceeds the control's range
    pub fn commands(&self, mixer: &MixerControl) -> Result<Vec<CommandLine>> {
        if let Some((index, entry)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.gain > mixer.max_gain)
        {
            return Err(UpmixError::CalibrationFailed {
                reason: format!(
                    "channel {} gain {} exceeds the control maximum {}",
                    index + 1,
                    entry.gain,
                    mixer.max_gain
                ),
                exit_code: None,
            });
        }

        let gains = self
            .channels
            .iter()
            .map(|entry| entry.gain.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let switches = self
            .channels
            .iter()
            .map(|entry| if entry.enabled { "on" } else { "off" })
            .collect::<Vec<_>>()
            .join(",");

        let cset = |control: &str, values: String| {
            CommandLine::new(mixer.program.clone())
                .args(["--card", mixer.card.as_str(), "cset", control])
                .arg(values)
        };

        Ok(vec![
            cset(&mixer.volume_control, gains),
            cset(&mixer.switch_control, switches),
        ])
    }

    /// Apply the whole profile to the device.
    ///
    /// Returns the commands issued. Stops at the first rejected command;
    /// the caller must not start playback after an error.
    pub fn apply<E: StageExecutable + ?Sized>(
        &self,
        mixer: &MixerControl,
        executable: &mut E,
    ) -> Result<Vec<CommandLine>> {
        let commands = self.commands(mixer)?;

        for command in &commands {
            info!("Executing '{}'", command);
            match executable.execute(command) {
                Ok(exit) if exit.is_success() => info!("Completed '{}'", command),
                Ok(exit) => {
                    return Err(UpmixError::CalibrationFailed {
                        reason: format!("'{}' was rejected by the device", command),
                        exit_code: exit.code(),
                    })
                }
                Err(e) => {
                    return Err(UpmixError::CalibrationFailed {
                        reason: format!("could not launch '{}': {}", command, e),
                        exit_code: None,
                    })
                }
            }
        }

        Ok(commands)
    }
}
