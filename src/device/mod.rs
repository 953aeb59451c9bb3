//! Audio Device Control
//!
//! Playback-device state applied before a render is played.

pub mod calibration;

pub use calibration::{CalibrationProfile, ChannelCalibration, MixerControl};
