//! Upmix - Wave-Field Render Orchestrator
//!
//! Renders a two-channel recording of a live performance into a
//! multi-speaker wave field, corrects it for the amplifier and speaker rig,
//! calibrates the audio interface and plays the result.
//!
//! # Architecture
//!
//! The render is a linear pipeline of stages that hand WAV artifacts to one
//! another through a single working directory:
//! - build: the native synthesis and driver-correction binaries
//! - prepare-input, synthesize, remap, correct, normalize
//! - calibrate and play on the interface
//!
//! Every external process goes through [`pipeline::StageExecutable`], and
//! the first failing stage ends the run.

pub mod cli;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod remap;

pub use config::{RemapBackend, RenderConfig};
pub use error::{Result, UpmixError};
pub use pipeline::{render, render_with, RenderOptions, RunManifest};
pub use remap::RemapMatrix;
