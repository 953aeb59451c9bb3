//! Audio Engine Module
//!
//! Sample-level plumbing used by the orchestrator:
//! - Planar multichannel audio buffers
//! - WAV reading, writing and header probing

pub mod buffer;
pub mod io;

pub use buffer::{linear_to_db, AudioBuffer};
pub use io::{probe_wav, read_wav, write_wav, SampleEncoding, SampleSpec, WavHeader};
