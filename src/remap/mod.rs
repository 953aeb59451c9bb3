//! Channel Remapping
//!
//! Logical-to-physical channel wiring, validated at construction and
//! expressed either as an in-process transform or as `sox remix` arguments.

mod matrix;
mod notation;

pub use matrix::{RemapEntry, RemapMatrix, Route};
