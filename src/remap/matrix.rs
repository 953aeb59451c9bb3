//! Channel Remap Matrix
//!
//! Declarative wiring from N logical (synthesized) channels to M physical
//! outputs. Each destination holds a set of (source, gain) routes and is
//! summed from them; a destination without routes is explicit silence.
//!
//! A matrix can only be obtained through validating constructors, so any
//! `RemapMatrix` value is safe to apply.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::{Result, UpmixError};

/// One (source, destination, gain) triple, 0-based indices, linear gain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemapEntry {
    pub source: usize,
    pub destination: usize,
    pub gain: f32,
}

impl RemapEntry {
    pub fn new(source: usize, destination: usize, gain: f32) -> Self {
        Self {
            source,
            destination,
            gain,
        }
    }

    /// Unity-gain entry
    pub fn unity(source: usize, destination: usize) -> Self {
        Self::new(source, destination, 1.0)
    }
}

/// A single contribution to a destination channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub source: usize,
    pub gain: f32,
}

/// Validated N-to-M channel mapping
#[derive(Debug, Clone, PartialEq)]
pub struct RemapMatrix {
    inputs: usize,
    routes: Vec<Vec<Route>>,
}

impl RemapMatrix {
    /// Build a matrix from entries.
    ///
    /// # Errors
    /// * `InvalidRemap` - If a channel count is zero, an index is out of
    ///   range, a gain is not finite, or a (source, destination) pair repeats
    pub fn new(
        inputs: usize,
        outputs: usize,
        entries: impl IntoIterator<Item = RemapEntry>,
    ) -> Result<Self> {
        if inputs == 0 {
            return Err(invalid("matrix needs at least one input channel"));
        }
        if outputs == 0 {
            return Err(invalid("matrix needs at least one output channel"));
        }

        let mut routes = vec![Vec::new(); outputs];
        let mut seen = HashSet::new();

        for entry in entries {
            if entry.source >= inputs {
                return Err(invalid(format!(
                    "source channel {} out of range (0..{})",
                    entry.source, inputs
                )));
            }
            if entry.destination >= outputs {
                return Err(invalid(format!(
                    "destination channel {} out of range (0..{})",
                    entry.destination, outputs
                )));
            }
            if !entry.gain.is_finite() {
                return Err(invalid(format!(
                    "gain for source {} -> destination {} is not finite",
                    entry.source, entry.destination
                )));
            }
            if !seen.insert((entry.source, entry.destination)) {
                return Err(invalid(format!(
                    "source {} feeds destination {} more than once",
                    entry.source, entry.destination
                )));
            }

            routes[entry.destination].push(Route {
                source: entry.source,
                gain: entry.gain,
            });
        }

        Ok(Self { inputs, routes })
    }

    /// Pure reordering: destination `d` takes source `order[d]` at unity gain.
    pub fn permutation(order: &[usize]) -> Result<Self> {
        let mut used = HashSet::new();
        for &source in order {
            if !used.insert(source) {
                return Err(invalid(format!(
                    "source {} appears twice in permutation",
                    source
                )));
            }
        }

        Self::new(
            order.len(),
            order.len(),
            order
                .iter()
                .enumerate()
                .map(|(destination, &source)| RemapEntry::unity(source, destination)),
        )
    }

    /// Unity routing with silent padding: one slot per destination, `None`
    /// for a silent output.
    ///
    /// Covers both interspersed padding (aligning a synthesized layout with a
    /// connector layout that has gaps) and partial coverage (driving only some
    /// of the outputs).
    pub fn from_layout(inputs: usize, layout: &[Option<usize>]) -> Result<Self> {
        Self::new(
            inputs,
            layout.len(),
            layout
                .iter()
                .enumerate()
                .filter_map(|(destination, slot)| {
                    slot.map(|source| RemapEntry::unity(source, destination))
                }),
        )
    }

    /// Fold `inputs` channels into `outputs` contiguous groups, each group
    /// averaged into one destination.
    pub fn downmix(inputs: usize, outputs: usize) -> Result<Self> {
        if outputs == 0 || outputs > inputs {
            return Err(invalid(format!(
                "cannot fold {} channels into {}",
                inputs, outputs
            )));
        }

        let mut entries = Vec::with_capacity(inputs);
        for destination in 0..outputs {
            let start = destination * inputs / outputs;
            let end = (destination + 1) * inputs / outputs;
            let gain = 1.0 / (end - start) as f32;
            entries.extend((start..end).map(|source| RemapEntry::new(source, destination, gain)));
        }

        Self::new(inputs, outputs, entries)
    }

    /// Logical (source) channel count, N
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Physical (destination) channel count, M
    pub fn outputs(&self) -> usize {
        self.routes.len()
    }

    /// Routes feeding one destination
    pub fn routes(&self, destination: usize) -> &[Route] {
        &self.routes[destination]
    }

    pub fn is_silent(&self, destination: usize) -> bool {
        self.routes[destination].is_empty()
    }

    /// Indices of destinations with no routes
    pub fn silent_outputs(&self) -> Vec<usize> {
        (0..self.outputs()).filter(|&d| self.is_silent(d)).collect()
    }

    /// All entries in destination order
    pub fn entries(&self) -> impl Iterator<Item = RemapEntry> + '_ {
        self.routes
            .iter()
            .enumerate()
            .flat_map(|(destination, routes)| {
                routes
                    .iter()
                    .map(move |route| RemapEntry::new(route.source, destination, route.gain))
            })
    }

    /// True if every destination has exactly one unity route and every
    /// source is used exactly once
    pub fn is_permutation(&self) -> bool {
        if self.inputs != self.outputs() {
            return false;
        }

        let mut used = HashSet::new();
        self.routes.iter().all(|routes| {
            matches!(routes.as_slice(), [route] if route.gain == 1.0 && used.insert(route.source))
        })
    }

    /// Inverse of a pure permutation.
    ///
    /// # Errors
    /// * `InvalidRemap` - If the matrix is not a pure permutation
    pub fn inverse(&self) -> Result<Self> {
        if !self.is_permutation() {
            return Err(invalid("only a pure permutation can be inverted"));
        }

        let mut order = vec![0; self.inputs];
        for (destination, routes) in self.routes.iter().enumerate() {
            order[routes[0].source] = destination;
        }

        Self::permutation(&order)
    }

    /// Apply the matrix to N-channel audio, producing M channels.
    ///
    /// # Errors
    /// * `ChannelMismatch` - If the input does not have exactly N channels
    pub fn apply(&self, input: &AudioBuffer) -> Result<AudioBuffer> {
        if input.num_channels() != self.inputs {
            return Err(UpmixError::ChannelMismatch {
                expected: self.inputs,
                actual: input.num_channels(),
            });
        }

        let mut output = AudioBuffer::new(self.outputs(), input.num_frames(), input.sample_rate());

        for (destination, routes) in self.routes.iter().enumerate() {
            let out = output.channel_mut(destination);
            for route in routes {
                let source = input.channel(route.source);
                for (o, &s) in out.iter_mut().zip(source) {
                    *o += route.gain * s;
                }
            }
        }

        Ok(output)
    }
}

fn invalid(reason: impl Into<String>) -> UpmixError {
    UpmixError::InvalidRemap {
        reason: reason.into(),
    }
}
