//! `sox remix` notation for remap matrices
//!
//! One whitespace-separated token per output channel:
//! - `0` is a silent output
//! - `3` is input 3 (1-based); `3v0.5` at linear gain 0.5
//! - `3p-6` / `3i-6` at -6 dB power gain (`i` also inverts polarity)
//! - `1-4` expands to inputs 1 through 4
//! - comma-joined inputs are summed
//!
//! An input without an explicit volume in a group of n inputs gets 1/n, the
//! same automatic scaling sox applies by default.

use std::fmt;

use crate::error::{Result, UpmixError};
use crate::remap::matrix::{RemapEntry, RemapMatrix};

impl RemapMatrix {
    /// Parse a remix layout for `inputs` source channels.
    ///
    /// # Errors
    /// * `InvalidRemap` - On malformed tokens or any matrix invariant violation
    pub fn from_remix(inputs: usize, layout: &str) -> Result<Self> {
        let tokens = layout.split_whitespace().collect::<Vec<_>>();
        if tokens.is_empty() {
            return Err(malformed(layout, "layout names no output channels"));
        }

        let mut entries = Vec::new();
        for (destination, token) in tokens.iter().enumerate() {
            if *token == "0" {
                continue;
            }

            let mut group = Vec::new();
            for part in token.split(',') {
                parse_part(part, inputs, &mut group).map_err(|reason| malformed(token, &reason))?;
            }

            let implicit = 1.0 / group.len() as f32;
            entries.extend(group.into_iter().map(|(source, gain)| {
                RemapEntry::new(source, destination, gain.unwrap_or(implicit))
            }));
        }

        Self::new(inputs, tokens.len(), entries)
    }

    /// Remix arguments, one per output channel, with explicit gains
    pub fn to_remix_args(&self) -> Vec<String> {
        (0..self.outputs())
            .map(|destination| {
                let routes = self.routes(destination);
                if routes.is_empty() {
                    "0".to_string()
                } else {
                    routes
                        .iter()
                        .map(|route| format!("{}v{}", route.source + 1, route.gain))
                        .collect::<Vec<_>>()
                        .join(",")
                }
            })
            .collect()
    }
}

impl fmt::Display for RemapMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_remix_args().join(" "))
    }
}

/// Parse one comma-separated part into 0-based (source, explicit gain) pairs
fn parse_part(
    part: &str,
    inputs: usize,
    group: &mut Vec<(usize, Option<f32>)>,
) -> std::result::Result<(), String> {
    let split = part.find(|c: char| matches!(c, 'v' | 'p' | 'i'));
    let (channels, volume) = match split {
        Some(at) => (&part[..at], Some((&part[at..at + 1], &part[at + 1..]))),
        None => (part, None),
    };

    let gain = match volume {
        None => None,
        Some((kind, value)) => {
            let value: f32 = value
                .parse()
                .map_err(|_| format!("bad volume '{}'", value))?;
            Some(match kind {
                "v" => value,
                "p" => 10.0_f32.powf(value / 20.0),
                _ => -(10.0_f32.powf(value / 20.0)),
            })
        }
    };

    let (first, last) = match channels.split_once('-') {
        Some((a, b)) => (parse_channel(a)?, parse_channel(b)?),
        None => {
            let ch = parse_channel(channels)?;
            (ch, ch)
        }
    };
    if last < first {
        return Err(format!("descending range '{}'", channels));
    }
    if last > inputs {
        return Err(format!("input {} out of range (1..={})", last, inputs));
    }

    group.extend((first..=last).map(|ch| (ch - 1, gain)));
    Ok(())
}

fn parse_channel(text: &str) -> std::result::Result<usize, String> {
    match text.parse::<usize>() {
        Ok(0) => Err("input channels are numbered from 1".to_string()),
        Ok(ch) => Ok(ch),
        Err(_) => Err(format!("bad channel '{}'", text)),
    }
}

fn malformed(token: &str, reason: &str) -> UpmixError {
    UpmixError::InvalidRemap {
        reason: format!("'{}': {}", token, reason),
    }
}
