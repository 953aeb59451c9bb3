//! Artifact Store
//!
//! The fixed set of named intermediate files that stages hand to one
//! another. Each logical name resolves to a single path in the working
//! directory for the whole run.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::{probe_wav, SampleEncoding, WavHeader};
use crate::error::{Result, UpmixError};

/// Logical artifact names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactName {
    /// Verbatim copy of the source recording
    Input,
    /// Trimmed, gain-adjusted, resampled stereo input
    DownDry,
    /// N-channel output of the spatial synthesis
    Wavefield,
    /// M-channel physical layout
    Remapped,
    /// Output of the driver-correction model
    DriverCorrected,
    /// Tonally shaped, loudness-normalized final render
    Normalized,
    /// Two-channel fold of the wave field for headphone/desk preview
    StereoPreview,
}

impl ArtifactName {
    pub const ALL: [ArtifactName; 7] = [
        ArtifactName::Input,
        ArtifactName::DownDry,
        ArtifactName::Wavefield,
        ArtifactName::Remapped,
        ArtifactName::DriverCorrected,
        ArtifactName::Normalized,
        ArtifactName::StereoPreview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactName::Input => "input",
            ArtifactName::DownDry => "down-dry",
            ArtifactName::Wavefield => "wavefield",
            ArtifactName::Remapped => "remapped",
            ArtifactName::DriverCorrected => "driver-corrected",
            ArtifactName::Normalized => "normalized",
            ArtifactName::StereoPreview => "stereo-preview",
        }
    }

    /// File name inside the working directory
    pub fn file_name(&self) -> String {
        format!("{}.wav", self.as_str())
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage promises about the artifact it writes.
///
/// `None` fields are not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: ArtifactName,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u16>,
    pub encoding: Option<SampleEncoding>,
}

impl ArtifactSpec {
    /// An artifact with no format expectations
    pub fn opaque(name: ArtifactName) -> Self {
        Self {
            name,
            channels: None,
            sample_rate: None,
            bit_depth: None,
            encoding: None,
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_format(mut self, bit_depth: u16, encoding: SampleEncoding) -> Self {
        self.bit_depth = Some(bit_depth);
        self.encoding = Some(encoding);
        self
    }

    /// True if at least one property is declared
    pub fn has_expectations(&self) -> bool {
        self.channels.is_some()
            || self.sample_rate.is_some()
            || self.bit_depth.is_some()
            || self.encoding.is_some()
    }

    /// Compare a header against the declaration, naming every mismatch
    pub fn check(&self, header: &WavHeader) -> std::result::Result<(), String> {
        let mut problems = Vec::new();

        if let Some(channels) = self.channels {
            if header.channels != channels {
                problems.push(format!("{} channels, expected {}", header.channels, channels));
            }
        }
        if let Some(rate) = self.sample_rate {
            if header.sample_rate != rate {
                problems.push(format!("{} Hz, expected {} Hz", header.sample_rate, rate));
            }
        }
        if let Some(bits) = self.bit_depth {
            if header.bit_depth != bits {
                problems.push(format!("{}-bit, expected {}-bit", header.bit_depth, bits));
            }
        }
        if let Some(encoding) = self.encoding {
            if header.encoding != encoding {
                problems.push(format!("{} samples, expected {}", header.encoding, encoding));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

/// Named artifact files in one working directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    specs: BTreeMap<ArtifactName, ArtifactSpec>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            specs: BTreeMap::new(),
        }
    }

    /// Declare (or redeclare) an artifact
    pub fn declare(&mut self, spec: ArtifactSpec) -> &mut Self {
        self.specs.insert(spec.name, spec);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_declared(&self, name: ArtifactName) -> bool {
        self.specs.contains_key(&name)
    }

    pub fn spec(&self, name: ArtifactName) -> Result<&ArtifactSpec> {
        self.specs
            .get(&name)
            .ok_or_else(|| UpmixError::UnknownArtifact {
                name: name.to_string(),
            })
    }

    /// Declared artifacts in pipeline order
    pub fn specs(&self) -> impl Iterator<Item = &ArtifactSpec> {
        self.specs.values()
    }

    /// Resolve a logical name to its path
    pub fn path(&self, name: ArtifactName) -> Result<PathBuf> {
        self.spec(name)?;
        Ok(self.root.join(name.file_name()))
    }

    /// Path of an input that must already exist
    pub fn require_input(&self, name: ArtifactName) -> Result<PathBuf> {
        let path = self.path(name)?;
        if !path.is_file() {
            return Err(UpmixError::MissingArtifact {
                name: name.to_string(),
                path,
            });
        }
        Ok(path)
    }

    /// Declared artifact stored at `path`, if any.
    ///
    /// Relative paths, `..` components and symlinks are resolved first, so
    /// any alias of an artifact file is recognised.
    pub fn artifact_at(&self, path: &Path) -> Option<ArtifactName> {
        let target = resolved(path);
        self.specs
            .keys()
            .copied()
            .find(|name| resolved(&self.root.join(name.file_name())) == target)
    }

    /// Make an output location ready for writing: the working directory
    /// exists and no stale file is left at the path.
    pub fn prepare_output(&self, name: ArtifactName) -> Result<PathBuf> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.root)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(path)
    }

    /// Remove every declared artifact left by a previous run.
    ///
    /// Returns the number of files removed.
    pub fn clear_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.specs.keys() {
            let path = self.root.join(name.file_name());
            if path.is_file() {
                fs::remove_file(&path)?;
                debug!("removed stale artifact {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Read an artifact's WAV header
    pub fn probe(&self, name: ArtifactName) -> Result<WavHeader> {
        let path = self.require_input(name)?;
        probe_wav(&path)
    }

    /// Check an artifact on disk against its declaration.
    ///
    /// # Errors
    /// * `MissingArtifact` - If the stage did not write the file
    /// * `ArtifactMismatch` - If the header contradicts the declaration
    pub fn verify(&self, name: ArtifactName) -> Result<()> {
        let spec = *self.spec(name)?;
        let path = self.require_input(name)?;
        if !spec.has_expectations() {
            return Ok(());
        }

        let header = probe_wav(&path)?;
        spec.check(&header)
            .map_err(|reason| UpmixError::ArtifactMismatch {
                name: name.to_string(),
                reason,
            })
    }
}

/// Canonical form of `path`; a missing file resolves through its parent
fn resolved(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(file)) => fs::canonicalize(parent)
            .map(|dir| dir.join(file))
            .unwrap_or(absolute),
        _ => absolute,
    }
}
