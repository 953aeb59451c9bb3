//! Stage descriptors
//!
//! A pipeline is data: an ordered list of immutable [`Stage`]s, each binding
//! an action to the artifacts it reads and the one it writes. Artifact
//! bindings are declared inside command templates, so the dependency graph
//! is derived from the same place the command line is.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::{CalibrationProfile, MixerControl};
use crate::error::{Result, UpmixError};
use crate::pipeline::artifact::{ArtifactName, ArtifactStore};
use crate::pipeline::executable::CommandLine;
use crate::remap::RemapMatrix;

/// Broad stage category, used to classify failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Produces the native executables
    Build,
    /// Reads and writes audio artifacts
    Transform,
    /// Configures the playback device
    Calibrate,
    /// Sends the final artifact to the device
    Playback,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Build => "build",
            StageKind::Transform => "transform",
            StageKind::Calibrate => "calibrate",
            StageKind::Playback => "playback",
        };
        f.write_str(name)
    }
}

/// One argument of a command template
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Literal(String),
    Input(ArtifactName),
    Output(ArtifactName),
}

/// A command with artifact placeholders, resolved per run
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<Arg>,
    cwd: Option<PathBuf>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Literal(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|a| Arg::Literal(a.into())));
        self
    }

    pub fn input(mut self, name: ArtifactName) -> Self {
        self.args.push(Arg::Input(name));
        self
    }

    pub fn output(mut self, name: ArtifactName) -> Self {
        self.args.push(Arg::Output(name));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn inputs(&self) -> Vec<ArtifactName> {
        let mut seen = Vec::new();
        for arg in &self.args {
            if let Arg::Input(name) = arg {
                if !seen.contains(name) {
                    seen.push(*name);
                }
            }
        }
        seen
    }

    pub fn outputs(&self) -> Vec<ArtifactName> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                Arg::Output(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Substitute artifact paths from the store
    pub fn resolve(&self, store: &ArtifactStore) -> Result<CommandLine> {
        let mut command = CommandLine::new(self.program.clone());
        for arg in &self.args {
            let resolved = match arg {
                Arg::Literal(text) => text.clone(),
                Arg::Input(name) | Arg::Output(name) => {
                    store.path(*name)?.to_string_lossy().into_owned()
                }
            };
            command.args.push(resolved);
        }
        command.cwd = self.cwd.clone();
        Ok(command)
    }
}

/// Device calibration bound to a mixer
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStep {
    pub profile: CalibrationProfile,
    pub mixer: MixerControl,
}

/// What a stage does when invoked
#[derive(Debug, Clone, PartialEq)]
pub enum StageAction {
    /// Run an external command
    Command(CommandTemplate),
    /// Copy the source recording into the working directory
    Import { source: PathBuf },
    /// Apply a remap matrix in-process
    Remap {
        matrix: RemapMatrix,
        from: ArtifactName,
    },
    /// Apply a calibration profile to the device
    Calibrate(CalibrationStep),
}

/// One step of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    label: String,
    kind: StageKind,
    action: StageAction,
    inputs: Vec<ArtifactName>,
    output: Option<ArtifactName>,
}

impl Stage {
    /// External command stage; inputs and output come from the template.
    ///
    /// # Errors
    /// * `InvalidPipeline` - If the template writes more than one artifact
    pub fn command(label: impl Into<String>, kind: StageKind, template: CommandTemplate) -> Result<Self> {
        let label = label.into();
        let outputs = template.outputs();
        if outputs.len() > 1 {
            return Err(UpmixError::InvalidPipeline {
                reason: format!("stage '{}' writes {} artifacts", label, outputs.len()),
            });
        }

        Ok(Self {
            label,
            kind,
            inputs: template.inputs(),
            output: outputs.first().copied(),
            action: StageAction::Command(template),
        })
    }

    /// Copy the external source recording into `output`
    pub fn import(label: impl Into<String>, source: impl Into<PathBuf>, output: ArtifactName) -> Self {
        Self {
            label: label.into(),
            kind: StageKind::Transform,
            action: StageAction::Import {
                source: source.into(),
            },
            inputs: Vec::new(),
            output: Some(output),
        }
    }

    /// In-process remap of `from` into `to`
    pub fn remap(label: impl Into<String>, matrix: RemapMatrix, from: ArtifactName, to: ArtifactName) -> Self {
        Self {
            label: label.into(),
            kind: StageKind::Transform,
            action: StageAction::Remap { matrix, from },
            inputs: vec![from],
            output: Some(to),
        }
    }

    pub fn calibrate(label: impl Into<String>, profile: CalibrationProfile, mixer: MixerControl) -> Self {
        Self {
            label: label.into(),
            kind: StageKind::Calibrate,
            action: StageAction::Calibrate(CalibrationStep { profile, mixer }),
            inputs: Vec::new(),
            output: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn action(&self) -> &StageAction {
        &self.action
    }

    pub fn inputs(&self) -> &[ArtifactName] {
        &self.inputs
    }

    pub fn output(&self) -> Option<ArtifactName> {
        self.output
    }

    /// Human-readable description of what the stage will do
    pub fn describe(&self, store: &ArtifactStore) -> Result<Vec<String>> {
        let lines = match &self.action {
            StageAction::Command(template) => vec![template.resolve(store)?.to_string()],
            StageAction::Import { source } => vec![format!(
                "copy {} -> {}",
                source.display(),
                self.output_path(store)?.display()
            )],
            StageAction::Remap { matrix, from } => vec![format!(
                "remap {} -> {} ({} -> {} channels: {})",
                store.path(*from)?.display(),
                self.output_path(store)?.display(),
                matrix.inputs(),
                matrix.outputs(),
                matrix
            )],
            StageAction::Calibrate(step) => step
                .profile
                .commands(&step.mixer)?
                .iter()
                .map(ToString::to_string)
                .collect(),
        };
        Ok(lines)
    }

    fn output_path(&self, store: &ArtifactStore) -> Result<PathBuf> {
        match self.output {
            Some(name) => store.path(name),
            None => Err(UpmixError::InvalidPipeline {
                reason: format!("stage '{}' has no output", self.label),
            }),
        }
    }
}

/// A validated, ordered list of stages
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Validate artifact wiring.
    ///
    /// # Errors
    /// * `InvalidPipeline` - If a stage reads an artifact no earlier stage
    ///   produced, writes one an earlier stage already produced, or two
    ///   stages share a label
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        let mut produced = HashSet::new();
        let mut labels = HashSet::new();

        for stage in &stages {
            if !labels.insert(stage.label.as_str()) {
                return Err(UpmixError::InvalidPipeline {
                    reason: format!("duplicate stage label '{}'", stage.label),
                });
            }

            if let Some(missing) = stage.inputs.iter().find(|name| !produced.contains(*name)) {
                return Err(UpmixError::InvalidPipeline {
                    reason: format!(
                        "stage '{}' reads '{}' before any stage produces it",
                        stage.label, missing
                    ),
                });
            }

            if let Some(output) = stage.output {
                if !produced.insert(output) {
                    return Err(UpmixError::InvalidPipeline {
                        reason: format!(
                            "stage '{}' overwrites '{}' produced by an earlier stage",
                            stage.label, output
                        ),
                    });
                }
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Source recording the import stage copies in
    pub fn source(&self) -> Option<&Path> {
        self.stages.iter().find_map(|stage| match &stage.action {
            StageAction::Import { source } => Some(source.as_path()),
            _ => None,
        })
    }

    /// Artifacts written by the pipeline, in production order
    pub fn produced(&self) -> Vec<ArtifactName> {
        self.stages.iter().filter_map(Stage::output).collect()
    }

    /// Check that every artifact the pipeline touches is declared
    pub fn check_declared(&self, store: &ArtifactStore) -> Result<()> {
        for stage in &self.stages {
            for name in stage.inputs.iter().chain(stage.output.iter()) {
                store.spec(*name)?;
            }
        }
        Ok(())
    }
}
