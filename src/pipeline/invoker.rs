//! Stage Invoker
//!
//! Runs one stage against the artifact store and turns any failure into a
//! fatal, classified error. There are no retries.

use std::fs;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::engine::{read_wav, write_wav, SampleSpec};
use crate::error::{Result, UpmixError};
use crate::pipeline::artifact::ArtifactStore;
use crate::pipeline::executable::{CommandLine, StageExecutable};
use crate::pipeline::stage::{Stage, StageAction, StageKind};

/// What a successful stage did
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Commands issued, in order; empty for in-process actions
    pub commands: Vec<CommandLine>,
    pub elapsed: Duration,
}

pub struct StageInvoker<'a, E: StageExecutable + ?Sized> {
    executable: &'a mut E,
    store: &'a ArtifactStore,
    verify: bool,
}

impl<'a, E: StageExecutable + ?Sized> StageInvoker<'a, E> {
    pub fn new(executable: &'a mut E, store: &'a ArtifactStore) -> Self {
        Self {
            executable,
            store,
            verify: true,
        }
    }

    /// Check each output against its declared format after the stage exits
    pub fn verify_outputs(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Run one stage to completion.
    ///
    /// On success the stage's output artifact exists (and matches its
    /// declaration when verification is on). On failure nothing else is
    /// touched: artifacts of earlier stages stay on disk.
    pub fn run(&mut self, stage: &Stage) -> Result<StageOutcome> {
        let start = Instant::now();

        for &input in stage.inputs() {
            self.store.require_input(input)?;
        }
        let output = stage
            .output()
            .map(|name| self.store.prepare_output(name))
            .transpose()?;

        let mut commands = Vec::new();
        match stage.action() {
            StageAction::Command(template) => {
                let command = template.resolve(self.store)?;
                self.execute(stage, &command)?;
                commands.push(command);
            }
            StageAction::Import { source } => {
                if !source.is_file() {
                    return Err(UpmixError::SourceNotFound {
                        path: source.clone(),
                    });
                }
                if let Some(path) = &output {
                    info!("Copying '{}' to '{}'", source.display(), path.display());
                    fs::copy(source, path)?;
                }
            }
            StageAction::Remap { matrix, from } => {
                let input = read_wav(&self.store.require_input(*from)?)?;
                let remapped = matrix.apply(&input)?;
                debug!(
                    "remapped {} -> {} channels, peak {:.1} dBFS",
                    matrix.inputs(),
                    matrix.outputs(),
                    remapped.peak_db()
                );
                if let Some(path) = &output {
                    write_wav(&remapped, path, SampleSpec::float32())?;
                }
            }
            StageAction::Calibrate(step) => {
                commands = step.profile.apply(&step.mixer, &mut *self.executable)?;
            }
        }

        if let (true, Some(name)) = (self.verify, stage.output()) {
            self.store.verify(name)?;
        } else if let Some(name) = stage.output() {
            self.store.require_input(name)?;
        }

        Ok(StageOutcome {
            commands,
            elapsed: start.elapsed(),
        })
    }

    fn execute(&mut self, stage: &Stage, command: &CommandLine) -> Result<()> {
        info!("Executing '{}'", command);

        match self.executable.execute(command) {
            Ok(exit) if exit.is_success() => {
                info!("Completed '{}'", command);
                Ok(())
            }
            Ok(exit) => Err(failure(stage, command, exit.code())),
            Err(source) => Err(match stage.kind() {
                StageKind::Build => UpmixError::BuildFailed {
                    reason: format!("could not launch '{}': {}", command, source),
                    exit_code: None,
                },
                _ => UpmixError::LaunchFailed {
                    stage: stage.label().to_string(),
                    command: command.to_string(),
                    source,
                },
            }),
        }
    }
}

/// Classify a non-zero exit by stage kind
fn failure(stage: &Stage, command: &CommandLine, exit_code: Option<i32>) -> UpmixError {
    match stage.kind() {
        StageKind::Build => UpmixError::BuildFailed {
            reason: format!("'{}' exited with {:?}", command, exit_code),
            exit_code,
        },
        StageKind::Calibrate => UpmixError::CalibrationFailed {
            reason: format!("'{}' was rejected by the device", command),
            exit_code,
        },
        StageKind::Transform | StageKind::Playback => UpmixError::StageFailed {
            stage: stage.label().to_string(),
            command: command.to_string(),
            exit_code,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioBuffer, SampleEncoding};
    use crate::pipeline::artifact::{ArtifactName, ArtifactSpec};
    use crate::pipeline::executable::ProcessExit;
    use crate::pipeline::stage::CommandTemplate;
    use crate::remap::RemapMatrix;
    use std::path::Path;
    use tempfile::tempdir;

    /// Exits with a fixed status and never touches the filesystem
    struct FixedExit {
        exit: std::io::Result<ProcessExit>,
        calls: usize,
    }

    impl FixedExit {
        fn code(code: i32) -> Self {
            Self {
                exit: Ok(ProcessExit::from_code(code)),
                calls: 0,
            }
        }
    }

    impl StageExecutable for FixedExit {
        fn execute(&mut self, _command: &CommandLine) -> std::io::Result<ProcessExit> {
            self.calls += 1;
            match &self.exit {
                Ok(exit) => Ok(*exit),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn store(root: &Path) -> ArtifactStore {
        let mut store = ArtifactStore::new(root);
        for name in ArtifactName::ALL {
            store.declare(ArtifactSpec::opaque(name));
        }
        store.declare(
            ArtifactSpec::opaque(ArtifactName::Remapped)
                .with_channels(4)
                .with_format(32, SampleEncoding::Float),
        );
        store
    }

    #[test]
    fn test_nonzero_exit_names_stage_and_command() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        fs::write(store.path(ArtifactName::DownDry).unwrap(), b"x").unwrap();
        let stage = Stage::command(
            "synthesize",
            StageKind::Transform,
            CommandTemplate::new("./build/revolve")
                .input(ArtifactName::DownDry)
                .output(ArtifactName::Wavefield),
        )
        .unwrap();
        let mut executable = FixedExit::code(134);

        let err = StageInvoker::new(&mut executable, &store)
            .run(&stage)
            .unwrap_err();

        match err {
            UpmixError::StageFailed {
                stage,
                command,
                exit_code,
            } => {
                assert_eq!(stage, "synthesize");
                assert!(command.starts_with("./build/revolve "));
                assert_eq!(exit_code, Some(134));
            }
            other => panic!("Expected StageFailed, got: {:?}", other),
        }
        assert_eq!(executable.calls, 1);
    }

    #[test]
    fn test_launch_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let stage = Stage::command(
            "play",
            StageKind::Playback,
            CommandTemplate::new("aplay").arg("-l"),
        )
        .unwrap();
        let mut executable = FixedExit {
            exit: Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no aplay")),
            calls: 0,
        };

        let err = StageInvoker::new(&mut executable, &store)
            .run(&stage)
            .unwrap_err();
        assert_eq!(err.error_code(), "LAUNCH_FAILED");
    }

    #[test]
    fn test_build_failure_is_classified() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let stage = Stage::command(
            "compile",
            StageKind::Build,
            CommandTemplate::new("make").arg("-j4"),
        )
        .unwrap();

        let err = StageInvoker::new(&mut FixedExit::code(2), &store)
            .run(&stage)
            .unwrap_err();
        assert!(matches!(
            err,
            UpmixError::BuildFailed {
                exit_code: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_missing_input_stops_before_execution() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let stage = Stage::command(
            "correct",
            StageKind::Transform,
            CommandTemplate::new("./build/driver_model")
                .input(ArtifactName::Remapped)
                .output(ArtifactName::DriverCorrected),
        )
        .unwrap();
        let mut executable = FixedExit::code(0);

        let err = StageInvoker::new(&mut executable, &store)
            .run(&stage)
            .unwrap_err();

        assert!(matches!(err, UpmixError::MissingArtifact { .. }));
        assert_eq!(executable.calls, 0);
    }

    #[test]
    fn test_successful_exit_without_output_file_is_fatal() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let stage = Stage::import("import", dir.path().join("source.wav"), ArtifactName::Input);
        fs::write(dir.path().join("source.wav"), b"riff").unwrap();
        StageInvoker::new(&mut FixedExit::code(0), &store)
            .run(&stage)
            .unwrap();

        let lazy = Stage::command(
            "prepare",
            StageKind::Transform,
            CommandTemplate::new("true")
                .input(ArtifactName::Input)
                .output(ArtifactName::DownDry),
        )
        .unwrap();
        let err = StageInvoker::new(&mut FixedExit::code(0), &store)
            .verify_outputs(false)
            .run(&lazy)
            .unwrap_err();
        assert!(matches!(err, UpmixError::MissingArtifact { .. }));
    }

    #[test]
    fn test_import_copies_source() {
        let dir = tempdir().unwrap();
        let store = store(&dir.path().join("work"));
        let source = dir.path().join("concert.wav");
        fs::write(&source, b"recording").unwrap();

        StageInvoker::new(&mut FixedExit::code(0), &store)
            .run(&Stage::import("import", &source, ArtifactName::Input))
            .unwrap();

        let copied = fs::read(store.path(ArtifactName::Input).unwrap()).unwrap();
        assert_eq!(copied, b"recording");
    }

    #[test]
    fn test_import_of_missing_source() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let err = StageInvoker::new(&mut FixedExit::code(0), &store)
            .run(&Stage::import("import", dir.path().join("nope.wav"), ArtifactName::Input))
            .unwrap_err();
        assert!(matches!(err, UpmixError::SourceNotFound { .. }));
    }

    #[test]
    fn test_native_remap_writes_verified_float_output() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut wavefield = AudioBuffer::new(2, 64, 48000);
        wavefield.channel_mut(0).fill(0.25);
        wavefield.channel_mut(1).fill(-0.5);
        write_wav(
            &wavefield,
            &store.path(ArtifactName::Wavefield).unwrap(),
            SampleSpec::float32(),
        )
        .unwrap();

        let matrix = RemapMatrix::from_layout(2, &[None, Some(1), None, Some(0)]).unwrap();
        let stage = Stage::remap("remap", matrix, ArtifactName::Wavefield, ArtifactName::Remapped);
        let mut executable = FixedExit::code(0);

        let outcome = StageInvoker::new(&mut executable, &store).run(&stage).unwrap();

        assert!(outcome.commands.is_empty());
        assert_eq!(executable.calls, 0);
        let remapped = read_wav(&store.path(ArtifactName::Remapped).unwrap()).unwrap();
        assert!(remapped.is_channel_silent(0));
        assert!(remapped.channel(1).iter().all(|&s| s == -0.5));
        assert!(remapped.is_channel_silent(2));
        assert!(remapped.channel(3).iter().all(|&s| s == 0.25));
    }
}
