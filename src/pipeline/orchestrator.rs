//! Pipeline Orchestrator
//!
//! Runs a validated pipeline front to back, strictly in order, one stage at
//! a time. The first failing stage ends the run; everything it and earlier
//! stages wrote stays on disk and the manifest records where it stopped.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::config::RenderConfig;
use crate::error::{Result, UpmixError};
use crate::pipeline::artifact::ArtifactStore;
use crate::pipeline::definition::{artifact_store, pipeline_for, RenderOptions};
use crate::pipeline::executable::{StageExecutable, SystemExecutable};
use crate::pipeline::invoker::StageInvoker;
use crate::pipeline::manifest::RunManifest;
use crate::pipeline::stage::{Pipeline, StageKind};
use crate::pipeline::toolchain::Toolchain;

/// One stage of a resolved plan, for dry runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub label: String,
    pub kind: StageKind,
    pub commands: Vec<String>,
}

/// Sequences stages over one artifact store
pub struct Orchestrator<E: StageExecutable> {
    executable: E,
    store: ArtifactStore,
    toolchain: Option<Toolchain>,
    verify: bool,
}

impl<E: StageExecutable> Orchestrator<E> {
    pub fn new(executable: E, store: ArtifactStore) -> Self {
        Self {
            executable,
            store,
            toolchain: None,
            verify: true,
        }
    }

    /// Require the native binaries before the first non-build stage
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    pub fn verify_artifacts(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn executable(&self) -> &E {
        &self.executable
    }

    pub fn into_executable(self) -> E {
        self.executable
    }

    /// Resolve every stage without running anything
    pub fn plan(&self, pipeline: &Pipeline) -> Result<Vec<PlannedStage>> {
        pipeline.check_declared(&self.store)?;
        self.check_source(pipeline)?;
        pipeline
            .stages()
            .iter()
            .map(|stage| {
                Ok(PlannedStage {
                    label: stage.label().to_string(),
                    kind: stage.kind(),
                    commands: stage.describe(&self.store)?,
                })
            })
            .collect()
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// The manifest is saved to the working directory either way. On error
    /// the returned error is the failing stage's; no later stage has run.
    pub fn run(&mut self, pipeline: &Pipeline) -> Result<RunManifest> {
        pipeline.check_declared(&self.store)?;
        self.check_source(pipeline)?;
        fs::create_dir_all(self.store.root())?;
        let removed = self.store.clear_stale()?;
        if removed > 0 {
            info!("Removed {} artifacts of a previous run", removed);
        }

        let mut manifest = RunManifest::begin(self.store.root(), pipeline.source(), pipeline.stages());
        let result = self.run_stages(pipeline, &mut manifest);

        manifest.finish(&self.store, result.as_ref().map(|_| ()));
        if let Err(e) = manifest.save() {
            warn!("Could not write the run manifest: {}", e);
        }

        match result {
            Ok(()) => {
                info!("Render completed in {}", self.store.root().display());
                Ok(manifest)
            }
            Err(e) => Err(e),
        }
    }

    /// The source must not be one of the files cleared at the start of a run
    fn check_source(&self, pipeline: &Pipeline) -> Result<()> {
        let Some(source) = pipeline.source() else {
            return Ok(());
        };
        match self.store.artifact_at(source) {
            Some(name) => Err(UpmixError::InvalidPipeline {
                reason: format!(
                    "source {} is the '{}' artifact of the working directory; copy it elsewhere first",
                    source.display(),
                    name
                ),
            }),
            None => Ok(()),
        }
    }

    fn run_stages(&mut self, pipeline: &Pipeline, manifest: &mut RunManifest) -> Result<()> {
        let mut toolchain_checked = false;

        for (index, stage) in pipeline.stages().iter().enumerate() {
            if let Some(toolchain) = &self.toolchain {
                if stage.kind() == StageKind::Build {
                    fs::create_dir_all(toolchain.build_dir())?;
                } else if !toolchain_checked {
                    toolchain.check()?;
                    toolchain_checked = true;
                }
            }

            info!("[{}/{}] {}", index + 1, pipeline.len(), stage.label());
            let outcome = StageInvoker::new(&mut self.executable, &self.store)
                .verify_outputs(self.verify)
                .run(stage);

            match outcome {
                Ok(outcome) => manifest.record_success(index, &outcome),
                Err(e) => {
                    manifest.record_failure(index, &e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Render `source` with the given executable.
///
/// Validates the configuration, builds the pipeline for `options` and runs
/// it over a fresh artifact store in the configured working directory.
pub fn render_with<E: StageExecutable>(
    executable: E,
    source: &Path,
    config: &RenderConfig,
    options: &RenderOptions,
) -> Result<RunManifest> {
    config.validate()?;
    let pipeline = pipeline_for(source, config, options)?;

    Orchestrator::new(executable, artifact_store(config))
        .with_toolchain(Toolchain::new(&config.paths.build_dir))
        .verify_artifacts(options.verify)
        .run(&pipeline)
}

/// Render `source` with real processes
pub fn render(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<RunManifest> {
    render_with(SystemExecutable, source, config, options)
}

/// Resolved plan of a render, without side effects
pub fn plan(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<Vec<PlannedStage>> {
    config.validate()?;
    let pipeline = pipeline_for(source, config, options)?;
    Orchestrator::new(SystemExecutable, artifact_store(config)).plan(&pipeline)
}
