//! Render Pipeline
//!
//! Stage descriptors, the artifact store they hand files through, the
//! invoker that runs one stage and the orchestrator that runs them all.

pub mod artifact;
pub mod definition;
pub mod executable;
pub mod invoker;
pub mod manifest;
pub mod orchestrator;
pub mod stage;
pub mod toolchain;

pub use artifact::{ArtifactName, ArtifactSpec, ArtifactStore};
pub use definition::{artifact_store, pipeline_for, preview_pipeline, render_pipeline, RenderOptions};
pub use executable::{CommandLine, ProcessExit, StageExecutable, SystemExecutable};
pub use invoker::{StageInvoker, StageOutcome};
pub use manifest::{ArtifactRecord, RunManifest, RunOutcome, StageRecord, StageStatus};
pub use orchestrator::{plan, render, render_with, Orchestrator, PlannedStage};
pub use stage::{CommandTemplate, Pipeline, Stage, StageAction, StageKind};
pub use toolchain::Toolchain;
