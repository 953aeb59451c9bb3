//! Run Manifest
//!
//! A JSON record of one render, written next to the artifacts whether the
//! run succeeded or not, so a failed render can be diagnosed from the
//! working directory alone.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::engine::{probe_wav, WavHeader};
use crate::error::{Result, UpmixError};
use crate::pipeline::artifact::{ArtifactName, ArtifactStore};
use crate::pipeline::invoker::StageOutcome;
use crate::pipeline::stage::{Stage, StageKind};

/// Manifest file name inside the working directory
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// Not reached because an earlier stage failed
    Skipped,
}

/// What happened to one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub label: String,
    pub kind: StageKind,
    pub status: StageStatus,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// State of one artifact file after the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: ArtifactName,
    pub path: PathBuf,
    pub exists: bool,
    #[serde(default)]
    pub header: Option<WavHeader>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Running,
    Succeeded,
    Failed {
        /// Label of the failing stage; `None` for failures outside a stage
        stage: Option<String>,
        error_code: String,
        message: String,
    },
}

/// Post-mortem record of a render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub upmix_version: String,
    pub work_dir: PathBuf,
    /// Recording the run imported
    #[serde(default)]
    pub source: Option<PathBuf>,
    pub stages: Vec<StageRecord>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
    pub outcome: RunOutcome,
}

impl RunManifest {
    /// Start a manifest with every stage pending
    pub fn begin(work_dir: &Path, source: Option<&Path>, stages: &[Stage]) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            upmix_version: env!("CARGO_PKG_VERSION").to_string(),
            work_dir: work_dir.to_path_buf(),
            source: source.map(Path::to_path_buf),
            stages: stages
                .iter()
                .map(|stage| StageRecord {
                    label: stage.label().to_string(),
                    kind: stage.kind(),
                    status: StageStatus::Skipped,
                    commands: Vec::new(),
                    exit_code: None,
                    elapsed_ms: 0,
                    error: None,
                })
                .collect(),
            artifacts: Vec::new(),
            outcome: RunOutcome::Running,
        }
    }

    pub fn record_success(&mut self, index: usize, outcome: &StageOutcome) {
        if let Some(record) = self.stages.get_mut(index) {
            record.status = StageStatus::Succeeded;
            record.commands = outcome.commands.iter().map(ToString::to_string).collect();
            record.exit_code = if outcome.commands.is_empty() { None } else { Some(0) };
            record.elapsed_ms = outcome.elapsed.as_millis() as u64;
        }
    }

    pub fn record_failure(&mut self, index: usize, error: &UpmixError) {
        if let Some(record) = self.stages.get_mut(index) {
            record.status = StageStatus::Failed;
            record.exit_code = error.process_exit_code();
            record.error = Some(error.to_string());
        }
    }

    /// Close the manifest and snapshot every declared artifact
    pub fn finish(&mut self, store: &ArtifactStore, result: std::result::Result<(), &UpmixError>) {
        self.finished_at = Some(Utc::now());
        self.artifacts = store
            .specs()
            .map(|spec| snapshot(store, spec.name))
            .collect();
        self.outcome = match result {
            Ok(()) => RunOutcome::Succeeded,
            Err(error) => RunOutcome::Failed {
                stage: self
                    .stages
                    .iter()
                    .find(|record| record.status == StageStatus::Failed)
                    .map(|record| record.label.clone()),
                error_code: error.error_code().to_string(),
                message: error.to_string(),
            },
        };
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    /// Stages that ran to completion, in order
    pub fn completed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|record| record.status == StageStatus::Succeeded)
            .map(|record| record.label.as_str())
            .collect()
    }

    pub fn artifact(&self, name: ArtifactName) -> Option<&ArtifactRecord> {
        self.artifacts.iter().find(|record| record.name == name)
    }

    pub fn path(work_dir: &Path) -> PathBuf {
        work_dir.join(MANIFEST_FILE)
    }

    /// Write to `<work_dir>/manifest.json`
    pub fn save(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.work_dir)?;
        let path = Self::path(&self.work_dir);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn load(work_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(Self::path(work_dir))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn snapshot(store: &ArtifactStore, name: ArtifactName) -> ArtifactRecord {
    let path = store.root().join(name.file_name());
    let exists = path.is_file();

    let (header, sha256) = if exists {
        let header = probe_wav(&path).ok();
        let sha256 = digest(&path).ok();
        (header, sha256)
    } else {
        (None, None)
    };

    ArtifactRecord {
        name,
        path,
        exists,
        header,
        sha256,
    }
}

/// SHA-256 of a file, streamed
fn digest(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
