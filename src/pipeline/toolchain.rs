//! Native toolchain
//!
//! The synthesis and driver-correction binaries are built from the native
//! source tree before anything else runs. Their presence afterwards is a
//! precondition of every transform stage.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpmixError};
use crate::pipeline::stage::{CommandTemplate, Stage, StageKind};

/// File name of the spatial-synthesis binary inside the build directory
pub const SYNTHESIZER: &str = "revolve";
/// File name of the driver-correction binary inside the build directory
pub const DRIVER_MODEL: &str = "driver_model";

/// Locations of the native build and the binaries it produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    build_dir: PathBuf,
}

impl Toolchain {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn synthesizer(&self) -> PathBuf {
        self.build_dir.join(SYNTHESIZER)
    }

    pub fn driver_model(&self) -> PathBuf {
        self.build_dir.join(DRIVER_MODEL)
    }

    /// Configure and compile stages, run inside the build directory
    pub fn build_stages(&self, cmake: &str, make: &str, jobs: usize) -> Result<Vec<Stage>> {
        let configure = CommandTemplate::new(cmake)
            .arg("-DCMAKE_BUILD_TYPE=release")
            .arg("..")
            .current_dir(&self.build_dir);
        let compile = CommandTemplate::new(make)
            .arg(format!("-j{}", jobs.max(1)))
            .current_dir(&self.build_dir);

        Ok(vec![
            Stage::command("configure", StageKind::Build, configure)?,
            Stage::command("compile", StageKind::Build, compile)?,
        ])
    }

    /// Check that both binaries exist.
    ///
    /// # Errors
    /// * `BuildFailed` - Naming every missing binary
    pub fn check(&self) -> Result<()> {
        let missing: Vec<String> = [self.synthesizer(), self.driver_model()]
            .iter()
            .filter(|path| !path.is_file())
            .map(|path| path.display().to_string())
            .collect();

        if !missing.is_empty() {
            return Err(UpmixError::BuildFailed {
                reason: format!("missing native binaries: {}", missing.join(", ")),
                exit_code: None,
            });
        }

        debug!("toolchain present in {}", self.build_dir.display());
        Ok(())
    }
}
