//! Error handling for Upmix
//!
//! Every category here is fatal for a render: nothing is retried and nothing
//! is downgraded to a warning. Variants carry the failing command and its
//! exit status so the operator can find the artifacts left behind.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Upmix operations
pub type Result<T> = std::result::Result<T, UpmixError>;

/// Main error type for Upmix operations
#[derive(Error, Debug)]
pub enum UpmixError {
    // Build Errors
    #[error("Build failed: {reason}")]
    BuildFailed {
        reason: String,
        exit_code: Option<i32>,
    },

    // Stage Errors
    #[error("Stage '{stage}' failed: '{command}' exited with {}", describe_exit(.exit_code))]
    StageFailed {
        stage: String,
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Stage '{stage}' could not launch '{command}': {source}")]
    LaunchFailed {
        stage: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pipeline: {reason}")]
    InvalidPipeline { reason: String },

    // Artifact Errors
    #[error("Source recording not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Artifact '{name}' is not declared in the artifact store")]
    UnknownArtifact { name: String },

    #[error("Artifact '{name}' missing at {path}")]
    MissingArtifact { name: String, path: PathBuf },

    #[error("Artifact '{name}' does not match its declaration: {reason}")]
    ArtifactMismatch { name: String, reason: String },

    // Remap Errors
    #[error("Invalid remap matrix: {reason}")]
    InvalidRemap { reason: String },

    #[error("Channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    // Device Errors
    #[error("Device calibration failed: {reason}")]
    CalibrationFailed {
        reason: String,
        exit_code: Option<i32>,
    },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Audio Errors
    #[error("Failed to read audio file: {path}")]
    AudioRead {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write audio file: {path}")]
    AudioWrite {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl UpmixError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            UpmixError::BuildFailed { .. } => "BUILD_FAILED",
            UpmixError::StageFailed { .. } => "STAGE_FAILED",
            UpmixError::LaunchFailed { .. } => "LAUNCH_FAILED",
            UpmixError::InvalidPipeline { .. } => "INVALID_PIPELINE",
            UpmixError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            UpmixError::UnknownArtifact { .. } => "UNKNOWN_ARTIFACT",
            UpmixError::MissingArtifact { .. } => "MISSING_ARTIFACT",
            UpmixError::ArtifactMismatch { .. } => "ARTIFACT_MISMATCH",
            UpmixError::InvalidRemap { .. } => "INVALID_REMAP",
            UpmixError::ChannelMismatch { .. } => "CHANNEL_MISMATCH",
            UpmixError::CalibrationFailed { .. } => "CALIBRATION_FAILED",
            UpmixError::InvalidConfig { .. } => "INVALID_CONFIG",
            UpmixError::AudioRead { .. } => "AUDIO_READ",
            UpmixError::AudioWrite { .. } => "AUDIO_WRITE",
            UpmixError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            UpmixError::Io(_) => "IO_ERROR",
            UpmixError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Exit status reported by the failing external process, if any
    pub fn process_exit_code(&self) -> Option<i32> {
        match self {
            UpmixError::BuildFailed { exit_code, .. }
            | UpmixError::StageFailed { exit_code, .. }
            | UpmixError::CalibrationFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    ///
    /// Propagates the failing stage's status when it fits in 1..=255,
    /// otherwise 1.
    pub fn exit_code(&self) -> u8 {
        match self.process_exit_code() {
            Some(code) if (1..=255).contains(&code) => code as u8,
            _ => 1,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            UpmixError::BuildFailed { .. } => vec![
                "Check that cmake, make and the native dependencies are installed",
                "libsndfile, fftw3 and eigen3 development packages are required",
                "Run the build by hand in the build directory to see the full log",
            ],
            UpmixError::StageFailed { .. } | UpmixError::LaunchFailed { .. } => vec![
                "Artifacts from earlier stages were left in the working directory",
                "Re-run the failing command by hand to see its diagnostics",
                "Check that sox, amixer and aplay are on the PATH",
            ],
            UpmixError::InvalidRemap { .. } => vec![
                "Source indices in the remix layout are 1-based and must not exceed the synthesis channel count",
                "Each source may feed a given output only once",
            ],
            UpmixError::CalibrationFailed { .. } => vec![
                "Check the card number with 'aplay -l'",
                "List the mixer controls with 'amixer --card <n> contents'",
                "Nothing was played; the device may be partially configured",
            ],
            UpmixError::SourceNotFound { .. } => vec![
                "Check the source recording path is correct",
            ],
            UpmixError::InvalidConfig { .. } => vec![
                "Compare the configuration file against 'upmix --print-config'",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = UpmixError::InvalidRemap {
            reason: "source 17 out of range".to_string(),
        };
        assert_eq!(err.error_code(), "INVALID_REMAP");
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_stage_failure_message_names_command_and_status() {
        let err = UpmixError::StageFailed {
            stage: "synthesize".to_string(),
            command: "./build/revolve in.wav out.wav".to_string(),
            exit_code: Some(3),
        };
        let message = err.to_string();
        assert!(message.contains("synthesize"));
        assert!(message.contains("./build/revolve in.wav out.wav"));
        assert!(message.contains("status 3"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_falls_back_to_one() {
        let signalled = UpmixError::StageFailed {
            stage: "play".to_string(),
            command: "aplay".to_string(),
            exit_code: None,
        };
        assert_eq!(signalled.exit_code(), 1);

        let out_of_range = UpmixError::BuildFailed {
            reason: "make".to_string(),
            exit_code: Some(-2),
        };
        assert_eq!(out_of_range.exit_code(), 1);

        let config = UpmixError::InvalidConfig {
            reason: "no channels".to_string(),
        };
        assert_eq!(config.exit_code(), 1);
    }
}
