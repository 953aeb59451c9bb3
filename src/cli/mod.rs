//! CLI Module
//!
//! Command-line interface for rendering a recording to the speaker rig.

pub mod commands;

use clap::Parser;
use std::path::PathBuf;

/// Upmix - render a stereo concert recording as a wave field and play it
#[derive(Parser, Debug)]
#[command(name = "upmix")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source recording (two-channel WAV)
    #[arg(required_unless_present = "print_config")]
    pub source: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory for intermediate artifacts
    #[arg(short, long)]
    pub work_dir: Option<PathBuf>,

    /// Native build directory
    #[arg(long)]
    pub build_dir: Option<PathBuf>,

    /// Do not rebuild the native binaries
    #[arg(long)]
    pub skip_build: bool,

    /// Stop after normalization; no calibration, no playback
    #[arg(long)]
    pub no_play: bool,

    /// Fold the wave field to stereo and play it on the default device
    #[arg(long)]
    pub preview: bool,

    /// Print the resolved commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Remap in-process instead of through sox
    #[arg(long)]
    pub native_remap: bool,

    /// Do not check artifact formats after each stage
    #[arg(long)]
    pub no_verify: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_source_is_required() {
        assert!(Cli::try_parse_from(["upmix"]).is_err());
        assert!(Cli::try_parse_from(["upmix", "--print-config"]).is_ok());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "upmix",
            "concert.wav",
            "--skip-build",
            "--no-play",
            "-w",
            "/scratch",
        ])
        .unwrap();

        assert_eq!(cli.source, Some(PathBuf::from("concert.wav")));
        assert!(cli.skip_build);
        assert!(cli.no_play);
        assert!(!cli.preview);
        assert_eq!(cli.work_dir, Some(PathBuf::from("/scratch")));
    }
}
