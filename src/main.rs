//! Upmix CLI - wave-field render orchestrator
//!
//! Renders a stereo recording for the speaker rig and plays it.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use upmix::cli::{commands, Cli};
use upmix::UpmixError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logger
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!("Upmix v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            match e.downcast_ref::<UpmixError>() {
                Some(upmix) => {
                    for hint in upmix.recovery_suggestions() {
                        eprintln!("  hint: {}", hint);
                    }
                    ExitCode::from(upmix.exit_code())
                }
                None => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = commands::load_config(cli).context("loading configuration")?;

    if cli.print_config {
        return Ok(commands::print_config(&config)?);
    }

    let source = cli
        .source
        .as_deref()
        .context("a source recording is required")?;
    let options = commands::render_options(cli);

    if cli.dry_run {
        commands::dry_run(source, &config, &options)
            .with_context(|| format!("planning render of {}", source.display()))
    } else {
        commands::render(source, &config, &options)
            .with_context(|| format!("rendering {}", source.display()))
    }
}
