//! CLI Command Implementations
//!
//! Configuration assembly and the three things the binary can do: print
//! the configuration, print a plan, or render.

use std::path::Path;

use log::info;

use crate::cli::Cli;
use crate::config::{RemapBackend, RenderConfig};
use crate::error::Result;
use crate::pipeline::{self, RenderOptions};

/// Effective configuration: defaults, then `--config`, then the
/// environment, then flags.
pub fn load_config(cli: &Cli) -> Result<RenderConfig> {
    let mut config = match &cli.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };

    config.apply_env();
    apply_flags(cli, &mut config);
    Ok(config)
}

fn apply_flags(cli: &Cli, config: &mut RenderConfig) {
    if let Some(dir) = &cli.work_dir {
        config.paths.work_dir = dir.clone();
    }
    if let Some(dir) = &cli.build_dir {
        config.paths.build_dir = dir.clone();
    }
    if cli.native_remap {
        config.layout.backend = RemapBackend::Native;
    }
}

pub fn render_options(cli: &Cli) -> RenderOptions {
    RenderOptions {
        skip_build: cli.skip_build,
        no_play: cli.no_play,
        preview: cli.preview,
        verify: !cli.no_verify,
    }
}

/// Print the effective configuration as JSON.
pub fn print_config(config: &RenderConfig) -> Result<()> {
    println!("{}", config.to_json()?);
    Ok(())
}

/// Print every stage and the commands it would run.
pub fn dry_run(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<()> {
    info!("Planning render of {}", source.display());

    let plan = pipeline::plan(source, config, options)?;
    for (i, stage) in plan.iter().enumerate() {
        println!("{:>2}. {} [{}]", i + 1, stage.label, stage.kind);
        for command in &stage.commands {
            println!("      {}", command);
        }
    }

    Ok(())
}

/// Run the render with real processes.
pub fn render(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<()> {
    info!("Rendering {}", source.display());

    let manifest = pipeline::render(source, config, options)?;

    println!("Render complete: {}", manifest.run_id);
    println!("{:-<60}", "");
    for record in manifest.artifacts.iter().filter(|a| a.exists) {
        match &record.header {
            Some(header) => println!(
                "{:<18} {:>3} ch  {:>6} Hz  {:>2}-bit {}",
                record.name, header.channels, header.sample_rate, header.bit_depth, header.encoding
            ),
            None => println!("{:<18} {}", record.name, record.path.display()),
        }
    }

    Ok(())
}
