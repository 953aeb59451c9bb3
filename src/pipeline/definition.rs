//! Render pipeline definitions
//!
//! Turns a [`RenderConfig`] into the artifact declarations and the ordered
//! stage list of a render. Nothing here runs a command.

use std::path::Path;

use crate::config::{RemapBackend, RenderConfig};
use crate::engine::SampleEncoding;
use crate::error::Result;
use crate::pipeline::artifact::{ArtifactName, ArtifactSpec, ArtifactStore};
use crate::pipeline::stage::{CommandTemplate, Pipeline, Stage, StageKind};
use crate::pipeline::toolchain::Toolchain;
use crate::remap::RemapMatrix;

/// Switches that change which stages a render includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Omit configure and compile; the binaries must already exist
    pub skip_build: bool,
    /// Stop after the last transform; calibration is skipped too
    pub no_play: bool,
    /// Fold the wave field to stereo instead of rendering for the rig
    pub preview: bool,
    /// Check every artifact against its declared format
    pub verify: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            skip_build: false,
            no_play: false,
            preview: false,
            verify: true,
        }
    }
}

/// Declare every artifact with the format its producer promises
pub fn artifact_store(config: &RenderConfig) -> ArtifactStore {
    let synthesis = config.layout.synthesis_channels as u16;
    let physical = config.layout.physical_channels as u16;
    let mut store = ArtifactStore::new(&config.paths.work_dir);

    store
        .declare(ArtifactSpec::opaque(ArtifactName::Input))
        .declare(
            ArtifactSpec::opaque(ArtifactName::DownDry)
                .with_channels(2)
                .with_sample_rate(config.input.sample_rate)
                .with_format(config.input.bit_depth, SampleEncoding::Int),
        )
        .declare(ArtifactSpec::opaque(ArtifactName::Wavefield).with_channels(synthesis))
        .declare(
            ArtifactSpec::opaque(ArtifactName::Remapped)
                .with_channels(physical)
                .with_format(32, SampleEncoding::Float),
        )
        .declare(ArtifactSpec::opaque(ArtifactName::DriverCorrected).with_channels(physical))
        .declare(
            ArtifactSpec::opaque(ArtifactName::Normalized)
                .with_channels(physical)
                .with_format(config.finishing.bit_depth, SampleEncoding::Int),
        )
        .declare(ArtifactSpec::opaque(ArtifactName::StereoPreview).with_channels(2));

    store
}

/// Pipeline for the given options
pub fn pipeline_for(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<Pipeline> {
    if options.preview {
        preview_pipeline(source, config, options)
    } else {
        render_pipeline(source, config, options)
    }
}

/// build, prepare-input, synthesize, remap, correct, normalize, calibrate, play
pub fn render_pipeline(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<Pipeline> {
    let toolchain = Toolchain::new(&config.paths.build_dir);
    let matrix = config.remap_matrix()?;
    let mut stages = leading_stages(source, config, options, &toolchain)?;

    stages.push(remap_stage(config, matrix)?);
    stages.push(Stage::command(
        "correct",
        StageKind::Transform,
        CommandTemplate::new(program(&toolchain.driver_model()))
            .input(ArtifactName::Remapped)
            .output(ArtifactName::DriverCorrected),
    )?);
    stages.push(Stage::command(
        "normalize",
        StageKind::Transform,
        CommandTemplate::new(config.paths.sox.as_str())
            .input(ArtifactName::DriverCorrected)
            .arg("-b")
            .arg(config.finishing.bit_depth.to_string())
            .output(ArtifactName::Normalized)
            .arg("treble")
            .arg(config.finishing.treble_db.to_string())
            .arg(config.finishing.treble_hz.to_string())
            .arg("norm")
            .arg(config.finishing.norm_db.to_string()),
    )?);

    if !options.no_play {
        stages.push(Stage::calibrate(
            "calibrate",
            config.calibration_profile()?,
            config.device.mixer.clone(),
        ));
        stages.push(Stage::command(
            "play",
            StageKind::Playback,
            CommandTemplate::new(config.device.player.as_str())
                .arg("-D")
                .arg(config.device.playback_device.as_str())
                .input(ArtifactName::Normalized),
        )?);
    }

    Pipeline::new(stages)
}

/// build, prepare-input, synthesize, fold to stereo, play on the default device
pub fn preview_pipeline(source: &Path, config: &RenderConfig, options: &RenderOptions) -> Result<Pipeline> {
    let toolchain = Toolchain::new(&config.paths.build_dir);
    let fold = RemapMatrix::downmix(config.layout.synthesis_channels, 2)?;
    let mut stages = leading_stages(source, config, options, &toolchain)?;

    stages.push(Stage::command(
        "fold",
        StageKind::Transform,
        CommandTemplate::new(config.paths.sox.as_str())
            .input(ArtifactName::Wavefield)
            .output(ArtifactName::StereoPreview)
            .arg("remix")
            .args(fold.to_remix_args())
            .arg("norm")
            .arg(config.preview.norm_db.to_string()),
    )?);

    if !options.no_play {
        let mut play = CommandTemplate::new(config.device.player.as_str());
        if let Some(device) = &config.preview.playback_device {
            play = play.arg("-D").arg(device.as_str());
        }
        stages.push(Stage::command(
            "play",
            StageKind::Playback,
            play.input(ArtifactName::StereoPreview),
        )?);
    }

    Pipeline::new(stages)
}

/// Stages shared by both pipelines, up to the wave field
fn leading_stages(
    source: &Path,
    config: &RenderConfig,
    options: &RenderOptions,
    toolchain: &Toolchain,
) -> Result<Vec<Stage>> {
    let mut stages = if options.skip_build {
        Vec::new()
    } else {
        toolchain.build_stages(&config.build.cmake, &config.build.make, config.build.jobs)?
    };

    stages.push(Stage::import("import", source, ArtifactName::Input));
    stages.push(Stage::command(
        "prepare",
        StageKind::Transform,
        prepare_template(config),
    )?);
    stages.push(Stage::command(
        "synthesize",
        StageKind::Transform,
        CommandTemplate::new(program(&toolchain.synthesizer()))
            .input(ArtifactName::DownDry)
            .output(ArtifactName::Wavefield),
    )?);

    Ok(stages)
}

/// `sox input -b 24 down-dry gain -10 rate 48k trim 0 8`
fn prepare_template(config: &RenderConfig) -> CommandTemplate {
    let input = &config.input;
    let mut template = CommandTemplate::new(config.paths.sox.as_str())
        .input(ArtifactName::Input)
        .arg("-b")
        .arg(input.bit_depth.to_string())
        .output(ArtifactName::DownDry)
        .arg("gain")
        .arg(input.gain_db.to_string())
        .arg("rate")
        .arg(rate_arg(input.sample_rate));

    match input.duration_secs {
        Some(duration) => {
            template = template
                .arg("trim")
                .arg(input.trim_start_secs.to_string())
                .arg(duration.to_string());
        }
        None if input.trim_start_secs > 0.0 => {
            template = template.arg("trim").arg(input.trim_start_secs.to_string());
        }
        None => {}
    }

    template
}

fn remap_stage(config: &RenderConfig, matrix: RemapMatrix) -> Result<Stage> {
    match config.layout.backend {
        RemapBackend::Native => Ok(Stage::remap(
            "remap",
            matrix,
            ArtifactName::Wavefield,
            ArtifactName::Remapped,
        )),
        RemapBackend::Sox => Stage::command(
            "remap",
            StageKind::Transform,
            CommandTemplate::new(config.paths.sox.as_str())
                .input(ArtifactName::Wavefield)
                .args(["-e", "float", "-b", "32"])
                .output(ArtifactName::Remapped)
                .arg("remix")
                .args(matrix.to_remix_args()),
        ),
    }
}

/// Sample rate in sox's shorthand, e.g. `48k`
fn rate_arg(sample_rate: u32) -> String {
    if sample_rate % 1000 == 0 {
        format!("{}k", sample_rate / 1000)
    } else {
        sample_rate.to_string()
    }
}

fn program(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
