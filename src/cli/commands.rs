//! Subcommand handlers for pair, batch, probe and config actions.

use std::error::Error;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use super::args::{BatchArgs, ConfigAction, PairArgs};
use crate::chain::{ChainReport, ChainRunner};
use crate::concat::FfmpegMerger;
use crate::config::{resolved_path, Config, DEFAULT_CONFIG_TOML};
use crate::discover::list_videos;
use crate::probe::{ClipProber, FfprobeProber};
use crate::style::{StylePolicy, StyleRotation};
use crate::transition::ScriptRenderer;

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Merge two clips with one fixed-style transition.
pub fn run_pair(config: &Config, args: PairArgs) -> CommandResult {
    let output = args
        .output
        .unwrap_or_else(|| config.defaults.output.clone());
    if !confirm_overwrite(&output, args.yes)? {
        return Err(format!("Not overwriting {}", output.display()).into());
    }

    let frame_count = args
        .num_frames
        .unwrap_or(config.defaults.pair_frame_count);
    let clips = [args.clip_a, args.clip_b];
    let report = run_with_config(
        config,
        &clips,
        StylePolicy::Fixed(args.animation),
        frame_count,
        &output,
    )?;
    print_report(&report);
    Ok(())
}

/// Merge every clip found in a directory.
pub fn run_batch(config: &Config, args: BatchArgs) -> CommandResult {
    let clips = list_videos(&args.dir, &config.defaults.extensions)
        .map_err(|e| format!("Failed to list {}: {}", args.dir.display(), e))?;

    println!("Found {} video files:", clips.len());
    for (i, clip) in clips.iter().enumerate() {
        println!("  {}. {}", i + 1, display_name(clip));
    }

    let policy = match args.fixed_style {
        Some(style) => StylePolicy::Fixed(style),
        None => StylePolicy::Rotate {
            start: args.start_style,
        },
    };
    let styles = planned_styles(policy, clips.len());
    if !styles.is_empty() {
        println!("Transitions: {}", styles.join(", "));
    }

    let output = args
        .output
        .unwrap_or_else(|| config.defaults.output.clone());
    if !confirm_overwrite(&output, args.yes)? {
        return Err(format!("Not overwriting {}", output.display()).into());
    }

    let frame_count = args
        .num_frames
        .unwrap_or(config.defaults.batch_frame_count);

    let report = run_with_config(config, &clips, policy, frame_count, &output)?;
    print_report(&report);
    Ok(())
}

/// Print what ffprobe reports for each file. Fails after printing if any file
/// could not be read.
pub fn run_probe(config: &Config, files: &[PathBuf]) -> CommandResult {
    let prober = FfprobeProber::new(config.encoder.ffprobe.clone());
    let mut failures = 0;

    for file in files {
        match prober.probe(file) {
            Ok(clip) => {
                println!("{}", file.display());
                println!("  Frame rate:   {:.3} fps", clip.frame_rate);
                println!("  Duration:     {:.3} s", clip.duration_secs);
                println!("  Total frames: {}", clip.total_frames);
                println!("  Resolution:   {}x{}", clip.width, clip.height);
                println!("  Audio:        {}", if clip.has_audio { "yes" } else { "no" });
            }
            Err(e) => {
                eprintln!("{}: {}", file.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} files could not be probed", failures, files.len()).into());
    }
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(
    action: ConfigAction,
    config: &Config,
    explicit_path: Option<&Path>,
) -> CommandResult {
    let config_path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(resolved_path);

    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Renderer:");
            println!("    Program: {}", config.renderer.program);
            println!(
                "    Script: {}",
                config
                    .renderer
                    .script
                    .as_ref()
                    .filter(|s| !s.as_os_str().is_empty())
                    .map(|s| s.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            );
            println!("    Max brightness: {}", config.renderer.max_brightness);
            println!("  Encoder:");
            println!("    ffmpeg: {}", config.encoder.ffmpeg);
            println!("    ffprobe: {}", config.encoder.ffprobe);
            println!(
                "    Codecs: {} / {} @ {} Hz",
                config.encoder.video_codec,
                config.encoder.audio_codec,
                config.encoder.audio_sample_rate
            );
            println!("  Defaults:");
            println!("    Pair frames: {}", config.defaults.pair_frame_count);
            println!("    Batch frames: {}", config.defaults.batch_frame_count);
            println!("    Output: {}", config.defaults.output.display());
            println!("    Extensions: {}", config.defaults.extensions.join(", "));
            println!(
                "    Work dir: {}",
                config
                    .defaults
                    .work_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "(system temp)".to_string())
            );
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'transition-chain config show' to view current settings.",
                    config_path.display()
                )
                .into());
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
                .map_err(|e| format!("Error writing config file: {}", e))?;

            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

fn run_with_config(
    config: &Config,
    clips: &[PathBuf],
    policy: StylePolicy,
    frame_count: u32,
    output: &Path,
) -> Result<ChainReport, crate::error::ChainError> {
    let prober = FfprobeProber::new(config.encoder.ffprobe.clone());
    let renderer = ScriptRenderer::new(config.renderer.clone());
    let merger = FfmpegMerger::new(config.encoder.clone());

    ChainRunner::new(&prober, &renderer, &merger)
        .with_work_dir(config.defaults.work_dir.clone())
        .run(clips, policy, frame_count, output)
}

fn print_report(report: &ChainReport) {
    for step in &report.steps {
        println!(
            "[{}/{}] {} + {} ({}, {} frames)",
            step.index,
            report.steps.len(),
            display_name(&step.left),
            display_name(&step.right),
            step.style,
            step.frame_count
        );
        if let Some(adjustment) = &step.adjustment {
            println!("      {}", adjustment);
        }
    }
    println!("{}", report.output.display());
}

/// Style tags a run over `clip_count` clips will use, in order.
fn planned_styles(policy: StylePolicy, clip_count: usize) -> Vec<&'static str> {
    StyleRotation::new(policy)
        .preview(clip_count.saturating_sub(1))
        .into_iter()
        .map(|style| style.as_str())
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ask on stdin before replacing an existing output. `yes` skips the prompt.
fn confirm_overwrite(path: &Path, yes: bool) -> std::io::Result<bool> {
    if yes || !path.exists() {
        return Ok(true);
    }
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    prompt_overwrite(path, &mut stdin.lock(), &mut stdout.lock())
}

fn prompt_overwrite(
    path: &Path,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> std::io::Result<bool> {
    write!(output, "{} already exists. Overwrite? [y/N] ", path.display())?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
