//! Invoking the external transition renderer.
//!
//! The renderer writes its video into its current working directory and
//! prints nothing machine readable, so the artifact is found by scanning that
//! directory for the newest video. Each render gets its own empty directory,
//! which keeps the scan unambiguous.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::RendererConfig;
use crate::error::ChainError;
use crate::process::{ProcessError, ToolProcess};
use crate::style::TransitionStyle;

/// Extensions treated as video artifacts when scanning a render directory.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "mkv", "avi", "webm", "m4v"];

/// One transition to render between two clips.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub clip_a: PathBuf,
    pub clip_b: PathBuf,
    pub style: TransitionStyle,
    /// At least 1 and no more than either clip's frame count.
    pub frame_count: u32,
}

/// Produces a transition clip for a request.
pub trait TransitionRenderer {
    /// Render into `output_dir`, which is empty and owned by this call, and
    /// return the path of the produced video.
    fn render(&self, request: &TransitionRequest, output_dir: &Path) -> Result<PathBuf, ChainError>;
}

/// Runs the renderer script as a subprocess.
#[derive(Debug, Clone)]
pub struct ScriptRenderer {
    config: RendererConfig,
}

impl ScriptRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Full argument list for `request`, excluding the program itself.
    ///
    /// Paths are made absolute because the renderer runs in its own directory.
    pub fn build_args(&self, request: &TransitionRequest) -> std::io::Result<Vec<OsString>> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(script) = self
            .config
            .script
            .as_ref()
            .filter(|s| !s.as_os_str().is_empty())
        {
            args.push(absolutize(script)?.into_os_string());
        }
        args.push("-i".into());
        args.push(absolutize(&request.clip_a)?.into_os_string());
        args.push(absolutize(&request.clip_b)?.into_os_string());
        args.push("--animation".into());
        args.push(request.style.as_str().into());
        args.push("--num_frames".into());
        args.push(request.frame_count.to_string().into());
        args.push("--max_brightness".into());
        args.push(self.config.max_brightness.to_string().into());
        args.push("-m".into());
        args.push("y".into());
        args.extend(self.config.extra_args.iter().map(OsString::from));
        Ok(args)
    }
}

impl TransitionRenderer for ScriptRenderer {
    fn render(&self, request: &TransitionRequest, output_dir: &Path) -> Result<PathBuf, ChainError> {
        let failure = |status: String, stderr: String| ChainError::RenderFailure {
            style: request.style,
            status,
            stderr,
        };

        let args = self.build_args(request)?;
        log::info!(
            "Rendering {} transition ({} frames): {} -> {}",
            request.style,
            request.frame_count,
            request.clip_a.display(),
            request.clip_b.display()
        );

        let output = ToolProcess::run(&self.config.program, &args, Some(output_dir))
            .map_err(|e: ProcessError| failure("no exit status".to_string(), e.to_string()))?;
        if !output.success() {
            return Err(failure(output.status.to_string(), output.stderr_tail()));
        }

        let artifact = latest_video_in(output_dir)?.ok_or_else(|| {
            failure(
                output.status.to_string(),
                format!("renderer produced no artifact in {}", output_dir.display()),
            )
        })?;
        log::info!("Transition rendered: {}", artifact.display());
        Ok(artifact)
    }
}

/// Newest video file in `dir` by creation time (modification time where the
/// platform does not record creation).
pub fn latest_video_in(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_video_file(&path) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let stamp = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let is_newer = match &newest {
            Some((best, _)) => stamp > *best,
            None => true,
        };
        if is_newer {
            newest = Some((stamp, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Whether `path` has one of the [`VIDEO_EXTENSIONS`].
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
