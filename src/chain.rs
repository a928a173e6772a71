//! Chain orchestration: merging N clips with N-1 transitions.
//!
//! Steps run strictly one after another. The left input of each step is the
//! previous step's output; intermediates live in a scoped run directory and
//! are deleted as soon as they stop being an input, and unconditionally when
//! the run ends.

use std::fs;
use std::path::{Path, PathBuf};

use crate::concat::{ClipMerger, MergeRequest};
use crate::error::ChainError;
use crate::probe::ClipProber;
use crate::process::ctrlc_received;
use crate::style::{StylePolicy, StyleRotation, TransitionStyle};
use crate::transition::{TransitionRenderer, TransitionRequest};
use crate::validate::{validate, FrameAdjustment};

/// Record of one completed pairwise step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// 1-based step number.
    pub index: usize,
    pub left: PathBuf,
    pub right: PathBuf,
    pub style: TransitionStyle,
    pub frame_count: u32,
    pub fps: f64,
    pub adjustment: Option<FrameAdjustment>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    pub output: PathBuf,
    pub steps: Vec<StepReport>,
}

impl ChainReport {
    pub fn adjustments(&self) -> impl Iterator<Item = &FrameAdjustment> {
        self.steps.iter().filter_map(|s| s.adjustment.as_ref())
    }
}

/// Paths to delete when a run ends. Deletion is best effort.
#[derive(Debug, Default)]
pub struct TempRegistry {
    paths: Vec<PathBuf>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete one tracked path now and stop tracking it.
    pub fn release(&mut self, path: &Path) {
        if let Some(pos) = self.paths.iter().position(|p| p == path) {
            let path = self.paths.remove(pos);
            remove_quietly(&path);
        }
    }

    /// Delete every tracked path, newest first.
    pub fn cleanup(&mut self) {
        while let Some(path) = self.paths.pop() {
            remove_quietly(&path);
        }
    }
}

impl Drop for TempRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_quietly(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => log::debug!("Deleted temporary {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to delete temporary {}: {}", path.display(), e),
    }
}

/// Runs a chain with the given collaborators.
pub struct ChainRunner<'a> {
    prober: &'a dyn ClipProber,
    renderer: &'a dyn TransitionRenderer,
    merger: &'a dyn ClipMerger,
    work_dir: Option<PathBuf>,
}

impl<'a> ChainRunner<'a> {
    pub fn new(
        prober: &'a dyn ClipProber,
        renderer: &'a dyn TransitionRenderer,
        merger: &'a dyn ClipMerger,
    ) -> Self {
        Self {
            prober,
            renderer,
            merger,
            work_dir: None,
        }
    }

    /// Create run directories under `dir` instead of the system temp directory.
    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    /// Merge `clips` in order into `final_output`.
    ///
    /// All-or-nothing: on failure nothing is written to `final_output` and
    /// every intermediate is removed.
    pub fn run(
        &self,
        clips: &[PathBuf],
        policy: StylePolicy,
        frame_count: u32,
        final_output: &Path,
    ) -> Result<ChainReport, ChainError> {
        if clips.len() < 2 {
            return Err(ChainError::InsufficientInput { count: clips.len() });
        }

        let parent = match &self.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };
        let run_dir = tempfile::Builder::new()
            .prefix("transition-chain-")
            .tempdir_in(&parent)?;
        log::debug!("Run directory: {}", run_dir.path().display());

        let mut temps = TempRegistry::new();
        let result = self
            .run_steps(clips, policy, frame_count, run_dir.path(), &mut temps)
            .and_then(|(staged, steps)| {
                publish(&staged, final_output)?;
                Ok(ChainReport {
                    output: final_output.to_path_buf(),
                    steps,
                })
            });

        temps.cleanup();
        let run_dir_path = run_dir.path().to_path_buf();
        if let Err(e) = run_dir.close() {
            log::warn!(
                "Failed to remove run directory {}: {}",
                run_dir_path.display(),
                e
            );
        }

        result
    }

    fn run_steps(
        &self,
        clips: &[PathBuf],
        policy: StylePolicy,
        frame_count: u32,
        run_dir: &Path,
        temps: &mut TempRegistry,
    ) -> Result<(PathBuf, Vec<StepReport>), ChainError> {
        let mut cursor = StyleRotation::new(policy);
        let mut steps = Vec::with_capacity(clips.len() - 1);
        let extension = output_extension(clips);

        let mut current_left = clips[0].clone();

        for (index, right) in clips.iter().enumerate().skip(1) {
            if ctrlc_received() {
                return Err(ChainError::Interrupted);
            }

            let pair = validate(self.prober, &current_left, right, frame_count)?;
            let style = cursor.next_style();
            log::info!(
                "Step {}/{}: {} + {} with {} ({} frames @ {:.3} fps)",
                index,
                clips.len() - 1,
                current_left.display(),
                right.display(),
                style,
                pair.frame_count,
                pair.fps
            );

            let render_dir = run_dir.join(format!("render-{:03}", index));
            fs::create_dir(&render_dir)?;
            temps.track(&render_dir);

            let request = TransitionRequest {
                clip_a: current_left.clone(),
                clip_b: right.clone(),
                style,
                frame_count: pair.frame_count,
            };
            let transition = self.renderer.render(&request, &render_dir)?;
            if !transition.starts_with(&render_dir) {
                temps.track(&transition);
            }

            let output = if index == clips.len() - 1 {
                run_dir.join(format!("final.{}", extension))
            } else {
                run_dir.join(format!("merged-{:03}.{}", index, extension))
            };
            temps.track(&output);

            self.merger.merge(&MergeRequest {
                clip_a: current_left.clone(),
                clip_b: right.clone(),
                transition: transition.clone(),
                frame_count: pair.frame_count,
                fps: pair.fps,
                output: output.clone(),
            })?;

            // Inputs of this step that we own are no longer needed
            temps.release(&transition);
            temps.release(&render_dir);
            if temps.is_tracked(&current_left) {
                temps.release(&current_left);
            }

            steps.push(StepReport {
                index,
                left: current_left,
                right: right.clone(),
                style,
                frame_count: pair.frame_count,
                fps: pair.fps,
                adjustment: pair.adjustment,
            });
            current_left = output;
        }

        Ok((current_left, steps))
    }
}

/// Convenience wrapper around [`ChainRunner::run`].
pub fn run_chain(
    prober: &dyn ClipProber,
    renderer: &dyn TransitionRenderer,
    merger: &dyn ClipMerger,
    clips: &[PathBuf],
    policy: StylePolicy,
    frame_count: u32,
    final_output: &Path,
) -> Result<ChainReport, ChainError> {
    ChainRunner::new(prober, renderer, merger).run(clips, policy, frame_count, final_output)
}

/// Extension for intermediates, taken from the first clip.
fn output_extension(clips: &[PathBuf]) -> String {
    clips
        .first()
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("mp4")
        .to_string()
}

/// Move the staged result to its final location.
fn publish(staged: &Path, final_output: &Path) -> std::io::Result<()> {
    if let Some(parent) = final_output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if fs::rename(staged, final_output).is_err() {
        // Different filesystem
        fs::copy(staged, final_output)?;
        fs::remove_file(staged)?;
    }
    log::info!("Final video written to {}", final_output.display());
    Ok(())
}
