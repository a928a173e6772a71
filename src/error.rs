//! Error taxonomy for a chain run.

use std::path::PathBuf;

use crate::probe::ProbeError;
use crate::style::TransitionStyle;

/// Errors that abort a chain run. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid media '{}': {reason}", path.display())]
    InvalidMedia { path: PathBuf, reason: String },

    #[error("At least 2 clips are required to merge, got {count}")]
    InsufficientInput { count: usize },

    #[error("Transition render ({style}) failed with {status}\n{stderr}")]
    RenderFailure {
        style: TransitionStyle,
        /// Exit status of the renderer, or a description when it never ran
        status: String,
        /// Tail of the renderer's stderr
        stderr: String,
    },

    #[error("Encoding '{}' failed: {reason}", output.display())]
    EncodeError { output: PathBuf, reason: String },

    #[error("Interrupted by Ctrl+C")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    /// Wrap a probe failure for the clip at `path`.
    pub fn invalid_media(path: impl Into<PathBuf>, err: &ProbeError) -> Self {
        ChainError::InvalidMedia {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
