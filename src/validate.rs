//! Input validation for a clip pair.

use std::path::Path;

use crate::error::ChainError;
use crate::probe::ClipProber;

/// Informational record of a clamped frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAdjustment {
    pub requested: u32,
    pub effective: u32,
    pub max_available: u64,
}

impl std::fmt::Display for FrameAdjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transition length adjusted from {} to {} frames (clips allow at most {})",
            self.requested, self.effective, self.max_available
        )
    }
}

/// Parameters that are safe to render and trim with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedPair {
    /// Lower of the two clips' frame rates.
    pub fps: f64,
    pub frame_count: u32,
    /// Lower of the two clips' total frame counts.
    pub max_available: u64,
    pub adjustment: Option<FrameAdjustment>,
}

/// Clamp `requested` into `1..=max_available`.
///
/// Returns the effective count and an adjustment when it differs from the
/// request. Applying it to its own output is a no-op.
pub fn clamp_frame_count(requested: u32, max_available: u64) -> (u32, Option<FrameAdjustment>) {
    let ceiling = u32::try_from(max_available).unwrap_or(u32::MAX);
    let effective = requested.clamp(1, ceiling.max(1));
    let adjustment = (effective != requested).then_some(FrameAdjustment {
        requested,
        effective,
        max_available,
    });
    (effective, adjustment)
}

/// Probe both clips and derive the effective fps and frame count.
pub fn validate(
    prober: &dyn ClipProber,
    clip_a: &Path,
    clip_b: &Path,
    requested_frame_count: u32,
) -> Result<ValidatedPair, ChainError> {
    let a = prober
        .probe(clip_a)
        .map_err(|e| ChainError::invalid_media(clip_a, &e))?;
    let b = prober
        .probe(clip_b)
        .map_err(|e| ChainError::invalid_media(clip_b, &e))?;

    let fps = a.frame_rate.min(b.frame_rate);
    let max_available = a.total_frames.min(b.total_frames);

    if max_available == 0 {
        let short = if a.total_frames == 0 { clip_a } else { clip_b };
        return Err(ChainError::InvalidMedia {
            path: short.to_path_buf(),
            reason: "clip is too short for a transition (0 frames)".to_string(),
        });
    }

    let (frame_count, adjustment) = clamp_frame_count(requested_frame_count, max_available);
    if let Some(adj) = &adjustment {
        log::info!("{}", adj);
    }

    Ok(ValidatedPair {
        fps,
        frame_count,
        max_available,
        adjustment,
    })
}
