//! Transition styles and the rotation cursor used across a chain run.

use clap::ValueEnum;
use serde::Deserialize;

/// Animated transition styles understood by the renderer.
///
/// Declaration order is the rotation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum TransitionStyle {
    #[default]
    Rotation,
    RotationInv,
    ZoomIn,
    ZoomOut,
    Translation,
    TranslationInv,
    LongTranslation,
    LongTranslationInv,
}

impl TransitionStyle {
    /// All styles in rotation order.
    pub const ALL: [TransitionStyle; 8] = [
        TransitionStyle::Rotation,
        TransitionStyle::RotationInv,
        TransitionStyle::ZoomIn,
        TransitionStyle::ZoomOut,
        TransitionStyle::Translation,
        TransitionStyle::TranslationInv,
        TransitionStyle::LongTranslation,
        TransitionStyle::LongTranslationInv,
    ];

    /// Tag passed to the renderer's `--animation` flag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStyle::Rotation => "rotation",
            TransitionStyle::RotationInv => "rotation_inv",
            TransitionStyle::ZoomIn => "zoom_in",
            TransitionStyle::ZoomOut => "zoom_out",
            TransitionStyle::Translation => "translation",
            TransitionStyle::TranslationInv => "translation_inv",
            TransitionStyle::LongTranslation => "long_translation",
            TransitionStyle::LongTranslationInv => "long_translation_inv",
        }
    }

    fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|style| style == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How styles are picked for successive chain steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylePolicy {
    /// Every step uses the same style.
    Fixed(TransitionStyle),
    /// Cycle through [`TransitionStyle::ALL`] beginning at `start`.
    Rotate { start: TransitionStyle },
}

impl Default for StylePolicy {
    fn default() -> Self {
        StylePolicy::Rotate {
            start: TransitionStyle::Rotation,
        }
    }
}

/// Stateful cursor over the style list. One per chain run.
#[derive(Debug, Clone)]
pub struct StyleRotation {
    policy: StylePolicy,
    position: usize,
}

impl StyleRotation {
    pub fn new(policy: StylePolicy) -> Self {
        let position = match policy {
            StylePolicy::Fixed(style) => style.index(),
            StylePolicy::Rotate { start } => start.index(),
        };
        Self { policy, position }
    }

    /// Style for the next step; advances the cursor when rotating.
    pub fn next_style(&mut self) -> TransitionStyle {
        let style = TransitionStyle::ALL[self.position];
        if let StylePolicy::Rotate { .. } = self.policy {
            self.position = (self.position + 1) % TransitionStyle::ALL.len();
        }
        style
    }

    /// The styles the next `steps` calls would yield, without advancing.
    pub fn preview(&self, steps: usize) -> Vec<TransitionStyle> {
        let mut copy = self.clone();
        (0..steps).map(|_| copy.next_style()).collect()
    }
}
