//! transition-chain library crate.
//!
//! Merges an ordered list of clips into one video, replacing each boundary
//! with a transition rendered by an external tool. The binary is a thin CLI
//! over [`chain::ChainRunner`].

pub mod chain;
pub mod cli;
pub mod concat;
pub mod config;
pub mod discover;
pub mod error;
pub mod probe;
pub mod process;
pub mod style;
pub mod transition;
pub mod validate;

pub use chain::{run_chain, ChainReport, ChainRunner, StepReport};
pub use error::ChainError;
pub use style::{StylePolicy, TransitionStyle};
