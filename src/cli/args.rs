//! CLI argument parsing with clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::style::TransitionStyle;

/// Merge video clips with animated transitions between them
#[derive(Parser, Debug)]
#[command(name = "transition-chain")]
#[command(version, about = "Chain video clips with rendered transitions", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge two clips with one transition
    Pair(PairArgs),
    /// Merge every clip in a directory, in name order
    Batch(BatchArgs),
    /// Print frame rate, duration and frame count of media files
    Probe {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PairArgs {
    /// First clip
    pub clip_a: PathBuf,

    /// Second clip
    pub clip_b: PathBuf,

    /// Output file (default from config: final_output.mp4)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Transition length in frames (default from config: 30)
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub num_frames: Option<u32>,

    /// Transition style
    #[arg(long, short, value_enum, default_value_t = TransitionStyle::Translation)]
    pub animation: TransitionStyle,

    /// Overwrite the output without asking
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BatchArgs {
    /// Directory containing the clips
    pub dir: PathBuf,

    /// Output file (default from config: final_output.mp4)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Transition length in frames (default from config: 40)
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub num_frames: Option<u32>,

    /// First style of the rotation
    #[arg(long, value_enum, default_value_t = TransitionStyle::Rotation)]
    pub start_style: TransitionStyle,

    /// Use one style for every transition instead of rotating
    #[arg(long, value_enum, conflicts_with = "start_style")]
    pub fixed_style: Option<TransitionStyle>,

    /// Overwrite the output without asking
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
