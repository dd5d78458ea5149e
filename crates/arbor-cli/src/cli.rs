use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: replay and inspect merges of versioned model trees",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a scenario's branches and merge right into left
    Merge(MergeArgs),
    /// Show the tree of one branch of a scenario
    Show(ShowArgs),
}

#[derive(Args)]
pub struct MergeArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,
    /// Replay the left branch first instead of ordering by tip hash
    #[arg(long)]
    pub left_first: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,
    #[arg(long, default_value = "base")]
    pub branch: Branch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Branch {
    Base,
    Left,
    Right,
}

impl Branch {
    pub fn name(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}
