use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(name = "employerfinder")]
#[command(about = "Resolve case employers against a business directory, resumably")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Verbose logging (use -v for rotations and pauses, -vv for per-search detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Append run log lines to this file (overrides paths.log_file)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Fixed seed for the rotation cadence
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Process the work list (the default)
    Run,
    /// Fill missing clean-name columns in the work list
    Prepare,
    /// Show checkpoint progress
    Status,
    /// Create the default configuration file
    Init,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
