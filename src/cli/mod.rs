//! Command-line interface for splitlab.

use std::path::PathBuf;

use clap::Parser;

pub mod commands;
pub mod output;

pub use commands::Commands;

#[derive(Parser, Debug)]
#[command(
    name = "splitlab",
    version,
    about = "Sticky A/B assignment, significance testing and churn scoring"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit JSON on stdout and JSON logs on stderr
    #[arg(long, global = true, env = "SPLITLAB_ROBOT")]
    pub robot: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Explicit config file (skips global and project config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}
