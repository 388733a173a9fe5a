//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Engine oil interval tracker.
///
/// Records odometer readings, typed or photographed, and tells you how far
/// the current engine oil has run.
#[derive(Debug, Parser)]
#[command(name = "ot", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// User to act for (defaults to `default_user` from the config).
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record a typed odometer reading.
    Km(KmArgs),

    /// Record a reading from a photo of the odometer.
    Photo(PhotoArgs),

    /// Clear the oil interval and all readings.
    Reset,

    /// Show the current oil status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Talk to the tracker like a chat bot, one command per line on stdin.
    Chat,
}

#[derive(Debug, Args)]
pub struct KmArgs {
    /// Odometer value, e.g. 12345.
    #[arg(allow_hyphen_values = true)]
    pub km: String,

    /// Treat this reading as the start of fresh engine oil.
    #[arg(long)]
    pub new_oil: bool,
}

#[derive(Debug, Args)]
pub struct PhotoArgs {
    /// Image file showing the odometer.
    pub path: PathBuf,

    /// Treat this reading as the start of fresh engine oil.
    #[arg(long)]
    pub new_oil: bool,
}
