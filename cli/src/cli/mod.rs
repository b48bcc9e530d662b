mod history;

pub use history::HistoryCommands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the collection daemon in the foreground
    Daemon {
        /// Delete the database (and its WAL files) and exit
        #[arg(long)]
        reset_db: bool,
    },

    /// Measure display power at each brightness level (requires root)
    Calibrate {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Where to write the result (defaults to calibration.json in the config dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// View and manage collected history
    History {
        #[command(subcommand)]
        command: Option<HistoryCommands>,
    },

    /// Show or edit configuration
    Config {
        /// Print config file path
        #[arg(long)]
        path: bool,

        /// Reset config to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },

    /// Print what the telemetry readers see
    Debug,
}

/// Battery power sampling, suspend/hibernate history and display power
/// calibration for Linux laptops
#[derive(Debug, Parser)]
#[command(name = "powermon", version, verbatim_doc_comment)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}
