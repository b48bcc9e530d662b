mod calibration;
mod cli;
mod commands;
mod config;
mod daemon;
mod data;
mod logging;

use clap::Parser;
use color_eyre::eyre::Result;

use cli::{Cli, Commands};
use config::{config_path, LogLevel, UserConfig};
use logging::LogMode;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    // `config` must work even when the file on disk no longer parses.
    if let Commands::Config { path, reset, edit } = cli.command {
        return commands::config::run(cli.config.as_deref(), path, reset, edit);
    }

    let config = UserConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Daemon { reset_db } => commands::daemon::run(&config, reset_db, log_level_override),
        Commands::Calibrate { yes, output } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::calibrate::run(&config.calibration, yes, output)
        }
        Commands::History { command } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::history::run(&config, command)
        }
        Commands::Debug => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            let config_file = cli.config.unwrap_or_else(config_path);
            commands::debug::run(&config, &config_file)
        }
        Commands::Config { .. } => Ok(()),
    }
}
