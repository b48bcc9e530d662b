use color_eyre::eyre::Result;

use crate::config::{LogLevel, UserConfig};
use crate::daemon::run_daemon;
use crate::logging::{self, LogMode};

pub fn run(config: &UserConfig, reset_db: bool, log_level_override: Option<LogLevel>) -> Result<()> {
    if reset_db {
        let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
        run_daemon(config, true)?;
        println!("Database deleted: {}", config.storage.db_path.display());
        return Ok(());
    }

    let _guard = logging::init(config.log_level, LogMode::Both, log_level_override);
    println!("Starting daemon in foreground...");
    println!("Press Ctrl+C to stop.");
    run_daemon(config, false)?;
    Ok(())
}
