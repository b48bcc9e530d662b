use std::path::Path;

use color_eyre::eyre::{bail, Result};

use crate::config::{config_path, UserConfig};

pub fn run(config_override: Option<&Path>, path: bool, reset: bool, edit: bool) -> Result<()> {
    let config_file = config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(config_path);

    if path {
        println!("{}", config_file.display());
        return Ok(());
    }

    if reset {
        let config = UserConfig::default();
        config.save(Some(&config_file))?;
        println!("Config reset to defaults at: {}", config_file.display());
        return Ok(());
    }

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());

        if !config_file.exists() {
            let config = UserConfig::default();
            config.save(Some(&config_file))?;
        }

        let status = std::process::Command::new(&editor)
            .arg(&config_file)
            .status()?;
        if !status.success() {
            bail!("{} exited with {}", editor, status);
        }

        // Catch mistakes while the file is still fresh in mind.
        UserConfig::load(Some(&config_file))?;
        return Ok(());
    }

    let config = UserConfig::load(Some(&config_file))?;
    println!("Config file: {}", config_file.display());
    if !config_file.exists() {
        println!("(not created yet, showing defaults)");
    }
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
