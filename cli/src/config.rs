use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

const APP_DIR: &str = "powermon";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{field} must be an absolute path, got {path:?}")]
    RelativePath { field: &'static str, path: PathBuf },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Written by the sleep/shutdown hooks, consumed by the daemon.
    pub state_log_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/powermon/data.db"),
            state_log_path: PathBuf::from("/var/lib/powermon/state-log.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub interval_seconds: u64,
    pub power_average_seconds: u64,
    pub wall_clock_jump_threshold_seconds: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            power_average_seconds: 30,
            wall_clock_jump_threshold_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub retention_days: u64,
    pub interval_hours: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Brightness levels to measure, in percent. The lowest is the baseline.
    pub levels: Vec<u8>,
    pub initial_settle_secs: u64,
    pub min_settle_secs: u64,
    pub window_secs: u64,
    pub poll_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            levels: vec![0, 25, 50, 75, 100],
            initial_settle_secs: 90,
            min_settle_secs: 90,
            window_secs: 30,
            poll_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserConfig {
    pub log_level: LogLevel,
    pub storage: StorageConfig,
    pub collection: CollectionConfig,
    pub cleanup: CleanupConfig,
    pub calibration: CalibrationConfig,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join(APP_DIR)
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl UserConfig {
    /// Loads `path` (or the default config file). A missing file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            ParseOrInvalid::Parse(source) => ConfigError::Parse { path, source },
            ParseOrInvalid::Invalid(e) => e,
        })
    }

    fn parse(content: &str) -> Result<Self, ParseOrInvalid> {
        let mut config: UserConfig = toml::from_str(content).map_err(ParseOrInvalid::Parse)?;
        config.storage.db_path = trim_path(&config.storage.db_path);
        config.storage.state_log_path = trim_path(&config.storage.state_log_path);
        config.validate().map_err(ParseOrInvalid::Invalid)?;
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_absolute("storage.db_path", &self.storage.db_path)?;
        check_absolute("storage.state_log_path", &self.storage.state_log_path)?;

        let c = &self.collection;
        check_range("collection.interval_seconds", c.interval_seconds, 1, 3600)?;
        check_range("collection.power_average_seconds", c.power_average_seconds, 1, 3600)?;
        check_range(
            "collection.wall_clock_jump_threshold_seconds",
            c.wall_clock_jump_threshold_seconds,
            1,
            3600,
        )?;

        check_range("cleanup.retention_days", self.cleanup.retention_days, 1, 3650)?;
        check_range("cleanup.interval_hours", self.cleanup.interval_hours, 1, 720)?;

        let cal = &self.calibration;
        if cal.levels.is_empty() {
            return Err(ConfigError::Empty("calibration.levels"));
        }
        for level in &cal.levels {
            check_range("calibration.levels", u64::from(*level), 0, 100)?;
        }
        check_range("calibration.initial_settle_secs", cal.initial_settle_secs, 0, 3600)?;
        check_range("calibration.min_settle_secs", cal.min_settle_secs, 0, 3600)?;
        check_range("calibration.window_secs", cal.window_secs, 1, 3600)?;
        check_range("calibration.poll_ms", cal.poll_ms, 10, 60_000)?;

        Ok(())
    }
}

#[derive(Debug)]
enum ParseOrInvalid {
    Parse(toml::de::Error),
    Invalid(ConfigError),
}

fn trim_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().trim())
}

fn check_absolute(field: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::RelativePath {
            field,
            path: path.to_path_buf(),
        })
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
