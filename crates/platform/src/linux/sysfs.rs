use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::TelemetryError;

const DEFAULT_ROOT: &str = "/sys";

/// Root of the sysfs hierarchy. Tests point this at a temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl SysfsRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn power_supply_dir(&self) -> PathBuf {
        self.root.join("class/power_supply")
    }

    pub fn backlight_dir(&self) -> PathBuf {
        self.root.join("class/backlight")
    }

    pub fn cpu_dir(&self) -> PathBuf {
        self.root.join("devices/system/cpu")
    }
}

/// Contents of a sysfs attribute with surrounding whitespace removed.
pub(crate) fn read_trimmed(path: &Path) -> Result<String, TelemetryError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| TelemetryError::ReadFailure {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) fn read_int(path: &Path) -> Result<i64, TelemetryError> {
    let value = read_trimmed(path)?;
    value
        .parse()
        .map_err(|_| TelemetryError::InvalidValue {
            path: path.to_path_buf(),
            value,
        })
}

pub(crate) fn write_value(path: &Path, value: &str) -> Result<(), TelemetryError> {
    fs::write(path, value).map_err(|source| TelemetryError::WriteFailure {
        path: path.to_path_buf(),
        source,
    })
}

/// Entries of a sysfs class directory, sorted by name. A missing directory
/// yields an empty list.
pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, TelemetryError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(TelemetryError::ReadFailure {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    Ok(paths)
}

/// Parses the `KEY=VALUE` lines of a power supply `uevent` file.
pub fn parse_uevent(data: &str) -> HashMap<String, String> {
    data.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Numeric uevent value; absent or malformed keys read as 0 since the kernel
/// omits attributes the firmware does not provide.
pub(crate) fn uevent_int(props: &HashMap<String, String>, key: &str) -> i64 {
    props
        .get(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uevent() {
        let props = parse_uevent(
            "POWER_SUPPLY_NAME=BAT0\nPOWER_SUPPLY_STATUS=Not charging\nPOWER_SUPPLY_VOLTAGE_NOW=12100000\n\ngarbage\n",
        );
        assert_eq!(props.len(), 3);
        assert_eq!(props["POWER_SUPPLY_STATUS"], "Not charging");
        assert_eq!(uevent_int(&props, "POWER_SUPPLY_VOLTAGE_NOW"), 12_100_000);
        assert_eq!(uevent_int(&props, "POWER_SUPPLY_NAME"), 0);
        assert_eq!(uevent_int(&props, "POWER_SUPPLY_POWER_NOW"), 0);
    }

    #[test]
    fn test_sorted_entries_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let entries = sorted_entries(&dir.path().join("nope")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_read_int_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        fs::write(&path, "bright\n").unwrap();
        assert!(matches!(
            read_int(&path),
            Err(TelemetryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_read_trimmed_missing_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_trimmed(&dir.path().join("status")).unwrap_err();
        assert!(matches!(err, TelemetryError::ReadFailure { .. }));
    }
}
