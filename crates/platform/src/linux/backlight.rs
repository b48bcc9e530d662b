use std::path::{Path, PathBuf};

use chrono::Utc;
use powermon_protocol::BacklightSample;
use tracing::debug;

use super::sysfs::{self, SysfsRoot};
use crate::error::TelemetryError;

/// A display backlight under `class/backlight`.
#[derive(Debug, Clone)]
pub struct Backlight {
    dir: PathBuf,
}

impl Backlight {
    /// The first backlight device, sorted by name.
    pub fn find(root: &SysfsRoot) -> Result<Self, TelemetryError> {
        sysfs::sorted_entries(&root.backlight_dir())?
            .into_iter()
            .next()
            .map(|dir| Self { dir })
            .ok_or(TelemetryError::NotFound("backlight"))
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        self.dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn brightness(&self) -> Result<i64, TelemetryError> {
        sysfs::read_int(&self.dir.join("brightness"))
    }

    pub fn max_brightness(&self) -> Result<i64, TelemetryError> {
        sysfs::read_int(&self.dir.join("max_brightness"))
    }

    pub fn sample(&self) -> Result<BacklightSample, TelemetryError> {
        Ok(BacklightSample {
            timestamp: Utc::now().timestamp(),
            brightness: self.brightness()?,
            max_brightness: self.max_brightness()?,
        })
    }

    /// Current brightness as a percentage of the maximum.
    pub fn percent(&self) -> Result<u8, TelemetryError> {
        let max = self.max_brightness()?;
        if max <= 0 {
            return Err(TelemetryError::InvalidValue {
                path: self.dir.join("max_brightness"),
                value: max.to_string(),
            });
        }
        Ok((self.brightness()? * 100 / max).clamp(0, 100) as u8)
    }

    /// Sets brightness to `percent` of the maximum (values above 100 are
    /// clamped).
    pub fn set_percent(&self, percent: u8) -> Result<(), TelemetryError> {
        let max = self.max_brightness()?;
        let target = max * i64::from(percent.min(100)) / 100;
        debug!(
            target: "powermon::backlight",
            device = self.name(),
            percent,
            raw = target,
            "Setting brightness"
        );
        sysfs::write_value(&self.dir.join("brightness"), &target.to_string())
    }
}
