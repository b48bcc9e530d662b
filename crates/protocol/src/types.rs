use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Battery status as reported by the power supply class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    #[default]
    Unknown,
}

impl BatteryStatus {
    /// Maps the kernel's `POWER_SUPPLY_STATUS` string.
    pub fn from_sysfs(value: &str) -> Self {
        match value.trim() {
            "Charging" => BatteryStatus::Charging,
            "Discharging" => BatteryStatus::Discharging,
            "Full" => BatteryStatus::Full,
            "Not charging" => BatteryStatus::NotCharging,
            _ => BatteryStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryStatus::Charging => "Charging",
            BatteryStatus::Discharging => "Discharging",
            BatteryStatus::Full => "Full",
            BatteryStatus::NotCharging => "NotCharging",
            BatteryStatus::Unknown => "Unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatteryStatus::Charging => "Charging",
            BatteryStatus::Discharging => "On Battery",
            BatteryStatus::Full => "Full",
            BatteryStatus::NotCharging => "Not Charging",
            BatteryStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatteryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Charging" => BatteryStatus::Charging,
            "Discharging" => BatteryStatus::Discharging,
            "Full" => BatteryStatus::Full,
            "NotCharging" | "Not charging" => BatteryStatus::NotCharging,
            _ => BatteryStatus::Unknown,
        })
    }
}

/// One battery reading with its windowed average power.
///
/// All electrical values are in micro-units, as exposed by sysfs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatterySample {
    pub timestamp: i64,
    pub voltage_uv: i64,
    pub current_ua: i64,
    /// Averaged power magnitude. Falls back to `sysfs_power_uw` when no
    /// charge delta is available.
    pub power_uw: i64,
    /// True when `power_uw` was derived from a charge delta over the window.
    pub power_from_charge_delta: bool,
    /// Instantaneous power as reported (or derived from voltage * current).
    pub sysfs_power_uw: i64,
    pub charge_now_uah: i64,
    pub capacity_pct: i32,
    pub status: BatteryStatus,
}

impl BatterySample {
    pub fn power_watts(&self) -> f64 {
        self.power_uw as f64 / 1e6
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BacklightSample {
    pub timestamp: i64,
    pub brightness: i64,
    pub max_brightness: i64,
}

impl BacklightSample {
    /// Brightness as a percentage of the maximum, 0 if the maximum is unknown.
    pub fn percent(&self) -> i64 {
        if self.max_brightness <= 0 {
            return 0;
        }
        self.brightness * 100 / self.max_brightness
    }
}
