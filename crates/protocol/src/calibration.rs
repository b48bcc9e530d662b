use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::CALIBRATION_FORMAT_VERSION;

/// Power measured at one backlight level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrightnessSample {
    pub brightness_pct: u8,
    pub avg_power_uw: i64,
    /// Half-width of the uncertainty band: one charge quantization step at
    /// each measurement boundary.
    pub avg_power_error_uw: i64,
    pub delta_charge_uah: i64,
    pub charge_quantization_uah: i64,
}

/// Output of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub update_interval_ms: i64,
    pub update_interval_min_ms: i64,
    pub update_interval_max_ms: i64,
    pub latency_ms: i64,
    pub stale_cycles: u32,
    pub baseline_power_uw: i64,
    pub samples: Vec<BrightnessSample>,
    pub cpu_frequency_khz: i64,
    pub calibrated_at: DateTime<Utc>,
}

fn default_format_version() -> u32 {
    1
}

impl CalibrationResult {
    pub fn new(calibrated_at: DateTime<Utc>) -> Self {
        Self {
            format_version: CALIBRATION_FORMAT_VERSION,
            update_interval_ms: 0,
            update_interval_min_ms: 0,
            update_interval_max_ms: 0,
            latency_ms: 0,
            stale_cycles: 0,
            baseline_power_uw: 0,
            samples: Vec::new(),
            cpu_frequency_khz: 0,
            calibrated_at,
        }
    }

    /// Power attributable to the display at `sample`'s level, relative to
    /// the baseline (lowest measured level).
    pub fn display_power_uw(&self, sample: &BrightnessSample) -> i64 {
        sample.avg_power_uw - self.baseline_power_uw
    }

    /// Sample for the given brightness, if that level was measured.
    pub fn sample_at(&self, brightness_pct: u8) -> Option<&BrightnessSample> {
        self.samples
            .iter()
            .find(|s| s.brightness_pct == brightness_pct)
    }
}
