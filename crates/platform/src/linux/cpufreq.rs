use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::sysfs::{self, SysfsRoot};
use crate::error::TelemetryError;

const PINNED_GOVERNOR: &str = "powersave";

/// Frequency settings of one CPU core, in kHz.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuFreqInfo {
    pub cpu: u32,
    pub cur_khz: i64,
    pub min_khz: i64,
    pub max_khz: i64,
    /// `base_frequency`, falling back to `cpuinfo_min_freq`.
    pub base_khz: Option<i64>,
    pub governor: String,
}

/// Current scaling frequency of cpu0.
pub fn cpu_frequency_khz(root: &SysfsRoot) -> Result<i64, TelemetryError> {
    sysfs::read_int(&root.cpu_dir().join("cpu0/cpufreq/scaling_cur_freq"))
}

/// Frequency settings of every core exposing cpufreq, ordered by core number.
pub fn read_cpufreq(root: &SysfsRoot) -> Result<Vec<CpuFreqInfo>, TelemetryError> {
    let cores = cpufreq_dirs(root)?;
    let read_or_zero = |dir: &Path, name: &str| sysfs::read_int(&dir.join(name)).unwrap_or(0);

    Ok(cores
        .into_iter()
        .map(|(cpu, dir)| CpuFreqInfo {
            cpu,
            cur_khz: read_or_zero(&dir, "scaling_cur_freq"),
            min_khz: read_or_zero(&dir, "scaling_min_freq"),
            max_khz: read_or_zero(&dir, "scaling_max_freq"),
            base_khz: base_frequency(&dir),
            governor: sysfs::read_trimmed(&dir.join("scaling_governor")).unwrap_or_default(),
        })
        .collect())
}

fn cpufreq_dirs(root: &SysfsRoot) -> Result<Vec<(u32, PathBuf)>, TelemetryError> {
    let mut cores: Vec<(u32, PathBuf)> = sysfs::sorted_entries(&root.cpu_dir())?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let cpu = name.strip_prefix("cpu")?.parse().ok()?;
            let dir = path.join("cpufreq");
            dir.is_dir().then_some((cpu, dir))
        })
        .collect();
    cores.sort_by_key(|(cpu, _)| *cpu);
    Ok(cores)
}

fn base_frequency(dir: &Path) -> Option<i64> {
    sysfs::read_int(&dir.join("base_frequency"))
        .or_else(|_| sysfs::read_int(&dir.join("cpuinfo_min_freq")))
        .ok()
}

/// Locks every core to its base frequency with turbo disabled.
///
/// Original values are written back in reverse order when the pin is
/// dropped.
#[derive(Debug)]
pub struct CpuPin {
    saved: Vec<(PathBuf, String)>,
}

impl CpuPin {
    pub fn engage(root: &SysfsRoot) -> Result<Self, TelemetryError> {
        let mut pin = CpuPin { saved: Vec::new() };

        let turbo = root.cpu_dir().join("intel_pstate/no_turbo");
        if let Ok(original) = sysfs::read_trimmed(&turbo) {
            sysfs::write_value(&turbo, "1")?;
            pin.saved.push((turbo, original));
        }

        let cores = cpufreq_dirs(root)?;
        if cores.is_empty() {
            return Err(TelemetryError::NotFound("cpufreq"));
        }

        for (cpu, dir) in cores {
            let Some(base) = base_frequency(&dir) else {
                warn!(target: "powermon::calibration", cpu, "No base frequency, leaving core unpinned");
                continue;
            };
            let base = base.to_string();

            let governor_path = dir.join("scaling_governor");
            let min_path = dir.join("scaling_min_freq");
            let max_path = dir.join("scaling_max_freq");
            let original_governor = sysfs::read_trimmed(&governor_path).unwrap_or_default();
            let original_min = sysfs::read_trimmed(&min_path).unwrap_or_default();
            let original_max = sysfs::read_trimmed(&max_path).unwrap_or_default();

            if sysfs::write_value(&governor_path, PINNED_GOVERNOR).is_ok() {
                pin.saved.push((governor_path, original_governor));
            }

            // min goes first so max may drop below the old min, then min again
            // in case the kernel clamped it against the old max.
            for path in [&min_path, &max_path, &min_path] {
                if let Err(e) = sysfs::write_value(path, &base) {
                    warn!(target: "powermon::calibration", cpu, error = %e, "Failed to pin frequency");
                }
            }
            pin.saved.push((min_path, original_min));
            pin.saved.push((max_path, original_max));

            let actual = sysfs::read_trimmed(&dir.join("scaling_cur_freq")).unwrap_or_default();
            info!(target: "powermon::calibration", cpu, base_khz = %base, actual_khz = %actual, "Pinned CPU frequency");
        }

        Ok(pin)
    }

    /// Writes back the saved settings now instead of on drop.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        while let Some((path, original)) = self.saved.pop() {
            if original.is_empty() {
                continue;
            }
            match sysfs::write_value(&path, &original) {
                Ok(()) => debug!(target: "powermon::calibration", path = %path.display(), value = %original, "Restored"),
                Err(e) => warn!(target: "powermon::calibration", error = %e, "Failed to restore CPU setting"),
            }
        }
    }
}

impl Drop for CpuPin {
    fn drop(&mut self) {
        self.restore();
    }
}
