//! sysfs-backed telemetry.

mod backlight;
mod battery;
mod cpufreq;
#[cfg(test)]
mod fixtures;
mod sampler;
mod sysfs;

pub use backlight::Backlight;
pub use battery::{ac_online, find_battery, read_battery, read_health, BatteryReading};
pub use cpufreq::{cpu_frequency_khz, read_cpufreq, CpuFreqInfo, CpuPin};
pub use sampler::SysfsBatterySampler;
pub use sysfs::{parse_uevent, SysfsRoot};
