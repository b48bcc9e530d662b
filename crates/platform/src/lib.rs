//! Battery, backlight and CPU frequency telemetry for powermon.
//!
//! The platform-neutral pieces (the [`BatterySampler`] trait, battery health
//! records and [`TelemetryError`]) live at the crate root. The sysfs readers
//! and the windowed [`linux::SysfsBatterySampler`] are Linux only.
//!
//! # Example
//!
//! ```ignore
//! use powermon_platform::BatterySampler;
//! use powermon_platform::linux::{SysfsBatterySampler, SysfsRoot};
//!
//! let mut sampler = SysfsBatterySampler::new(SysfsRoot::default(), 30);
//! let sample = sampler.collect()?;
//! println!("{:.2} W ({})", sample.power_watts(), sample.status);
//! ```

mod battery;
mod error;

pub use battery::{BatteryHealth, BatterySampler};
pub use error::TelemetryError;

#[cfg(target_os = "linux")]
pub mod linux;
