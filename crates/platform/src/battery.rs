//! Battery sampling trait and health types.

use powermon_protocol::BatterySample;

use crate::error::TelemetryError;

/// Source of battery samples.
///
/// Each call performs a fresh telemetry read. Implementations may keep
/// private history between calls, so one instance must only be driven from a
/// single logical sequence of calls.
pub trait BatterySampler {
    /// Read the battery and return a new sample.
    fn collect(&mut self) -> Result<BatterySample, TelemetryError>;
}

impl<T: BatterySampler + ?Sized> BatterySampler for &mut T {
    fn collect(&mut self) -> Result<BatterySample, TelemetryError> {
        (**self).collect()
    }
}

/// Identity and wear information for the battery.
///
/// Fields the firmware does not report are empty or zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatteryHealth {
    /// Battery vendor/manufacturer name.
    pub manufacturer: String,

    /// Battery model identifier.
    pub model: String,

    pub serial_number: String,

    /// Cell chemistry as reported by the kernel (e.g. "Li-ion").
    pub technology: String,

    pub cycle_count: i64,

    /// Full charge capacity right now, in microamp-hours.
    pub charge_full_uah: i64,

    /// Factory design capacity, in microamp-hours.
    pub charge_full_design_uah: i64,

    pub voltage_min_design_uv: i64,
}

impl BatteryHealth {
    /// Current full capacity as a percentage of design capacity.
    pub fn health_percent(&self) -> Option<f64> {
        if self.charge_full_design_uah > 0 && self.charge_full_uah > 0 {
            Some(self.charge_full_uah as f64 / self.charge_full_design_uah as f64 * 100.0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_percent() {
        let health = BatteryHealth {
            charge_full_uah: 4_500_000,
            charge_full_design_uah: 5_000_000,
            ..Default::default()
        };
        assert_eq!(health.health_percent(), Some(90.0));
    }

    #[test]
    fn test_health_percent_unknown_design() {
        let health = BatteryHealth {
            charge_full_uah: 4_500_000,
            ..Default::default()
        };
        assert_eq!(health.health_percent(), None);
    }
}
