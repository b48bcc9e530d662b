use std::path::{Path, PathBuf};

use powermon_protocol::BatteryStatus;
use tracing::debug;

use super::sysfs::{self, SysfsRoot};
use crate::battery::BatteryHealth;
use crate::error::TelemetryError;

/// Raw values from a battery's `uevent` file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryReading {
    pub status: BatteryStatus,
    pub voltage_uv: i64,
    /// Magnitude of the battery current.
    pub current_ua: i64,
    /// `POWER_SUPPLY_POWER_NOW`, 0 when the firmware does not report it.
    pub power_now_uw: i64,
    pub charge_now_uah: i64,
    pub capacity_pct: i32,
}

impl BatteryReading {
    /// Instantaneous power, derived from voltage and current when the power
    /// register is absent. Both factors are scaled down before multiplying so
    /// the product stays in range.
    pub fn instant_power_uw(&self) -> i64 {
        if self.power_now_uw != 0 {
            return self.power_now_uw.abs();
        }
        (self.voltage_uv / 1000) * (self.current_ua / 1000)
    }
}

/// First power supply of type `Battery`, or named `BAT*` when the supply has
/// no `type` attribute.
pub fn find_battery(root: &SysfsRoot) -> Result<PathBuf, TelemetryError> {
    for path in sysfs::sorted_entries(&root.power_supply_dir())? {
        match sysfs::read_trimmed(&path.join("type")) {
            Ok(kind) if kind == "Battery" => return Ok(path),
            Ok(_) => continue,
            Err(_) if file_name_starts_with(&path, &["BAT"]) => return Ok(path),
            Err(_) => continue,
        }
    }
    Err(TelemetryError::NotFound("battery"))
}

/// Reads the battery at `dir`.
pub fn read_battery(dir: &Path) -> Result<BatteryReading, TelemetryError> {
    let data = sysfs::read_trimmed(&dir.join("uevent"))?;
    let props = sysfs::parse_uevent(&data);

    let status = props
        .get("POWER_SUPPLY_STATUS")
        .map(|s| BatteryStatus::from_sysfs(s))
        .unwrap_or_default();

    Ok(BatteryReading {
        status,
        voltage_uv: sysfs::uevent_int(&props, "POWER_SUPPLY_VOLTAGE_NOW"),
        current_ua: sysfs::uevent_int(&props, "POWER_SUPPLY_CURRENT_NOW").abs(),
        power_now_uw: sysfs::uevent_int(&props, "POWER_SUPPLY_POWER_NOW"),
        charge_now_uah: sysfs::uevent_int(&props, "POWER_SUPPLY_CHARGE_NOW"),
        capacity_pct: sysfs::uevent_int(&props, "POWER_SUPPLY_CAPACITY") as i32,
    })
}

/// Whether any mains adapter reports `online`.
pub fn ac_online(root: &SysfsRoot) -> bool {
    let entries = match sysfs::sorted_entries(&root.power_supply_dir()) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(target: "powermon::battery", error = %e, "Cannot list power supplies");
            return false;
        }
    };

    entries.iter().any(|path| {
        let is_mains = match sysfs::read_trimmed(&path.join("type")) {
            Ok(kind) => kind == "Mains",
            Err(_) => file_name_starts_with(path, &["AC", "ADP"]),
        };
        is_mains
            && sysfs::read_trimmed(&path.join("online"))
                .map(|online| online == "1")
                .unwrap_or(false)
    })
}

/// Identity and wear attributes of the first battery.
pub fn read_health(root: &SysfsRoot) -> Result<BatteryHealth, TelemetryError> {
    let dir = find_battery(root)?;
    let data = sysfs::read_trimmed(&dir.join("uevent"))?;
    let props = sysfs::parse_uevent(&data);
    let text = |key: &str| props.get(key).cloned().unwrap_or_default();

    Ok(BatteryHealth {
        manufacturer: text("POWER_SUPPLY_MANUFACTURER"),
        model: text("POWER_SUPPLY_MODEL_NAME"),
        serial_number: text("POWER_SUPPLY_SERIAL_NUMBER"),
        technology: text("POWER_SUPPLY_TECHNOLOGY"),
        cycle_count: sysfs::uevent_int(&props, "POWER_SUPPLY_CYCLE_COUNT"),
        charge_full_uah: sysfs::uevent_int(&props, "POWER_SUPPLY_CHARGE_FULL"),
        charge_full_design_uah: sysfs::uevent_int(&props, "POWER_SUPPLY_CHARGE_FULL_DESIGN"),
        voltage_min_design_uv: sysfs::uevent_int(&props, "POWER_SUPPLY_VOLTAGE_MIN_DESIGN"),
    })
}

fn file_name_starts_with(path: &Path, prefixes: &[&str]) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| prefixes.iter().any(|prefix| name.starts_with(prefix)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linux::fixtures::FakeSysfs;

    #[test]
    fn test_read_battery_uevent() {
        let fake = FakeSysfs::new();
        fake.battery(
            "BAT0",
            "Discharging",
            &[
                ("VOLTAGE_NOW", 12_000_000),
                ("CURRENT_NOW", -2_000_000),
                ("POWER_NOW", 0),
                ("CHARGE_NOW", 3_500_000),
                ("CAPACITY", 64),
            ],
        );

        let dir = find_battery(&fake.root()).unwrap();
        let reading = read_battery(&dir).unwrap();
        assert_eq!(reading.status, BatteryStatus::Discharging);
        assert_eq!(reading.current_ua, 2_000_000);
        assert_eq!(reading.charge_now_uah, 3_500_000);
        assert_eq!(reading.capacity_pct, 64);
        assert_eq!(reading.instant_power_uw(), 24_000_000);
    }

    #[test]
    fn test_power_register_preferred() {
        let reading = BatteryReading {
            voltage_uv: 12_000_000,
            current_ua: 2_000_000,
            power_now_uw: 9_500_000,
            ..Default::default()
        };
        assert_eq!(reading.instant_power_uw(), 9_500_000);
    }

    #[test]
    fn test_find_battery_skips_mains() {
        let fake = FakeSysfs::new();
        fake.ac("AC", true);
        fake.battery("BAT1", "Full", &[("CAPACITY", 100)]);

        let dir = find_battery(&fake.root()).unwrap();
        assert!(dir.ends_with("BAT1"));
    }

    #[test]
    fn test_find_battery_by_name_without_type() {
        let fake = FakeSysfs::new();
        fake.write("class/power_supply/BAT0/uevent", "POWER_SUPPLY_CAPACITY=50\n");

        let dir = find_battery(&fake.root()).unwrap();
        assert!(dir.ends_with("BAT0"));
    }

    #[test]
    fn test_no_battery() {
        let fake = FakeSysfs::new();
        fake.ac("ADP1", false);
        let err = find_battery(&fake.root()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ac_online() {
        let fake = FakeSysfs::new();
        assert!(!ac_online(&fake.root()));

        fake.ac("ADP1", false);
        assert!(!ac_online(&fake.root()));

        fake.ac("AC", true);
        assert!(ac_online(&fake.root()));
    }

    #[test]
    fn test_read_health() {
        let fake = FakeSysfs::new();
        fake.battery("BAT0", "Discharging", &[("CYCLE_COUNT", 212), ("CHARGE_FULL", 4_000_000), ("CHARGE_FULL_DESIGN", 5_000_000)]);
        fake.append("class/power_supply/BAT0/uevent", "POWER_SUPPLY_MANUFACTURER=SMP\nPOWER_SUPPLY_TECHNOLOGY=Li-poly\n");

        let health = read_health(&fake.root()).unwrap();
        assert_eq!(health.manufacturer, "SMP");
        assert_eq!(health.technology, "Li-poly");
        assert_eq!(health.cycle_count, 212);
        assert_eq!(health.health_percent(), Some(80.0));
        assert_eq!(health.model, "");
    }
}
