use std::collections::VecDeque;

use chrono::Utc;
use powermon_protocol::{BatterySample, BatteryStatus};
use tracing::{debug, trace};

use super::battery::{ac_online, find_battery, read_battery};
use super::sysfs::SysfsRoot;
use crate::battery::BatterySampler;
use crate::error::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HistoryEntry {
    timestamp: i64,
    charge_uah: i64,
    voltage_uv: i64,
}

/// Battery sampler that averages power over a trailing window of charge
/// readings.
///
/// The charge register moves in coarse steps but is far less noisy than the
/// instantaneous power register, so power is derived from the charge drop
/// across the window whenever the history allows it.
#[derive(Debug)]
pub struct SysfsBatterySampler {
    root: SysfsRoot,
    window_secs: i64,
    history: VecDeque<HistoryEntry>,
}

impl SysfsBatterySampler {
    pub fn new(root: SysfsRoot, window_secs: u64) -> Self {
        Self {
            root,
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX).max(1),
            history: VecDeque::new(),
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Reads the battery and stamps the sample with `timestamp` (unix
    /// seconds).
    pub fn collect_at(&mut self, timestamp: i64) -> Result<BatterySample, TelemetryError> {
        let dir = find_battery(&self.root)?;
        let reading = read_battery(&dir)?;
        let sysfs_power_uw = reading.instant_power_uw();

        let averaged = self.record(HistoryEntry {
            timestamp,
            charge_uah: reading.charge_now_uah,
            voltage_uv: reading.voltage_uv,
        });

        let (power_uw, power_from_charge_delta) = match averaged {
            Some(power) => (power, true),
            None => (sysfs_power_uw, false),
        };

        let mut status = reading.status;
        if reading.capacity_pct >= 100
            && status == BatteryStatus::Discharging
            && ac_online(&self.root)
        {
            trace!(target: "powermon::battery", reported = %status, "Correcting status at full capacity on AC");
            status = BatteryStatus::Full;
        }

        Ok(BatterySample {
            timestamp,
            voltage_uv: reading.voltage_uv,
            current_ua: reading.current_ua,
            power_uw,
            power_from_charge_delta,
            sysfs_power_uw,
            charge_now_uah: reading.charge_now_uah,
            capacity_pct: reading.capacity_pct,
            status,
        })
    }

    /// Adds `entry` to the history and returns the charge-delta power over
    /// the remaining window, if one can be computed.
    fn record(&mut self, entry: HistoryEntry) -> Option<i64> {
        if let Some(last) = self.history.back() {
            let gap = entry.timestamp - last.timestamp;
            if gap > 2 * self.window_secs {
                debug!(
                    target: "powermon::battery",
                    gap_secs = gap,
                    dropped = self.history.len(),
                    "Gap in battery history, restarting average"
                );
                self.history.clear();
            }
        }

        if entry.charge_uah > 0 {
            self.history.push_back(entry);
        }

        // Keep one entry at or before the cutoff so the span still covers the
        // whole window.
        let cutoff = entry.timestamp - self.window_secs;
        while self.history.len() >= 2 && self.history[1].timestamp <= cutoff {
            self.history.pop_front();
        }

        self.average_power()
    }

    fn average_power(&self) -> Option<i64> {
        if self.history.len() < 2 {
            return None;
        }
        let oldest = self.history.front()?;
        let newest = self.history.back()?;

        let delta_time = newest.timestamp - oldest.timestamp;
        if delta_time <= 0 {
            return None;
        }
        let delta_charge = (oldest.charge_uah - newest.charge_uah).abs();
        let avg_voltage =
            self.history.iter().map(|h| h.voltage_uv).sum::<i64>() / self.history.len() as i64;

        // uAh * mV * s/h / (s * 1000) = uW
        let power = delta_charge * (avg_voltage / 1000) * 3600 / (delta_time * 1000);
        (power > 0).then_some(power)
    }
}

impl BatterySampler for SysfsBatterySampler {
    fn collect(&mut self) -> Result<BatterySample, TelemetryError> {
        self.collect_at(Utc::now().timestamp())
    }
}
