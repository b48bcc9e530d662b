use std::path::PathBuf;

use powermon_platform::linux::{Backlight, SysfsRoot};
use powermon_platform::BatterySampler;
use powermon_protocol::{BacklightSample, BatterySample};
use tracing::{debug, info, trace, warn};

use crate::config::UserConfig;
use crate::data::history_store::{CleanupCounts, HistoryStore, HistoryStoreError};
use crate::data::state_log;

const SECS_PER_DAY: i64 = 86_400;

/// What a single collection tick managed to persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub battery: Option<BatterySample>,
    pub backlight: Option<BacklightSample>,
}

/// Glues the samplers to the store: one call per daemon tick.
pub struct Recorder<S: BatterySampler> {
    store: HistoryStore,
    sampler: S,
    sysfs: SysfsRoot,
    state_log_path: PathBuf,
    retention_days: u64,
}

impl<S: BatterySampler> Recorder<S> {
    pub fn new(store: HistoryStore, sampler: S, sysfs: SysfsRoot, config: &UserConfig) -> Self {
        debug!(
            db = %store.path().display(),
            state_log = %config.storage.state_log_path.display(),
            retention_days = config.cleanup.retention_days,
            "Recorder initialized"
        );
        Self {
            store,
            sampler,
            sysfs,
            state_log_path: config.storage.state_log_path.clone(),
            retention_days: config.cleanup.retention_days,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Collects and stores one battery and one backlight sample.
    ///
    /// Missing or unreadable hardware is logged and skipped so the loop keeps
    /// running; only store failures are returned.
    pub fn record_tick(&mut self) -> Result<TickOutcome, HistoryStoreError> {
        let mut outcome = TickOutcome::default();

        match self.sampler.collect() {
            Ok(sample) => {
                self.store.insert_battery_sample(&sample)?;
                trace!(
                    target: "powermon::battery",
                    power_uw = sample.power_uw,
                    from_charge_delta = sample.power_from_charge_delta,
                    capacity = sample.capacity_pct,
                    status = sample.status.as_str(),
                    "Recorded battery sample"
                );
                outcome.battery = Some(sample);
            }
            Err(e) => debug!(target: "powermon::battery", error = %e, "Battery sample skipped"),
        }

        match Backlight::find(&self.sysfs).and_then(|b| b.sample()) {
            Ok(sample) => {
                self.store.insert_backlight_sample(&sample)?;
                outcome.backlight = Some(sample);
            }
            Err(e) => debug!(target: "powermon::backlight", error = %e, "Backlight sample skipped"),
        }

        Ok(outcome)
    }

    /// Consumes the hook state log and stores any events not seen before.
    ///
    /// Returns the number of newly inserted events. A log that cannot be read
    /// is logged and left for the next attempt.
    pub fn import_state_log(&mut self, now: i64) -> Result<usize, HistoryStoreError> {
        let events = match state_log::consume(&self.state_log_path, now) {
            Ok(events) => events,
            Err(e) => {
                warn!(target: "powermon::sleep", error = %e, "Failed to consume state log");
                return Ok(0);
            }
        };

        let mut inserted = 0;
        for event in &events {
            if self.store.insert_power_state_event(event)? {
                inserted += 1;
                info!(
                    target: "powermon::sleep",
                    kind = event.kind.type_name(),
                    start = event.start_time,
                    end = event.end_time,
                    "Recorded power state event"
                );
            }
        }
        if !events.is_empty() {
            debug!(
                target: "powermon::sleep",
                parsed = events.len(),
                inserted,
                "Imported state log"
            );
        }
        Ok(inserted)
    }

    /// Deletes everything older than the retention period.
    pub fn cleanup(&mut self, now: i64) -> Result<CleanupCounts, HistoryStoreError> {
        let cutoff = retention_cutoff(now, self.retention_days);
        let counts = self.store.delete_older_than(cutoff)?;
        if counts.total() > 0 {
            info!(
                cutoff,
                battery = counts.battery_samples,
                backlight = counts.backlight_samples,
                events = counts.power_state_events,
                "Pruned old records"
            );
        }
        Ok(counts)
    }
}

fn retention_cutoff(now: i64, retention_days: u64) -> i64 {
    let days = i64::try_from(retention_days).unwrap_or(i64::MAX / SECS_PER_DAY);
    now.saturating_sub(days.saturating_mul(SECS_PER_DAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use powermon_platform::TelemetryError;
    use powermon_protocol::{BatteryStatus, PowerStateEvent, PowerStateKind};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::fs;

    struct ScriptedSampler {
        samples: VecDeque<Result<BatterySample, TelemetryError>>,
    }

    impl BatterySampler for ScriptedSampler {
        fn collect(&mut self) -> Result<BatterySample, TelemetryError> {
            self.samples
                .pop_front()
                .unwrap_or(Err(TelemetryError::NotFound("battery")))
        }
    }

    fn sample(ts: i64, power_uw: i64) -> BatterySample {
        BatterySample {
            timestamp: ts,
            voltage_uv: 12_000_000,
            current_ua: 1_000_000,
            power_uw,
            sysfs_power_uw: power_uw,
            charge_now_uah: 4_000_000,
            capacity_pct: 80,
            status: BatteryStatus::Discharging,
            ..Default::default()
        }
    }

    fn recorder(
        dir: &tempfile::TempDir,
        samples: Vec<Result<BatterySample, TelemetryError>>,
    ) -> Recorder<ScriptedSampler> {
        let mut config = UserConfig::default();
        config.storage.state_log_path = dir.path().join("state-log.jsonl");
        config.cleanup.retention_days = 1;
        Recorder::new(
            HistoryStore::open_in_memory().unwrap(),
            ScriptedSampler {
                samples: samples.into(),
            },
            SysfsRoot::new(dir.path().join("sys")),
            &config,
        )
    }

    #[test]
    fn test_record_tick_stores_battery_without_backlight() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, vec![Ok(sample(100, 9_000_000))]);

        let outcome = rec.record_tick().unwrap();
        assert_eq!(outcome.battery, Some(sample(100, 9_000_000)));
        assert_eq!(outcome.backlight, None);
        assert_eq!(
            rec.store().latest_battery_sample().unwrap(),
            Some(sample(100, 9_000_000))
        );
    }

    #[test]
    fn test_record_tick_survives_missing_battery() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, vec![Err(TelemetryError::NotFound("battery"))]);

        let outcome = rec.record_tick().unwrap();
        assert_eq!(outcome, TickOutcome::default());
        assert_eq!(rec.store().latest_battery_sample().unwrap(), None);
    }

    #[test]
    fn test_record_tick_reads_backlight() {
        let dir = tempfile::tempdir().unwrap();
        let bl = dir.path().join("sys/class/backlight/intel_backlight");
        fs::create_dir_all(&bl).unwrap();
        fs::write(bl.join("brightness"), "120\n").unwrap();
        fs::write(bl.join("max_brightness"), "240\n").unwrap();

        let mut rec = recorder(&dir, vec![]);
        let outcome = rec.record_tick().unwrap();
        let backlight = outcome.backlight.unwrap();
        assert_eq!(backlight.brightness, 120);
        assert_eq!(backlight.max_brightness, 240);
        assert_eq!(backlight.percent(), 50);
    }

    #[test]
    fn test_import_state_log_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("state-log.jsonl");
        let lines = concat!(
            r#"{"ts":100,"action":"pre","what":"suspend"}"#,
            "\n",
            r#"{"ts":160,"action":"post","what":"suspend"}"#,
            "\n",
        );
        let mut rec = recorder(&dir, vec![]);

        fs::write(&log, lines).unwrap();
        assert_eq!(rec.import_state_log(1_000).unwrap(), 1);
        assert!(!log.exists());

        // Same transition logged again after a crash.
        fs::write(&log, lines).unwrap();
        assert_eq!(rec.import_state_log(1_000).unwrap(), 0);

        assert_eq!(
            rec.store().power_state_events(0, 2_000).unwrap(),
            vec![PowerStateEvent::new(
                100,
                160,
                PowerStateKind::Suspend { suspend_secs: 60 }
            )]
        );
    }

    #[test]
    fn test_import_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, vec![]);
        assert_eq!(rec.import_state_log(1_000).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_uses_retention() {
        let dir = tempfile::tempdir().unwrap();
        let now = 10 * SECS_PER_DAY;
        let mut rec = recorder(
            &dir,
            vec![
                Ok(sample(now - 2 * SECS_PER_DAY, 1)),
                Ok(sample(now - 10, 2)),
            ],
        );
        rec.record_tick().unwrap();
        rec.record_tick().unwrap();

        let counts = rec.cleanup(now).unwrap();
        assert_eq!(counts.battery_samples, 1);
        let left = rec.store().battery_samples(0, now).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].power_uw, 2);
    }

    #[test]
    fn test_retention_cutoff_saturates() {
        assert_eq!(retention_cutoff(1_000_000, 1), 1_000_000 - SECS_PER_DAY);
        assert!(retention_cutoff(0, u64::MAX) < 0);
    }
}
