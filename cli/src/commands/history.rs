use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use color_eyre::eyre::{bail, Result};
use powermon_protocol::{BacklightSample, BatterySample, PowerStateEvent};

use crate::cli::HistoryCommands;
use crate::config::UserConfig;
use crate::data::HistoryStore;

const SECS_PER_DAY: i64 = 86_400;

pub fn run(config: &UserConfig, command: Option<HistoryCommands>) -> Result<()> {
    let cmd = command.unwrap_or(HistoryCommands::Summary {
        period: "week".to_string(),
    });

    let db_path = &config.storage.db_path;
    if !db_path.exists() {
        bail!(
            "no history database at {}; make sure `powermon daemon` has been running",
            db_path.display()
        );
    }
    let mut store = HistoryStore::open(db_path)?;
    let now = Utc::now().timestamp();

    match cmd {
        HistoryCommands::Summary { period } => {
            let (from, to) = period_range(&period, now);
            let samples = store.battery_samples(from, to)?;
            let events = store.power_state_events(from, to)?;

            println!("History Summary ({})", period);
            println!("{}", "=".repeat(50));

            match PowerSummary::from_samples(&samples) {
                None => {
                    println!("No battery samples for this period.");
                    println!("\nMake sure the daemon is running to collect data:");
                    println!("  powermon daemon");
                }
                Some(summary) => {
                    println!("Samples:          {}", summary.count);
                    println!("Avg power:        {:.2} W", summary.avg_w);
                    println!("Min power:        {:.2} W", summary.min_w);
                    println!("Max power:        {:.2} W", summary.max_w);
                    println!(
                        "Charge-delta avg: {:.0}% of samples",
                        summary.charge_delta_pct
                    );
                    if let Some(last) = samples.last() {
                        println!(
                            "Latest:           {}% {} at {}",
                            last.capacity_pct,
                            last.status.label(),
                            format_ts(last.timestamp)
                        );
                    }
                }
            }

            let backlight = store.backlight_samples(from, to)?;
            if let Some(pct) = mean_brightness_pct(&backlight) {
                println!("Avg brightness:   {:.0}%", pct);
            }

            let totals = SleepTotals::from_events(&events);
            println!();
            println!("Suspends:         {}", totals.suspends);
            println!("Hibernations:     {}", totals.hibernations);
            println!("Shutdowns:        {}", totals.shutdowns);
            println!("Time suspended:   {}", format_secs(totals.suspend_secs));
            println!("Time hibernated:  {}", format_secs(totals.hibernate_secs));

            let stats = store.get_stats()?;
            println!();
            println!(
                "Database:         {} ({} battery, {} backlight, {} events)",
                stats.size_formatted(),
                stats.battery_samples,
                stats.backlight_samples,
                stats.power_state_events
            );
        }
        HistoryCommands::Battery {
            period,
            limit,
            json,
        } => {
            let (from, to) = period_range(&period, now);
            let samples = store.battery_samples(from, to)?;
            let recent = &samples[samples.len().saturating_sub(limit)..];

            if json {
                println!("{}", serde_json::to_string_pretty(recent)?);
                return Ok(());
            }
            if recent.is_empty() {
                println!("No battery samples for this period.");
                return Ok(());
            }

            println!(
                "{:<20} {:>6} {:<13} {:>9} {:>9} {:>8}",
                "Time", "Cap %", "Status", "Power W", "Sysfs W", "Volts"
            );
            println!("{}", "-".repeat(70));
            for s in recent {
                println!(
                    "{:<20} {:>6} {:<13} {:>8.2}{} {:>9.2} {:>8.2}",
                    format_ts(s.timestamp),
                    s.capacity_pct,
                    s.status.label(),
                    s.power_watts(),
                    if s.power_from_charge_delta { '*' } else { ' ' },
                    s.sysfs_power_uw as f64 / 1e6,
                    s.voltage_uv as f64 / 1e6
                );
            }
            println!("\n* averaged from charge delta");
        }
        HistoryCommands::Events { period, json } => {
            let (from, to) = period_range(&period, now);
            let events = store.power_state_events(from, to)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
                return Ok(());
            }
            if events.is_empty() {
                println!("No power state events for this period.");
                return Ok(());
            }

            println!(
                "{:<20} {:<20} {:<24} {:>12} {:>12}",
                "Start", "End", "Type", "Suspended", "Hibernated"
            );
            println!("{}", "-".repeat(92));
            for e in &events {
                println!(
                    "{:<20} {:<20} {:<24} {:>12} {:>12}",
                    format_ts(e.start_time),
                    format_ts(e.end_time),
                    e.kind.type_name(),
                    format_secs(e.suspend_secs()),
                    format_secs(e.hibernate_secs())
                );
            }
        }
        HistoryCommands::Prune { older_than, yes } => {
            let days = older_than.unwrap_or(config.cleanup.retention_days);
            let before = now.saturating_sub(
                i64::try_from(days)
                    .unwrap_or(i64::MAX)
                    .saturating_mul(SECS_PER_DAY),
            );

            let stats = store.get_stats()?;
            println!("Current database stats:");
            println!("  Battery samples:   {}", stats.battery_samples);
            println!("  Backlight samples: {}", stats.backlight_samples);
            println!("  Events:            {}", stats.power_state_events);
            println!("  Size: {}", stats.size_formatted());
            println!(
                "\nWill delete data older than {} days (before {})",
                days,
                format_ts(before)
            );

            if !yes {
                print!("Proceed? [y/N] ");
                std::io::stdout().flush()?;

                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let counts = store.delete_older_than(before)?;
            println!("\nDeleted:");
            println!("  {} battery samples", counts.battery_samples);
            println!("  {} backlight samples", counts.backlight_samples);
            println!("  {} power state events", counts.power_state_events);
        }
    }

    Ok(())
}

/// Unix-second range covered by a named period ending at `now`.
pub fn period_range(period: &str, now: i64) -> (i64, i64) {
    let from = match period.to_lowercase().as_str() {
        "today" => now - now.rem_euclid(SECS_PER_DAY),
        "month" => now - 30 * SECS_PER_DAY,
        "all" => 0,
        _ => now - 7 * SECS_PER_DAY,
    };
    (from, now)
}

#[derive(Debug, Clone, PartialEq)]
struct PowerSummary {
    count: usize,
    avg_w: f64,
    min_w: f64,
    max_w: f64,
    charge_delta_pct: f64,
}

impl PowerSummary {
    fn from_samples(samples: &[BatterySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let watts = samples.iter().map(BatterySample::power_watts);
        let averaged = samples.iter().filter(|s| s.power_from_charge_delta).count();
        Some(Self {
            count: samples.len(),
            avg_w: watts.clone().sum::<f64>() / samples.len() as f64,
            min_w: watts.clone().fold(f64::INFINITY, f64::min),
            max_w: watts.fold(0.0, f64::max),
            charge_delta_pct: averaged as f64 * 100.0 / samples.len() as f64,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SleepTotals {
    suspends: usize,
    hibernations: usize,
    shutdowns: usize,
    suspend_secs: i64,
    hibernate_secs: i64,
}

impl SleepTotals {
    fn from_events(events: &[PowerStateEvent]) -> Self {
        use powermon_protocol::PowerStateKind::*;

        let mut totals = Self::default();
        for e in events {
            match e.kind {
                Suspend { .. } | HybridSleep { .. } | Other { .. } => totals.suspends += 1,
                Hibernate { .. } => totals.hibernations += 1,
                SuspendThenHibernate { .. } => {
                    totals.suspends += 1;
                    totals.hibernations += 1;
                }
                Shutdown => totals.shutdowns += 1,
            }
            totals.suspend_secs += e.suspend_secs();
            totals.hibernate_secs += e.hibernate_secs();
        }
        totals
    }
}

fn mean_brightness_pct(samples: &[BacklightSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: i64 = samples.iter().map(BacklightSample::percent).sum();
    Some(total as f64 / samples.len() as f64)
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_secs(secs: i64) -> String {
    if secs <= 0 {
        return "-".to_string();
    }
    humantime::format_duration(Duration::from_secs(secs as u64)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use powermon_protocol::{BatteryStatus, PowerStateKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_period_range() {
        let now = 10 * SECS_PER_DAY + 3_600;
        assert_eq!(period_range("today", now), (10 * SECS_PER_DAY, now));
        assert_eq!(period_range("WEEK", now), (now - 7 * SECS_PER_DAY, now));
        assert_eq!(period_range("month", now), (now - 30 * SECS_PER_DAY, now));
        assert_eq!(period_range("all", now), (0, now));
        assert_eq!(period_range("bogus", now), (now - 7 * SECS_PER_DAY, now));
    }

    #[test]
    fn test_power_summary() {
        let sample = |power_uw, averaged| BatterySample {
            power_uw,
            power_from_charge_delta: averaged,
            status: BatteryStatus::Discharging,
            ..Default::default()
        };
        let summary =
            PowerSummary::from_samples(&[sample(4_000_000, true), sample(8_000_000, false)])
                .unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.avg_w, 6.0);
        assert_eq!(summary.min_w, 4.0);
        assert_eq!(summary.max_w, 8.0);
        assert_eq!(summary.charge_delta_pct, 50.0);

        assert_eq!(PowerSummary::from_samples(&[]), None);
    }

    #[test]
    fn test_sleep_totals() {
        let events = [
            PowerStateEvent::new(0, 20, PowerStateKind::Suspend { suspend_secs: 20 }),
            PowerStateEvent::new(
                100,
                200,
                PowerStateKind::SuspendThenHibernate {
                    suspend_secs: 30,
                    hibernate_secs: 60,
                },
            ),
            PowerStateEvent::new(300, 400, PowerStateKind::Shutdown),
        ];
        assert_eq!(
            SleepTotals::from_events(&events),
            SleepTotals {
                suspends: 2,
                hibernations: 1,
                shutdowns: 1,
                suspend_secs: 50,
                hibernate_secs: 60,
            }
        );
    }

    #[test]
    fn test_mean_brightness() {
        let sample = |brightness| BacklightSample {
            timestamp: 0,
            brightness,
            max_brightness: 200,
        };
        assert_eq!(mean_brightness_pct(&[sample(50), sample(150)]), Some(50.0));
        assert_eq!(mean_brightness_pct(&[]), None);
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(0), "-");
        assert_eq!(format_secs(90), "1m 30s");
    }
}
