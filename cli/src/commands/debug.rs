use std::path::Path;

use color_eyre::eyre::Result;
use powermon_platform::linux::{
    ac_online, find_battery, read_battery, read_cpufreq, read_health, Backlight, SysfsRoot,
};
use powermon_platform::TelemetryError;

use crate::config::{config_dir, UserConfig};
use crate::data::{HistoryStore, HistoryStoreError};
use crate::logging::log_dir;

pub fn run(config: &UserConfig, config_file: &Path) -> Result<()> {
    let root = SysfsRoot::default();

    println!("powermon debug information");
    println!("{}", "=".repeat(60));

    println!("\n--- Battery ---");
    match find_battery(&root) {
        Ok(dir) => {
            println!("Device: {}", dir.display());
            match read_battery(&dir) {
                Ok(r) => {
                    println!("Status: {}", r.status.label());
                    println!("Capacity: {}%", r.capacity_pct);
                    println!("Voltage: {:.3} V", r.voltage_uv as f64 / 1e6);
                    println!("Current: {:.3} A", r.current_ua as f64 / 1e6);
                    println!("Charge: {:.3} Ah", r.charge_now_uah as f64 / 1e6);
                    if r.power_now_uw > 0 {
                        println!("Power (reported): {:.2} W", r.power_now_uw as f64 / 1e6);
                    } else {
                        println!("Power (reported): n/a");
                    }
                    println!("Power (instant): {:.2} W", r.instant_power_uw() as f64 / 1e6);
                }
                Err(e) => println!("Read failed: {}", e),
            }
        }
        Err(e) => print_missing(&e),
    }
    println!("AC online: {}", if ac_online(&root) { "yes" } else { "no" });

    println!("\n--- Battery Health ---");
    match read_health(&root) {
        Ok(h) => {
            println!("Manufacturer: {}", or_unknown(&h.manufacturer));
            println!("Model: {}", or_unknown(&h.model));
            println!("Serial: {}", or_unknown(&h.serial_number));
            println!("Technology: {}", or_unknown(&h.technology));
            println!("Cycles: {}", h.cycle_count);
            println!(
                "Full / design: {:.3} / {:.3} Ah",
                h.charge_full_uah as f64 / 1e6,
                h.charge_full_design_uah as f64 / 1e6
            );
            if let Some(pct) = h.health_percent() {
                println!("Health: {:.1}%", pct);
            }
        }
        Err(e) => print_missing(&e),
    }

    println!("\n--- Backlight ---");
    match Backlight::find(&root) {
        Ok(bl) => {
            println!("Device: {}", bl.name());
            match (bl.brightness(), bl.max_brightness(), bl.percent()) {
                (Ok(cur), Ok(max), Ok(pct)) => println!("Brightness: {}/{} ({}%)", cur, max, pct),
                (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => println!("Read failed: {}", e),
            }
        }
        Err(e) => print_missing(&e),
    }

    println!("\n--- CPU Frequency ---");
    match read_cpufreq(&root) {
        Ok(cores) if cores.is_empty() => println!("No cpufreq interface"),
        Ok(cores) => {
            for c in cores {
                println!(
                    "cpu{:<3} cur={} min={} max={} base={} gov={}",
                    c.cpu,
                    c.cur_khz,
                    c.min_khz,
                    c.max_khz,
                    c.base_khz.map_or_else(|| "?".to_string(), |b| b.to_string()),
                    or_unknown(&c.governor)
                );
            }
        }
        Err(e) => println!("Read failed: {}", e),
    }

    println!("\n--- Paths ---");
    println!("Config: {}", config_file.display());
    println!("Config dir: {}", config_dir().display());
    println!("Logs: {}", log_dir().display());
    println!("Database: {}", config.storage.db_path.display());
    println!("State log: {}", config.storage.state_log_path.display());

    if config.storage.db_path.exists() {
        println!("\n--- Database ---");
        if let Err(e) = print_database(&config.storage.db_path) {
            println!("Open failed: {}", e);
        }
    }

    println!("\n--- Current Config ---");
    println!("{}", toml::to_string_pretty(config)?);

    Ok(())
}

fn print_database(path: &Path) -> Result<(), HistoryStoreError> {
    let store = HistoryStore::open(path)?;
    let stats = store.get_stats()?;
    println!("Size: {}", stats.size_formatted());
    println!("Battery samples: {}", stats.battery_samples);
    println!("Backlight samples: {}", stats.backlight_samples);
    println!("Power state events: {}", stats.power_state_events);
    if let (Some(oldest), Some(newest)) = (stats.oldest_sample, stats.newest_sample) {
        println!("Sample range: {} .. {}", oldest, newest);
    }
    if let Some(s) = store.latest_battery_sample()? {
        println!(
            "Latest sample: {:.2} W, {}% {} at {}",
            s.power_watts(),
            s.capacity_pct,
            s.status.label(),
            s.timestamp
        );
    }
    Ok(())
}

fn print_missing(error: &TelemetryError) {
    if error.is_not_found() {
        println!("Not present");
    } else {
        println!("Read failed: {}", error);
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "Unknown"
    } else {
        value
    }
}
